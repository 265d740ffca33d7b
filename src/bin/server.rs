use std::sync::Arc;
use stock_query_engine::{
    api::start_server,
    config::Settings,
    extractor::{GeminiBackend, GroqBackend, ModelBackend, ProbabilityGate},
    selector::{HttpMarketDataProvider, ModelRanker, NoRanker, ResultRanker, StockSelector},
    IntentExtractor, QueryPipeline,
};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    let settings = Settings::from_env();

    if settings.gemini_api_key.is_empty() && settings.groq_api_key.is_empty() {
        eprintln!("⚠️  No model API keys set; queries will use the keyword extractor only");
    }

    info!("🚀 Stock Query Engine - API Server");
    info!("📍 Port: {}", settings.port);

    // Extraction fallback chain: Gemini, then Groq.
    let backends: Vec<Box<dyn ModelBackend>> = vec![
        Box::new(GeminiBackend::new(
            settings.gemini_api_key.clone(),
            settings.gemini_model.clone(),
        )),
        Box::new(GroqBackend::new(
            settings.groq_api_key,
            settings.groq_model,
        )),
    ];

    let extractor = IntentExtractor::new(
        backends,
        Box::new(ProbabilityGate::new(settings.model_probability)),
        std::time::Duration::from_secs(settings.cache_ttl_secs),
        settings.cache_capacity,
    );

    let provider = HttpMarketDataProvider::new(
        settings.market_api_host,
        settings.market_api_key,
    );

    let ranker: Box<dyn ResultRanker> = if settings.enable_ranking {
        Box::new(ModelRanker::new(Box::new(GeminiBackend::new(
            settings.gemini_api_key,
            settings.gemini_model,
        ))))
    } else {
        Box::new(NoRanker)
    };

    let selector = StockSelector::new(Box::new(provider), ranker);

    let pipeline = Arc::new(QueryPipeline::new(extractor, selector));

    info!("✅ Pipeline initialized");
    info!("📡 Starting API server...");

    start_server(pipeline, settings.port).await?;

    Ok(())
}
