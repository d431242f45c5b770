use anyhow::Context as _;
use sales_copilot::{Clients, RetrievalMode, SalesPipeline, Settings};
use sales_copilot_service::{AppState, build_router};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// JSON logs by default, `LOG_FORMAT=pretty` for local development
fn init_tracing() {
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_else(|_| "json".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "sales_copilot=debug,sales_copilot_service=debug,insight_flow=debug,tower_http=debug"
            .into()
    });

    match log_format.as_str() {
        "pretty" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_target(true)
                        .with_level(true),
                )
                .init();
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let settings = Settings::from_env().context("invalid configuration")?;
    let clients = Clients::from_settings(&settings).context("failed to build clients")?;
    if settings.retrieval_mode == RetrievalMode::Vector {
        clients.check_index().await;
    }

    let pipeline = SalesPipeline::from_settings(&settings, &clients)
        .context("failed to build the sales pipeline")?;
    let app = build_router(AppState {
        pipeline: Arc::new(pipeline),
        timeout: settings.pipeline_timeout,
        mode: settings.retrieval_mode,
    });

    let port = std::env::var("PORT")
        .ok()
        .and_then(|port| port.parse::<u16>().ok())
        .unwrap_or(3000);
    let listener = TcpListener::bind(format!("0.0.0.0:{port}")).await?;
    let addr = listener.local_addr()?;

    info!(mode = %settings.retrieval_mode, taxonomy = settings.taxonomy.len(), "Sales Copilot starting on {}", addr);
    info!("Insight endpoint: POST http://{}/insight", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
