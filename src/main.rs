use std::sync::Arc;

use anyhow::Context;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;

use partner_onboard::config::{OnboardingConfig, ServerConfig};
use partner_onboard::onboarding::{
    DirectorySink, OnboardingService, TeamRouting, TracingNotifier, onboarding_routes,
};
use partner_onboard::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let server_config = ServerConfig::from_env();
    let onboarding_config = OnboardingConfig::from_env();

    eprintln!("Partner Onboarding v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: http://0.0.0.0:{}/api/partners/{{partner_id}}/onboarding", server_config.port);
    eprintln!("   Database: {}", server_config.db_path);
    eprintln!("   Documents: {}", server_config.documents_dir);

    // ── Database ─────────────────────────────────────────────────────────
    let db_path = std::path::Path::new(&server_config.db_path);
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(db_path)
            .await
            .with_context(|| format!("failed to open database at {}", server_config.db_path))?,
    );

    // ── Onboarding ───────────────────────────────────────────────────────
    let notifier = Arc::new(TracingNotifier::new(TeamRouting::default()));
    let service = Arc::new(
        OnboardingService::new(db, notifier, onboarding_config)
            .with_document_sink(Arc::new(DirectorySink::new(&server_config.documents_dir))),
    );

    let app = onboarding_routes(service).layer(ServiceBuilder::new().layer(CorsLayer::permissive()));

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", server_config.port))
        .await
        .with_context(|| format!("failed to bind port {}", server_config.port))?;
    tracing::info!(port = server_config.port, "Onboarding server started");
    axum::serve(listener, app).await?;

    Ok(())
}
