//! Centrix Admin Server — generated CRUD administration for PostgreSQL tables.
//!
//! Tables listed in `ADMIN_SECTIONS` are introspected at startup and served
//! through the admin router. `--memory` serves a demo blog without a database.

mod config;
mod demo;
mod metrics;

use std::net::SocketAddr;

use admin_core::introspect::introspect_table;
use admin_core::metadata::ColumnType;
use admin_core::{
    AdminEntity, AdminEnvironment, AdminSection, AdminSite, AdminState, PgPool, PgRepository,
    UrlBuilder,
};
use axum::routing::get;
use axum::{Json, Router};
use clap::Parser;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::AsyncPgConnection;
use tower_http::trace::TraceLayer;

use crate::config::AdminConfig;

#[derive(Parser)]
#[command(name = "centrix-admin", about = "Centrix Admin Server")]
struct Cli {
    /// Server port
    #[arg(short, long, env = "ADMIN_PORT", default_value = "9090")]
    port: u16,

    /// PostgreSQL connection URL
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Serve the demo blog from memory instead of PostgreSQL
    #[arg(long)]
    memory: bool,

    /// Create and fill the demo blog tables before introspection
    #[arg(long)]
    seed_demo: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| "info".into()),
            )
            .init();
    }

    let cli = Cli::parse();
    let config = AdminConfig::from_env();

    tracing::info!("Starting Centrix Admin Server...");

    let site = if cli.memory {
        tracing::info!("Serving the in-memory demo site");
        demo::memory_site(config.results_per_page).await?
    } else {
        postgres_site(&cli, &config).await?
    };

    let entity_count: usize = site
        .get_section_list()
        .iter()
        .map(|s| s.entities().len())
        .sum();
    if entity_count == 0 {
        tracing::warn!("No entities registered -- set ADMIN_SECTIONS or use --seed-demo");
    }

    let env = match &config.template_dir {
        Some(dir) => AdminEnvironment::with_template_dir(dir)?,
        None => AdminEnvironment::new()?,
    };
    let urls = UrlBuilder::new(&config.base_path);
    let index_url = urls.index_url();
    let state = AdminState::new(site, env, urls);
    let app = app(state);

    // Initialize metrics
    metrics::init_metrics();
    metrics::registered_entities(entity_count);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
    tracing::info!("Centrix Admin Server listening on {} (admin at {})", addr, index_url);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutdown complete");
    Ok(())
}

fn app(state: AdminState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(admin_core::mount(state))
        .layer(TraceLayer::new_for_http())
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Connect, optionally apply the demo schema, and introspect every configured table.
async fn postgres_site(cli: &Cli, config: &AdminConfig) -> anyhow::Result<AdminSite> {
    let db_url = cli
        .database_url
        .clone()
        .ok_or_else(|| anyhow::anyhow!("DATABASE_URL is required unless --memory is set"))?;

    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(db_url);
    let pool: PgPool = PgPool::builder(manager)
        .max_size(config.max_connections)
        .build()
        .map_err(|e| anyhow::anyhow!("diesel pool: {e}"))?;

    let mut conn = pool
        .get()
        .await
        .map_err(|e| anyhow::anyhow!("diesel pool: {e}"))?;

    if cli.seed_demo {
        tracing::info!("Running demo schema migration...");
        demo::run_migration(&mut conn).await?;
        tracing::info!("Demo schema migration completed.");
    }

    let sections = if config.sections.is_empty() && cli.seed_demo {
        demo::demo_sections()
    } else {
        config.sections.clone()
    };

    let mut site = AdminSite::new();
    for section_config in &sections {
        let mut section = AdminSection::new(section_config.name.as_str());
        for table in &section_config.tables {
            let metadata = introspect_table(&mut conn, table, None).await?;
            let search_fields: Vec<String> = metadata
                .columns
                .iter()
                .filter(|c| !c.is_primary && c.column_type == ColumnType::Text)
                .map(|c| c.name.clone())
                .collect();
            let search_fields: Vec<&str> = search_fields.iter().map(String::as_str).collect();
            tracing::info!(
                "Introspected {} ({} columns, {} relations)",
                table,
                metadata.columns.len(),
                metadata.relations.len()
            );
            let entity = AdminEntity::new(PgRepository::new(pool.clone(), metadata))
                .with_search_fields(&search_fields)
                .with_results_per_page(config.results_per_page);
            section.register(entity)?;
        }
        site.register_section(section)?;
    }
    Ok(site)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    async fn demo_app(base: &str) -> Router {
        let site = demo::memory_site(10).await.unwrap();
        let state = AdminState::new(site, AdminEnvironment::new().unwrap(), UrlBuilder::new(base));
        app(state)
    }

    async fn status(app: Router, uri: &str) -> StatusCode {
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        app.oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn health_and_admin_are_served_together() {
        let app = demo_app("/api/admin").await;
        assert_eq!(status(app.clone(), "/health").await, StatusCode::OK);
        assert_eq!(status(app.clone(), "/api/admin").await, StatusCode::OK);
        assert_eq!(status(app.clone(), "/api/admin/blog/post").await, StatusCode::OK);
        assert_eq!(status(app, "/api/admin/blog/tag/%22history%22/change").await, StatusCode::OK);
    }

    #[tokio::test]
    async fn admin_mounts_at_root_with_empty_base() {
        let app = demo_app("").await;
        assert_eq!(status(app.clone(), "/").await, StatusCode::OK);
        assert_eq!(status(app.clone(), "/accounts/user/1/change").await, StatusCode::OK);
        assert_eq!(status(app, "/health").await, StatusCode::OK);
    }
}
