use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

use wp_courier::articles::{ArticleStore, HttpArticleStore};
use wp_courier::http::{create_router, AppState};
use wp_courier::wordpress::{WordPressClient, WordPressService};
use wp_courier::{config, db, sweep};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_target(false)
        .compact()
        .init();

    let args = Args::parse();
    let cfg = config::load(Some(&args.config))?;
    cfg.ensure_dirs()?;

    let database_url = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| format!("sqlite://{}/wp-courier.db", cfg.app.data_dir));

    let pool = db::init_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let timeout = Duration::from_secs(cfg.app.http_timeout_secs);
    let articles: Arc<dyn ArticleStore> =
        Arc::new(HttpArticleStore::new(&cfg.article_api.base_url, timeout)?);
    let wordpress: Arc<dyn WordPressService> = Arc::new(WordPressClient::new(timeout));
    let due_batch_limit = cfg.app.due_batch_limit as i64;

    // Spawn the scheduled-post sweep loop.
    let sweep_pool = pool.clone();
    let sweep_articles = articles.clone();
    let sweep_wordpress = wordpress.clone();
    let interval = Duration::from_secs(cfg.app.sweep_interval_secs);
    tokio::spawn(async move {
        loop {
            match sweep::process_due(
                &sweep_pool,
                sweep_articles.as_ref(),
                sweep_wordpress.as_ref(),
                chrono::Utc::now(),
                due_batch_limit,
            )
            .await
            {
                Ok(report) if report.processed > 0 => {
                    info!(
                        processed = report.processed,
                        succeeded = report.succeeded,
                        failed = report.failed,
                        "processed due publish records"
                    );
                }
                Ok(_) => {}
                Err(err) => error!(?err, "sweep error"),
            }
            tokio::time::sleep(interval).await;
        }
    });

    let state = AppState {
        pool,
        articles,
        wordpress,
        due_batch_limit,
    };
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(cfg.server.bind_addr.as_str()).await?;
    info!(addr = %cfg.server.bind_addr, "starting publish service");
    axum::serve(listener, app).await?;

    Ok(())
}
