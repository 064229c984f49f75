use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use wp_courier::articles::{ArticleStore, HttpArticleStore};
use wp_courier::wordpress::{WordPressClient, WordPressService};
use wp_courier::{config, db, sweep};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Process all currently-due scheduled publish records and exit"
)]
struct Args {
    /// Path to YAML config file
    #[arg(long, default_value = "config.yaml")]
    config: PathBuf,

    /// Maximum records per sweep batch (overrides the configured limit)
    #[arg(long)]
    batch_limit: Option<i64>,
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
    let limit = args.batch_limit.unwrap_or(cfg.app.due_batch_limit as i64);

    info!("starting scheduled-post drain");

    let mut total = sweep::SweepReport::default();
    loop {
        let report = sweep::process_due(
            &pool,
            articles.as_ref(),
            wordpress.as_ref(),
            chrono::Utc::now(),
            limit,
        )
        .await?;
        if report.processed == 0 {
            break;
        }
        total.processed += report.processed;
        total.succeeded += report.succeeded;
        total.failed += report.failed;
        info!(
            processed = total.processed,
            succeeded = total.succeeded,
            failed = total.failed,
            "drain progress"
        );
    }

    info!(
        processed = total.processed,
        succeeded = total.succeeded,
        failed = total.failed,
        "all due publish records processed"
    );
    Ok(())
}
