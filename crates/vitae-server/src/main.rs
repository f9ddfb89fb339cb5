use clap::Parser;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{info, warn};
use vitae_core::config::{PollerSettings, VitaeConfig};
use vitae_scheduler::{
    CronPoller, DocumentHandler, LeaseStore, ListingExpiryReaper, PollerConfig, Stores,
    TaskHandler, UnverifiedUserReaper,
};

/// Background worker: alert digests, reminders and housekeeping.
#[derive(Debug, Parser)]
#[command(name = "vitae-server", version)]
struct Cli {
    /// Config file (defaults to VITAE_CONFIG, then ~/.vitae/vitae.toml).
    #[arg(long, env = "VITAE_CONFIG")]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vitae_server=info,vitae_scheduler=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = VitaeConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        VitaeConfig::default()
    });

    let db_path = &config.database.path;
    ensure_parent_dir(db_path);
    info!(path = %db_path, "opening SQLite database");
    let conn = vitae_core::db::open(db_path)?;
    vitae_scheduler::init_all(&conn)?;
    info!("database migrations complete");

    let stores = Stores::new(vitae_core::db::shared(conn));
    let email = vitae_notify::email_sender(&config.notify.email)?;
    let push = vitae_notify::push_sender(&config.notify.push)?;
    let handler = TaskHandler::new(
        stores.clone(),
        email,
        push,
        config.site.clone(),
        config.alerts.watermark,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut pollers = JoinSet::new();
    spawn_poller(
        &mut pollers,
        &config.cron.tasks,
        CronPoller::new(
            "tasks",
            stores.tasks.clone(),
            handler,
            PollerConfig::from(&config.cron.tasks),
        ),
        &shutdown_rx,
    );
    spawn_poller(
        &mut pollers,
        &config.cron.users,
        CronPoller::new(
            "users",
            stores.users.clone(),
            UnverifiedUserReaper::new(stores.users.clone()),
            PollerConfig::from(&config.cron.users),
        ),
        &shutdown_rx,
    );
    spawn_poller(
        &mut pollers,
        &config.cron.posts,
        CronPoller::new(
            "posts",
            stores.content.clone(),
            ListingExpiryReaper::new(stores.content.clone()),
            PollerConfig::from(&config.cron.posts),
        ),
        &shutdown_rx,
    );
    info!(pollers = pollers.len(), "Vitae worker running");

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    let _ = shutdown_tx.send(true);

    while let Some(done) = pollers.join_next().await {
        if let Err(e) = done {
            warn!(error = %e, "poller task ended abnormally");
        }
    }
    info!("Vitae worker stopped");
    Ok(())
}

fn spawn_poller<S, H>(
    set: &mut JoinSet<()>,
    settings: &PollerSettings,
    poller: CronPoller<S, H>,
    shutdown: &watch::Receiver<bool>,
) where
    S: LeaseStore,
    H: DocumentHandler<S::Doc>,
{
    if !settings.enabled {
        info!(collection = poller.name(), "poller disabled");
        return;
    }
    set.spawn(poller.run(shutdown.clone()));
}

fn ensure_parent_dir(path: &str) {
    if let Some(parent) = std::path::Path::new(path).parent() {
        let _ = std::fs::create_dir_all(parent);
    }
}
