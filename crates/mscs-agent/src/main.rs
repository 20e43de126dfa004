use mscs_agent::cache::CacheSweeper;
use mscs_agent::config::AgentConfig;
use mscs_agent::enrich::PropertyEnricher;
use mscs_agent::executor::CommandExecutor;
use mscs_agent::http;
use mscs_agent::properties_store::PropertiesStore;
use mscs_agent::state::AppState;
use mscs_agent::worlds::WorldService;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn init_tracing(cfg: &AgentConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let (file_layer, guard) = match &cfg.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "mscs-agent.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();

    guard
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = AgentConfig::from_env()?;
    let _log_guard = init_tracing(&cfg);

    tracing::info!(
        mscs = %cfg.executor.executable.display(),
        worlds_root = %cfg.worlds_root.display(),
        timeout_ms = cfg.executor.timeout.as_millis() as u64,
        "mscs-agent starting"
    );

    let worlds = WorldService::new(
        CommandExecutor::new(cfg.executor.clone()),
        PropertyEnricher::new(cfg.worlds_root.clone()),
    );
    let properties = PropertiesStore::open(cfg.properties_path.clone()).await?;

    let sweeper = CacheSweeper::spawn(cfg.cache_sweep_interval, {
        let worlds = worlds.clone();
        move || {
            let worlds = worlds.clone();
            async move { worlds.evict_all().await }
        }
    });

    let app = http::router(AppState { worlds, properties });

    let listener = tokio::net::TcpListener::bind(cfg.listen_addr).await?;
    tracing::info!(addr = %cfg.listen_addr, "mscs-agent HTTP listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown requested");
        })
        .await?;

    sweeper.stop().await;
    Ok(())
}
