//! Repocache - demo service wiring the cache registry.
//!
//! Registers a keyed cache for every repository concern, logs every
//! registry event, and runs a freshness sweep on an interval until Ctrl-C.

use anyhow::Context;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use repocache::config::Config;
use repocache::{CacheConfig, CacheKind, CacheRegistry, KeyedCache};

type RepoCache = KeyedCache<String, String>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("invalid configuration")?;

    // RUST_LOG wins over the configured default
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting repocache...");
    info!(
        sweep_interval = ?config.sweep_interval,
        registry = ?config.registry,
        "Configuration loaded"
    );

    let registry = CacheRegistry::with_config(config.registry);
    for kind in CacheKind::ALL {
        registry.register(kind, move || Ok(RepoCache::new(kind, CacheConfig::for_kind(kind))))?;
    }

    registry.subscribe(|event| match serde_json::to_string(event) {
        Ok(json) => info!(event = %json, "Cache event"),
        Err(e) => warn!(error = %e, "Failed to serialize cache event"),
    });

    let repository = registry.repository_info_cache::<RepoCache>()?;
    let root = std::env::current_dir().context("cannot resolve working directory")?;
    repository.refresh([("root".to_string(), root.display().to_string())]);

    let mut ticker = tokio::time::interval(config.sweep_interval);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => match registry.validate_all() {
                Ok(report) => debug!(stale = ?report.stale, "Sweep complete"),
                Err(e) => warn!(error = %e, "Sweep failed"),
            },
            result = &mut shutdown => {
                if let Err(e) = result {
                    warn!(error = %e, "Failed to listen for Ctrl-C");
                }
                info!("Shutting down");
                break;
            }
        }
    }

    registry.teardown();
    Ok(())
}
