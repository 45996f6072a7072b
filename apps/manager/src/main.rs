use anyhow::Context;
use gts_kernel::config::load_config;
use gts_kernel::domain::config::ManagerConfig;
use gts_logger::{LevelFilter, Logger};
use gts_manager::Server;

#[gts_runtime::main(coordinator)]
async fn main() -> anyhow::Result<()> {
    // An explicit path must exist; without one `manager.toml` is optional.
    let path = std::env::args().nth(1);
    let cfg: ManagerConfig =
        load_config(path.as_deref()).context("Critical: Configuration is malformed")?;

    let level: LevelFilter = cfg
        .log
        .level
        .parse()
        .with_context(|| format!("Invalid log level: {}", cfg.log.level))?;

    let mut logger = Logger::builder(env!("CARGO_PKG_NAME")).level(level).json(cfg.log.json);
    if let Some(filter) = &cfg.log.filter {
        logger = logger.env_filter(filter);
    }
    if let Some(path) = &cfg.log.path {
        logger = logger.path(path);
    }
    let _log = logger.init()?;

    Server::builder().config(cfg).build()?.run().await
}
