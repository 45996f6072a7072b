use config::{Config, Environment, File};
use serde::de::DeserializeOwned;
use std::borrow::Cow;
use std::path::{Path, PathBuf};
use tracing::info;

/// Prefix of environment overrides (`GTS__SERVER__PORT` maps to `server.port`).
pub const ENV_PREFIX: &str = "GTS";
/// Config file looked up when no path is given. Any extension `config` understands is accepted.
pub const DEFAULT_CONFIG_FILE: &str = "manager";

/// Custom error type for config loading.
#[gts_derive::gts_error]
pub enum ConfigError {
    #[error("Config error{}: {source}", format_context(.context))]
    Config { source: config::ConfigError, context: Option<Cow<'static, str>> },
}

/// A reusable configuration loader that combines file-based settings with environment overrides.
///
/// Layers, lowest priority first:
/// 1. **Base File**: an explicit `path` must exist. Without one, `manager.*` in the working
///    directory is used when present and every value falls back to its `Default` otherwise.
/// 2. **Environment Overrides**: variables prefixed with `GTS__`, nested with double
///    underscores (e.g., `GTS__REGISTRY__CHANNEL_EXPIRED_SECS` maps to
///    `registry.channel_expired_secs`). Values are parsed into numbers and booleans first, so
///    they survive flattened targets such as `ManagerConfig`.
///
/// # Errors
/// This function will return an error if:
/// * An explicitly specified configuration file cannot be found.
/// * The merged content does not match the structure of type `T`.
///
/// # Example
/// ```rust
/// use gts_kernel::config::load_config;
///
/// #[derive(Default, serde::Deserialize)]
/// struct AppConfig {
///     port: u16,
/// }
///
/// let cfg: AppConfig = load_config(Some("config/local")).unwrap_or_default();
/// ```
pub fn load_config<T>(path: Option<impl AsRef<Path>>) -> Result<T, ConfigError>
where
    T: DeserializeOwned,
{
    let required = path.is_some();
    let effective_path =
        path.map_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE), |p| p.as_ref().to_path_buf());

    let builder = Config::builder()
        .add_source(File::from(effective_path.as_path()).required(required))
        .add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true)
                .convert_case(config::Case::Snake),
        );

    info!(path = %effective_path.display(), required, "Loading config");

    let config = builder
        .build()
        .context("Failed to build config")?
        .try_deserialize::<T>()
        .context("Failed to deserialize config")?;

    Ok(config)
}
