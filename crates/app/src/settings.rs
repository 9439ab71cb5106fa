use crate::cli::Cli;
use config::{Config, Environment, File, FileFormat, Map};
use tickvault_core::config::{AppConfig, ConfigError};

/// 环境变量覆盖前缀，如 `TICKVAULT__SERVER__PORT=9000`
const ENV_PREFIX: &str = "TICKVAULT";

/// # Summary
/// 按 默认值 → TOML 文件 → `TICKVAULT__*` 环境变量 → 命令行 的顺序合并配置并校验。
pub fn load(cli: &Cli) -> Result<AppConfig, ConfigError> {
    load_with_env(cli, None)
}

/// # Summary
/// 同 [`load`]，可注入环境变量表代替进程环境。
///
/// # Arguments
/// * `cli`: 已解析的命令行参数。
/// * `env`: `None` 时读取进程环境。
///
/// # Returns
/// 任一来源读取或反序列化失败返回 `ConfigError::Load`，校验失败返回 `ConfigError::Invalid`。
pub fn load_with_env(
    cli: &Cli,
    env: Option<Map<String, String>>,
) -> Result<AppConfig, ConfigError> {
    let defaults = Config::try_from(&AppConfig::default()).map_err(load_error)?;
    let mut builder = Config::builder().add_source(defaults);

    if let Some(path) = &cli.config {
        builder = builder.add_source(File::from(path.as_path()).format(FileFormat::Toml));
    }

    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("scheduler.symbols")
            .with_list_parse_key("scheduler.realtime_symbols")
            .with_list_parse_key("scheduler.periods")
            .source(env),
    );

    let config = builder
        .set_override_option("server.api_key", cli.api_key.clone())
        .map_err(load_error)?
        .set_override_option("server.port", cli.port.map(i64::from))
        .map_err(load_error)?
        .set_override_option("server.host", cli.host.clone())
        .map_err(load_error)?
        .set_override_option("storage.data_dir", cli.data_dir.clone())
        .map_err(load_error)?
        .set_override_option("feed.base_url", cli.feed_url.clone())
        .map_err(load_error)?
        .set_override_option("scheduler.enabled", cli.no_scheduler.then_some(false))
        .map_err(load_error)?
        .build()
        .map_err(load_error)?;

    let app: AppConfig = config.try_deserialize().map_err(load_error)?;
    app.validate()?;
    Ok(app)
}

fn load_error(e: config::ConfigError) -> ConfigError {
    ConfigError::Load(e.to_string())
}
