//! Configuration Loader
//!
//! 实现多源配置加载与合并逻辑
//!
//! 优先级（从高到低）：
//! 1. 环境变量
//! 2. 配置文件（cadenza.toml）
//! 3. 默认值

use config::{Config, ConfigError as ConfigCrateError, Environment, File};
use std::path::Path;
use thiserror::Error;

use super::types::AppConfig;

/// 配置加载错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

impl From<ConfigCrateError> for ConfigError {
    fn from(err: ConfigCrateError) -> Self {
        ConfigError::LoadError(err.to_string())
    }
}

/// 配置文件搜索路径
const CONFIG_FILE_NAMES: &[&str] = &["cadenza", "cadenza.local"];

/// 环境变量前缀
const ENV_PREFIX: &str = "CADENZA";

/// 加载应用配置
///
/// 按优先级从高到低合并配置：
/// 1. 环境变量（前缀 `CADENZA_`，层级分隔符 `__`）
/// 2. 配置文件（cadenza.toml 或 cadenza.local.toml）
/// 3. 默认值
///
/// # 环境变量示例
/// - `CADENZA_SERVICE__URL=https://music.example.com`
/// - `CADENZA_RETRY__MAX_RETRIES=5`
/// - `CADENZA_STORAGE__OUTPUT_DIR=/home/me/renders`
pub fn load_config() -> Result<AppConfig, ConfigError> {
    load_config_from_path(None)
}

/// 从指定路径加载配置
///
/// # 参数
/// - `config_path` - 可选的配置文件路径，如果为 None 则使用默认搜索路径
pub fn load_config_from_path(config_path: Option<&Path>) -> Result<AppConfig, ConfigError> {
    let mut builder = Config::builder();

    // 1. 默认值（最低优先级）
    builder = builder
        .set_default("service.url", "http://localhost:8000")?
        .set_default("service.timeout_secs", 30)?
        .set_default("service.connect_timeout_secs", 10)?
        .set_default("service.supports_resume", false)?
        .set_default("service.max_frame_bytes", 4 * 1024 * 1024)?
        .set_default("retry.max_retries", 3)?
        .set_default("retry.initial_backoff_ms", 500)?
        .set_default("retry.max_backoff_ms", 8000)?
        .set_default("session.cancel_grace_ms", 2000)?
        .set_default("session.stream_idle_timeout_secs", 30)?
        .set_default("session.event_capacity", 256)?
        .set_default("prompt.max_chars", 1000)?
        .set_default("prompt.min_duration_secs", 5)?
        .set_default("prompt.max_duration_secs", 120)?
        .set_default("audio.sample_rate", 48000)?
        .set_default("audio.channels", 2)?
        .set_default("audio.bits_per_sample", 16)?
        .set_default("storage.write_sidecar", true)?
        .set_default("credential.env_var", "CADENZA_API_KEY")?
        .set_default("log.level", "info")?
        .set_default("log.json", false)?;

    // 2. 配置文件（如果存在）
    if let Some(path) = config_path {
        builder = builder.add_source(File::from(path).required(true));
    } else {
        for name in CONFIG_FILE_NAMES {
            builder = builder.add_source(File::with_name(name).required(false));
        }
    }

    // 3. 环境变量（最高优先级）
    // 例如: CADENZA_SERVICE__URL=http://music-server:8000
    // 注意: CADENZA_API_KEY 会被读成顶层 api_key，AppConfig 忽略该字段
    builder = builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true),
    );

    let config = builder.build()?;

    let app_config: AppConfig = config.try_deserialize().map_err(|e| {
        ConfigError::ParseError(format!("Failed to deserialize config: {}", e))
    })?;

    validate_config(&app_config)?;

    Ok(app_config)
}

/// 验证配置有效性
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.service.url.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "Service URL cannot be empty".to_string(),
        ));
    }

    if config.service.max_frame_bytes == 0 {
        return Err(ConfigError::ValidationError(
            "Maximum frame size cannot be 0".to_string(),
        ));
    }

    if config.audio.sample_rate == 0 || config.audio.channels == 0 {
        return Err(ConfigError::ValidationError(
            "Audio sample rate and channel count must be positive".to_string(),
        ));
    }

    if config.audio.bits_per_sample != 16 {
        return Err(ConfigError::ValidationError(format!(
            "Unsupported bit depth {}, only 16-bit PCM is supported",
            config.audio.bits_per_sample
        )));
    }

    if config.prompt.min_duration_secs > config.prompt.max_duration_secs {
        return Err(ConfigError::ValidationError(format!(
            "Prompt duration bounds are inverted ({} > {})",
            config.prompt.min_duration_secs, config.prompt.max_duration_secs
        )));
    }

    if config.prompt.max_chars == 0 {
        return Err(ConfigError::ValidationError(
            "Prompt max_chars cannot be 0".to_string(),
        ));
    }

    if config.retry.initial_backoff_ms > config.retry.max_backoff_ms {
        return Err(ConfigError::ValidationError(format!(
            "initial_backoff_ms ({}) cannot exceed max_backoff_ms ({})",
            config.retry.initial_backoff_ms, config.retry.max_backoff_ms
        )));
    }

    if config.credential.env_var.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "Credential env_var cannot be empty".to_string(),
        ));
    }

    Ok(())
}

/// 打印配置信息（用于启动时日志）
pub fn print_config(config: &AppConfig) {
    tracing::info!("=== Cadenza Configuration ===");
    tracing::info!("Service URL: {}", config.service.url);
    tracing::info!("Service Timeout: {}s", config.service.timeout_secs);
    tracing::info!("Resume Supported: {}", config.service.supports_resume);
    tracing::info!(
        "Retry: max {} (backoff {}ms..{}ms)",
        config.retry.max_retries,
        config.retry.initial_backoff_ms,
        config.retry.max_backoff_ms
    );
    tracing::info!("Cancel Grace: {}ms", config.session.cancel_grace_ms);
    tracing::info!("Stream Idle Timeout: {}s", config.session.stream_idle_timeout_secs);
    tracing::info!(
        "Audio: {} Hz, {} ch, {} bit",
        config.audio.sample_rate,
        config.audio.channels,
        config.audio.bits_per_sample
    );
    match &config.storage.output_dir {
        Some(dir) => tracing::info!("Output Directory: {:?}", dir),
        None => tracing::info!("Output Directory: <system temp>/cadenza"),
    }
    tracing::info!("Credential Variable: {}", config.credential.env_var);
    tracing::info!("Log Level: {}", config.log.level);
    tracing::info!("=============================");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_validation_passes_for_valid_config() {
        let config = AppConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validation_error_for_empty_url() {
        let mut config = AppConfig::default();
        config.service.url = "  ".to_string();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_error_for_bad_audio() {
        let mut config = AppConfig::default();
        config.audio.bits_per_sample = 24;
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.audio.channels = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validation_error_for_inverted_bounds() {
        let mut config = AppConfig::default();
        config.prompt.min_duration_secs = 60;
        config.prompt.max_duration_secs = 30;
        assert!(validate_config(&config).is_err());

        let mut config = AppConfig::default();
        config.retry.initial_backoff_ms = 10_000;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[service]\nurl = \"http://music.test:9000\"\nsupports_resume = true\n\n[retry]\nmax_retries = 5\n\n[storage]\noutput_dir = \"/tmp/renders\""
        )
        .unwrap();

        let config = load_config_from_path(Some(file.path())).unwrap();
        assert_eq!(config.service.url, "http://music.test:9000");
        assert!(config.service.supports_resume);
        assert_eq!(config.retry.max_retries, 5);
        assert_eq!(config.retry.initial_backoff_ms, 500);
        assert_eq!(
            config.storage.output_dir.as_deref(),
            Some(Path::new("/tmp/renders"))
        );
    }
}
