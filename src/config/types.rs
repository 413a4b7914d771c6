//! Configuration Types
//!
//! 定义所有配置结构体

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::application::session::{RetryPolicy, SessionSettings};
use crate::domain::{AudioSpec, PromptLimits};

/// 应用主配置
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    /// 远程生成服务配置
    #[serde(default)]
    pub service: ServiceConfig,

    /// 重试配置
    #[serde(default)]
    pub retry: RetryConfig,

    /// 会话配置
    #[serde(default)]
    pub session: SessionConfig,

    /// 提示词限制
    #[serde(default)]
    pub prompt: PromptConfig,

    /// 音频流格式
    #[serde(default)]
    pub audio: AudioConfig,

    /// 存储配置
    #[serde(default)]
    pub storage: StorageConfig,

    /// 凭据配置
    #[serde(default)]
    pub credential: CredentialConfig,

    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

impl AppConfig {
    /// 会话运行参数
    pub fn session_settings(&self) -> SessionSettings {
        SessionSettings {
            retry: RetryPolicy::new(
                self.retry.max_retries,
                Duration::from_millis(self.retry.initial_backoff_ms),
                Duration::from_millis(self.retry.max_backoff_ms),
            ),
            cancel_grace: Duration::from_millis(self.session.cancel_grace_ms),
            stream_idle_timeout: match self.session.stream_idle_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            prompt_limits: PromptLimits {
                max_chars: self.prompt.max_chars,
                min_duration_secs: self.prompt.min_duration_secs,
                max_duration_secs: self.prompt.max_duration_secs,
            },
            audio: self.audio.spec(),
        }
    }
}

/// 远程生成服务配置
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// 服务基础 URL
    #[serde(default = "default_service_url")]
    pub url: String,

    /// 等待响应头的超时时间（秒）
    #[serde(default = "default_service_timeout")]
    pub timeout_secs: u64,

    /// 建连超时时间（秒）
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// 服务是否支持从块序号续传
    #[serde(default)]
    pub supports_resume: bool,

    /// 单帧最大字节数
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

fn default_service_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_service_timeout() -> u64 {
    30
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_max_frame_bytes() -> usize {
    4 * 1024 * 1024 // 4 MiB
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            url: default_service_url(),
            timeout_secs: default_service_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            supports_resume: false,
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

/// 重试配置
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    /// 瞬时错误最大重试次数
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff")]
    pub max_backoff_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_backoff() -> u64 {
    500
}

fn default_max_backoff() -> u64 {
    8000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_ms: default_max_backoff(),
        }
    }
}

/// 会话配置
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// 取消后等待远程调用停止的宽限期（毫秒）
    #[serde(default = "default_cancel_grace")]
    pub cancel_grace_ms: u64,

    /// 等待下一个音频块的超时（秒），0 表示不限制
    #[serde(default = "default_stream_idle_timeout")]
    pub stream_idle_timeout_secs: u64,

    /// 事件广播通道容量
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_cancel_grace() -> u64 {
    2000
}

fn default_stream_idle_timeout() -> u64 {
    30
}

fn default_event_capacity() -> usize {
    256
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cancel_grace_ms: default_cancel_grace(),
            stream_idle_timeout_secs: default_stream_idle_timeout(),
            event_capacity: default_event_capacity(),
        }
    }
}

/// 提示词限制
#[derive(Debug, Clone, Deserialize)]
pub struct PromptConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,

    #[serde(default = "default_min_duration")]
    pub min_duration_secs: u32,

    #[serde(default = "default_max_duration")]
    pub max_duration_secs: u32,
}

fn default_max_chars() -> usize {
    1000
}

fn default_min_duration() -> u32 {
    5
}

fn default_max_duration() -> u32 {
    120
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            min_duration_secs: default_min_duration(),
            max_duration_secs: default_max_duration(),
        }
    }
}

/// 音频流格式
#[derive(Debug, Clone, Deserialize)]
pub struct AudioConfig {
    /// 采样率（Hz）
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,

    /// 声道数
    #[serde(default = "default_channels")]
    pub channels: u16,

    /// 位深，目前只支持 16
    #[serde(default = "default_bits_per_sample")]
    pub bits_per_sample: u16,
}

fn default_sample_rate() -> u32 {
    48000
}

fn default_channels() -> u16 {
    2 // 立体声
}

fn default_bits_per_sample() -> u16 {
    16
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            bits_per_sample: default_bits_per_sample(),
        }
    }
}

impl AudioConfig {
    pub fn spec(&self) -> AudioSpec {
        AudioSpec {
            sample_rate: self.sample_rate,
            channels: self.channels,
            bits_per_sample: self.bits_per_sample,
        }
    }
}

/// 存储配置
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// 资产输出目录，未设置时使用系统临时目录下的 cadenza/
    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    /// 是否写出 TOML 元数据文件
    #[serde(default = "default_write_sidecar")]
    pub write_sidecar: bool,
}

fn default_write_sidecar() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            write_sidecar: default_write_sidecar(),
        }
    }
}

/// 凭据配置
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialConfig {
    /// 读取 API Key 的环境变量名
    #[serde(default = "default_credential_env")]
    pub env_var: String,
}

fn default_credential_env() -> String {
    "CADENZA_API_KEY".to_string()
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            env_var: default_credential_env(),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// 日志级别
    #[serde(default = "default_log_level")]
    pub level: String,

    /// 是否启用 JSON 格式
    #[serde(default)]
    pub json: bool,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}
