//! 统一配置中心
//!
//! 加载顺序：内置默认值 → `CHAT_CONFIG_FILE` 指定的文件（toml/yaml/json）→ `CHAT_*` 环境变量，
//! 嵌套字段用 `__` 分隔，例如 `CHAT_SERVER__PORT=9000`。

use std::time::Duration;

use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use validator::Validate;

pub const CONFIG_FILE_ENV: &str = "CHAT_CONFIG_FILE";
pub const ENV_PREFIX: &str = "CHAT_";

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(range(min = 1))]
    pub port: u16,
}

/// 推送流配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct StreamConfig {
    /// 每个推送流缓冲的消息条数
    #[validate(range(min = 1, max = 65536))]
    pub sink_capacity: usize,
    /// 单次推送的超时时间（毫秒）
    #[validate(range(min = 1))]
    pub push_timeout_ms: u64,
    /// SSE 心跳间隔（秒）
    #[validate(range(min = 1))]
    pub keep_alive_secs: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct LogConfig {
    /// `EnvFilter` 语法，`RUST_LOG` 存在时以它为准
    #[validate(length(min = 1))]
    pub filter: String,
    #[serde(default)]
    pub json: bool,
}

/// 全局应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AppConfig {
    #[validate(nested)]
    pub server: ServerConfig,
    #[validate(nested)]
    pub stream: StreamConfig,
    #[validate(nested)]
    pub log: LogConfig,
    /// 收到停止信号后等待连接排空的时间（秒）
    #[validate(range(min = 1))]
    pub shutdown_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".into(),
                port: 8080,
            },
            stream: StreamConfig {
                sink_capacity: 64,
                push_timeout_ms: 5_000,
                keep_alive_secs: 15,
            },
            log: LogConfig {
                filter: "info".into(),
                json: false,
            },
            shutdown_timeout_secs: 10,
        }
    }
}

/// 配置错误类型
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),
    #[error("failed to parse configuration: {0}")]
    Parse(String),
    #[error("invalid configuration: {0}")]
    Invalid(#[from] validator::ValidationErrors),
}

impl From<figment::Error> for ConfigError {
    fn from(value: figment::Error) -> Self {
        ConfigError::Load(Box::new(value))
    }
}

impl AppConfig {
    /// 按默认值、配置文件、环境变量的优先级加载并校验
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_figment(Self::figment())
    }

    pub fn figment() -> Figment {
        let mut fig = Figment::new().merge(Serialized::defaults(AppConfig::default()));
        if let Ok(path) = std::env::var(CONFIG_FILE_ENV) {
            if path.ends_with(".yml") || path.ends_with(".yaml") {
                fig = fig.merge(Yaml::file(path));
            } else if path.ends_with(".json") {
                fig = fig.merge(Json::file(path));
            } else {
                fig = fig.merge(Toml::file(path));
            }
        }
        fig.merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
        let config: AppConfig = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// 解析完整的配置文本，按开头字符粗略判断格式
    pub fn from_str(s: &str) -> Result<Self, ConfigError> {
        let trimmed = s.trim_start();
        let config: AppConfig = if trimmed.starts_with('{') {
            serde_json::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?
        } else if trimmed.starts_with('[') || s.contains('=') {
            toml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?
        } else {
            serde_yaml::from_str(s).map_err(|e| ConfigError::Parse(e.to_string()))?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn push_timeout(&self) -> Duration {
        Duration::from_millis(self.stream.push_timeout_ms)
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.stream.keep_alive_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}
