//! 配置管理
//!
//! 静态配置从 TOML 文件加载，环境变量可覆盖。
//! 优先级：ENV > config.toml > 默认值。
//! ENV 前缀：REGISTRY_STATS，分隔符：__
//! 示例：REGISTRY_STATS__STATS__FLUSH_INTERVAL=2s

use serde::{Deserialize, Serialize};
use tracing::error;

use crate::errors::{RegistryStatsError, Result};
use crate::stats::FlushMode;
use crate::utils::parse_duration_ms;

fn default_database_url() -> String {
    "sqlite://registry-stats.db".to_string()
}

fn default_database_pool_size() -> u32 {
    10
}

fn default_database_timeout() -> u64 {
    30
}

fn default_flush_interval() -> String {
    "30s".to_string()
}

fn default_max_pending_entries() -> usize {
    1_000
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

/// 数据库连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_database_pool_size")]
    pub pool_size: u32,
    /// 连接 / 事务超时（秒），超时语义委托给存储层
    #[serde(default = "default_database_timeout")]
    pub timeout: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            pool_size: default_database_pool_size(),
            timeout: default_database_timeout(),
        }
    }
}

/// 计数器行为配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CounterConfig {
    /// 刷盘间隔：时长字符串（`"2s"`、`"500ms"`），`"0"` 表示同步刷盘，
    /// 负数表示禁用定时刷盘
    #[serde(default = "default_flush_interval")]
    pub flush_interval: String,
    /// 缓冲区键数超过该阈值时触发紧急刷盘
    #[serde(default = "default_max_pending_entries")]
    pub max_pending_entries: usize,
    /// 周桶标签是否采用 ISO-8601 周规则（否则为美式周日起始规则）
    #[serde(default)]
    pub iso_week: bool,
    /// 是否统计 tarball 下载
    #[serde(default = "default_true")]
    pub count_downloads: bool,
    /// 是否统计 manifest 访问
    #[serde(default = "default_true")]
    pub count_manifest_views: bool,
}

impl Default for CounterConfig {
    fn default() -> Self {
        Self {
            flush_interval: default_flush_interval(),
            max_pending_entries: default_max_pending_entries(),
            iso_week: false,
            count_downloads: true,
            count_manifest_views: true,
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    /// `text` 或 `json`
    #[serde(default = "default_log_format")]
    pub format: String,
    /// 为空或缺省时输出到控制台
    #[serde(default)]
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

/// 统计插件的静态配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StatsConfig {
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub stats: CounterConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl StatsConfig {
    /// 从 TOML 文件和环境变量加载配置
    pub fn load() -> Self {
        Self::load_from("registry-stats.toml")
    }

    /// 从指定 TOML 文件（可选存在）和环境变量加载配置
    pub fn load_from(path: &str) -> Self {
        use config::{Config, Environment, File};

        let builder = Config::builder()
            // 1. 从 TOML 文件加载（可选）
            .add_source(File::with_name(path).required(false))
            // 2. 从环境变量覆盖，前缀 REGISTRY_STATS，分隔符 __
            .add_source(
                Environment::with_prefix("REGISTRY_STATS")
                    .separator("__")
                    .try_parsing(true),
            );

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<StatsConfig>() {
                Ok(config) => config,
                Err(e) => {
                    error!("Failed to deserialize config: {}", e);
                    Self::default()
                }
            },
            Err(e) => {
                error!("Failed to build config: {}", e);
                Self::default()
            }
        }
    }

    /// 校验配置，逐字段收集错误
    ///
    /// 宿主应在启动阶段调用；校验失败属于致命配置错误，
    /// 约定由宿主以非零退出码终止进程。
    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.database.database_url.is_empty() {
            errors.push("database.database_url: must not be empty".to_string());
        }
        if self.database.pool_size == 0 {
            errors.push("database.pool_size: must be greater than 0".to_string());
        }
        if let Err(e) = parse_duration_ms(&self.stats.flush_interval) {
            errors.push(format!("stats.flush_interval: {}", e.message()));
        }
        if self.stats.max_pending_entries == 0 {
            errors.push("stats.max_pending_entries: must be greater than 0".to_string());
        }
        if self.logging.format != "text" && self.logging.format != "json" {
            errors.push(format!(
                "logging.format: expected 'text' or 'json', got '{}'",
                self.logging.format
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            for e in &errors {
                error!("Invalid config: {}", e);
            }
            Err(RegistryStatsError::validation(errors.join("; ")))
        }
    }

    /// 解析配置的刷盘间隔为调度模式
    pub fn flush_mode(&self) -> Result<FlushMode> {
        Ok(FlushMode::from_millis(parse_duration_ms(
            &self.stats.flush_interval,
        )?))
    }

    /// 生成示例 TOML 配置
    pub fn generate_sample_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|e| format!("Error generating sample config: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::FlushMode;
    use tokio::time::Duration;

    #[test]
    fn test_defaults_are_valid() {
        let config = StatsConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.flush_mode().unwrap(),
            FlushMode::Periodic(Duration::from_secs(30))
        );
        assert!(config.stats.count_downloads);
        assert!(config.stats.count_manifest_views);
        assert!(!config.stats.iso_week);
    }

    #[test]
    fn test_flush_mode_parsing() {
        let mut config = StatsConfig::default();

        config.stats.flush_interval = "0".to_string();
        assert_eq!(config.flush_mode().unwrap(), FlushMode::Immediate);

        config.stats.flush_interval = "-1".to_string();
        assert_eq!(config.flush_mode().unwrap(), FlushMode::Disabled);

        config.stats.flush_interval = "2s".to_string();
        assert_eq!(
            config.flush_mode().unwrap(),
            FlushMode::Periodic(Duration::from_secs(2))
        );
    }

    #[test]
    fn test_validate_collects_field_errors() {
        let mut config = StatsConfig::default();
        config.database.database_url = String::new();
        config.stats.flush_interval = "soon".to_string();
        config.logging.format = "xml".to_string();

        let err = config.validate().unwrap_err();
        assert_eq!(err.code(), "E004");
        assert!(err.message().contains("database.database_url"));
        assert!(err.message().contains("stats.flush_interval"));
        assert!(err.message().contains("logging.format"));
    }

    #[test]
    fn test_sample_config_round_trips() {
        let sample = StatsConfig::generate_sample_config();
        let parsed: StatsConfig = toml::from_str(&sample).unwrap();
        assert!(parsed.validate().is_ok());
    }
}
