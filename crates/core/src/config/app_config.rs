use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use super::{
    api_observability::{ApiConfig, ObservabilityConfig, PlatformConfig},
    proxy_monitor::{MonitorConfig, ProxyConfig},
    scheduler_storage::{SchedulerConfig, StorageConfig},
    validation::ConfigValidator,
};

/// 默认配置文件搜索路径
pub const DEFAULT_CONFIG_PATHS: [&str; 2] = ["config/crawler.toml", "crawler.toml"];

/// 系统配置
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub scheduler: SchedulerConfig,
    pub storage: StorageConfig,
    pub proxy: ProxyConfig,
    pub monitor: MonitorConfig,
    pub api: ApiConfig,
    pub observability: ObservabilityConfig,
    pub platforms: HashMap<String, PlatformConfig>,
}

impl AppConfig {
    /// 加载配置
    ///
    /// 加载顺序：
    /// 1. 内置默认值
    /// 2. 配置文件（TOML），未指定时依次尝试 [`DEFAULT_CONFIG_PATHS`]
    /// 3. 环境变量覆盖，前缀 `CRAWLER_`，层级分隔符 `__`，
    ///    例如 `CRAWLER_SCHEDULER__MAX_CONCURRENT_TASKS=8`
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if !Path::new(path).exists() {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        } else if let Some(path) = DEFAULT_CONFIG_PATHS
            .iter()
            .find(|path| Path::new(path).exists())
        {
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix("CRAWLER")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("proxy.proxies")
                .with_list_parse_key("api.cors_origins"),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;

        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    pub fn validate(&self) -> Result<()> {
        self.scheduler.validate().context("调度器配置验证失败")?;
        self.storage.validate().context("存储配置验证失败")?;
        self.proxy.validate().context("代理配置验证失败")?;
        self.monitor.validate().context("监控配置验证失败")?;
        self.api.validate().context("API配置验证失败")?;
        self.observability
            .validate()
            .context("可观测性配置验证失败")?;
        self.platforms.validate().context("平台配置验证失败")?;

        Ok(())
    }
}
