use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::validation::ConfigValidator;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiConfig {
    pub enabled: bool,
    pub bind_address: String,
    pub cors_enabled: bool,
    pub cors_origins: Vec<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_address: "0.0.0.0:8080".to_string(),
            cors_enabled: true,
            cors_origins: vec!["*".to_string()],
        }
    }
}

impl ConfigValidator for ApiConfig {
    fn validate(&self) -> anyhow::Result<()> {
        if self.enabled && self.bind_address.parse::<std::net::SocketAddr>().is_err() {
            return Err(anyhow::anyhow!("无效的API绑定地址: {}", self.bind_address));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: String,
    pub metrics_enabled: bool,
    pub metrics_bind_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_bind_address: "0.0.0.0:9090".to_string(),
        }
    }
}

impl ConfigValidator for ObservabilityConfig {
    fn validate(&self) -> anyhow::Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(anyhow::anyhow!(
                "无效的日志级别: {}，支持的级别: {:?}",
                self.log_level,
                valid_levels
            ));
        }

        if !["json", "pretty"].contains(&self.log_format.as_str()) {
            return Err(anyhow::anyhow!("不支持的日志格式: {}", self.log_format));
        }

        if self.metrics_enabled
            && self
                .metrics_bind_address
                .parse::<std::net::SocketAddr>()
                .is_err()
        {
            return Err(anyhow::anyhow!(
                "无效的指标绑定地址: {}",
                self.metrics_bind_address
            ));
        }

        Ok(())
    }
}

fn default_platform_timeout() -> u64 {
    30
}

fn default_features() -> Vec<String> {
    vec![
        "search".to_string(),
        "detail".to_string(),
        "creator".to_string(),
    ]
}

/// 单个平台的抓取端点
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlatformConfig {
    pub endpoint: String,
    #[serde(default = "default_platform_timeout")]
    pub timeout_seconds: u64,
    #[serde(default = "default_features")]
    pub features: Vec<String>,
}

impl ConfigValidator for HashMap<String, PlatformConfig> {
    fn validate(&self) -> anyhow::Result<()> {
        for (platform, config) in self {
            if platform.trim().is_empty() {
                return Err(anyhow::anyhow!("平台名称不能为空"));
            }
            if !config.endpoint.starts_with("http://") && !config.endpoint.starts_with("https://")
            {
                return Err(anyhow::anyhow!(
                    "平台 {platform} 的端点无效: {}",
                    config.endpoint
                ));
            }
            if config.timeout_seconds == 0 {
                return Err(anyhow::anyhow!("平台 {platform} 的超时必须大于0"));
            }
        }
        Ok(())
    }
}
