use serde::{Deserialize, Serialize};

use super::validation::ConfigValidator;
use crate::models::ProxyRecord;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProxyProviderKind {
    #[default]
    None,
    Static,
    File,
    Api,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProxyConfig {
    pub enabled: bool,
    pub provider: ProxyProviderKind,
    /// static 来源的代理列表
    pub proxies: Vec<String>,
    pub file_path: Option<String>,
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub pool_size: usize,
    pub validation_timeout_seconds: u64,
    pub probe_url: String,
    pub max_concurrent_validations: usize,
    pub validation_ttl_seconds: u64,
    /// 无可用代理时是否直接判定任务失败
    pub require_proxy: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            provider: ProxyProviderKind::None,
            proxies: Vec::new(),
            file_path: None,
            api_url: None,
            api_key: None,
            pool_size: 50,
            validation_timeout_seconds: 10,
            probe_url: "https://www.baidu.com".to_string(),
            max_concurrent_validations: 10,
            validation_ttl_seconds: 300,
            require_proxy: false,
        }
    }
}

impl ConfigValidator for ProxyConfig {
    fn validate(&self) -> anyhow::Result<()> {
        if self.require_proxy && !self.enabled {
            return Err(anyhow::anyhow!("require_proxy 需要先启用代理"));
        }

        if !self.enabled {
            return Ok(());
        }

        match self.provider {
            ProxyProviderKind::None => {
                return Err(anyhow::anyhow!("启用代理时必须指定代理来源"));
            }
            ProxyProviderKind::Static => {
                if self.proxies.is_empty() {
                    return Err(anyhow::anyhow!("static 代理来源需要配置 proxies"));
                }
                for proxy in &self.proxies {
                    ProxyRecord::parse(proxy)
                        .map_err(|e| anyhow::anyhow!("代理地址无效 {proxy}: {e}"))?;
                }
            }
            ProxyProviderKind::File => {
                if self.file_path.as_deref().map_or(true, str::is_empty) {
                    return Err(anyhow::anyhow!("file 代理来源需要配置 file_path"));
                }
            }
            ProxyProviderKind::Api => {
                let url = self.api_url.as_deref().unwrap_or_default();
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err(anyhow::anyhow!("api 代理来源需要有效的 api_url"));
                }
            }
        }

        if self.pool_size == 0 {
            return Err(anyhow::anyhow!("代理池大小必须大于0"));
        }

        if self.validation_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("代理校验超时必须大于0"));
        }

        if self.max_concurrent_validations == 0 {
            return Err(anyhow::anyhow!("并发校验数必须大于0"));
        }

        if self.probe_url.is_empty() {
            return Err(anyhow::anyhow!("代理探测地址不能为空"));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MonitorConfig {
    /// 失败率超过该阈值时判定为 degraded
    pub degraded_failure_rate: f64,
    pub latency_window: usize,
    pub max_recent_errors: usize,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            degraded_failure_rate: 0.5,
            latency_window: 100,
            max_recent_errors: 100,
        }
    }
}

impl ConfigValidator for MonitorConfig {
    fn validate(&self) -> anyhow::Result<()> {
        if !(self.degraded_failure_rate > 0.0 && self.degraded_failure_rate <= 1.0) {
            return Err(anyhow::anyhow!(
                "degraded_failure_rate 必须在 (0, 1] 区间: {}",
                self.degraded_failure_rate
            ));
        }

        if self.latency_window == 0 {
            return Err(anyhow::anyhow!("延迟统计窗口必须大于0"));
        }

        Ok(())
    }
}
