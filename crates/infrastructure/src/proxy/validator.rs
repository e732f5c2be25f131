use std::time::Duration;

use async_trait::async_trait;
use crawler_core::{ProxyRecord, ProxyValidator};
use tracing::debug;

/// 通过代理请求探测地址，仅 200 响应视为可用
pub struct HttpProxyValidator {
    probe_url: String,
    timeout: Duration,
}

impl HttpProxyValidator {
    pub fn new(probe_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            probe_url: probe_url.into(),
            timeout,
        }
    }
}

#[async_trait]
impl ProxyValidator for HttpProxyValidator {
    async fn probe(&self, proxy: &ProxyRecord) -> bool {
        let client = match reqwest::Proxy::all(proxy.url())
            .and_then(|p| reqwest::Client::builder().proxy(p).timeout(self.timeout).build())
        {
            Ok(client) => client,
            Err(e) => {
                debug!("构建代理客户端失败 {}: {e}", proxy.url());
                return false;
            }
        };

        match client.get(&self.probe_url).send().await {
            Ok(response) => response.status() == reqwest::StatusCode::OK,
            Err(e) => {
                debug!("代理探测失败 {}: {e}", proxy.url());
                false
            }
        }
    }
}
