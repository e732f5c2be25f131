use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use crawler_core::{
    config::{ProxyConfig, ProxyProviderKind},
    CrawlerError, CrawlerResult, ProxyProvider, ProxyRecord, ProxyScheme,
};
use serde::Deserialize;
use tracing::warn;

/// 根据配置构造代理来源，未启用代理时返回 `None`
pub fn build_provider(config: &ProxyConfig) -> CrawlerResult<Option<Arc<dyn ProxyProvider>>> {
    if !config.enabled {
        return Ok(None);
    }

    let provider: Arc<dyn ProxyProvider> = match config.provider {
        ProxyProviderKind::None => return Ok(None),
        ProxyProviderKind::Static => Arc::new(StaticProxyProvider::from_strings(&config.proxies)?),
        ProxyProviderKind::File => {
            let path = config
                .file_path
                .as_deref()
                .ok_or_else(|| CrawlerError::Configuration("缺少代理文件路径".to_string()))?;
            Arc::new(FileProxyProvider::new(path))
        }
        ProxyProviderKind::Api => {
            let url = config
                .api_url
                .as_deref()
                .ok_or_else(|| CrawlerError::Configuration("缺少代理API地址".to_string()))?;
            Arc::new(ApiProxyProvider::new(
                url,
                config.api_key.clone(),
                Duration::from_secs(config.validation_timeout_seconds),
            )?)
        }
    };

    Ok(Some(provider))
}

/// 固定代理列表
pub struct StaticProxyProvider {
    proxies: Vec<ProxyRecord>,
}

impl StaticProxyProvider {
    pub fn new(proxies: Vec<ProxyRecord>) -> Self {
        Self { proxies }
    }

    pub fn from_strings(entries: &[String]) -> CrawlerResult<Self> {
        let proxies = entries
            .iter()
            .map(|entry| ProxyRecord::parse(entry))
            .collect::<CrawlerResult<Vec<_>>>()?;
        Ok(Self::new(proxies))
    }
}

#[async_trait]
impl ProxyProvider for StaticProxyProvider {
    async fn fetch(&self, limit: usize) -> CrawlerResult<Vec<ProxyRecord>> {
        Ok(self.proxies.iter().take(limit).cloned().collect())
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// 从文本文件读取代理，每行一个，`#` 开头为注释
pub struct FileProxyProvider {
    path: PathBuf,
}

impl FileProxyProvider {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ProxyProvider for FileProxyProvider {
    async fn fetch(&self, limit: usize) -> CrawlerResult<Vec<ProxyRecord>> {
        let content = tokio::fs::read_to_string(&self.path).await?;

        let mut proxies = Vec::new();
        for line in content.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            match ProxyRecord::parse(line) {
                Ok(proxy) => proxies.push(proxy),
                Err(e) => warn!("跳过无效的代理行 {line}: {e}"),
            }
            if proxies.len() >= limit {
                break;
            }
        }

        Ok(proxies)
    }

    fn name(&self) -> &str {
        "file"
    }
}

#[derive(Debug, Deserialize)]
struct ApiProxyResponse {
    #[serde(default)]
    proxies: Vec<ApiProxyEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ApiProxyEntry {
    Url {
        url: String,
    },
    Address {
        ip: String,
        port: u16,
        #[serde(default)]
        scheme: Option<String>,
    },
}

impl ApiProxyEntry {
    fn into_record(self) -> CrawlerResult<ProxyRecord> {
        match self {
            ApiProxyEntry::Url { url } => ProxyRecord::parse(&url),
            ApiProxyEntry::Address { ip, port, scheme } => {
                let scheme = match scheme {
                    Some(s) => s.parse()?,
                    None => ProxyScheme::Http,
                };
                Ok(ProxyRecord::new(format!("{ip}:{port}"), scheme))
            }
        }
    }
}

/// 通过 HTTP 接口获取代理
///
/// 响应格式：`{"proxies": [{"ip": "1.2.3.4", "port": 8080}, {"url": "socks5://..."}]}`
pub struct ApiProxyProvider {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

impl ApiProxyProvider {
    pub fn new(url: impl Into<String>, api_key: Option<String>, timeout: Duration) -> CrawlerResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CrawlerError::Network(e.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
            api_key,
        })
    }
}

#[async_trait]
impl ProxyProvider for ApiProxyProvider {
    async fn fetch(&self, limit: usize) -> CrawlerResult<Vec<ProxyRecord>> {
        let mut request = self.client.get(&self.url).query(&[("count", limit)]);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| CrawlerError::Network(e.to_string()))?;
        if !response.status().is_success() {
            return Err(CrawlerError::Proxy(format!(
                "代理API返回状态码 {}",
                response.status()
            )));
        }

        let body: ApiProxyResponse = response
            .json()
            .await
            .map_err(|e| CrawlerError::Proxy(format!("解析代理API响应失败: {e}")))?;

        let mut proxies = Vec::new();
        for entry in body.proxies.into_iter().take(limit) {
            match entry.into_record() {
                Ok(proxy) => proxies.push(proxy),
                Err(e) => warn!("跳过无效的代理条目: {e}"),
            }
        }
        Ok(proxies)
    }

    fn name(&self) -> &str {
        "api"
    }
}
