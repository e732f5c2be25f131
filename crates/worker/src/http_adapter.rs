//! 通用 HTTP 平台适配器
//!
//! 适用于已经把平台数据整理成标准化记录的抓取端点：
//!
//! | 操作 | 请求 |
//! |---|---|
//! | `start` | `GET {endpoint}/health` |
//! | `search` | `GET {endpoint}/search?q=&limit=` |
//! | `get_content_detail` | `GET {endpoint}/content/{id}` |
//! | `get_comments` | `GET {endpoint}/content/{id}/comments?limit=` |
//! | `get_user_profile` | `GET {endpoint}/users/{id}` |
//! | `get_user_content` | `GET {endpoint}/users/{id}/content?limit=` |
//!
//! 响应中缺省的 `platform` 与 `type` 字段按请求补全。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use crawler_core::{
    config::PlatformConfig, AdapterFactory, AdapterRegistry, CanonicalRecord, CrawlerAdapter,
    CrawlerError, CrawlerResult, ProxyRecord, RecordType,
};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
struct WireRecord {
    id: Value,
    #[serde(default)]
    platform: Option<String>,
    #[serde(rename = "type", default)]
    record_type: Option<RecordType>,
    #[serde(default)]
    attributes: Map<String, Value>,
    #[serde(default)]
    metadata: Map<String, Value>,
}

impl WireRecord {
    fn into_record(self, platform: &str, default_type: RecordType) -> CrawlerResult<CanonicalRecord> {
        let id = match self.id {
            Value::String(s) if !s.is_empty() => s,
            Value::Number(n) => n.to_string(),
            other => {
                return Err(CrawlerError::adapter(format!("记录 id 无效: {other}")));
            }
        };
        Ok(CanonicalRecord {
            id,
            platform: self.platform.unwrap_or_else(|| platform.to_string()),
            record_type: self.record_type.unwrap_or(default_type),
            attributes: self.attributes,
            metadata: self.metadata,
        })
    }
}

pub struct HttpAdapter {
    platform: String,
    endpoint: Url,
    features: Vec<String>,
    client: reqwest::Client,
}

impl HttpAdapter {
    pub fn new(
        platform: impl Into<String>,
        config: &PlatformConfig,
        proxy: Option<&ProxyRecord>,
    ) -> CrawlerResult<Self> {
        let mut builder =
            reqwest::Client::builder().timeout(Duration::from_secs(config.timeout_seconds));
        if let Some(proxy) = proxy {
            let proxy = reqwest::Proxy::all(proxy.url())
                .map_err(|e| CrawlerError::Proxy(format!("代理地址无效 {}: {e}", proxy.url())))?;
            builder = builder.proxy(proxy);
        }
        let client = builder
            .build()
            .map_err(|e| CrawlerError::Network(e.to_string()))?;

        let endpoint = Url::parse(&config.endpoint)
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| {
                CrawlerError::Configuration(format!("平台端点地址无效: {}", config.endpoint))
            })?;

        Ok(Self {
            platform: platform.into(),
            endpoint,
            features: config.features.clone(),
            client,
        })
    }

    /// 在端点路径后追加路径段，每段单独做百分号编码
    fn url(&self, segments: &[&str]) -> CrawlerResult<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| CrawlerError::Configuration(format!("平台端点地址无效: {}", self.endpoint)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
    ) -> CrawlerResult<T> {
        let url = self.url(segments)?;
        debug!("{} GET {url}", self.platform);

        let response = self
            .client
            .get(url.clone())
            .query(query)
            .send()
            .await
            .map_err(|e| CrawlerError::Network(format!("请求 {url} 失败: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CrawlerError::adapter(format!("{url} 返回状态码 {status}")));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| CrawlerError::adapter(format!("解析 {url} 响应失败: {e}")))
    }

    async fn get_record(
        &self,
        segments: &[&str],
        record_type: RecordType,
    ) -> CrawlerResult<CanonicalRecord> {
        let wire: WireRecord = self.get_json(segments, &[]).await?;
        wire.into_record(&self.platform, record_type)
    }

    async fn get_records(
        &self,
        segments: &[&str],
        query: &[(&str, String)],
        record_type: RecordType,
        limit: u32,
    ) -> CrawlerResult<Vec<CanonicalRecord>> {
        let wire: Vec<WireRecord> = self.get_json(segments, query).await?;
        wire.into_iter()
            .take(limit as usize)
            .map(|w| w.into_record(&self.platform, record_type))
            .collect()
    }
}

fn segment(id: &str) -> CrawlerResult<&str> {
    if id.is_empty() {
        return Err(CrawlerError::adapter("标识不能为空"));
    }
    Ok(id)
}

#[async_trait]
impl CrawlerAdapter for HttpAdapter {
    async fn start(&self) -> CrawlerResult<()> {
        let url = self.url(&["health"])?;
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| CrawlerError::Network(format!("请求 {url} 失败: {e}")))?;
        if !response.status().is_success() {
            return Err(CrawlerError::adapter(format!(
                "平台 {} 不可用，状态码 {}",
                self.platform,
                response.status()
            )));
        }
        Ok(())
    }

    async fn search(&self, query: &str, max_results: u32) -> CrawlerResult<Vec<CanonicalRecord>> {
        self.get_records(
            &["search"],
            &[("q", query.to_string()), ("limit", max_results.to_string())],
            RecordType::Content,
            max_results,
        )
        .await
    }

    async fn get_content_detail(&self, content_id: &str) -> CrawlerResult<CanonicalRecord> {
        self.get_record(&["content", segment(content_id)?], RecordType::Content)
            .await
    }

    async fn get_comments(
        &self,
        content_id: &str,
        max_results: u32,
    ) -> CrawlerResult<Vec<CanonicalRecord>> {
        self.get_records(
            &["content", segment(content_id)?, "comments"],
            &[("limit", max_results.to_string())],
            RecordType::Comment,
            max_results,
        )
        .await
    }

    async fn get_user_profile(&self, creator_id: &str) -> CrawlerResult<CanonicalRecord> {
        self.get_record(&["users", segment(creator_id)?], RecordType::Creator)
            .await
    }

    async fn get_user_content(
        &self,
        creator_id: &str,
        max_results: u32,
    ) -> CrawlerResult<Vec<CanonicalRecord>> {
        self.get_records(
            &["users", segment(creator_id)?, "content"],
            &[("limit", max_results.to_string())],
            RecordType::Content,
            max_results,
        )
        .await
    }

    fn get_platform_name(&self) -> &str {
        &self.platform
    }

    fn get_supported_features(&self) -> Vec<String> {
        self.features.clone()
    }
}

/// 为单个平台创建 [`HttpAdapter`]
pub struct HttpAdapterFactory {
    platform: String,
    config: PlatformConfig,
}

impl HttpAdapterFactory {
    pub fn new(platform: impl Into<String>, config: PlatformConfig) -> Self {
        Self {
            platform: platform.into(),
            config,
        }
    }
}

impl AdapterFactory for HttpAdapterFactory {
    fn create(&self, proxy: Option<&ProxyRecord>) -> CrawlerResult<Box<dyn CrawlerAdapter>> {
        Ok(Box::new(HttpAdapter::new(&self.platform, &self.config, proxy)?))
    }

    fn platform(&self) -> &str {
        &self.platform
    }

    fn supported_features(&self) -> Vec<String> {
        self.config.features.clone()
    }
}

/// 按配置为每个平台注册 HTTP 适配器
pub async fn register_http_adapters(
    registry: &AdapterRegistry,
    platforms: &HashMap<String, PlatformConfig>,
) {
    for (platform, config) in platforms {
        registry
            .register(
                platform.clone(),
                Arc::new(HttpAdapterFactory::new(platform.clone(), config.clone())),
            )
            .await;
        info!("已注册平台适配器: {platform} -> {}", config.endpoint);
    }
}
