use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use crawler_core::{config::ProxyConfig, CrawlerResult, ProxyProvider, ProxyRecord, ProxyValidator};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::observability::{MetricsCollector, StructuredLogger};

#[derive(Debug, Clone)]
pub struct ProxyManagerConfig {
    pub pool_size: usize,
    pub max_concurrent_validations: usize,
    /// 校验结果的有效期，过期的代理在分配前重新校验
    pub validation_ttl: Duration,
}

impl Default for ProxyManagerConfig {
    fn default() -> Self {
        Self {
            pool_size: 50,
            max_concurrent_validations: 10,
            validation_ttl: Duration::seconds(300),
        }
    }
}

impl From<&ProxyConfig> for ProxyManagerConfig {
    fn from(config: &ProxyConfig) -> Self {
        Self {
            pool_size: config.pool_size,
            max_concurrent_validations: config.max_concurrent_validations.max(1),
            validation_ttl: Duration::seconds(
                i64::try_from(config.validation_ttl_seconds).unwrap_or(i64::MAX / 1000),
            ),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ProxyPoolStats {
    pub raw_count: usize,
    pub valid_count: usize,
    pub invalid_count: usize,
    pub usage_count: u64,
    pub refresh_count: u64,
    pub last_refresh: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct PoolState {
    raw: Vec<ProxyRecord>,
    valid: Vec<ProxyRecord>,
    cursor: usize,
    usage_count: u64,
    refresh_count: u64,
    last_refresh: Option<DateTime<Utc>>,
}

impl PoolState {
    fn mark_raw(&mut self, proxy: &ProxyRecord, valid: bool, at: DateTime<Utc>) {
        if let Some(entry) = self.raw.iter_mut().find(|p| p.same_endpoint(proxy)) {
            entry.valid = valid;
            entry.last_validated_at = Some(at);
        }
    }

    /// 从轮询集合中移除，保持游标指向原来的下一个代理
    fn remove_valid(&mut self, proxy: &ProxyRecord) -> bool {
        let Some(index) = self.valid.iter().position(|p| p.same_endpoint(proxy)) else {
            return false;
        };
        self.valid.remove(index);
        if index < self.cursor {
            self.cursor -= 1;
        }
        if self.cursor >= self.valid.len() {
            self.cursor = 0;
        }
        true
    }
}

/// 代理池管理器
///
/// 轮询集合为空时从代理来源刷新，候选代理以受限并发校验。
/// 校验失败或使用失败的代理只离开轮询集合，原始池保留它，下次刷新可能重新启用。
pub struct ProxyManager {
    provider: Arc<dyn ProxyProvider>,
    validator: Arc<dyn ProxyValidator>,
    config: ProxyManagerConfig,
    state: Mutex<PoolState>,
    refresh_lock: Mutex<()>,
    metrics: Arc<MetricsCollector>,
}

impl ProxyManager {
    pub fn new(
        provider: Arc<dyn ProxyProvider>,
        validator: Arc<dyn ProxyValidator>,
        config: ProxyManagerConfig,
    ) -> Self {
        Self {
            provider,
            validator,
            config,
            state: Mutex::new(PoolState::default()),
            refresh_lock: Mutex::new(()),
            metrics: Arc::new(MetricsCollector::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsCollector>) -> Self {
        self.metrics = metrics;
        self
    }

    /// 取得当前轮询位置的代理
    ///
    /// 轮询集合为空时先刷新一次；仍无可用代理返回 `None`。
    /// 不移动游标，使用完毕后由调用方 [`rotate`](Self::rotate)。
    pub async fn get_proxy(&self) -> Option<ProxyRecord> {
        self.next_proxy(false).await
    }

    /// 分配代理并在同一次加锁中推进游标
    ///
    /// 并发执行的调用方依次拿到轮询顺序中的不同代理，无需再调用 `rotate`。
    pub async fn acquire(&self) -> Option<ProxyRecord> {
        self.next_proxy(true).await
    }

    async fn next_proxy(&self, advance: bool) -> Option<ProxyRecord> {
        let mut refreshed = false;

        loop {
            let candidate = {
                let state = self.state.lock().await;
                if state.valid.is_empty() {
                    None
                } else {
                    let index = state.cursor % state.valid.len();
                    Some(state.valid[index].clone())
                }
            };

            let candidate = match candidate {
                Some(candidate) => candidate,
                None if !refreshed => {
                    refreshed = true;
                    if let Err(e) = self.refresh_pool(false).await {
                        warn!("刷新代理池失败: {e}");
                    }
                    continue;
                }
                None => return None,
            };

            // 校验失败会把代理移出轮询集合，循环必然收敛
            if candidate.is_stale(self.config.validation_ttl, Utc::now())
                && !self.validate(&candidate).await
            {
                continue;
            }

            let mut state = self.state.lock().await;
            let position = state.valid.iter().position(|p| p.same_endpoint(&candidate));
            let current = match position {
                Some(index) => state.valid[index].clone(),
                // 校验期间被并发移出轮询集合，重新选择
                None if advance => continue,
                None => candidate,
            };
            if advance {
                if let Some(index) = position {
                    state.cursor = (index + 1) % state.valid.len();
                }
            }
            state.usage_count += 1;
            return Some(current);
        }
    }

    /// 推进轮询游标
    pub async fn rotate(&self) {
        let mut state = self.state.lock().await;
        if state.valid.is_empty() {
            state.cursor = 0;
        } else {
            state.cursor = (state.cursor + 1) % state.valid.len();
        }
    }

    /// 探测代理并更新池状态
    pub async fn validate(&self, proxy: &ProxyRecord) -> bool {
        let ok = self.validator.probe(proxy).await;
        let now = Utc::now();

        let mut state = self.state.lock().await;
        state.mark_raw(proxy, ok, now);
        if ok {
            match state.valid.iter_mut().find(|p| p.same_endpoint(proxy)) {
                Some(entry) => {
                    entry.valid = true;
                    entry.last_validated_at = Some(now);
                }
                None => {
                    let mut record = proxy.clone();
                    record.valid = true;
                    record.last_validated_at = Some(now);
                    state.valid.push(record);
                }
            }
        } else if state.remove_valid(proxy) {
            StructuredLogger::log_proxy_invalidated(&proxy.url(), "validation failed");
        }
        self.metrics.update_valid_proxies(state.valid.len());
        ok
    }

    /// 使用代理失败后调用，立即移出轮询集合
    pub async fn report_failure(&self, proxy: &ProxyRecord) {
        let mut state = self.state.lock().await;
        state.mark_raw(proxy, false, Utc::now());
        if state.remove_valid(proxy) {
            StructuredLogger::log_proxy_invalidated(&proxy.url(), "request failed");
        }
        self.metrics.update_valid_proxies(state.valid.len());
    }

    /// 从代理来源拉取新一批代理并并发校验，返回可用数量
    pub async fn refresh(&self) -> CrawlerResult<usize> {
        self.refresh_pool(true).await
    }

    async fn refresh_pool(&self, force: bool) -> CrawlerResult<usize> {
        let _guard = self.refresh_lock.lock().await;

        // 等锁期间其他调用已完成刷新
        if !force {
            let state = self.state.lock().await;
            if !state.valid.is_empty() {
                return Ok(state.valid.len());
            }
        }

        let started = Instant::now();
        let mut candidates: Vec<ProxyRecord> = Vec::new();
        for proxy in self.provider.fetch(self.config.pool_size).await? {
            if !candidates.iter().any(|p| p.same_endpoint(&proxy)) {
                candidates.push(proxy);
            }
        }
        let fetched = candidates.len();
        debug!("从 {} 获取到 {fetched} 个候选代理", self.provider.name());

        let validator = Arc::clone(&self.validator);
        let mut results: Vec<(usize, ProxyRecord, bool)> = stream::iter(candidates.into_iter().enumerate())
            .map(|(index, proxy)| {
                let validator = Arc::clone(&validator);
                async move {
                    let ok = validator.probe(&proxy).await;
                    (index, proxy, ok)
                }
            })
            .buffer_unordered(self.config.max_concurrent_validations.max(1))
            .collect()
            .await;
        results.sort_by_key(|(index, _, _)| *index);

        let now = Utc::now();
        let raw: Vec<ProxyRecord> = results
            .into_iter()
            .map(|(_, mut proxy, ok)| {
                proxy.valid = ok;
                proxy.last_validated_at = Some(now);
                proxy
            })
            .collect();
        let valid: Vec<ProxyRecord> = raw.iter().filter(|p| p.valid).cloned().collect();
        let valid_count = valid.len();

        {
            let mut state = self.state.lock().await;
            state.raw = raw;
            state.valid = valid;
            state.cursor = 0;
            state.refresh_count += 1;
            state.last_refresh = Some(now);
        }

        self.metrics.update_valid_proxies(valid_count);
        StructuredLogger::log_proxy_pool_refreshed(
            self.provider.name(),
            fetched,
            valid_count,
            started.elapsed().as_millis() as u64,
        );

        Ok(valid_count)
    }

    pub async fn stats(&self) -> ProxyPoolStats {
        let state = self.state.lock().await;
        ProxyPoolStats {
            raw_count: state.raw.len(),
            valid_count: state.valid.len(),
            invalid_count: state.raw.iter().filter(|p| !p.valid).count(),
            usage_count: state.usage_count,
            refresh_count: state.refresh_count,
            last_refresh: state.last_refresh,
        }
    }
}
