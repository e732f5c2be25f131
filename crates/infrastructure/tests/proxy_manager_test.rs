use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use crawler_core::{CrawlerError, CrawlerResult, ProxyProvider, ProxyRecord, ProxyValidator};
use crawler_infrastructure::{ProxyManager, ProxyManagerConfig};

struct MockProxyProvider {
    proxies: Mutex<Vec<ProxyRecord>>,
    fetch_count: AtomicUsize,
    fail: bool,
}

impl MockProxyProvider {
    fn new(addresses: &[&str]) -> Self {
        Self {
            proxies: Mutex::new(
                addresses
                    .iter()
                    .map(|a| ProxyRecord::parse(a).unwrap())
                    .collect(),
            ),
            fetch_count: AtomicUsize::new(0),
            fail: false,
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(&[])
        }
    }

    fn fetches(&self) -> usize {
        self.fetch_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProxyProvider for MockProxyProvider {
    async fn fetch(&self, limit: usize) -> CrawlerResult<Vec<ProxyRecord>> {
        self.fetch_count.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(CrawlerError::Proxy("provider down".to_string()));
        }
        let proxies = self.proxies.lock().unwrap();
        Ok(proxies.iter().take(limit).cloned().collect())
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// 按地址决定探测结果，并记录最大并发数
struct MockProxyValidator {
    results: Mutex<HashMap<String, bool>>,
    probes: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Duration,
}

impl MockProxyValidator {
    fn all_valid() -> Self {
        Self {
            results: Mutex::new(HashMap::new()),
            probes: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            delay: Duration::from_millis(0),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn set(&self, address: &str, valid: bool) {
        self.results
            .lock()
            .unwrap()
            .insert(address.to_string(), valid);
    }

    fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProxyValidator for MockProxyValidator {
    async fn probe(&self, proxy: &ProxyRecord) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let results = self.results.lock().unwrap();
        results.get(&proxy.address).copied().unwrap_or(true)
    }
}

fn manager(
    provider: Arc<MockProxyProvider>,
    validator: Arc<MockProxyValidator>,
    config: ProxyManagerConfig,
) -> ProxyManager {
    ProxyManager::new(provider, validator, config)
}

#[tokio::test]
async fn test_rotation_returns_each_proxy_once() {
    let provider = Arc::new(MockProxyProvider::new(&[
        "10.0.0.1:80",
        "10.0.0.2:80",
        "10.0.0.3:80",
    ]));
    let validator = Arc::new(MockProxyValidator::all_valid());
    let manager = manager(provider, validator, ProxyManagerConfig::default());

    let mut seen = Vec::new();
    for _ in 0..3 {
        let proxy = manager.get_proxy().await.expect("proxy available");
        seen.push(proxy.address.clone());
        manager.rotate().await;
    }

    let unique: HashSet<_> = seen.iter().collect();
    assert_eq!(unique.len(), 3);
    assert_eq!(seen[0], "10.0.0.1:80");
    assert_eq!(seen[1], "10.0.0.2:80");
    assert_eq!(seen[2], "10.0.0.3:80");

    // 第四次回到起点
    assert_eq!(manager.get_proxy().await.unwrap().address, "10.0.0.1:80");
}

#[tokio::test]
async fn test_concurrent_acquire_hands_out_distinct_proxies() {
    let provider = Arc::new(MockProxyProvider::new(&[
        "10.0.0.1:80",
        "10.0.0.2:80",
        "10.0.0.3:80",
    ]));
    let validator = Arc::new(MockProxyValidator::all_valid());
    let manager = Arc::new(manager(provider, validator, ProxyManagerConfig::default()));
    manager.refresh().await.unwrap();

    let handles: Vec<_> = (0..3)
        .map(|_| {
            let manager = Arc::clone(&manager);
            tokio::spawn(async move { manager.acquire().await.unwrap().address })
        })
        .collect();
    let mut picked = Vec::new();
    for handle in handles {
        picked.push(handle.await.unwrap());
    }

    let unique: HashSet<_> = picked.iter().collect();
    assert_eq!(unique.len(), 3);
    // 游标已随分配推进，下一次回到起点
    assert_eq!(manager.acquire().await.unwrap().address, "10.0.0.1:80");
    assert_eq!(manager.stats().await.usage_count, 4);
}

#[tokio::test]
async fn test_invalid_proxies_never_rotate_in() {
    let provider = Arc::new(MockProxyProvider::new(&["10.0.0.1:80", "10.0.0.2:80"]));
    let validator = Arc::new(MockProxyValidator::all_valid());
    validator.set("10.0.0.1:80", false);
    let manager = manager(provider, validator, ProxyManagerConfig::default());

    for _ in 0..4 {
        let proxy = manager.get_proxy().await.unwrap();
        assert_eq!(proxy.address, "10.0.0.2:80");
        assert!(proxy.valid);
        manager.rotate().await;
    }

    let stats = manager.stats().await;
    assert_eq!(stats.raw_count, 2);
    assert_eq!(stats.valid_count, 1);
    assert_eq!(stats.invalid_count, 1);
    assert_eq!(stats.usage_count, 4);
}

#[tokio::test]
async fn test_all_invalid_returns_none() {
    let provider = Arc::new(MockProxyProvider::new(&["10.0.0.1:80"]));
    let validator = Arc::new(MockProxyValidator::all_valid());
    validator.set("10.0.0.1:80", false);
    let manager = manager(provider.clone(), validator, ProxyManagerConfig::default());

    assert!(manager.get_proxy().await.is_none());
    assert_eq!(provider.fetches(), 1);
}

#[tokio::test]
async fn test_provider_failure_returns_none() {
    let provider = Arc::new(MockProxyProvider::failing());
    let validator = Arc::new(MockProxyValidator::all_valid());
    let manager = manager(provider, validator, ProxyManagerConfig::default());

    assert!(manager.get_proxy().await.is_none());
    assert!(manager.refresh().await.is_err());
}

#[tokio::test]
async fn test_report_failure_removes_from_rotation() {
    let provider = Arc::new(MockProxyProvider::new(&["10.0.0.1:80", "10.0.0.2:80"]));
    let validator = Arc::new(MockProxyValidator::all_valid());
    let manager = manager(provider.clone(), validator, ProxyManagerConfig::default());

    let first = manager.get_proxy().await.unwrap();
    manager.report_failure(&first).await;
    manager.rotate().await;

    let next = manager.get_proxy().await.unwrap();
    assert_ne!(next.address, first.address);

    manager.report_failure(&next).await;
    let stats = manager.stats().await;
    assert_eq!(stats.valid_count, 0);
    assert_eq!(stats.raw_count, 2);

    // 轮询集合耗尽后重新从来源刷新
    assert!(manager.get_proxy().await.is_some());
    assert_eq!(provider.fetches(), 2);
}

#[tokio::test]
async fn test_stale_proxy_revalidated_before_use() {
    let provider = Arc::new(MockProxyProvider::new(&["10.0.0.1:80", "10.0.0.2:80"]));
    let validator = Arc::new(MockProxyValidator::all_valid());
    let config = ProxyManagerConfig {
        validation_ttl: chrono::Duration::zero(),
        ..ProxyManagerConfig::default()
    };
    let manager = manager(provider, validator.clone(), config);

    manager.refresh().await.unwrap();
    assert_eq!(validator.probes(), 2);

    tokio::time::sleep(Duration::from_millis(5)).await;
    validator.set("10.0.0.1:80", false);
    let proxy = manager.get_proxy().await.unwrap();
    assert_eq!(proxy.address, "10.0.0.2:80");
    assert!(validator.probes() >= 4);
}

#[tokio::test]
async fn test_validation_fan_out_is_bounded() {
    let addresses: Vec<String> = (1..=12).map(|i| format!("10.0.0.{i}:80")).collect();
    let refs: Vec<&str> = addresses.iter().map(String::as_str).collect();
    let provider = Arc::new(MockProxyProvider::new(&refs));
    let validator =
        Arc::new(MockProxyValidator::all_valid().with_delay(Duration::from_millis(20)));
    let config = ProxyManagerConfig {
        pool_size: 10,
        max_concurrent_validations: 3,
        ..ProxyManagerConfig::default()
    };
    let manager = manager(provider, validator.clone(), config);

    let valid = manager.refresh().await.unwrap();
    assert_eq!(valid, 10);
    assert_eq!(validator.probes(), 10);
    assert!(validator.max_in_flight.load(Ordering::SeqCst) <= 3);
    assert!(validator.max_in_flight.load(Ordering::SeqCst) > 1);
}

#[tokio::test]
async fn test_validate_readmits_proxy() {
    let provider = Arc::new(MockProxyProvider::new(&["10.0.0.1:80"]));
    let validator = Arc::new(MockProxyValidator::all_valid());
    let manager = manager(provider, validator.clone(), ProxyManagerConfig::default());

    let proxy = manager.get_proxy().await.unwrap();
    manager.report_failure(&proxy).await;
    assert_eq!(manager.stats().await.valid_count, 0);

    assert!(manager.validate(&proxy).await);
    assert_eq!(manager.stats().await.valid_count, 1);

    validator.set("10.0.0.1:80", false);
    assert!(!manager.validate(&proxy).await);
    assert_eq!(manager.stats().await.valid_count, 0);
}
