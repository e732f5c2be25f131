use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::{
    models::ProxyRecord,
    traits::{AdapterFactory, CrawlerAdapter},
    CrawlerError, CrawlerResult,
};

/// 平台 → 适配器构造器的映射
///
/// 新增平台只需注册一个 [`AdapterFactory`]。
#[derive(Clone, Default)]
pub struct AdapterRegistry {
    factories: Arc<RwLock<HashMap<String, Arc<dyn AdapterFactory>>>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn register(&self, platform: impl Into<String>, factory: Arc<dyn AdapterFactory>) {
        let mut registry = self.factories.write().await;
        registry.insert(platform.into(), factory);
    }

    pub async fn register_batch(&self, factories: Vec<(String, Arc<dyn AdapterFactory>)>) {
        let mut registry = self.factories.write().await;
        for (platform, factory) in factories {
            registry.insert(platform, factory);
        }
    }

    pub async fn get(&self, platform: &str) -> Option<Arc<dyn AdapterFactory>> {
        let registry = self.factories.read().await;
        registry.get(platform).cloned()
    }

    pub async fn contains(&self, platform: &str) -> bool {
        let registry = self.factories.read().await;
        registry.contains_key(platform)
    }

    pub async fn unregister(&self, platform: &str) -> bool {
        let mut registry = self.factories.write().await;
        registry.remove(platform).is_some()
    }

    /// 已注册的平台，按名称排序
    pub async fn platforms(&self) -> Vec<String> {
        let registry = self.factories.read().await;
        let mut platforms: Vec<String> = registry.keys().cloned().collect();
        platforms.sort();
        platforms
    }

    pub async fn count(&self) -> usize {
        let registry = self.factories.read().await;
        registry.len()
    }

    /// 为指定平台创建绑定到代理的适配器
    pub async fn create_adapter(
        &self,
        platform: &str,
        proxy: Option<&ProxyRecord>,
    ) -> CrawlerResult<Box<dyn CrawlerAdapter>> {
        let factory = self
            .get(platform)
            .await
            .ok_or_else(|| CrawlerError::UnsupportedPlatform(platform.to_string()))?;
        factory.create(proxy)
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CanonicalRecord;
    use async_trait::async_trait;

    struct StubAdapter;

    #[async_trait]
    impl CrawlerAdapter for StubAdapter {
        async fn start(&self) -> CrawlerResult<()> {
            Ok(())
        }
        async fn search(&self, _query: &str, _max: u32) -> CrawlerResult<Vec<CanonicalRecord>> {
            Ok(Vec::new())
        }
        async fn get_content_detail(&self, id: &str) -> CrawlerResult<CanonicalRecord> {
            Err(CrawlerError::adapter(format!("missing {id}")))
        }
        async fn get_comments(&self, _id: &str, _max: u32) -> CrawlerResult<Vec<CanonicalRecord>> {
            Ok(Vec::new())
        }
        async fn get_user_profile(&self, id: &str) -> CrawlerResult<CanonicalRecord> {
            Err(CrawlerError::adapter(format!("missing {id}")))
        }
        async fn get_user_content(
            &self,
            _id: &str,
            _max: u32,
        ) -> CrawlerResult<Vec<CanonicalRecord>> {
            Ok(Vec::new())
        }
        fn get_platform_name(&self) -> &str {
            "stub"
        }
        fn get_supported_features(&self) -> Vec<String> {
            vec!["search".to_string()]
        }
    }

    struct StubFactory;

    impl AdapterFactory for StubFactory {
        fn create(&self, _proxy: Option<&ProxyRecord>) -> CrawlerResult<Box<dyn CrawlerAdapter>> {
            Ok(Box::new(StubAdapter))
        }
        fn platform(&self) -> &str {
            "stub"
        }
    }

    #[tokio::test]
    async fn test_register_and_lookup() {
        let registry = AdapterRegistry::new();
        registry.register("stub", Arc::new(StubFactory)).await;

        assert!(registry.contains("stub").await);
        assert!(!registry.contains("other").await);
        assert_eq!(registry.platforms().await, vec!["stub".to_string()]);

        let adapter = registry.create_adapter("stub", None).await.unwrap();
        assert_eq!(adapter.get_platform_name(), "stub");
    }

    #[tokio::test]
    async fn test_unknown_platform() {
        let registry = AdapterRegistry::new();
        let result = registry.create_adapter("missing", None).await;
        assert!(matches!(result, Err(CrawlerError::UnsupportedPlatform(_))));

        registry.register("stub", Arc::new(StubFactory)).await;
        assert!(registry.unregister("stub").await);
        assert!(!registry.unregister("stub").await);
        assert_eq!(registry.count().await, 0);
    }
}
