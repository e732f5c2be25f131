use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use crawler_core::{
    CanonicalRecord, CrawlerError, CrawlerResult, PersistenceGateway, RecordType, StoredRecord,
};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::write_atomically;

type RecordMap = BTreeMap<String, StoredRecord>;

/// 按记录类型分文件保存的 JSON 存储
///
/// `contents.json`、`comments.json`、`creators.json` 各保存一个以
/// `platform:id` 为键的对象，每次写入后整体落盘。
pub struct JsonFileStore {
    data_dir: PathBuf,
    records: Mutex<HashMap<RecordType, RecordMap>>,
}

impl JsonFileStore {
    /// 打开存储目录并载入已有记录
    pub async fn open(data_dir: impl Into<PathBuf>) -> CrawlerResult<Self> {
        let data_dir = data_dir.into();
        tokio::fs::create_dir_all(&data_dir)
            .await
            .map_err(|e| CrawlerError::persistence(format!("创建目录 {} 失败: {e}", data_dir.display())))?;

        let mut records = HashMap::new();
        for record_type in [RecordType::Content, RecordType::Comment, RecordType::Creator] {
            let path = Self::file_path(&data_dir, record_type);
            records.insert(record_type, Self::load_file(&path).await?);
        }

        info!("JSON 记录存储已打开: {}", data_dir.display());
        Ok(Self {
            data_dir,
            records: Mutex::new(records),
        })
    }

    fn file_path(data_dir: &Path, record_type: RecordType) -> PathBuf {
        let name = match record_type {
            RecordType::Content => "contents.json",
            RecordType::Comment => "comments.json",
            RecordType::Creator => "creators.json",
        };
        data_dir.join(name)
    }

    async fn load_file(path: &Path) -> CrawlerResult<RecordMap> {
        match tokio::fs::read_to_string(path).await {
            Ok(content) if content.trim().is_empty() => Ok(RecordMap::new()),
            Ok(content) => serde_json::from_str(&content)
                .map_err(|e| CrawlerError::persistence(format!("解析 {} 失败: {e}", path.display()))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(RecordMap::new()),
            Err(e) => Err(CrawlerError::persistence(format!(
                "读取 {} 失败: {e}",
                path.display()
            ))),
        }
    }

    async fn upsert(&self, expected: RecordType, record: &CanonicalRecord) -> CrawlerResult<()> {
        if record.record_type != expected {
            return Err(CrawlerError::persistence(format!(
                "记录 {} 类型为 {}，不能写入 {expected} 存储",
                record.id, record.record_type
            )));
        }

        let mut records = self.records.lock().await;
        let map = records.entry(expected).or_default();
        map.insert(
            record.storage_key(),
            StoredRecord {
                record: record.clone(),
                stored_at: Utc::now(),
            },
        );

        let encoded = serde_json::to_vec_pretty(map)?;
        let path = Self::file_path(&self.data_dir, expected);
        write_atomically(&path, &encoded)
            .await
            .map_err(|e| CrawlerError::persistence(format!("写入 {} 失败: {e}", path.display())))?;

        debug!(record.id = %record.id, record.platform = %record.platform, "记录已保存");
        Ok(())
    }

    pub async fn get(
        &self,
        record_type: RecordType,
        platform: &str,
        id: &str,
    ) -> Option<CanonicalRecord> {
        let records = self.records.lock().await;
        records
            .get(&record_type)
            .and_then(|map| map.get(&format!("{platform}:{id}")))
            .map(|stored| stored.record.clone())
    }

    pub async fn count(&self, record_type: RecordType) -> usize {
        let records = self.records.lock().await;
        records.get(&record_type).map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl PersistenceGateway for JsonFileStore {
    async fn store_content(&self, record: &CanonicalRecord) -> CrawlerResult<()> {
        self.upsert(RecordType::Content, record).await
    }

    async fn store_comment(&self, record: &CanonicalRecord) -> CrawlerResult<()> {
        self.upsert(RecordType::Comment, record).await
    }

    async fn store_creator(&self, record: &CanonicalRecord) -> CrawlerResult<()> {
        self.upsert(RecordType::Creator, record).await
    }

    async fn close(&self) -> CrawlerResult<()> {
        info!("JSON 记录存储已关闭: {}", self.data_dir.display());
        Ok(())
    }
}
