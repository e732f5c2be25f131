use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// 标准化记录类型
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum RecordType {
    Content,
    Comment,
    Creator,
}

impl RecordType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordType::Content => "content",
            RecordType::Comment => "comment",
            RecordType::Creator => "creator",
        }
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 平台无关的标准化记录
///
/// 各平台适配器负责把原始响应映射为 `CanonicalRecord`，存储层只按
/// `(platform, record_type, id)` 区分记录。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CanonicalRecord {
    pub id: String,
    pub platform: String,
    #[serde(rename = "type")]
    pub record_type: RecordType,
    #[serde(default)]
    pub attributes: Map<String, Value>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl CanonicalRecord {
    pub fn new(id: impl Into<String>, platform: impl Into<String>, record_type: RecordType) -> Self {
        Self {
            id: id.into(),
            platform: platform.into(),
            record_type,
            attributes: Map::new(),
            metadata: Map::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// 存储层使用的唯一键
    pub fn storage_key(&self) -> String {
        format!("{}:{}", self.platform, self.id)
    }
}

/// 落盘时附带写入时间的记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredRecord {
    #[serde(flatten)]
    pub record: CanonicalRecord,
    pub stored_at: DateTime<Utc>,
}
