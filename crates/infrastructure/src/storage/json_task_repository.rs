use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use crawler_core::{CrawlerError, CrawlerResult, Task, TaskRepository};
use tokio::sync::Mutex;
use tracing::debug;

use super::write_atomically;

/// 以单个 JSON 文档保存任务注册表，键为任务 `id`
pub struct JsonTaskRepository {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonTaskRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl TaskRepository for JsonTaskRepository {
    async fn load_all(&self) -> CrawlerResult<Vec<Task>> {
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            debug!("任务注册表文件不存在，从空注册表启动: {}", self.path.display());
            return Ok(Vec::new());
        }

        let content = tokio::fs::read_to_string(&self.path)
            .await
            .map_err(|e| CrawlerError::Registry(format!("读取 {} 失败: {e}", self.path.display())))?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        let tasks: BTreeMap<String, Task> = serde_json::from_str(&content).map_err(|e| {
            CrawlerError::Registry(format!("解析 {} 失败: {e}", self.path.display()))
        })?;
        Ok(tasks.into_values().collect())
    }

    async fn save_all(&self, tasks: &[Task]) -> CrawlerResult<()> {
        let _guard = self.write_lock.lock().await;

        let document: BTreeMap<&str, &Task> =
            tasks.iter().map(|task| (task.id.as_str(), task)).collect();
        let encoded = serde_json::to_vec_pretty(&document)
            .map_err(|e| CrawlerError::Registry(format!("序列化任务注册表失败: {e}")))?;

        write_atomically(&self.path, &encoded)
            .await
            .map_err(|e| CrawlerError::Registry(format!("写入 {} 失败: {e}", self.path.display())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crawler_core::TaskSpec;

    #[tokio::test]
    async fn test_missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let repo = JsonTaskRepository::new(dir.path().join("tasks.json"));
        assert!(repo.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_and_reload_keyed_by_id() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("tasks.json");
        let repo = JsonTaskRepository::new(&path);

        let now = Utc::now();
        let a = Task::from_spec(TaskSpec::search("xhs", "food").with_interval(60), 100, now);
        let b = Task::from_spec(TaskSpec::detail("dy", "note-1"), 100, now);
        repo.save_all(&[a.clone(), b.clone()]).await.unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw[&a.id]["status"], "pending");
        assert_eq!(raw[&b.id]["kind"], "detail");

        let mut loaded = repo.load_all().await.unwrap();
        loaded.sort_by(|x, y| x.id.cmp(&y.id));
        let mut expected = vec![a, b];
        expected.sort_by(|x, y| x.id.cmp(&y.id));
        assert_eq!(loaded, expected);
    }

    #[tokio::test]
    async fn test_corrupt_file_is_registry_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tasks.json");
        std::fs::write(&path, "{not json").unwrap();

        let repo = JsonTaskRepository::new(&path);
        let err = repo.load_all().await.unwrap_err();
        assert!(err.is_fatal());
    }
}
