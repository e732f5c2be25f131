pub mod json_file_store;
pub mod json_task_repository;
pub mod sqlite_store;

pub use json_file_store::JsonFileStore;
pub use json_task_repository::JsonTaskRepository;
pub use sqlite_store::SqliteStore;

use std::path::Path;

/// 先写临时文件再重命名，避免进程中断留下半截文件
pub(crate) async fn write_atomically(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await?;
        }
    }
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    tokio::fs::write(&tmp, contents).await?;
    tokio::fs::rename(&tmp, path).await
}
