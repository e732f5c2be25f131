use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crawler_core::{CrawlerError, CrawlerResult, Task};
use futures::FutureExt;
use tokio::sync::{mpsc, RwLock, Semaphore};
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

use super::{panic_message, CancellationFlag, ExecutionOutcome, TaskRunner};

/// 一次执行结束后回传给调度器的报告
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub task_id: String,
    pub outcome: ExecutionOutcome,
    pub duration: Duration,
}

struct RunningTask {
    started_at: Instant,
    abort: AbortHandle,
}

/// 有界执行池
///
/// 并发上限由信号量控制，池满时 `execute` 等待空位。每个任务在独立的
/// Tokio 任务中运行，结束后通过通道发送 [`ExecutionReport`]，
/// 任务状态的记账由接收方完成。适配器或存储的 panic 按执行失败上报。
pub struct TaskExecutionManager {
    runner: Arc<TaskRunner>,
    semaphore: Arc<Semaphore>,
    max_concurrent_tasks: usize,
    running_tasks: Arc<RwLock<HashMap<String, RunningTask>>>,
    report_tx: mpsc::UnboundedSender<ExecutionReport>,
}

impl TaskExecutionManager {
    pub fn new(
        runner: Arc<TaskRunner>,
        max_concurrent_tasks: usize,
        report_tx: mpsc::UnboundedSender<ExecutionReport>,
    ) -> Self {
        let max_concurrent_tasks = max_concurrent_tasks.max(1);
        Self {
            runner,
            semaphore: Arc::new(Semaphore::new(max_concurrent_tasks)),
            max_concurrent_tasks,
            running_tasks: Arc::new(RwLock::new(HashMap::new())),
            report_tx,
        }
    }

    pub fn max_concurrent_tasks(&self) -> usize {
        self.max_concurrent_tasks
    }

    pub async fn running_count(&self) -> usize {
        self.running_tasks.read().await.len()
    }

    pub async fn running_task_ids(&self) -> Vec<String> {
        self.running_tasks.read().await.keys().cloned().collect()
    }

    pub async fn is_running(&self, task_id: &str) -> bool {
        self.running_tasks.read().await.contains_key(task_id)
    }

    /// 提交任务执行，执行池满时等待空位
    pub async fn execute(&self, task: Task, cancel: CancellationFlag) -> CrawlerResult<()> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| CrawlerError::Internal("执行池已关闭".to_string()))?;

        let task_id = task.id.clone();
        let runner = Arc::clone(&self.runner);
        let running_tasks = Arc::clone(&self.running_tasks);
        let report_tx = self.report_tx.clone();

        // 持有写锁直到登记完成，保证任务结束时的移除发生在登记之后
        let mut running = self.running_tasks.write().await;
        let handle = tokio::spawn(async move {
            let started = Instant::now();
            let outcome = match AssertUnwindSafe(runner.run(&task, &cancel))
                .catch_unwind()
                .await
            {
                Ok(outcome) => outcome,
                Err(panic) => {
                    let message = panic_message(panic.as_ref());
                    error!("任务 {} 执行时发生panic: {}", task.id, message);
                    ExecutionOutcome::Failed {
                        error: format!("执行过程中发生panic: {message}"),
                    }
                }
            };
            drop(permit);

            let report = ExecutionReport {
                task_id: task.id.clone(),
                outcome,
                duration: started.elapsed(),
            };
            if report_tx.send(report).is_err() {
                warn!("执行报告接收端已关闭，任务 {} 的结果被丢弃", task.id);
            }

            running_tasks.write().await.remove(&task.id);
        });

        debug!("任务 {} 已提交到执行池", task_id);
        running.insert(
            task_id,
            RunningTask {
                started_at: Instant::now(),
                abort: handle.abort_handle(),
            },
        );
        Ok(())
    }

    /// 等待所有执行结束，超时返回 `false`
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            if self.running_tasks.read().await.is_empty() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// 强制中止仍在执行的任务，返回被中止的任务 id
    pub async fn abort_all(&self) -> Vec<String> {
        let mut running = self.running_tasks.write().await;
        let aborted: Vec<String> = running
            .drain()
            .map(|(task_id, task)| {
                task.abort.abort();
                info!(
                    "中止任务 {task_id}，已运行 {:?}",
                    task.started_at.elapsed()
                );
                task_id
            })
            .collect();
        aborted
    }
}
