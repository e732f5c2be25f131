use std::time::Duration;

use crawler_core::{CrawlerError, CrawlerResult};
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

/// 有界 FIFO 任务队列
///
/// 基于 Tokio 有界通道实现。队列满时 `enqueue` 等待空位（背压），
/// `try_enqueue` 立即返回 `QueueFull`；`dequeue` 在超时后返回 `None`，
/// 消费循环借此检查关闭信号。
#[derive(Debug)]
pub struct TaskQueue<T> {
    sender: mpsc::Sender<T>,
    receiver: Mutex<mpsc::Receiver<T>>,
    capacity: usize,
}

impl<T: Send> TaskQueue<T> {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            sender,
            receiver: Mutex::new(receiver),
            capacity,
        }
    }

    /// 入队，队列满时等待
    pub async fn enqueue(&self, item: T) -> CrawlerResult<()> {
        self.sender
            .send(item)
            .await
            .map_err(|_| CrawlerError::QueueClosed)
    }

    /// 非阻塞入队
    pub fn try_enqueue(&self, item: T) -> CrawlerResult<()> {
        self.sender.try_send(item).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => CrawlerError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => CrawlerError::QueueClosed,
        })
    }

    /// 出队，超时或队列已关闭且为空时返回 `None`
    pub async fn dequeue(&self, timeout: Duration) -> Option<T> {
        let mut receiver = self.receiver.lock().await;
        match tokio::time::timeout(timeout, receiver.recv()).await {
            Ok(item) => item,
            Err(_) => None,
        }
    }

    pub fn len(&self) -> usize {
        self.capacity - self.sender.capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn remaining_capacity(&self) -> usize {
        self.sender.capacity()
    }

    /// 关闭队列，已入队的元素仍可被取出
    pub async fn close(&self) {
        self.receiver.lock().await.close();
        debug!("任务队列已关闭");
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = TaskQueue::new(4);
        for i in 0..3 {
            queue.enqueue(i).await.unwrap();
        }
        assert_eq!(queue.len(), 3);

        let timeout = Duration::from_millis(10);
        assert_eq!(queue.dequeue(timeout).await, Some(0));
        assert_eq!(queue.dequeue(timeout).await, Some(1));
        assert_eq!(queue.dequeue(timeout).await, Some(2));
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_full_queue_rejects_try_enqueue() {
        let queue = TaskQueue::new(2);
        queue.try_enqueue("a").unwrap();
        queue.try_enqueue("b").unwrap();
        assert!(matches!(queue.try_enqueue("c"), Err(CrawlerError::QueueFull)));
        assert_eq!(queue.remaining_capacity(), 0);
    }

    #[tokio::test]
    async fn test_dequeue_times_out_when_empty() {
        let queue: TaskQueue<u32> = TaskQueue::new(1);
        let started = std::time::Instant::now();
        assert_eq!(queue.dequeue(Duration::from_millis(50)).await, None);
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_enqueue_waits_for_space() {
        let queue = Arc::new(TaskQueue::new(1));
        queue.enqueue(1).await.unwrap();

        let producer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.enqueue(2).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!producer.is_finished());

        assert_eq!(queue.dequeue(Duration::from_millis(10)).await, Some(1));
        producer.await.unwrap().unwrap();
        assert_eq!(queue.dequeue(Duration::from_millis(10)).await, Some(2));
    }

    #[tokio::test]
    async fn test_close_drains_then_rejects() {
        let queue = TaskQueue::new(2);
        queue.enqueue(7).await.unwrap();
        queue.close().await;

        assert!(matches!(queue.try_enqueue(8), Err(CrawlerError::QueueClosed)));
        assert_eq!(queue.dequeue(Duration::from_millis(10)).await, Some(7));
        assert_eq!(queue.dequeue(Duration::from_millis(10)).await, None);
    }
}
