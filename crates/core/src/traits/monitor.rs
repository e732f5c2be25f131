use crate::models::MonitorEvent;

/// 执行事件的接收方
///
/// `record` 必须立即返回且不能失败，监控异常不允许中断抓取。
pub trait TaskMonitor: Send + Sync {
    fn record(&self, event: MonitorEvent);
}

/// 丢弃所有事件
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMonitor;

impl TaskMonitor for NoopMonitor {
    fn record(&self, _event: MonitorEvent) {}
}
