use std::collections::VecDeque;
use std::time::{Duration, Instant};

const WINDOW: Duration = Duration::from_secs(1);

/// 每秒准入上限
///
/// 记录最近一秒内的准入时间戳，超出上限时立即返回 `false`，从不阻塞。
/// 窗口边界允许短暂突发。
#[derive(Debug)]
pub struct RateThrottler {
    max_per_second: usize,
    admissions: VecDeque<Instant>,
}

impl RateThrottler {
    pub fn new(max_per_second: usize) -> Self {
        Self {
            max_per_second: max_per_second.max(1),
            admissions: VecDeque::new(),
        }
    }

    pub fn try_admit(&mut self) -> bool {
        self.try_admit_at(Instant::now())
    }

    pub fn try_admit_at(&mut self, now: Instant) -> bool {
        self.expire(now);
        if self.admissions.len() >= self.max_per_second {
            return false;
        }
        self.admissions.push_back(now);
        true
    }

    /// 运行时调整上限，已记录的准入保留
    pub fn set_rate(&mut self, max_per_second: usize) {
        self.max_per_second = max_per_second.max(1);
    }

    pub fn rate(&self) -> usize {
        self.max_per_second
    }

    /// 最近一秒内的准入次数
    pub fn current_rate(&mut self) -> usize {
        self.expire(Instant::now());
        self.admissions.len()
    }

    fn expire(&mut self, now: Instant) {
        while let Some(oldest) = self.admissions.front() {
            if now.duration_since(*oldest) >= WINDOW {
                self.admissions.pop_front();
            } else {
                break;
            }
        }
    }
}
