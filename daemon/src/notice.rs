use shared::{CaptureError, Notice, NoticeLevel};
use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

/// Operator notices that dismiss themselves after a fixed lifetime.
pub struct Notices {
    lifetime: Duration,
    entries: VecDeque<(Instant, Notice)>,
}

impl Notices {
    pub fn new(lifetime: Duration) -> Self {
        Self {
            lifetime,
            entries: VecDeque::new(),
        }
    }

    pub fn push(&mut self, notice: Notice) {
        let now = Instant::now();
        self.prune(now);
        self.entries.push_back((now + self.lifetime, notice));
    }

    pub fn success(&mut self, text: impl Into<String>) {
        self.push(Notice {
            level: NoticeLevel::Success,
            text: text.into(),
        });
    }

    pub fn error(&mut self, err: &CaptureError) {
        self.push(Notice {
            level: NoticeLevel::Error,
            text: err.to_string(),
        });
    }

    /// Notices that have not expired yet, oldest first.
    pub fn active(&mut self) -> Vec<Notice> {
        self.prune(Instant::now());
        self.entries.iter().map(|(_, notice)| notice.clone()).collect()
    }

    /// Entries held, expired ones included until the next push or read.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    // Every entry shares one lifetime, so expiry times are ordered front to back.
    fn prune(&mut self, now: Instant) {
        while let Some((expires_at, _)) = self.entries.front() {
            if *expires_at > now {
                break;
            }
            self.entries.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn notices_expire_after_lifetime() {
        let mut notices = Notices::new(Duration::from_secs(5));
        notices.success("saved");
        tokio::time::sleep(Duration::from_secs(3)).await;
        notices.error(&CaptureError::Remote("offline".into()));

        assert_eq!(notices.active().len(), 2);

        tokio::time::sleep(Duration::from_secs(3)).await;
        let active = notices.active();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].level, NoticeLevel::Error);

        tokio::time::sleep(Duration::from_secs(3)).await;
        assert!(notices.active().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn pushing_drops_expired_notices() {
        let mut notices = Notices::new(Duration::from_secs(5));
        for _ in 0..1000 {
            notices.success("saved");
            tokio::time::sleep(Duration::from_secs(1)).await;
        }

        assert_eq!(notices.len(), 5);
        tokio::time::sleep(Duration::from_secs(5)).await;
        notices.success("saved");
        assert_eq!(notices.len(), 1);
    }
}
