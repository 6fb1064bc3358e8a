use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Run-level stop signal shared by the coordinator, the workers and the
/// transfer progress callbacks.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Same flag, plus a deadline after which the token reads as cancelled.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        Self {
            flag: Arc::clone(&self.flag),
            deadline: Some(deadline),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        if self.flag.load(Ordering::SeqCst) {
            return true;
        }
        self.deadline
            .map(|deadline| Instant::now() >= deadline)
            .unwrap_or(false)
    }

    /// True only when [`CancelToken::cancel`] was called, ignoring deadlines.
    pub fn is_interrupted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn deadline_token_shares_flag() {
        let token = CancelToken::new();
        let scoped = token.with_deadline(Instant::now() + Duration::from_secs(3600));
        assert!(!scoped.is_cancelled());
        token.cancel();
        assert!(scoped.is_cancelled());
        assert!(scoped.is_interrupted());
    }

    #[test]
    fn past_deadline_reads_as_cancelled() {
        let token = CancelToken::new();
        let scoped = token.with_deadline(Instant::now());
        assert!(scoped.is_cancelled());
        assert!(!scoped.is_interrupted());
        assert!(!token.is_cancelled());
    }
}
