use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Shared run flag gating the supervisor, the status publisher and every
/// in-flight delayed-delete wait.
///
/// Starts true and is flipped false at most once per process; the loops read
/// it at their checkpoints instead of relying on ambient globals.
#[derive(Clone, Debug, Default)]
pub struct RunFlag {
    stopped: Arc<AtomicBool>,
}

impl RunFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_running(&self) -> bool {
        !self.stopped.load(Ordering::SeqCst)
    }

    pub fn request_stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_running_and_stays_stopped() {
        let flag = RunFlag::new();
        assert!(flag.is_running());

        let clone = flag.clone();
        clone.request_stop();
        assert!(!flag.is_running());

        // A second stop request is harmless.
        flag.request_stop();
        assert!(!clone.is_running());
    }
}
