use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Cooperative cancellation of a training run.
///
/// Clones share the same flag, so a token can be handed to another thread
/// or a signal handler. [`RolloutProcedure`](crate::RolloutProcedure)
/// checks it between episodes; a running step is never interrupted.
#[derive(Debug, Clone, Default)]
pub struct StopToken(Arc<AtomicBool>);

impl StopToken {
    /// Creates a token that is not stopped.
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests a stop.
    pub fn stop(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Returns `true` once a stop was requested.
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_between_threads() {
        let token = StopToken::new();
        let t = token.clone();
        std::thread::spawn(move || t.stop()).join().unwrap();
        assert!(token.is_stopped());
    }
}
