use std::sync::atomic::{AtomicU8, Ordering};

/// Best-effort network connectivity signal.
///
/// Consulted only to annotate failures, never to gate fetches.
pub trait Reachability: Send + Sync {
    /// `None` when connectivity cannot be determined.
    fn is_reachable(&self) -> Option<bool>;
}

const UNKNOWN: u8 = 0;
const REACHABLE: u8 = 1;
const UNREACHABLE: u8 = 2;

/// Reachability answer set by the embedder, e.g. from an OS network monitor.
pub struct StaticReachability {
    state: AtomicU8,
}

impl StaticReachability {
    pub fn new(reachable: Option<bool>) -> Self {
        Self {
            state: AtomicU8::new(encode(reachable)),
        }
    }

    pub fn set(&self, reachable: Option<bool>) {
        self.state.store(encode(reachable), Ordering::Relaxed);
    }
}

impl Default for StaticReachability {
    fn default() -> Self {
        Self::new(None)
    }
}

impl Reachability for StaticReachability {
    fn is_reachable(&self) -> Option<bool> {
        match self.state.load(Ordering::Relaxed) {
            REACHABLE => Some(true),
            UNREACHABLE => Some(false),
            _ => None,
        }
    }
}

fn encode(reachable: Option<bool>) -> u8 {
    match reachable {
        Some(true) => REACHABLE,
        Some(false) => UNREACHABLE,
        None => UNKNOWN,
    }
}
