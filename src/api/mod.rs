use std::time::Instant;

pub mod health;

/// Process start time reported by the health endpoint.
pub struct Uptime {
    started: Instant,
}

impl Uptime {
    pub fn since(started: Instant) -> Self {
        Self { started }
    }

    pub fn secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}
