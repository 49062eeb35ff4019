//! Lock-free circuit breaker used to fail fast against a dependency
//! (KV store, message bus) that is timing out repeatedly, instead of
//! piling up blocked tasks on every suspension point (§5).

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicU8, Ordering::Relaxed};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum State {
    Closed = 0,
    Open = 1,
    HalfOpen = 2,
}

impl From<u8> for State {
    fn from(v: u8) -> Self {
        match v {
            1 => State::Open,
            2 => State::HalfOpen,
            _ => State::Closed,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub failure_threshold: u32,
    pub open_cooldown_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            open_cooldown_ms: 30_000,
        }
    }
}

pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now_ms(&self) -> u64;
}

#[derive(Default, Debug)]
pub struct RealClock;

impl Clock for RealClock {
    fn now_ms(&self) -> u64 {
        use std::time::{SystemTime, UNIX_EPOCH};
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or(0)
    }
}

/// A lock-free Closed/Open/HalfOpen circuit breaker.
///
/// `try_acquire` is cheap enough to call on every KV/bus operation; the
/// caller reports the outcome with `on_success`/`on_failure`.
#[derive(Debug)]
pub struct CircuitBreaker {
    state: AtomicU8,
    failures: AtomicU32,
    open_until_ms: AtomicU64,
    cfg: Config,
    clock: Arc<dyn Clock>,
}

pub struct Rejected;

impl CircuitBreaker {
    pub fn new(cfg: Config, clock: Arc<dyn Clock>) -> Arc<Self> {
        Arc::new(Self {
            state: AtomicU8::new(State::Closed as u8),
            failures: AtomicU32::new(0),
            open_until_ms: AtomicU64::new(0),
            cfg,
            clock,
        })
    }

    pub fn state(&self) -> State {
        State::from(self.state.load(Relaxed))
    }

    pub fn try_acquire(&self) -> Result<(), Rejected> {
        match self.state() {
            State::Closed | State::HalfOpen => Ok(()),
            State::Open => {
                if self.clock.now_ms() >= self.open_until_ms.load(Relaxed) {
                    self.state.store(State::HalfOpen as u8, Relaxed);
                    Ok(())
                } else {
                    Err(Rejected)
                }
            }
        }
    }

    pub fn on_success(&self) {
        self.failures.store(0, Relaxed);
        self.state.store(State::Closed as u8, Relaxed);
    }

    pub fn on_failure(&self) {
        let failures = self.failures.fetch_add(1, Relaxed) + 1;
        if failures >= self.cfg.failure_threshold {
            self.state.store(State::Open as u8, Relaxed);
            self.open_until_ms
                .store(self.clock.now_ms() + self.cfg.open_cooldown_ms, Relaxed);
        }
    }
}
