//! Three-state circuit breaker guarding calls to the remote store.
//!
//! Counters are atomic; the transition decision itself runs under a short
//! `parking_lot::Mutex` so two concurrent callers can't both decide to flip
//! `open → half-open`, or both claim the single half-open trial slot.

use crate::error::CacheError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU8, Ordering};
use std::time::{Duration, Instant};

const CLOSED: u8 = 0;
const OPEN: u8 = 1;
const HALF_OPEN: u8 = 2;

/// Observable state of a [`CircuitBreaker`], for logging/metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl From<u8> for BreakerState {
    fn from(v: u8) -> Self {
        match v {
            OPEN => BreakerState::Open,
            HALF_OPEN => BreakerState::HalfOpen,
            _ => BreakerState::Closed,
        }
    }
}

/// Breaker configuration.
#[derive(Debug, Clone, Copy)]
pub struct BreakerConfig {
    pub failure_threshold: u32,
    pub cooldown: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown: Duration::from_secs(30),
        }
    }
}

pub struct CircuitBreaker {
    state: AtomicU8,
    failure_count: AtomicU32,
    trial_claimed: AtomicBool,
    last_failure: Mutex<Option<Instant>>,
    transition_lock: Mutex<()>,
    config: BreakerConfig,
}

impl CircuitBreaker {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            state: AtomicU8::new(CLOSED),
            failure_count: AtomicU32::new(0),
            trial_claimed: AtomicBool::new(false),
            last_failure: Mutex::new(None),
            transition_lock: Mutex::new(()),
            config,
        }
    }

    /// Current state, for metrics/logging.
    pub fn state(&self) -> BreakerState {
        BreakerState::from(self.state.load(Ordering::Acquire))
    }

    /// Call before issuing a remote operation. `Err(CircuitOpen)` means the
    /// caller must not contact the remote store this time.
    pub fn before_call(&self) -> Result<(), CacheError> {
        loop {
            match self.state.load(Ordering::Acquire) {
                CLOSED => return Ok(()),
                OPEN => {
                    if !self.cooldown_elapsed() {
                        return Err(CacheError::CircuitOpen);
                    }
                    let _guard = self.transition_lock.lock();
                    if self.state.load(Ordering::Acquire) == OPEN && self.cooldown_elapsed() {
                        self.trial_claimed.store(false, Ordering::Release);
                        self.state.store(HALF_OPEN, Ordering::Release);
                        tracing::debug!("circuit breaker: open -> half-open (cooldown elapsed)");
                    }
                    // loop again to evaluate the (now likely half-open) state
                }
                HALF_OPEN => {
                    return if self
                        .trial_claimed
                        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                        .is_ok()
                    {
                        Ok(())
                    } else {
                        Err(CacheError::CircuitOpen)
                    };
                }
                _ => unreachable!("circuit breaker state is one of CLOSED/OPEN/HALF_OPEN"),
            }
        }
    }

    /// Report that the call permitted by [`Self::before_call`] succeeded.
    pub fn record_success(&self) {
        match self.state.load(Ordering::Acquire) {
            HALF_OPEN => {
                let _guard = self.transition_lock.lock();
                self.failure_count.store(0, Ordering::Release);
                self.state.store(CLOSED, Ordering::Release);
                tracing::debug!("circuit breaker: half-open -> closed (trial succeeded)");
            }
            CLOSED => {
                self.failure_count.store(0, Ordering::Release);
            }
            _ => {}
        }
    }

    /// Report that the call permitted by [`Self::before_call`] failed.
    pub fn record_failure(&self) {
        match self.state.load(Ordering::Acquire) {
            HALF_OPEN => {
                let _guard = self.transition_lock.lock();
                *self.last_failure.lock() = Some(Instant::now());
                self.state.store(OPEN, Ordering::Release);
                tracing::warn!("circuit breaker: half-open -> open (trial failed)");
            }
            CLOSED => {
                let count = self.failure_count.fetch_add(1, Ordering::AcqRel) + 1;
                if count >= self.config.failure_threshold {
                    let _guard = self.transition_lock.lock();
                    *self.last_failure.lock() = Some(Instant::now());
                    self.state.store(OPEN, Ordering::Release);
                    tracing::warn!(
                        failures = count,
                        "circuit breaker: closed -> open (failure threshold reached)"
                    );
                }
            }
            OPEN => {
                *self.last_failure.lock() = Some(Instant::now());
            }
            _ => {}
        }
    }

    fn cooldown_elapsed(&self) -> bool {
        match *self.last_failure.lock() {
            Some(t) => t.elapsed() >= self.config.cooldown,
            None => true,
        }
    }
}
