//! Injected process capabilities.
//!
//! Nothing in this crate reads the clock, randomness, or the environment
//! directly. Hosts hand in implementations of these traits; tests use the
//! deterministic doubles below.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Millisecond wall clock.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> u64;
}

/// Random bit source.
pub trait Entropy: Send + Sync {
    fn next_u128(&self) -> u128;
}

/// Read-only environment access.
pub trait EnvSource: Send + Sync {
    fn var(&self, name: &str) -> Option<String>;
}

// ============================================================================
// System implementations
// ============================================================================

/// Real wall clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        chrono::Utc::now().timestamp_millis().max(0) as u64
    }
}

/// OS randomness via the thread-local generator.
pub struct SystemEntropy;

impl Entropy for SystemEntropy {
    fn next_u128(&self) -> u128 {
        rand::random()
    }
}

/// Real process environment.
pub struct SystemEnv;

impl EnvSource for SystemEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

// ============================================================================
// Deterministic doubles
// ============================================================================

/// Clock pinned to a settable instant.
pub struct FixedClock(AtomicU64);

impl FixedClock {
    pub fn at(millis: u64) -> Self {
        FixedClock(AtomicU64::new(millis))
    }

    pub fn advance(&self, millis: u64) {
        self.0.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn now_millis(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Reproducible entropy from a seed.
pub struct SeededEntropy(Mutex<StdRng>);

impl SeededEntropy {
    pub fn from_seed(seed: u64) -> Self {
        SeededEntropy(Mutex::new(StdRng::seed_from_u64(seed)))
    }
}

impl Entropy for SeededEntropy {
    fn next_u128(&self) -> u128 {
        self.0.lock().gen()
    }
}

/// Environment backed by a plain map.
#[derive(Default)]
pub struct MapEnv(HashMap<String, String>);

impl MapEnv {
    pub fn new() -> Self {
        MapEnv(HashMap::new())
    }

    pub fn set(mut self, name: &str, value: &str) -> Self {
        self.0.insert(name.to_string(), value.to_string());
        self
    }
}

impl EnvSource for MapEnv {
    fn var(&self, name: &str) -> Option<String> {
        self.0.get(name).cloned()
    }
}

// ============================================================================
// Capability bundle
// ============================================================================

/// The capability bundle handed to edge construction.
#[derive(Clone)]
pub struct EdgeContext {
    pub clock: Arc<dyn Clock>,
    pub entropy: Arc<dyn Entropy>,
    pub env: Arc<dyn EnvSource>,
}

impl EdgeContext {
    /// Production wiring: real clock, OS randomness, process environment.
    pub fn system() -> Self {
        EdgeContext {
            clock: Arc::new(SystemClock),
            entropy: Arc::new(SystemEntropy),
            env: Arc::new(SystemEnv),
        }
    }

    /// Fully deterministic wiring for tests.
    pub fn deterministic(now_millis: u64, seed: u64, env: MapEnv) -> Self {
        EdgeContext {
            clock: Arc::new(FixedClock::at(now_millis)),
            entropy: Arc::new(SeededEntropy::from_seed(seed)),
            env: Arc::new(env),
        }
    }
}
