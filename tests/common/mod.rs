//! In-memory driver that counts every lifecycle call.

#![allow(dead_code)]

use pg_session_pool::DriverError;
use pg_session_pool::driver::{Driver, Engine, EngineOptions, Session, SessionOptions};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct Counters {
    pub engines_created: AtomicUsize,
    pub probes: AtomicUsize,
    pub disposals: AtomicUsize,
    pub sessions_opened: AtomicUsize,
    pub begins: AtomicUsize,
    pub commits: AtomicUsize,
    pub rollbacks: AtomicUsize,
    pub closes: AtomicUsize,
}

impl Counters {
    pub fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }

    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// Failure switches, flipped by tests while the driver is in use.
#[derive(Debug, Default)]
pub struct Behavior {
    pub fail_engine: AtomicBool,
    pub fail_probe: AtomicBool,
    pub fail_commit: AtomicBool,
    pub fail_rollback: AtomicBool,
    pub probe_delay_ms: AtomicU64,
    pub rollback_delay_ms: AtomicU64,
}

impl Behavior {
    pub fn set(flag: &AtomicBool, value: bool) {
        flag.store(value, Ordering::SeqCst);
    }

    fn is(flag: &AtomicBool) -> bool {
        flag.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockDriver {
    pub counters: Arc<Counters>,
    pub behavior: Arc<Behavior>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_probe_delay(delay: Duration) -> Self {
        let driver = Self::default();
        driver
            .behavior
            .probe_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
        driver
    }

    pub fn with_rollback_delay(delay: Duration) -> Self {
        let driver = Self::default();
        driver
            .behavior
            .rollback_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
        driver
    }
}

impl Driver for MockDriver {
    type Engine = MockEngine;
    type Session = MockSession;

    fn create_engine(&self, options: &EngineOptions) -> Result<MockEngine, DriverError> {
        if Behavior::is(&self.behavior.fail_engine) {
            return Err(DriverError::other(format!("invalid url: {}", options.url)));
        }
        Counters::bump(&self.counters.engines_created);
        Ok(MockEngine {
            counters: Arc::clone(&self.counters),
            behavior: Arc::clone(&self.behavior),
        })
    }
}

#[derive(Debug)]
pub struct MockEngine {
    counters: Arc<Counters>,
    behavior: Arc<Behavior>,
}

impl Engine for MockEngine {
    type Session = MockSession;

    async fn probe(&self) -> Result<(), DriverError> {
        Counters::bump(&self.counters.probes);
        let delay = self.behavior.probe_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if Behavior::is(&self.behavior.fail_probe) {
            return Err(DriverError::other("connection refused"));
        }
        Ok(())
    }

    fn open_session(&self, options: &SessionOptions) -> MockSession {
        Counters::bump(&self.counters.sessions_opened);
        MockSession {
            counters: Arc::clone(&self.counters),
            behavior: Arc::clone(&self.behavior),
            options: *options,
            open_tx: false,
        }
    }

    async fn dispose(&self) {
        Counters::bump(&self.counters.disposals);
    }
}

#[derive(Debug)]
pub struct MockSession {
    counters: Arc<Counters>,
    behavior: Arc<Behavior>,
    pub options: SessionOptions,
    open_tx: bool,
}

impl Session for MockSession {
    fn in_transaction(&self) -> bool {
        self.open_tx
    }

    async fn begin(&mut self) -> Result<(), DriverError> {
        Counters::bump(&self.counters.begins);
        self.open_tx = true;
        Ok(())
    }

    async fn commit(&mut self) -> Result<(), DriverError> {
        Counters::bump(&self.counters.commits);
        if Behavior::is(&self.behavior.fail_commit) {
            return Err(DriverError::other("could not serialize access"));
        }
        self.open_tx = false;
        Ok(())
    }

    async fn rollback(&mut self) -> Result<(), DriverError> {
        Counters::bump(&self.counters.rollbacks);
        let delay = self.behavior.rollback_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        self.open_tx = false;
        if Behavior::is(&self.behavior.fail_rollback) {
            return Err(DriverError::other("connection lost during rollback"));
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<(), DriverError> {
        Counters::bump(&self.counters.closes);
        Ok(())
    }
}
