//! Process-wide, single-flight setup gates.
//!
//! Concurrent first runs wait on the same initialization instead of racing
//! to bootstrap the runtime or build the image twice. A failed attempt
//! leaves the gate open so the next run retries.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, OnceLock};

use tokio::sync::OnceCell;

use crate::error::SetupError;

#[derive(Debug, Default)]
pub struct ReadinessGate {
    cell: OnceCell<()>,
}

impl ReadinessGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// The gate registered under `key` for the whole process, created on
    /// first use. Every caller passing the same key shares one gate.
    pub fn shared(key: &str) -> Arc<Self> {
        static GATES: OnceLock<Mutex<HashMap<String, Arc<ReadinessGate>>>> = OnceLock::new();
        let mut gates = GATES
            .get_or_init(|| Mutex::new(HashMap::new()))
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(gates.entry(key.to_string()).or_default())
    }

    /// Run `init` unless a previous call already succeeded. At most one
    /// `init` runs at a time; other callers wait for its outcome.
    pub async fn ensure<F, Fut>(&self, init: F) -> Result<(), SetupError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), SetupError>>,
    {
        self.cell.get_or_try_init(init).await.map(|_| ())
    }

    pub fn is_ready(&self) -> bool {
        self.cell.initialized()
    }
}
