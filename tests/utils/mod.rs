//! Shared helpers for integration tests

#![allow(dead_code)]

use querystat::{DebugHook, DebuggableStorage, ParamValue};
use std::sync::{Arc, Once};
use tracing_subscriber::EnvFilter;

static TRACING: Once = Once::new();

/// Route library logs to the test writer (RUST_LOG controls the level)
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// Minimal storage layer that reports queries to its debug hook
#[derive(Default)]
pub struct FakeStore {
    hook: Option<Arc<dyn DebugHook>>,
    enabled: bool,
}

impl FakeStore {
    pub fn debug_enabled(&self) -> bool {
        self.enabled
    }

    pub fn execute(&self, query: &str, params: &[ParamValue]) {
        if let (Some(hook), true) = (&self.hook, self.enabled) {
            let token = hook.query_start(query, params);
            hook.query_end(token, query, params);
        }
    }

    pub fn commit(&self) {
        if let (Some(hook), true) = (&self.hook, self.enabled) {
            hook.transaction_commit();
        }
    }
}

impl DebuggableStorage for FakeStore {
    fn set_debug_hook(&mut self, hook: Arc<dyn DebugHook>) {
        self.hook = Some(hook);
    }

    fn set_debug_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }
}
