//! Job classes: the code that actually runs a payload.
//!
//! A payload names its class as a string; the [`JobRegistry`] maps that
//! name to a [`JobHandler`]. The worker binary registers the built-in
//! [`ShellJob`] under `Shell`; embedders register their own.

pub mod shell;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

pub use shell::ShellJob;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    async fn perform(&self, args: Vec<Value>) -> Result<(), BoxError>;
}

#[derive(Clone, Default)]
pub struct JobRegistry {
    handlers: HashMap<String, Arc<dyn JobHandler>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in classes.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(ShellJob::CLASS, ShellJob);
        registry
    }

    pub fn register(&mut self, class: impl Into<String>, handler: impl JobHandler) -> &mut Self {
        self.handlers.insert(class.into(), Arc::new(handler));
        self
    }

    pub fn get(&self, class: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(class).cloned()
    }

    pub fn contains(&self, class: &str) -> bool {
        self.handlers.contains_key(class)
    }

    pub fn classes(&self) -> Vec<&str> {
        let mut classes: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        classes.sort_unstable();
        classes
    }
}

impl std::fmt::Debug for JobRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobRegistry")
            .field("classes", &self.classes())
            .finish()
    }
}
