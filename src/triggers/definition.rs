//! Trigger definitions and their registry
//!
//! Definitions are registered once at startup; `enabled` is the only field
//! that changes afterwards. Registration order is remembered because it
//! breaks ties during winner selection.

use parking_lot::RwLock;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// A keyword-gated candidate action
#[derive(Debug)]
pub struct TriggerDefinition {
    name: String,
    keywords: Vec<String>,
    priority: u8,
    enabled: AtomicBool,
    registration_index: usize,
}

impl TriggerDefinition {
    pub fn new(name: impl Into<String>, keywords: Vec<String>) -> Self {
        Self {
            name: name.into(),
            keywords: keywords.into_iter().map(|k| k.to_lowercase()).collect(),
            priority: 50,
            enabled: AtomicBool::new(true),
            registration_index: 0,
        }
    }

    /// Priority 0-100, higher wins
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.min(100);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn keywords(&self) -> &[String] {
        &self.keywords
    }

    pub fn priority(&self) -> u8 {
        self.priority
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Position in registration order; assigned by the registry
    pub fn registration_index(&self) -> usize {
        self.registration_index
    }

    /// Case-insensitive substring match of any keyword against the text
    pub fn matches_keywords(&self, text: &str) -> bool {
        let text_lower = text.to_lowercase();
        self.keywords.iter().any(|k| text_lower.contains(k.as_str()))
    }
}

/// Startup-time registry of trigger definitions
#[derive(Default)]
pub struct TriggerRegistry {
    triggers: RwLock<Vec<Arc<TriggerDefinition>>>,
}

impl TriggerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a definition, assigning its registration index
    pub fn register(&self, mut definition: TriggerDefinition) -> Arc<TriggerDefinition> {
        let mut triggers = self.triggers.write();
        definition.registration_index = triggers.len();
        info!(
            "Registered trigger '{}' (priority {}, keywords {:?})",
            definition.name, definition.priority, definition.keywords
        );
        let definition = Arc::new(definition);
        triggers.push(Arc::clone(&definition));
        definition
    }

    pub fn get(&self, name: &str) -> Option<Arc<TriggerDefinition>> {
        self.triggers
            .read()
            .iter()
            .find(|t| t.name() == name)
            .cloned()
    }

    pub fn all(&self) -> Vec<Arc<TriggerDefinition>> {
        self.triggers.read().clone()
    }

    pub fn len(&self) -> usize {
        self.triggers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.read().is_empty()
    }

    /// Flip a trigger's enabled flag; returns false for unknown names
    pub fn set_enabled(&self, name: &str, enabled: bool) -> bool {
        match self.get(name) {
            Some(trigger) => {
                trigger.set_enabled(enabled);
                debug!("Trigger '{}' enabled={}", name, enabled);
                true
            }
            None => false,
        }
    }

    /// Enabled definitions whose keywords match the text, in registration
    /// order
    pub fn matching(&self, text: &str) -> Vec<Arc<TriggerDefinition>> {
        self.triggers
            .read()
            .iter()
            .filter(|t| t.is_enabled() && t.matches_keywords(text))
            .cloned()
            .collect()
    }
}
