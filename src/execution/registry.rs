//! Capability registry resolving element type identifiers to cached instances.
//!
//! Factories are registered once at startup from a static table. The first resolution of a type
//! instantiates it; every later resolution, from any execution, returns the same instance.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use super::element::{Component, PipelineElement};
use super::elements;

type ElementFactory = Box<dyn Fn() -> Component + Send + Sync>;

/// Registry of element factories plus the shared instance cache.
#[derive(Default)]
pub struct ElementRegistry {
    factories: HashMap<String, ElementFactory>,
    instances: RwLock<HashMap<String, Component>>,
}

impl ElementRegistry {
    /// Registry without any element types.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in element set.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        elements::register_builtins(&mut registry);
        registry
    }

    /// Register a factory for `element_type`, replacing any previous one.
    pub fn register<F>(&mut self, element_type: impl Into<String>, factory: F)
    where
        F: Fn() -> Component + Send + Sync + 'static,
    {
        self.factories.insert(element_type.into(), Box::new(factory));
    }

    /// Register a shared instance for `element_type`.
    pub fn register_element(
        &mut self,
        element_type: impl Into<String>,
        element: Arc<dyn PipelineElement>,
    ) {
        self.register(element_type, move || Component::Executable(element.clone()));
    }

    /// Register a type that resolves but has nothing to execute.
    pub fn register_passive(&mut self, element_type: impl Into<String>) {
        self.register(element_type, || Component::Passive);
    }

    /// Whether a factory exists for `element_type`.
    pub fn contains(&self, element_type: &str) -> bool {
        self.factories.contains_key(element_type)
    }

    /// Registered type identifiers, sorted.
    pub fn element_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.keys().cloned().collect();
        types.sort();
        types
    }

    /// Number of instantiated (cached) element types.
    pub fn cached_count(&self) -> usize {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Resolve `element_type`, instantiating and caching it on first use.
    ///
    /// Returns `None` for unregistered types.
    pub fn resolve(&self, element_type: &str) -> Option<Component> {
        if let Some(component) = self
            .instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(element_type)
        {
            return Some(component.clone());
        }

        let factory = self.factories.get(element_type)?;
        let mut instances = self
            .instances
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        // Another execution may have won the race between the two locks.
        let component = instances
            .entry(element_type.to_string())
            .or_insert_with(|| {
                tracing::debug!(element_type, "Instantiating pipeline element");
                factory()
            })
            .clone();
        Some(component)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::context::ExecutionContext;
    use crate::execution::element::ElementError;
    use async_trait::async_trait;
    use serde_json::{Map, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Noop;

    #[async_trait]
    impl PipelineElement for Noop {
        async fn execute(
            &self,
            _config: &Map<String, Value>,
            _context: &mut ExecutionContext,
        ) -> Result<bool, ElementError> {
            Ok(true)
        }
    }

    #[test]
    fn factory_runs_once_per_type() {
        let calls = Arc::new(AtomicUsize::new(0));
        let mut registry = ElementRegistry::new();
        let counter = calls.clone();
        registry.register("noop", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Component::Executable(Arc::new(Noop))
        });

        let first = registry.resolve("noop").expect("registered");
        let second = registry.resolve("noop").expect("registered");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.cached_count(), 1);
        match (first, second) {
            (Component::Executable(a), Component::Executable(b)) => assert!(Arc::ptr_eq(&a, &b)),
            other => panic!("unexpected components: {other:?}"),
        }
    }

    #[test]
    fn unknown_types_do_not_resolve() {
        let registry = ElementRegistry::new();
        assert!(registry.resolve("missing.Element").is_none());
        assert_eq!(registry.cached_count(), 0);
    }

    #[test]
    fn passive_types_resolve_to_passive() {
        let mut registry = ElementRegistry::new();
        registry.register_passive("docs.Note");
        assert!(matches!(registry.resolve("docs.Note"), Some(Component::Passive)));
    }

    #[test]
    fn builtins_are_registered() {
        let registry = ElementRegistry::with_builtins();
        for element_type in elements::BUILTIN_TYPES {
            assert!(registry.contains(element_type), "{element_type}");
        }
        assert_eq!(registry.element_types().len(), elements::BUILTIN_TYPES.len());
    }
}
