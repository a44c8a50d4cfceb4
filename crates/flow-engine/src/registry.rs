//! Component registry for palette listing and reconstruction
//!
//! Maps component type strings to descriptors and factories. Snapshots,
//! clipboard contents and flow files store only `component_type` plus a
//! configuration value, so every restore goes through this registry.
//!
//! # Usage
//!
//! ```ignore
//! use flow_engine::{ComponentRegistry, ComponentRegistration};
//!
//! inventory::submit!(ComponentRegistration {
//!     descriptor: MySource::descriptor,
//!     create: MySource::create,
//! });
//!
//! let registry = ComponentRegistry::with_builtins();
//! let component = registry.create("my-source", &serde_json::json!({}))?;
//! ```

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::capability::Component;
use crate::error::{FlowError, Result};

/// Palette category of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentCategory {
    /// Loads data into the flow (usually start points)
    Source,
    /// Transforms data in flight
    Filter,
    /// Learns or evaluates models
    Evaluation,
    /// Displays or stores results
    Sink,
    /// Anything else
    Tool,
}

/// Static description of a component type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDescriptor {
    /// Unique type identifier (e.g., "record-source")
    pub component_type: String,
    /// Human-readable label
    pub label: String,
    /// What the component does
    pub description: String,
    /// Palette grouping
    pub category: ComponentCategory,
}

/// Builds components of one type from their configuration
pub trait ComponentFactory: Send + Sync {
    fn create(&self, config: &serde_json::Value) -> Result<Arc<dyn Component>>;
}

/// Link-time registration of a component type
///
/// Uses const function pointers so registrations can be collected with
/// `inventory` from any crate linked into the binary.
pub struct ComponentRegistration {
    /// Returns the component's descriptor
    pub descriptor: fn() -> ComponentDescriptor,
    /// Builds an instance from configuration
    pub create: fn(&serde_json::Value) -> Result<Arc<dyn Component>>,
}

inventory::collect!(ComponentRegistration);

struct FnFactory<F>(F);

impl<F> ComponentFactory for FnFactory<F>
where
    F: Fn(&serde_json::Value) -> Result<Arc<dyn Component>> + Send + Sync,
{
    fn create(&self, config: &serde_json::Value) -> Result<Arc<dyn Component>> {
        (self.0)(config)
    }
}

struct RegistryEntry {
    descriptor: ComponentDescriptor,
    factory: Arc<dyn ComponentFactory>,
}

/// Registry of component types with their descriptors and factories
pub struct ComponentRegistry {
    entries: HashMap<String, RegistryEntry>,
}

impl ComponentRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Create a registry populated from every linked `ComponentRegistration`
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for registration in inventory::iter::<ComponentRegistration> {
            let descriptor = (registration.descriptor)();
            log::debug!("Registering component type '{}'", descriptor.component_type);
            registry.register_fn(descriptor, registration.create);
        }
        registry
    }

    /// Register a component type with a factory
    pub fn register(&mut self, descriptor: ComponentDescriptor, factory: Arc<dyn ComponentFactory>) {
        self.entries.insert(
            descriptor.component_type.clone(),
            RegistryEntry {
                descriptor,
                factory,
            },
        );
    }

    /// Register a component type backed by a plain function or closure
    pub fn register_fn<F>(&mut self, descriptor: ComponentDescriptor, create: F)
    where
        F: Fn(&serde_json::Value) -> Result<Arc<dyn Component>> + Send + Sync + 'static,
    {
        self.register(descriptor, Arc::new(FnFactory(create)));
    }

    /// Build a component of `component_type` from `config`
    pub fn create(&self, component_type: &str, config: &serde_json::Value) -> Result<Arc<dyn Component>> {
        let entry = self
            .entries
            .get(component_type)
            .ok_or_else(|| FlowError::UnknownComponentType(component_type.to_string()))?;
        entry.factory.create(config)
    }

    /// Rebuild an equivalent, independent instance of `component`
    pub fn duplicate(&self, component: &dyn Component) -> Result<Arc<dyn Component>> {
        self.create(component.component_type(), &component.config())
    }

    /// Get the descriptor for a component type
    pub fn descriptor(&self, component_type: &str) -> Option<&ComponentDescriptor> {
        self.entries.get(component_type).map(|e| &e.descriptor)
    }

    /// All descriptors, sorted by label for palette display
    pub fn descriptors(&self) -> Vec<&ComponentDescriptor> {
        let mut all: Vec<&ComponentDescriptor> = self.entries.values().map(|e| &e.descriptor).collect();
        all.sort_by(|a, b| a.label.cmp(&b.label));
        all
    }

    /// Descriptors grouped by category
    pub fn descriptors_by_category(&self) -> HashMap<ComponentCategory, Vec<&ComponentDescriptor>> {
        let mut grouped: HashMap<ComponentCategory, Vec<&ComponentDescriptor>> = HashMap::new();
        for descriptor in self.descriptors() {
            grouped.entry(descriptor.category).or_default().push(descriptor);
        }
        grouped
    }

    /// Check if a component type is registered
    pub fn has_component_type(&self, component_type: &str) -> bool {
        self.entries.contains_key(component_type)
    }

    /// Merge another registry into this one
    ///
    /// Entries from `other` override entries in `self` with the same type.
    pub fn merge(&mut self, other: ComponentRegistry) {
        self.entries.extend(other.entries);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}
