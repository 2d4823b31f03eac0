use indexmap::IndexMap;

use sf_lang::plan::StrategyTag;

use crate::value::{ReferenceValue, Value};


// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// One binding in the hierarchical context.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ContextEntry {
    /// A plain value (computed variables, synthetic keys).
    Value(Value),
    /// A resolved entity-backed value carrying its origin.
    Reference(ReferenceValue),
    /// A placeholder inserted at context-preparation time; dereferenced on
    /// first read by the lazy resolver.
    Lazy {
        reference: String,
        strategy: StrategyTag,
    },
}

impl ContextEntry {
    pub fn value(&self) -> Option<&Value> {
        match self {
            ContextEntry::Value(v) => Some(v),
            ContextEntry::Reference(rv) => Some(&rv.value),
            ContextEntry::Lazy { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Hierarchical context
// ---------------------------------------------------------------------------

/// Stack-structured name → value mapping used during one evaluation.
///
/// Layers, outermost first: process → sensor-set globals → sensor →
/// formula. Lookup walks innermost-out; writes always land in the
/// innermost layer; popping a frame discards its bindings and never
/// disturbs outer layers.
#[derive(Debug, Clone)]
pub struct HierarchicalContext {
    layers: Vec<IndexMap<String, ContextEntry>>,
}

impl Default for HierarchicalContext {
    fn default() -> Self {
        Self::new()
    }
}

impl HierarchicalContext {
    /// A fresh context with only the process layer.
    pub fn new() -> Self {
        Self {
            layers: vec![IndexMap::new()],
        }
    }

    pub fn push_layer(&mut self) {
        self.layers.push(IndexMap::new());
    }

    /// Pop the innermost layer and return its bindings. The process layer
    /// cannot be popped.
    pub fn pop_layer(&mut self) -> IndexMap<String, ContextEntry> {
        if self.layers.len() > 1 {
            self.layers.pop().unwrap_or_default()
        } else {
            IndexMap::new()
        }
    }

    pub fn depth(&self) -> usize {
        self.layers.len()
    }

    /// Insert into the innermost layer.
    pub fn insert(&mut self, name: impl Into<String>, entry: ContextEntry) {
        if let Some(layer) = self.layers.last_mut() {
            layer.insert(name.into(), entry);
        }
    }

    pub fn insert_value(&mut self, name: impl Into<String>, value: Value) {
        self.insert(name, ContextEntry::Value(value));
    }

    pub fn insert_reference(&mut self, name: impl Into<String>, rv: ReferenceValue) {
        self.insert(name, ContextEntry::Reference(rv));
    }

    pub fn insert_lazy(
        &mut self,
        name: impl Into<String>,
        reference: impl Into<String>,
        strategy: StrategyTag,
    ) {
        self.insert(
            name,
            ContextEntry::Lazy {
                reference: reference.into(),
                strategy,
            },
        );
    }

    /// Innermost-out lookup.
    pub fn get(&self, name: &str) -> Option<&ContextEntry> {
        self.layers.iter().rev().find_map(|layer| layer.get(name))
    }

    /// Innermost-out lookup of a concrete value (skips lazy placeholders).
    pub fn get_value(&self, name: &str) -> Option<&Value> {
        self.get(name).and_then(|entry| entry.value())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Replace a lazy placeholder with its resolved reference value,
    /// wherever in the stack it lives.
    pub fn materialize(&mut self, name: &str, rv: ReferenceValue) {
        for layer in self.layers.iter_mut().rev() {
            if let Some(entry) = layer.get_mut(name) {
                *entry = ContextEntry::Reference(rv);
                return;
            }
        }
    }

    /// Reference values recorded in the innermost layer, for traceability.
    pub fn frame_references(&self) -> Vec<ReferenceValue> {
        self.layers
            .last()
            .map(|layer| {
                layer
                    .values()
                    .filter_map(|entry| match entry {
                        ContextEntry::Reference(rv) => Some(rv.clone()),
                        _ => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}
