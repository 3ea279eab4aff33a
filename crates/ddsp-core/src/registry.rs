//! Registry of configurables that bindings may target.

use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone)]
enum Params {
    Any,
    Only(BTreeSet<String>),
}

/// A named configurable and the parameters it accepts.
#[derive(Debug, Clone)]
pub struct Configurable {
    name: String,
    params: Params,
}

impl Configurable {
    /// Registered name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether `param` may be bound on this configurable.
    pub fn accepts(&self, param: &str) -> bool {
        match &self.params {
            Params::Any => true,
            Params::Only(params) => params.contains(param),
        }
    }
}

/// Set of known configurables.
///
/// Selectors are matched either by their full text or by their last dotted
/// component, so `ddsp.core.cumsum` and `data.NSynthTfds` resolve to the
/// configurables registered as `cumsum` and `NSynthTfds`.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    configurables: BTreeMap<String, Configurable>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a configurable with a fixed parameter list.
    pub fn register(&mut self, name: &str, params: &[&str]) -> &mut Self {
        let params = params.iter().map(|p| p.to_string()).collect();
        self.configurables.insert(
            name.to_string(),
            Configurable {
                name: name.to_string(),
                params: Params::Only(params),
            },
        );
        self
    }

    /// Register a configurable that accepts any parameter.
    pub fn register_open(&mut self, name: &str) -> &mut Self {
        self.configurables.insert(
            name.to_string(),
            Configurable {
                name: name.to_string(),
                params: Params::Any,
            },
        );
        self
    }

    /// Find the configurable a selector refers to.
    pub fn lookup(&self, selector: &str) -> Option<&Configurable> {
        self.configurables.get(selector).or_else(|| {
            let short = selector.rsplit('.').next()?;
            self.configurables.get(short)
        })
    }

    /// Number of registered configurables.
    pub fn len(&self) -> usize {
        self.configurables.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.configurables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_by_suffix() {
        let mut registry = Registry::new();
        registry
            .register("cumsum", &["use_tpu"])
            .register_open("Autoencoder");

        let cumsum = registry.lookup("ddsp.core.cumsum").unwrap();
        assert_eq!(cumsum.name(), "cumsum");
        assert!(cumsum.accepts("use_tpu"));
        assert!(!cumsum.accepts("exclusive"));

        assert!(registry.lookup("models.Autoencoder").unwrap().accepts("anything"));
        assert!(registry.lookup("Decoder").is_none());
        assert_eq!(registry.len(), 2);
    }
}
