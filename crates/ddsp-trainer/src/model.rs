//! Model selection.

use std::collections::BTreeMap;
use std::fmt;

use ddsp_core::{ConfigValue, ResolvedConfig, Result};

/// Binding that selects the model.
pub const MODEL_KEY: &str = "get_model.model";

/// A configured model: its configurable name and bound parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSpec {
    /// Configurable name, e.g. `Autoencoder`.
    pub name: String,
    /// Parameters bound on the configurable.
    pub params: BTreeMap<String, ConfigValue>,
}

impl fmt::Display for ModelSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.name)?;
        for (i, (param, value)) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{param}={value}")?;
        }
        f.write_str(")")
    }
}

/// Resolve the model bound to `get_model.model`.
pub fn get_model(config: &ResolvedConfig) -> Result<ModelSpec> {
    let reference = config.require_reference(MODEL_KEY)?;
    let name = reference.configurable_name().to_string();
    let params = config
        .params_of(&name)
        .map(|(param, value)| (param.to_string(), value.clone()))
        .collect();
    let model = ModelSpec { name, params };
    tracing::info!(model = %model, "Resolved model");
    Ok(model)
}
