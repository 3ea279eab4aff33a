//! Layered configuration.
//!
//! Configuration is assembled from an ordered list of layers. Each layer is a
//! gin file or a block of bindings; later layers override earlier ones. Once
//! every layer has been pushed, [`ConfigBuilder::build`] merges them into an
//! immutable [`ResolvedConfig`] with all macros substituted.

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use crate::gin::{parse_config, BindingKey, ConfigValue, Reference, Statement};
use crate::{expand_user, DdspError, Registry, Result};

const MAX_INCLUDE_DEPTH: usize = 32;
const MAX_MACRO_DEPTH: usize = 32;

/// Where a configuration layer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerOrigin {
    /// Built-in defaults.
    Defaults,
    /// Snapshot persisted by a previous run.
    OperativeSnapshot,
    /// Fixed override applied by the runner.
    Override,
    /// User-supplied files and parameters.
    User,
}

impl fmt::Display for LayerOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Defaults => "defaults",
            Self::OperativeSnapshot => "operative snapshot",
            Self::Override => "override",
            Self::User => "user",
        };
        f.write_str(name)
    }
}

/// One merged layer: a partial set of bindings and macros.
#[derive(Debug, Clone)]
pub struct ConfigLayer {
    /// Origin of the layer.
    pub origin: LayerOrigin,
    /// File name or description of the layer's text.
    pub source: String,
    /// Bindings in the order they were written, includes expanded.
    pub bindings: Vec<(BindingKey, ConfigValue)>,
    /// Macro definitions in the order they were written.
    pub macros: Vec<(String, ConfigValue)>,
}

/// Builds a [`ResolvedConfig`] from ordered layers.
pub struct ConfigBuilder<'r> {
    registry: &'r Registry,
    builtin_files: BTreeMap<String, &'static str>,
    search_paths: Vec<PathBuf>,
    layers: Vec<ConfigLayer>,
}

struct LoadedFile {
    display: String,
    contents: String,
    dir: Option<PathBuf>,
}

impl<'r> ConfigBuilder<'r> {
    /// Create a builder that validates bindings against `registry`.
    pub fn new(registry: &'r Registry) -> Self {
        Self {
            registry,
            builtin_files: BTreeMap::new(),
            search_paths: Vec::new(),
            layers: Vec::new(),
        }
    }

    /// Make an embedded file available under `name` (e.g. `optimization/base.gin`).
    pub fn with_builtin_file(mut self, name: &str, contents: &'static str) -> Self {
        self.builtin_files.insert(name.to_string(), contents);
        self
    }

    /// Add a directory searched for gin files after the built-in files.
    pub fn add_search_path(&mut self, path: impl Into<PathBuf>) {
        self.search_paths.push(path.into());
    }

    /// Layers pushed so far.
    pub fn layers(&self) -> &[ConfigLayer] {
        &self.layers
    }

    /// Parse a gin file and push it as a new layer.
    ///
    /// With `skip_unknown`, bindings for unregistered configurables or
    /// parameters are logged and dropped instead of failing.
    pub fn parse_file(
        &mut self,
        origin: LayerOrigin,
        file: &str,
        skip_unknown: bool,
    ) -> Result<()> {
        let loaded = self.load(file, None)?;
        tracing::debug!(file = %loaded.display, %origin, "Parsing gin file");

        let mut layer = ConfigLayer {
            origin,
            source: loaded.display.clone(),
            bindings: Vec::new(),
            macros: Vec::new(),
        };
        self.collect(&loaded, skip_unknown, 0, &mut layer)?;
        self.layers.push(layer);
        Ok(())
    }

    /// Parse a block of bindings and push it as a new layer.
    pub fn parse_bindings(
        &mut self,
        origin: LayerOrigin,
        source: &str,
        text: &str,
        skip_unknown: bool,
    ) -> Result<()> {
        let loaded = LoadedFile {
            display: source.to_string(),
            contents: text.to_string(),
            dir: None,
        };
        let mut layer = ConfigLayer {
            origin,
            source: source.to_string(),
            bindings: Vec::new(),
            macros: Vec::new(),
        };
        self.collect(&loaded, skip_unknown, 0, &mut layer)?;
        self.layers.push(layer);
        Ok(())
    }

    /// Merge all layers in order and substitute macros.
    pub fn build(self) -> Result<ResolvedConfig> {
        let mut bindings = BTreeMap::new();
        let mut macros = BTreeMap::new();

        for layer in self.layers {
            for (name, value) in layer.macros {
                macros.insert(name, value);
            }
            for (key, value) in layer.bindings {
                bindings.insert(key, value);
            }
        }

        for (key, value) in bindings.iter_mut() {
            *value = substitute_macros(value, &macros, 0)
                .map_err(|e| DdspError::Config(format!("{key}: {}", message(e))))?;
        }

        Ok(ResolvedConfig { bindings })
    }

    fn collect(
        &self,
        file: &LoadedFile,
        skip_unknown: bool,
        depth: usize,
        layer: &mut ConfigLayer,
    ) -> Result<()> {
        if depth > MAX_INCLUDE_DEPTH {
            return Err(DdspError::Config(format!(
                "{}: include depth exceeds {MAX_INCLUDE_DEPTH}",
                file.display
            )));
        }

        for parsed in parse_config(&file.contents, &file.display)? {
            match parsed.statement {
                Statement::Import(module) => {
                    tracing::trace!(%module, "Ignoring import");
                }
                Statement::Include(path) => {
                    let included = self.load(&path, file.dir.as_deref())?;
                    self.collect(&included, skip_unknown, depth + 1, layer)?;
                }
                Statement::Macro { name, value } => layer.macros.push((name, value)),
                Statement::Binding { key, value } => {
                    let configurable = self.registry.lookup(&key.selector);
                    match configurable {
                        Some(c) if c.accepts(&key.param) => {
                            let key = BindingKey {
                                selector: c.name().to_string(),
                                ..key
                            };
                            layer.bindings.push((key, value));
                        }
                        _ if skip_unknown => {
                            tracing::warn!(
                                binding = %key,
                                source = %file.display,
                                line = parsed.line,
                                "Skipping binding for unknown configurable or parameter"
                            );
                        }
                        Some(_) => {
                            return Err(DdspError::Config(format!(
                                "{}:{}: Configurable '{}' has no parameter '{}'",
                                file.display, parsed.line, key.selector, key.param
                            )))
                        }
                        None => {
                            return Err(DdspError::Config(format!(
                                "{}:{}: No configurable matching '{}'",
                                file.display, parsed.line, key.selector
                            )))
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Locate a gin file: as given, next to the including file, in the
    /// built-in files, then in each search path.
    fn load(&self, file: &str, including_dir: Option<&Path>) -> Result<LoadedFile> {
        let direct = expand_user(file);
        let mut candidates = vec![direct.clone()];
        if let Some(dir) = including_dir {
            if direct.is_relative() {
                candidates.push(dir.join(&direct));
            }
        }

        for candidate in &candidates {
            if candidate.is_file() {
                return read_file(candidate);
            }
        }

        if let Some(contents) = self.builtin_files.get(file) {
            return Ok(LoadedFile {
                display: format!("<builtin>/{file}"),
                contents: (*contents).to_string(),
                dir: None,
            });
        }

        for dir in &self.search_paths {
            let candidate = dir.join(file);
            if candidate.is_file() {
                return read_file(&candidate);
            }
        }

        Err(DdspError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Unable to find gin file '{file}' in the working directory or search paths"),
        )))
    }
}

fn read_file(path: &Path) -> Result<LoadedFile> {
    let contents = fs::read_to_string(path).map_err(|e| {
        DdspError::Io(std::io::Error::new(
            e.kind(),
            format!("Failed to read gin file {}: {}", path.display(), e),
        ))
    })?;
    Ok(LoadedFile {
        display: path.display().to_string(),
        contents,
        dir: path.parent().map(Path::to_path_buf),
    })
}

fn message(err: DdspError) -> String {
    match err {
        DdspError::Config(msg) => msg,
        other => other.to_string(),
    }
}

fn substitute_macros(
    value: &ConfigValue,
    macros: &BTreeMap<String, ConfigValue>,
    depth: usize,
) -> Result<ConfigValue> {
    if depth > MAX_MACRO_DEPTH {
        return Err(DdspError::Config("macro expansion is too deep".into()));
    }
    Ok(match value {
        ConfigValue::Macro(name) => {
            let bound = macros
                .get(name)
                .ok_or_else(|| DdspError::Config(format!("Unknown macro '%{name}'")))?;
            substitute_macros(bound, macros, depth + 1)?
        }
        ConfigValue::List(items) => ConfigValue::List(
            items
                .iter()
                .map(|item| substitute_macros(item, macros, depth))
                .collect::<Result<_>>()?,
        ),
        ConfigValue::Map(entries) => ConfigValue::Map(
            entries
                .iter()
                .map(|(k, v)| Ok((k.clone(), substitute_macros(v, macros, depth)?)))
                .collect::<Result<_>>()?,
        ),
        other => other.clone(),
    })
}

/// Immutable configuration produced by merging every layer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedConfig {
    bindings: BTreeMap<BindingKey, ConfigValue>,
}

impl ResolvedConfig {
    /// Look up `[scope/]Configurable.param`, falling back to the unscoped
    /// binding when a scoped one is absent.
    pub fn get(&self, key: &str) -> Option<&ConfigValue> {
        let key = BindingKey::parse(key).ok()?;
        self.bindings
            .get(&key)
            .or_else(|| self.bindings.get(&key.unscoped()))
    }

    /// String binding, `None` when unbound or bound to `None`.
    pub fn get_str(&self, key: &str) -> Result<Option<&str>> {
        match self.get(key) {
            None | Some(ConfigValue::None) => Ok(None),
            Some(ConfigValue::Str(s)) => Ok(Some(s)),
            Some(other) => Err(type_error(key, "string", other)),
        }
    }

    /// Integer binding.
    pub fn get_i64(&self, key: &str) -> Result<Option<i64>> {
        match self.get(key) {
            None | Some(ConfigValue::None) => Ok(None),
            Some(ConfigValue::Int(v)) => Ok(Some(*v)),
            Some(other) => Err(type_error(key, "int", other)),
        }
    }

    /// Non-negative integer binding.
    pub fn get_usize(&self, key: &str) -> Result<Option<usize>> {
        match self.get_i64(key)? {
            None => Ok(None),
            Some(v) => usize::try_from(v).map(Some).map_err(|_| {
                DdspError::Config(format!("{key}: expected a non-negative int, found {v}"))
            }),
        }
    }

    /// Float binding; integers are widened.
    pub fn get_f64(&self, key: &str) -> Result<Option<f64>> {
        match self.get(key) {
            None | Some(ConfigValue::None) => Ok(None),
            Some(ConfigValue::Float(v)) => Ok(Some(*v)),
            Some(ConfigValue::Int(v)) => Ok(Some(*v as f64)),
            Some(other) => Err(type_error(key, "float", other)),
        }
    }

    /// Boolean binding.
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        match self.get(key) {
            None | Some(ConfigValue::None) => Ok(None),
            Some(ConfigValue::Bool(v)) => Ok(Some(*v)),
            Some(other) => Err(type_error(key, "bool", other)),
        }
    }

    /// Reference binding.
    pub fn get_reference(&self, key: &str) -> Result<Option<&Reference>> {
        match self.get(key) {
            None | Some(ConfigValue::None) => Ok(None),
            Some(ConfigValue::Reference(r)) => Ok(Some(r)),
            Some(other) => Err(type_error(key, "reference", other)),
        }
    }

    /// Reference binding that must be present.
    pub fn require_reference(&self, key: &str) -> Result<&Reference> {
        self.get_reference(key)?
            .ok_or_else(|| DdspError::MissingRequired(key.to_string()))
    }

    /// Unscoped parameters bound on `configurable`.
    pub fn params_of<'a>(
        &'a self,
        configurable: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a ConfigValue)> + 'a {
        self.bindings
            .iter()
            .filter(move |(k, _)| k.scope.is_none() && k.selector == configurable)
            .map(|(k, v)| (k.param.as_str(), v))
    }

    /// All bindings in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&BindingKey, &ConfigValue)> {
        self.bindings.iter()
    }

    /// Number of bindings.
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    /// Whether no bindings are present.
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Render as a gin file that re-parses to the same bindings.
    pub fn to_gin_string(&self) -> String {
        let mut out = String::from("# Operative configuration.\n");
        let mut current: Option<&str> = None;
        for (key, value) in &self.bindings {
            if current != Some(key.selector.as_str()) {
                out.push('\n');
                out.push_str(&format!("# {}\n", key.selector));
                current = Some(&key.selector);
            }
            out.push_str(&format!("{key} = {value}\n"));
        }
        out
    }
}

fn type_error(key: &str, expected: &str, found: &ConfigValue) -> DdspError {
    DdspError::Config(format!(
        "{key}: expected {expected}, found {} ({found})",
        found.type_name()
    ))
}
