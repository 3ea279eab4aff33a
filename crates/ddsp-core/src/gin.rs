//! Parser for the gin binding language.
//!
//! Supports the subset used by DDSP configs:
//!
//! ```text
//! # comment
//! import ddsp.training
//! include 'datasets/nsynth_tfds.gin'
//! train.batch_size = 16
//! eval/evaluate.num_batches = 10
//! train.data_provider = @data.NSynthTfds()
//! SAMPLE_RATE = 16000
//! sample.sample_rate = %SAMPLE_RATE
//! ```
//!
//! Literals follow Python syntax: quoted strings with backslash escapes,
//! lists, tuples, and dicts are parsed here; bare scalars (`True`, `None`,
//! numbers) go through YAML.

use std::collections::BTreeMap;
use std::fmt;

use crate::{DdspError, Result};

/// A reference to a configurable, written `@Name` or `@Name()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Name as written, possibly with a module prefix (`data.NSynthTfds`).
    pub name: String,
    /// Whether the reference is called (`@Name()`) rather than passed as-is.
    pub evaluate: bool,
}

impl Reference {
    /// The configurable name without any module prefix.
    pub fn configurable_name(&self) -> &str {
        self.name.rsplit('.').next().unwrap_or(&self.name)
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.name)?;
        if self.evaluate {
            write!(f, "()")?;
        }
        Ok(())
    }
}

/// A bound configuration value.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    /// `None`.
    None,
    /// `True` / `False`.
    Bool(bool),
    /// Integer literal.
    Int(i64),
    /// Float literal.
    Float(f64),
    /// String literal.
    Str(String),
    /// List or tuple literal.
    List(Vec<ConfigValue>),
    /// Dict literal with string keys.
    Map(BTreeMap<String, ConfigValue>),
    /// Configurable reference.
    Reference(Reference),
    /// Macro reference (`%NAME`), substituted when the config is built.
    Macro(String),
}

impl ConfigValue {
    /// Short type name used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::None => "None",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::Str(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "dict",
            Self::Reference(_) => "reference",
            Self::Macro(_) => "macro",
        }
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::Bool(true) => write!(f, "True"),
            Self::Bool(false) => write!(f, "False"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v:?}"),
            Self::Str(s) => write_quoted(f, s),
            Self::List(items) => {
                write!(f, "[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, "]")
            }
            Self::Map(entries) => {
                write!(f, "{{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write_quoted(f, key)?;
                    write!(f, ": {value}")?;
                }
                write!(f, "}}")
            }
            Self::Reference(r) => write!(f, "{r}"),
            Self::Macro(name) => write!(f, "%{name}"),
        }
    }
}

/// Quote a string so that both Python and [`parse_value`] read it back
/// unchanged.
fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    let plain = !s.chars().any(|c| c == '\'' || c == '\\' || c.is_control());
    if plain {
        return write!(f, "'{s}'");
    }
    write!(f, "\"")?;
    for c in s.chars() {
        match c {
            '"' => write!(f, "\\\"")?,
            '\\' => write!(f, "\\\\")?,
            '\n' => write!(f, "\\n")?,
            '\t' => write!(f, "\\t")?,
            '\r' => write!(f, "\\r")?,
            c => write!(f, "{c}")?,
        }
    }
    write!(f, "\"")
}

/// Fully qualified binding target: `[scope/]selector.param`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BindingKey {
    /// Configurable selector (`train`, `NSynthTfds`, `ddsp.core.cumsum`).
    pub selector: String,
    /// Optional scope prefix.
    pub scope: Option<String>,
    /// Parameter name.
    pub param: String,
}

impl BindingKey {
    /// Create an unscoped key.
    pub fn new(selector: impl Into<String>, param: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            scope: None,
            param: param.into(),
        }
    }

    /// Parse `[scope/]selector.param`.
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        let (scope, rest) = match text.rfind('/') {
            Some(idx) => (Some(&text[..idx]), &text[idx + 1..]),
            None => (None, text),
        };
        let (selector, param) = rest.rsplit_once('.').ok_or_else(|| {
            DdspError::Config(format!("'{text}' is not of the form selector.param"))
        })?;

        let scope_ok = scope.map_or(true, |s| {
            !s.is_empty() && s.split('/').all(is_dotted_identifier)
        });
        if !scope_ok || !is_dotted_identifier(selector) || !is_identifier(param) {
            return Err(DdspError::Config(format!("Malformed binding key '{text}'")));
        }

        Ok(Self {
            selector: selector.to_string(),
            scope: scope.map(str::to_string),
            param: param.to_string(),
        })
    }

    /// Copy of this key without its scope.
    pub fn unscoped(&self) -> Self {
        Self::new(self.selector.clone(), self.param.clone())
    }
}

impl fmt::Display for BindingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(scope) = &self.scope {
            write!(f, "{scope}/")?;
        }
        write!(f, "{}.{}", self.selector, self.param)
    }
}

/// One parsed statement of a gin file.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `import module`; accepted and ignored.
    Import(String),
    /// `include 'file.gin'`.
    Include(String),
    /// `selector.param = value`.
    Binding {
        /// Target of the binding.
        key: BindingKey,
        /// Bound value.
        value: ConfigValue,
    },
    /// `NAME = value`.
    Macro {
        /// Macro name.
        name: String,
        /// Macro value.
        value: ConfigValue,
    },
}

/// A statement together with the line it started on.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedStatement {
    /// 1-based line number.
    pub line: usize,
    /// The statement.
    pub statement: Statement,
}

/// Parse the text of a gin file or a block of `--gin_param` bindings.
///
/// `origin` names the source in error messages.
pub fn parse_config(text: &str, origin: &str) -> Result<Vec<ParsedStatement>> {
    let mut statements = Vec::new();
    for (line, logical) in logical_lines(text, origin)? {
        let statement = parse_statement(&logical)
            .map_err(|e| DdspError::Config(format!("{origin}:{line}: {}", strip_prefix(e))))?;
        statements.push(ParsedStatement { line, statement });
    }
    Ok(statements)
}

fn strip_prefix(err: DdspError) -> String {
    match err {
        DdspError::Config(msg) => msg,
        other => other.to_string(),
    }
}

fn parse_statement(text: &str) -> Result<Statement> {
    if let Some(module) = text.strip_prefix("import ") {
        return Ok(Statement::Import(module.trim().to_string()));
    }
    if let Some(file) = text.strip_prefix("include ") {
        return match parse_value(file)? {
            ConfigValue::Str(path) => Ok(Statement::Include(path)),
            other => Err(DdspError::Config(format!(
                "include expects a quoted path, found {}",
                other.type_name()
            ))),
        };
    }

    let (lhs, rhs) = split_assignment(text)
        .ok_or_else(|| DdspError::Config(format!("Expected a binding, found '{text}'")))?;
    let lhs = lhs.trim();
    let value = parse_value(rhs)?;

    if lhs.contains('.') {
        let key = BindingKey::parse(lhs)?;
        Ok(Statement::Binding { key, value })
    } else if is_identifier(lhs) {
        Ok(Statement::Macro {
            name: lhs.to_string(),
            value,
        })
    } else {
        Err(DdspError::Config(format!("Malformed binding target '{lhs}'")))
    }
}

/// Parse a single value literal.
pub fn parse_value(text: &str) -> Result<ConfigValue> {
    let text = text.trim();
    if text.is_empty() {
        return Err(DdspError::Config("Missing value".into()));
    }

    if let Some(rest) = text.strip_prefix('@') {
        let (name, evaluate) = match rest.strip_suffix("()") {
            Some(name) => (name, true),
            None => (rest, false),
        };
        let valid = !name.is_empty()
            && name.split('/').all(is_dotted_identifier);
        if !valid {
            return Err(DdspError::Config(format!("Malformed reference '{text}'")));
        }
        return Ok(ConfigValue::Reference(Reference {
            name: name.to_string(),
            evaluate,
        }));
    }

    if let Some(name) = text.strip_prefix('%') {
        if !is_dotted_identifier(name) {
            return Err(DdspError::Config(format!("Malformed macro '{text}'")));
        }
        return Ok(ConfigValue::Macro(name.to_string()));
    }

    if text.starts_with('\'') || text.starts_with('"') {
        return parse_string(text).map(ConfigValue::Str);
    }
    if let Some(inner) = text.strip_prefix('(').and_then(|t| t.strip_suffix(')')) {
        return parse_items(inner).map(ConfigValue::List);
    }
    if let Some(inner) = text.strip_prefix('[').and_then(|t| t.strip_suffix(']')) {
        return parse_items(inner).map(ConfigValue::List);
    }
    if let Some(inner) = text.strip_prefix('{').and_then(|t| t.strip_suffix('}')) {
        return parse_dict(inner).map(ConfigValue::Map);
    }

    // Bare scalars: numbers, booleans, `None`.
    let yaml: serde_yaml::Value = serde_yaml::from_str(text)
        .map_err(|e| DdspError::Config(format!("Unable to parse value '{text}': {e}")))?;
    from_yaml(yaml)
}

/// Decode a quoted literal with Python escapes.
fn parse_string(text: &str) -> Result<String> {
    let malformed = || DdspError::Config(format!("Malformed string literal {text}"));
    let mut chars = text.chars();
    let quote = chars.next().ok_or_else(malformed)?;
    let mut out = String::new();
    loop {
        match chars.next().ok_or_else(malformed)? {
            '\\' => match chars.next().ok_or_else(malformed)? {
                'n' => out.push('\n'),
                't' => out.push('\t'),
                'r' => out.push('\r'),
                c @ ('\\' | '\'' | '"') => out.push(c),
                other => {
                    out.push('\\');
                    out.push(other);
                }
            },
            c if c == quote => break,
            c => out.push(c),
        }
    }
    if !chars.as_str().trim().is_empty() {
        return Err(malformed());
    }
    Ok(out)
}

/// Split on `sep` outside strings and brackets.
fn split_top_level(text: &str, sep: char) -> Vec<&str> {
    let mut state = QuoteState::default();
    let mut depth = 0i32;
    let mut parts = Vec::new();
    let mut start = 0;
    for (idx, c) in text.char_indices() {
        if !state.outside(c) {
            continue;
        }
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            c if c == sep && depth == 0 => {
                parts.push(&text[start..idx]);
                start = idx + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

/// Comma-separated items; a single trailing comma is allowed.
fn comma_items(text: &str) -> Result<Vec<&str>> {
    let mut items = split_top_level(text, ',');
    if items.last().is_some_and(|last| last.trim().is_empty()) {
        items.pop();
    }
    if items.iter().any(|item| item.trim().is_empty()) {
        return Err(DdspError::Config(format!("Empty element in '{text}'")));
    }
    Ok(items)
}

fn parse_items(text: &str) -> Result<Vec<ConfigValue>> {
    comma_items(text)?.into_iter().map(parse_value).collect()
}

fn parse_dict(text: &str) -> Result<BTreeMap<String, ConfigValue>> {
    let mut map = BTreeMap::new();
    for entry in comma_items(text)? {
        let parts = split_top_level(entry, ':');
        let [key, value] = parts.as_slice() else {
            return Err(DdspError::Config(format!(
                "Expected 'key: value', found '{}'",
                entry.trim()
            )));
        };
        let key = match parse_value(key)? {
            ConfigValue::Str(s) => s,
            ConfigValue::Int(i) => i.to_string(),
            ConfigValue::Bool(b) => b.to_string(),
            other => {
                return Err(DdspError::Config(format!(
                    "Unsupported dict key of type {}",
                    other.type_name()
                )))
            }
        };
        map.insert(key, parse_value(value)?);
    }
    Ok(map)
}

fn from_yaml(value: serde_yaml::Value) -> Result<ConfigValue> {
    use serde_yaml::Value;

    Ok(match value {
        Value::Null => ConfigValue::None,
        Value::Bool(b) => ConfigValue::Bool(b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => ConfigValue::Int(i),
            None => ConfigValue::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) if s == "None" => ConfigValue::None,
        Value::String(s) => ConfigValue::Str(s),
        Value::Sequence(items) => {
            ConfigValue::List(items.into_iter().map(from_yaml).collect::<Result<_>>()?)
        }
        Value::Mapping(entries) => {
            let mut map = BTreeMap::new();
            for (key, value) in entries {
                let key = match key {
                    Value::String(s) => s,
                    Value::Number(n) => n.to_string(),
                    Value::Bool(b) => b.to_string(),
                    other => {
                        return Err(DdspError::Config(format!(
                            "Unsupported dict key {other:?}"
                        )))
                    }
                };
                map.insert(key, from_yaml(value)?);
            }
            ConfigValue::Map(map)
        }
        Value::Tagged(tagged) => {
            return Err(DdspError::Config(format!(
                "Unsupported tagged value {}",
                tagged.tag
            )))
        }
    })
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_dotted_identifier(s: &str) -> bool {
    !s.is_empty() && s.split('.').all(is_identifier)
}

/// Tracks whether a scan position is inside a quoted string.
#[derive(Default)]
struct QuoteState {
    quote: Option<char>,
    escaped: bool,
}

impl QuoteState {
    /// Feed one character; returns true when it is outside any string.
    fn outside(&mut self, c: char) -> bool {
        match self.quote {
            Some(q) => {
                if self.escaped {
                    self.escaped = false;
                } else if c == '\\' {
                    self.escaped = true;
                } else if c == q {
                    self.quote = None;
                }
                false
            }
            None if c == '\'' || c == '"' => {
                self.quote = Some(c);
                false
            }
            None => true,
        }
    }
}

fn strip_comment(line: &str) -> &str {
    let mut state = QuoteState::default();
    for (idx, c) in line.char_indices() {
        if state.outside(c) && c == '#' {
            return &line[..idx];
        }
    }
    line
}

fn bracket_delta(line: &str) -> i32 {
    let mut state = QuoteState::default();
    line.chars()
        .filter(|&c| state.outside(c))
        .map(|c| match c {
            '(' | '[' | '{' => 1,
            ')' | ']' | '}' => -1,
            _ => 0,
        })
        .sum()
}

fn split_assignment(text: &str) -> Option<(&str, &str)> {
    let mut state = QuoteState::default();
    let mut depth = 0i32;
    for (idx, c) in text.char_indices() {
        if !state.outside(c) {
            continue;
        }
        match c {
            '(' | '[' | '{' => depth += 1,
            ')' | ']' | '}' => depth -= 1,
            '=' if depth == 0 => return Some((&text[..idx], &text[idx + 1..])),
            _ => {}
        }
    }
    None
}

/// Join physical lines into statements: brackets left open or a trailing
/// backslash continue onto the next line.
fn logical_lines(text: &str, origin: &str) -> Result<Vec<(usize, String)>> {
    let mut out = Vec::new();
    let mut pending = String::new();
    let mut start = 0;
    let mut depth = 0i32;

    for (idx, raw) in text.lines().enumerate() {
        let line = strip_comment(raw).trim_end();
        let (line, continued) = match line.strip_suffix('\\') {
            Some(l) => (l, true),
            None => (line, false),
        };
        if pending.is_empty() && line.trim().is_empty() && !continued {
            continue;
        }
        if pending.is_empty() {
            start = idx + 1;
        } else {
            pending.push(' ');
        }
        pending.push_str(line.trim());
        depth += bracket_delta(line);

        if depth < 0 {
            return Err(DdspError::Config(format!(
                "{origin}:{}: unbalanced closing bracket",
                idx + 1
            )));
        }
        if depth == 0 && !continued {
            out.push((start, std::mem::take(&mut pending)));
        }
    }

    if !pending.trim().is_empty() {
        return Err(DdspError::Config(format!(
            "{origin}:{start}: statement is not terminated"
        )));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_literals() {
        assert_eq!(parse_value("None").unwrap(), ConfigValue::None);
        assert_eq!(parse_value("True").unwrap(), ConfigValue::Bool(true));
        assert_eq!(parse_value("False").unwrap(), ConfigValue::Bool(false));
        assert_eq!(parse_value("16").unwrap(), ConfigValue::Int(16));
        assert_eq!(parse_value("-1").unwrap(), ConfigValue::Int(-1));
        assert_eq!(parse_value("0.0003").unwrap(), ConfigValue::Float(0.0003));
        assert_eq!(
            parse_value("'nsynth/gansynth_subset.f0_and_loudness:2.3.0'").unwrap(),
            ConfigValue::Str("nsynth/gansynth_subset.f0_and_loudness:2.3.0".into())
        );
        assert_eq!(
            parse_value("[1, 2, 3]").unwrap(),
            ConfigValue::List(vec![
                ConfigValue::Int(1),
                ConfigValue::Int(2),
                ConfigValue::Int(3)
            ])
        );
    }

    #[test]
    fn test_parse_references_and_macros() {
        assert_eq!(
            parse_value("@data.NSynthTfds()").unwrap(),
            ConfigValue::Reference(Reference {
                name: "data.NSynthTfds".into(),
                evaluate: true,
            })
        );
        match parse_value("@SoloInstrument").unwrap() {
            ConfigValue::Reference(r) => {
                assert!(!r.evaluate);
                assert_eq!(r.configurable_name(), "SoloInstrument");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(
            parse_value("%BATCH").unwrap(),
            ConfigValue::Macro("BATCH".into())
        );
        assert!(parse_value("@").is_err());
        assert!(parse_value("@Foo(1)").is_err());
    }

    #[test]
    fn test_binding_key_parse() {
        let key = BindingKey::parse("eval/ddsp.core.cumsum.use_tpu").unwrap();
        assert_eq!(key.scope.as_deref(), Some("eval"));
        assert_eq!(key.selector, "ddsp.core.cumsum");
        assert_eq!(key.param, "use_tpu");
        assert_eq!(key.to_string(), "eval/ddsp.core.cumsum.use_tpu");

        assert!(BindingKey::parse("nodot").is_err());
        assert!(BindingKey::parse("train.").is_err());
        assert!(BindingKey::parse("1train.batch").is_err());
    }

    #[test]
    fn test_parse_config_statements() {
        let text = r#"
# Dataset
import ddsp.training
include 'datasets/base.gin'

BATCH = 8
train.batch_size = %BATCH  # trailing comment
train.data_provider = @data.SoloInstrument()
SoloInstrument.file_pattern = 'data/train*.tfrecord#1'
"#;
        let statements = parse_config(text, "test.gin").unwrap();
        assert_eq!(statements.len(), 6);
        assert_eq!(statements[0].line, 3);
        assert_eq!(
            statements[0].statement,
            Statement::Import("ddsp.training".into())
        );
        assert_eq!(
            statements[1].statement,
            Statement::Include("datasets/base.gin".into())
        );
        assert_eq!(
            statements[2].statement,
            Statement::Macro {
                name: "BATCH".into(),
                value: ConfigValue::Int(8)
            }
        );
        match &statements[5].statement {
            Statement::Binding { key, value } => {
                assert_eq!(key.selector, "SoloInstrument");
                assert_eq!(
                    value,
                    &ConfigValue::Str("data/train*.tfrecord#1".into())
                );
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_multiline_values() {
        let text = "evaluate.features = [\n  'audio',\n  'f0_hz',\n]\ntrain.batch_size = \\\n  4\n";
        let statements = parse_config(text, "multi.gin").unwrap();
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0].line, 1);
        match &statements[0].statement {
            Statement::Binding { value, .. } => assert_eq!(
                value,
                &ConfigValue::List(vec![
                    ConfigValue::Str("audio".into()),
                    ConfigValue::Str("f0_hz".into())
                ])
            ),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(statements[1].line, 5);
    }

    #[test]
    fn test_parse_errors_carry_location() {
        let err = parse_config("train.batch_size 16\n", "bad.gin").unwrap_err();
        assert!(err.to_string().contains("bad.gin:1"), "{err}");

        let err = parse_config("train.shape = [1, 2\n", "open.gin").unwrap_err();
        assert!(err.to_string().contains("not terminated"), "{err}");
    }

    #[test]
    fn test_display_round_trips_through_parser() {
        let values = vec![
            ConfigValue::None,
            ConfigValue::Bool(true),
            ConfigValue::Int(-3),
            ConfigValue::Float(1.5),
            ConfigValue::Str("it's".into()),
            ConfigValue::Str("gs://tfds-data/datasets".into()),
            ConfigValue::List(vec![ConfigValue::Int(1), ConfigValue::Str("a".into())]),
            ConfigValue::Str("None".into()),
            ConfigValue::Str("True".into()),
            ConfigValue::Str("42".into()),
            ConfigValue::Str("say \"hi\"\n".into()),
            ConfigValue::Str("back\\slash".into()),
            ConfigValue::List(vec![ConfigValue::Str("None".into()), ConfigValue::None]),
            ConfigValue::Map(BTreeMap::from([
                ("it's".to_string(), ConfigValue::Str("a: b".into())),
                ("n".to_string(), ConfigValue::Int(2)),
            ])),
        ];
        for value in values {
            let rendered = value.to_string();
            assert_eq!(parse_value(&rendered).unwrap(), value, "{rendered}");
        }
    }

    #[test]
    fn test_python_string_literals() {
        assert_eq!(parse_value("'None'").unwrap(), ConfigValue::Str("None".into()));
        assert_eq!(parse_value("\"False\"").unwrap(), ConfigValue::Str("False".into()));
        assert_eq!(parse_value(r"'it\'s'").unwrap(), ConfigValue::Str("it's".into()));
        assert_eq!(
            parse_value(r#""a \"quoted\" word""#).unwrap(),
            ConfigValue::Str("a \"quoted\" word".into())
        );
        assert_eq!(
            parse_value(r"'C:\data\x'").unwrap(),
            ConfigValue::Str(r"C:\data\x".into())
        );
        assert!(parse_value("'unterminated").is_err());
        assert!(parse_value("'a' 'b'").is_err());
    }

    #[test]
    fn test_tuples_and_dicts() {
        let pair = ConfigValue::List(vec![ConfigValue::Int(1), ConfigValue::Int(2)]);
        assert_eq!(parse_value("(1, 2)").unwrap(), pair);
        assert_eq!(parse_value("[1, 2,]").unwrap(), pair);
        assert_eq!(
            parse_value("(1,)").unwrap(),
            ConfigValue::List(vec![ConfigValue::Int(1)])
        );
        assert_eq!(parse_value("()").unwrap(), ConfigValue::List(Vec::new()));
        assert_eq!(
            parse_value("[('a', None), [0.5]]").unwrap(),
            ConfigValue::List(vec![
                ConfigValue::List(vec![ConfigValue::Str("a".into()), ConfigValue::None]),
                ConfigValue::List(vec![ConfigValue::Float(0.5)]),
            ])
        );
        assert_eq!(
            parse_value("{'rate': 16000, 'name': 'x,y'}").unwrap(),
            ConfigValue::Map(BTreeMap::from([
                ("name".to_string(), ConfigValue::Str("x,y".into())),
                ("rate".to_string(), ConfigValue::Int(16000)),
            ]))
        );
        assert!(parse_value("[1, , 2]").is_err());
        assert!(parse_value("{'a' 1}").is_err());
    }
}
