//! Recfile text format
//!
//! A store is a plain-text file:
//!
//! ```text
//! %rec: Person
//!
//! Name: John Doe
//! Age: 25
//!
//! Name: Jane Smith
//! Age: 30
//! ```
//!
//! An optional type declaration, then records separated by one blank line,
//! one `name: value` line per field, and a trailing newline. Values that
//! span several lines continue on lines starting with `+ `.

use crate::error::{Error, Result};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// Prefix of the type declaration line
pub const TYPE_DECLARATION_MARKER: &str = "%rec:";

/// Prefix of a continuation line inside a multi-line value
const CONTINUATION: &str = "+";

/// Data field and record type names. `%` names are descriptors, never data.
fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-zA-Z][a-zA-Z0-9_]*$").expect("valid regex"))
}

/// A single `name: value` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub value: String,
}

impl Field {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Render as one or more lines (no trailing newline)
    pub fn render(&self) -> String {
        let mut lines = self.value.split('\n');
        let first = lines.next().unwrap_or_default();
        let mut out = format!("{}: {}", self.name, first);
        for line in lines {
            out.push('\n');
            out.push_str(CONTINUATION);
            out.push(' ');
            out.push_str(line);
        }
        out
    }
}

/// An ordered sequence of fields with no enforced schema
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Record {
    fields: Vec<Field>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.push(Field::new(name, value));
    }

    /// First value recorded for `name`
    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|f| f.name == name)
            .map(|f| f.value.as_str())
    }

    /// Replace every occurrence of `name` in place, or append it once.
    ///
    /// Returns true when at least one existing line was replaced.
    pub fn set(&mut self, name: &str, value: &str) -> bool {
        let mut replaced = false;
        for field in self.fields.iter_mut().filter(|f| f.name == name) {
            field.value = value.to_string();
            replaced = true;
        }
        if !replaced {
            self.push(name, value);
        }
        replaced
    }

    /// Render one line per field, in order, without a trailing newline
    pub fn render(&self) -> String {
        self.fields
            .iter()
            .map(Field::render)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Return the first type declaration line in `raw`, trimmed.
pub fn extract_type_declaration(raw: &str) -> Option<String> {
    raw.lines()
        .map(str::trim)
        .find(|line| line.starts_with(TYPE_DECLARATION_MARKER))
        .map(String::from)
}

/// Build the declaration line for a record type
pub fn type_declaration(record_type: &str) -> Result<String> {
    let record_type = record_type.trim();
    if !identifier_pattern().is_match(record_type) {
        return Err(Error::InvalidArgument(format!(
            "invalid record type '{}': expected a letter followed by letters, digits or '_'",
            record_type
        )));
    }
    Ok(format!("{} {}", TYPE_DECLARATION_MARKER, record_type))
}

/// Record type named by a declaration line (`%rec: Person` -> `Person`)
pub fn declared_type(declaration: &str) -> Option<&str> {
    declaration
        .trim()
        .strip_prefix(TYPE_DECLARATION_MARKER)
        .map(str::trim)
        .and_then(|rest| rest.split_whitespace().next())
}

/// Reject names that are not bare field identifiers
pub fn validate_field_name(name: &str) -> Result<()> {
    if identifier_pattern().is_match(name) {
        Ok(())
    } else {
        Err(Error::InvalidArgument(format!(
            "invalid field name '{}': expected a letter followed by letters, digits or '_'",
            name
        )))
    }
}

/// Stringify a JSON value for a field line
pub fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Turn a JSON object into a record, keeping the supplied field order
pub fn record_from_map(fields: &Map<String, Value>) -> Result<Record> {
    let mut record = Record::new();
    for (name, value) in fields {
        validate_field_name(name)?;
        record.push(name.as_str(), render_value(value));
    }
    Ok(record)
}

/// Render the field lines of a record given as a JSON object
pub fn format_record(fields: &Map<String, Value>) -> Result<String> {
    Ok(record_from_map(fields)?.render())
}

/// Split evaluation output into records on blank lines.
///
/// Comment (`#`) and descriptor (`%`) lines are skipped; `+` lines extend
/// the previous field's value.
pub fn parse_records(text: &str) -> Vec<Record> {
    let mut records = Vec::new();
    let mut current = Record::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                records.push(std::mem::take(&mut current));
            }
            continue;
        }
        if line.starts_with('#') || line.starts_with('%') {
            continue;
        }
        if let Some(rest) = line.strip_prefix(CONTINUATION) {
            let rest = rest.strip_prefix(' ').unwrap_or(rest);
            if let Some(last) = current.fields.last_mut() {
                last.value.push('\n');
                last.value.push_str(rest);
            }
            continue;
        }
        match line.split_once(':') {
            Some((name, value)) => {
                let value = value.strip_prefix(' ').unwrap_or(value);
                current.push(name.trim(), value);
            }
            None => tracing::debug!("Skipping malformed record line: {}", line),
        }
    }

    if !current.is_empty() {
        records.push(current);
    }
    records
}

/// Assemble a whole store file.
///
/// The declaration and every non-empty block are separated by exactly one
/// blank line and the file ends with a single newline. Nothing at all
/// yields an empty file.
pub fn compose_store(declaration: Option<&str>, blocks: &[String]) -> String {
    let parts: Vec<&str> = declaration
        .into_iter()
        .map(str::trim)
        .chain(blocks.iter().map(|b| b.trim_matches('\n')))
        .filter(|part| !part.trim().is_empty())
        .collect();

    if parts.is_empty() {
        return String::new();
    }
    let mut out = parts.join("\n\n");
    out.push('\n');
    out
}
