//! Shared fixtures: an in-process evaluator that understands a small
//! subset of the recsel expression language.

#![allow(dead_code)]

use async_trait::async_trait;
use recfile::format::{self, Record};
use recfile::{EngineConfig, Evaluator, FailureKind, OpContext, Outcome, OutputShape, RecordStore, Selection};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const TWO_PEOPLE: &str = "%rec: Person\n\nName: John Doe\nAge: 25\nCity: New York\n\nName: Jane Smith\nAge: 30\nCity: Los Angeles\n";

/// Injected misbehaviour for the complement (negated) selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Fault {
    #[default]
    None,
    /// Report a capability failure
    FailComplement,
    /// Put a directory where the rewrite's temp file goes, then answer normally
    BlockTempOnComplement,
}

#[derive(Default)]
pub struct FakeEvaluator {
    pub fault: Fault,
    pub calls: Mutex<Vec<Selection>>,
}

impl FakeEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fault(fault: Fault) -> Self {
        Self {
            fault,
            ..Self::default()
        }
    }

    pub fn predicates(&self) -> Vec<Option<String>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .map(|s| s.predicate.clone())
            .collect()
    }
}

#[async_trait]
impl Evaluator for FakeEvaluator {
    async fn select(&self, store: &Path, selection: &Selection, _cx: &OpContext) -> Outcome {
        self.calls.lock().unwrap().push(selection.clone());

        let negated = selection
            .predicate
            .as_deref()
            .is_some_and(|p| p.starts_with("!("));
        if negated {
            match self.fault {
                Fault::FailComplement => {
                    return Outcome::failure(FailureKind::Capability, "recsel: simulated failure")
                }
                Fault::BlockTempOnComplement => block_temp_file(store),
                Fault::None => {}
            }
        }

        let raw = match std::fs::read_to_string(store) {
            Ok(raw) => raw,
            Err(e) => return Outcome::failure(FailureKind::Capability, e.to_string()),
        };

        let mut matched = Vec::new();
        for record in format::parse_records(&raw) {
            let keep = match selection.predicate.as_deref() {
                Some(expr) => match eval_expr(expr, &record) {
                    Ok(keep) => keep,
                    Err(msg) => return Outcome::failure(FailureKind::Capability, msg),
                },
                None => true,
            };
            if keep {
                matched.push(record);
            }
        }

        let rendered: Vec<String> = matched.iter().map(Record::render).collect();
        match selection.shape {
            OutputShape::Rec => Outcome::ok(rendered.join("\n\n")),
            OutputShape::Collapsed => Outcome::ok(rendered.join("\n")),
            OutputShape::Count => Outcome::ok(matched.len().to_string()),
            OutputShape::Csv => Outcome::failure(FailureKind::Capability, "csv not supported"),
        }
    }

    async fn describe(&self, store: &Path, _cx: &OpContext) -> Outcome {
        match std::fs::read_to_string(store) {
            Ok(raw) => {
                let rtype = format::extract_type_declaration(&raw)
                    .and_then(|d| format::declared_type(&d).map(String::from))
                    .unwrap_or_default();
                Outcome::ok(format!("{} {}", format::parse_records(&raw).len(), rtype))
            }
            Err(e) => Outcome::failure(FailureKind::Capability, e.to_string()),
        }
    }
}

/// The backup `<store>.<token>.bak` already exists when the complement is
/// selected; occupy `<store>.<token>.tmp` with a directory so the rewrite
/// cannot create its temp file, whatever the user's privileges.
fn block_temp_file(store: &Path) {
    let name = store.file_name().unwrap().to_string_lossy().into_owned();
    let prefix = format!("{}.", name);
    for backup in siblings_with_suffix(store, ".bak") {
        let token = backup
            .strip_prefix(&prefix)
            .and_then(|rest| rest.strip_suffix(".bak"))
            .unwrap();
        let tmp = store.with_file_name(format!("{}{}.tmp", prefix, token));
        std::fs::create_dir(tmp).unwrap();
    }
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        lock_timeout: Duration::from_millis(200),
        ..EngineConfig::default()
    }
}

pub fn fake_store(evaluator: Arc<FakeEvaluator>) -> RecordStore {
    RecordStore::with_evaluator(evaluator, test_config())
}

/// Files next to `store` whose name ends with `suffix`
pub fn siblings_with_suffix(store: &Path, suffix: &str) -> Vec<String> {
    let dir = store.parent().unwrap();
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(suffix))
        .collect()
}

// --- expression evaluation -------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Literal(String),
    Op(String),
    Not,
    And,
    Or,
    Open,
    Close,
}

fn tokenize(expr: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = expr.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' => i += 1,
            '(' => {
                tokens.push(Token::Open);
                i += 1;
            }
            ')' => {
                tokens.push(Token::Close);
                i += 1;
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                tokens.push(Token::And);
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                tokens.push(Token::Or);
                i += 2;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push(Token::Op("!=".into()));
                i += 2;
            }
            '!' => {
                tokens.push(Token::Not);
                i += 1;
            }
            '<' | '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Op(format!("{}=", c)));
                    i += 2;
                } else {
                    tokens.push(Token::Op(c.to_string()));
                    i += 1;
                }
            }
            '=' => {
                tokens.push(Token::Op("=".into()));
                i += 1;
            }
            '\'' | '"' => {
                let end = chars[i + 1..]
                    .iter()
                    .position(|&q| q == c)
                    .ok_or_else(|| format!("recsel: unterminated string in '{}'", expr))?;
                tokens.push(Token::Literal(chars[i + 1..i + 1 + end].iter().collect()));
                i += end + 2;
            }
            c if c.is_alphanumeric() || c == '_' || c == '.' || c == '-' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || matches!(chars[i], '_' | '.' | '-'))
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                if word.chars().next().is_some_and(|c| c.is_ascii_digit() || c == '-') {
                    tokens.push(Token::Literal(word));
                } else {
                    tokens.push(Token::Ident(word));
                }
            }
            other => return Err(format!("recsel: syntax error near '{}'", other)),
        }
    }
    Ok(tokens)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    record: &'a Record,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn or(&mut self) -> Result<bool, String> {
        let mut value = self.and()?;
        while self.peek() == Some(&Token::Or) {
            self.pos += 1;
            let rhs = self.and()?;
            value = value || rhs;
        }
        Ok(value)
    }

    fn and(&mut self) -> Result<bool, String> {
        let mut value = self.unary()?;
        while self.peek() == Some(&Token::And) {
            self.pos += 1;
            let rhs = self.unary()?;
            value = value && rhs;
        }
        Ok(value)
    }

    fn unary(&mut self) -> Result<bool, String> {
        match self.next() {
            Some(Token::Not) => Ok(!self.unary()?),
            Some(Token::Open) => {
                let value = self.or()?;
                match self.next() {
                    Some(Token::Close) => Ok(value),
                    _ => Err("recsel: expected ')'".to_string()),
                }
            }
            Some(Token::Ident(name)) => {
                let op = match self.next() {
                    Some(Token::Op(op)) => op,
                    _ => return Err(format!("recsel: expected operator after {}", name)),
                };
                let literal = match self.next() {
                    Some(Token::Literal(v)) | Some(Token::Ident(v)) => v,
                    _ => return Err(format!("recsel: expected value after {}", op)),
                };
                Ok(compare(self.record.get(&name), &op, &literal))
            }
            other => Err(format!("recsel: unexpected token {:?}", other)),
        }
    }
}

fn compare(actual: Option<&str>, op: &str, expected: &str) -> bool {
    let Some(actual) = actual else {
        return false;
    };
    let ordering = match (actual.trim().parse::<f64>(), expected.parse::<f64>()) {
        (Ok(a), Ok(b)) => a.partial_cmp(&b),
        _ => Some(actual.cmp(expected)),
    };
    let Some(ordering) = ordering else {
        return false;
    };
    match op {
        "=" => ordering.is_eq(),
        "!=" => ordering.is_ne(),
        ">" => ordering.is_gt(),
        "<" => ordering.is_lt(),
        ">=" => ordering.is_ge(),
        "<=" => ordering.is_le(),
        _ => false,
    }
}

pub fn eval_expr(expr: &str, record: &Record) -> Result<bool, String> {
    let mut parser = Parser {
        tokens: tokenize(expr)?,
        pos: 0,
        record,
    };
    let value = parser.or()?;
    if parser.pos != parser.tokens.len() {
        return Err(format!("recsel: trailing input in '{}'", expr));
    }
    Ok(value)
}
