//! Record selection capability
//!
//! The engine never evaluates predicates itself. It asks an [`Evaluator`]
//! for the records matching a predicate, serialized in the same
//! field-per-line format the store uses, and relies on wrapping a
//! predicate in a negation to get the complementary subset.
//!
//! [`Recutils`] is the production implementation, shelling out to GNU
//! recutils (`recsel`, `recinf`, `rec2csv`).

use crate::config::EngineConfig;
use crate::error::Error;
use crate::exec::{CommandRunner, Invocation, OpContext};
use crate::outcome::Outcome;
use async_trait::async_trait;
use std::path::Path;
use std::str::FromStr;

/// Serialization requested from a selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputShape {
    /// Field-per-line records separated by blank lines
    #[default]
    Rec,
    /// Comma-separated rows with a header line
    Csv,
    /// Number of matching records
    Count,
    /// Records without blank-line separators
    Collapsed,
}

impl OutputShape {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputShape::Rec => "rec",
            OutputShape::Csv => "csv",
            OutputShape::Count => "count",
            OutputShape::Collapsed => "collapsed",
        }
    }
}

impl FromStr for OutputShape {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "rec" => Ok(OutputShape::Rec),
            "csv" => Ok(OutputShape::Csv),
            "count" => Ok(OutputShape::Count),
            "collapsed" => Ok(OutputShape::Collapsed),
            other => Err(Error::InvalidArgument(format!(
                "Unknown output format: {} (expected rec, csv, count or collapsed)",
                other
            ))),
        }
    }
}

/// What to select from a store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selection {
    /// Boolean selection expression (None = every record)
    pub predicate: Option<String>,
    /// Restrict to one record set
    pub record_type: Option<String>,
    pub shape: OutputShape,
}

impl Selection {
    /// Every record, in store format
    pub fn all() -> Self {
        Self::default()
    }

    /// Records matching `predicate`, in store format
    pub fn matching(predicate: impl Into<String>) -> Self {
        Self {
            predicate: Some(predicate.into()),
            ..Self::default()
        }
    }

    pub fn record_type(mut self, record_type: impl Into<String>) -> Self {
        self.record_type = Some(record_type.into());
        self
    }

    pub fn shape(mut self, shape: OutputShape) -> Self {
        self.shape = shape;
        self
    }
}

/// External predicate evaluation and introspection.
///
/// Implementations report failures through the returned [`Outcome`]
/// rather than panicking or erroring; callers inspect `success`.
#[async_trait]
pub trait Evaluator: Send + Sync {
    /// Return the records of `store` matching `selection`
    async fn select(&self, store: &Path, selection: &Selection, cx: &OpContext) -> Outcome;

    /// Describe the store (record sets and counts)
    async fn describe(&self, store: &Path, cx: &OpContext) -> Outcome;

    /// Predicate selecting exactly the records `predicate` does not
    fn negate(&self, predicate: &str) -> String {
        format!("!({})", predicate)
    }
}

/// GNU recutils as the evaluation capability
#[derive(Debug, Clone, Default)]
pub struct Recutils {
    config: EngineConfig,
    runner: CommandRunner,
}

impl Recutils {
    pub fn new(config: EngineConfig) -> Self {
        let runner = CommandRunner::new(config.command_timeout);
        Self { config, runner }
    }

    /// Build the `recsel` call for a selection
    pub fn recsel(&self, store: &Path, selection: &Selection) -> Invocation {
        let mut inv = Invocation::new(self.config.program("recsel"));
        if let Some(record_type) = selection.record_type.as_deref().filter(|t| !t.is_empty()) {
            inv = inv.arg("-t").arg(record_type);
        }
        if let Some(predicate) = selection.predicate.as_deref().filter(|p| !p.trim().is_empty()) {
            inv = inv.arg("-e").arg(predicate);
        }
        match selection.shape {
            OutputShape::Count => inv = inv.arg("-c"),
            OutputShape::Collapsed => inv = inv.arg("-C"),
            OutputShape::Rec | OutputShape::Csv => {}
        }
        inv.arg(store)
    }
}

#[async_trait]
impl Evaluator for Recutils {
    async fn select(&self, store: &Path, selection: &Selection, cx: &OpContext) -> Outcome {
        let selected = self.runner.invoke(&self.recsel(store, selection), cx).await;
        if selection.shape != OutputShape::Csv || !selected.success {
            return selected;
        }
        if selected.output.is_empty() {
            return selected;
        }

        // recsel trims its output; rec2csv wants the final newline back
        let csv = Invocation::new(self.config.program("rec2csv"))
            .stdin(format!("{}\n", selected.output));
        self.runner.invoke(&csv, cx).await
    }

    async fn describe(&self, store: &Path, cx: &OpContext) -> Outcome {
        let inv = Invocation::new(self.config.program("recinf")).arg(store);
        self.runner.invoke(&inv, cx).await
    }
}
