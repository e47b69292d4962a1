//! # Recfile - record store engine over GNU recutils
//!
//! Reads and rewrites plain-text recfile databases, delegating predicate
//! evaluation to an external capability (`recsel` by default).
//!
//! Recfile provides:
//! - **Query** with selection expressions and rec/csv/count/collapsed output
//! - **Insert** that creates the store with its `%rec:` declaration on first use
//! - **Update / Delete** as verified, lock-protected, restorable rewrites
//! - **MCP server** for AI agent integration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use recfile::{EngineConfig, OpContext, QueryRequest, RecordStore};
//! use serde_json::json;
//! use std::path::Path;
//!
//! # async fn demo() {
//! let store = RecordStore::new(EngineConfig::default());
//! let path = Path::new("people.rec");
//! let cx = OpContext::new();
//!
//! let fields = json!({"Name": "John Doe", "Age": 25});
//! let inserted = store
//!     .insert(path, "Person", fields.as_object().unwrap(), &cx)
//!     .await;
//! assert!(inserted.success);
//!
//! let adults = store
//!     .query(path, &QueryRequest::new().predicate("Age > 18"), &cx)
//!     .await;
//! println!("{}", adults.output);
//! # }
//! ```

pub mod config;
pub mod error;
pub mod eval;
pub mod exec;
pub mod format;
pub mod mcp;
pub mod outcome;
pub mod store;

// Re-exports for convenience
pub use config::EngineConfig;
pub use error::{Error, FailureKind, Result};
pub use eval::{Evaluator, OutputShape, Recutils, Selection};
pub use exec::{CommandRunner, Invocation, OpContext};
pub use outcome::Outcome;
pub use store::{QueryRequest, RecordStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
