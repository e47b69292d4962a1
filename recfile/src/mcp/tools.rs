//! MCP tool handlers for Recfile
//!
//! Each handler validates its arguments, runs one store operation and
//! returns the operation's [`Outcome`](crate::Outcome) as JSON text.
//! Operation failures are tool results with `isError` set; only malformed
//! arguments become JSON-RPC errors.

use super::protocol::{JsonRpcError, ToolDefinition, ToolResult};
use crate::config::expand_home;
use crate::exec::OpContext;
use crate::store::{QueryRequest, RecordStore};
use serde_json::{json, Map, Value};
use std::path::PathBuf;

/// Get all tool definitions
pub fn get_tool_definitions() -> Vec<ToolDefinition> {
    let database_file = json!({
        "type": "string",
        "description": "Path to the recfile database (e.g. ~/data/people.rec)"
    });

    vec![
        ToolDefinition {
            name: "recutils_query".to_string(),
            description: "Query records in a recutils database. Without a query expression every record is returned.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "database_file": database_file,
                    "query_expression": {
                        "type": "string",
                        "description": "Selection expression, e.g. \"Age > 30 && City = 'Boston'\""
                    },
                    "output_format": {
                        "type": "string",
                        "enum": ["rec", "csv", "count", "collapsed"],
                        "description": "Output shape (default: rec)",
                        "default": "rec"
                    },
                    "record_type": {
                        "type": "string",
                        "description": "Record set to select from when the file holds several"
                    }
                },
                "required": ["database_file"]
            }),
        },
        ToolDefinition {
            name: "recutils_insert".to_string(),
            description: "Insert a new record into a recutils database. Creates the file with a %rec: declaration when it does not exist.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "database_file": database_file,
                    "record_type": {
                        "type": "string",
                        "description": "Record type name used when the database is created"
                    },
                    "fields": {
                        "type": "object",
                        "description": "Field name to value mapping, written in the given order",
                        "additionalProperties": true
                    }
                },
                "required": ["database_file", "record_type", "fields"]
            }),
        },
        ToolDefinition {
            name: "recutils_update".to_string(),
            description: "Update every record matching a query expression. Existing fields are rewritten, missing fields are added.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "database_file": database_file,
                    "query_expression": {
                        "type": "string",
                        "description": "Selection expression choosing the records to update"
                    },
                    "fields": {
                        "type": "object",
                        "description": "Field name to new value mapping",
                        "additionalProperties": true
                    }
                },
                "required": ["database_file", "query_expression", "fields"]
            }),
        },
        ToolDefinition {
            name: "recutils_delete".to_string(),
            description: "Delete every record matching a query expression.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "database_file": database_file,
                    "query_expression": {
                        "type": "string",
                        "description": "Selection expression choosing the records to delete"
                    }
                },
                "required": ["database_file", "query_expression"]
            }),
        },
        ToolDefinition {
            name: "recutils_info".to_string(),
            description: "Get recutils database info: record types and record counts.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "database_file": database_file
                },
                "required": ["database_file"]
            }),
        },
    ]
}

/// Handle tool call dispatch
pub async fn handle_tool_call(
    store: &RecordStore,
    tool_name: &str,
    arguments: &Value,
) -> Result<ToolResult, JsonRpcError> {
    let cx = OpContext::new();
    let outcome = match tool_name {
        "recutils_query" => {
            let path = database_file(arguments)?;
            let request = QueryRequest {
                predicate: optional_str(arguments, "query_expression"),
                output_format: optional_str(arguments, "output_format"),
                record_type: optional_str(arguments, "record_type"),
            };
            store.query(&path, &request, &cx).await
        }
        "recutils_insert" => {
            let path = database_file(arguments)?;
            let record_type = required_str(arguments, "record_type")?;
            let fields = field_map(arguments)?;
            store.insert(&path, record_type, fields, &cx).await
        }
        "recutils_update" => {
            let path = database_file(arguments)?;
            let predicate = required_str(arguments, "query_expression")?;
            let fields = field_map(arguments)?;
            store.update(&path, predicate, fields, &cx).await
        }
        "recutils_delete" => {
            let path = database_file(arguments)?;
            let predicate = required_str(arguments, "query_expression")?;
            store.delete(&path, predicate, &cx).await
        }
        "recutils_info" => {
            let path = database_file(arguments)?;
            store.info(&path, &cx).await
        }
        _ => {
            return Err(JsonRpcError::invalid_params(format!(
                "Unknown tool: {}",
                tool_name
            )))
        }
    };

    if !outcome.success {
        tracing::debug!("{} failed: {}", tool_name, outcome.error);
    }
    ToolResult::from_outcome(&outcome)
}

fn required_str<'a>(args: &'a Value, name: &str) -> Result<&'a str, JsonRpcError> {
    args.get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| JsonRpcError::invalid_params(format!("Missing {} parameter", name)))
}

fn optional_str(args: &Value, name: &str) -> Option<String> {
    args.get(name).and_then(|v| v.as_str()).map(String::from)
}

fn database_file(args: &Value) -> Result<PathBuf, JsonRpcError> {
    let raw = required_str(args, "database_file")?;
    if raw.trim().is_empty() {
        return Err(JsonRpcError::invalid_params("database_file must not be empty"));
    }
    Ok(expand_home(raw))
}

fn field_map(args: &Value) -> Result<&Map<String, Value>, JsonRpcError> {
    match args.get("fields") {
        Some(Value::Object(map)) => Ok(map),
        Some(_) => Err(JsonRpcError::invalid_params("fields must be an object")),
        None => Err(JsonRpcError::invalid_params("Missing fields parameter")),
    }
}
