//! execute_query: raw read-only SQL with optional bind parameters.

use historian_data::sql::{bind_named, validate_read_only};
use historian_data::{DataError, QueryResult};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{error_handler, ToolContext};
use crate::types::{ToolDefinition, ToolResult};

pub(super) fn tool_definitions() -> Vec<ToolDefinition> {
    vec![ToolDefinition::function(
        "execute_query",
        "Execute a read-only SQL query against the historian database and return every row wrapped in a response envelope. Use :name placeholders with an object of parameters, or $1, $2 ... with an array.",
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The full SQL query (SELECT or WITH)"
                },
                "parameters": {
                    "description": "Optional bind parameters: an object for :name placeholders or an array for $n placeholders",
                    "type": ["object", "array"]
                }
            },
            "required": ["query"]
        }),
    )]
}

pub(super) fn is_database_tool(name: &str) -> bool {
    name == "execute_query"
}

#[derive(Debug, Deserialize)]
struct ExecuteQueryArgs {
    query: String,
    #[serde(default)]
    parameters: Option<Value>,
}

pub(super) async fn execute(tool_name: &str, args: Value, ctx: &mut ToolContext<'_>) -> ToolResult {
    error_handler::respond(tool_name, execute_query(args, ctx).await)
}

async fn execute_query(args: Value, ctx: &ToolContext<'_>) -> anyhow::Result<QueryResult> {
    let args: ExecuteQueryArgs = serde_json::from_value(args)?;
    let checked = validate_read_only(&args.query).map_err(DataError::from)?;
    let (sql, params) = match args.parameters {
        None | Some(Value::Null) => (checked, Vec::new()),
        Some(Value::Object(named)) => bind_named(&checked, &named).map_err(DataError::from)?,
        Some(Value::Array(positional)) => (checked, positional),
        Some(_) => {
            return Err(DataError::validation("parameters must be an object or an array").into());
        }
    };
    let result = ctx.services.historian.execute_query(&sql, &params).await?;
    tracing::info!(rows = result.row_count, "execute_query returned");
    Ok(result)
}
