//! JSON-RPC (MCP) adapter
//!
//! A single endpoint accepts JSON-RPC 2.0 envelopes and dispatches
//! `listTools` / `callTool`. Authentication is a shared bearer secret
//! compared as a SHA-256 digest against the configured hash. The exposed
//! tool set is configured; `updateTicket` is additionally gated by the
//! `allow_ticket_updates` module flag and refuses with a 403-coded
//! JSON-RPC error when off, regardless of other settings.

use crate::auth::{sha256_hex, AppState};
use crate::error::ApiResult;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use opsdesk_common::config::McpConfig;
use opsdesk_common::text::humanize_hours;
use opsdesk_common::types::Pagination;
use opsdesk_common::Error;
use opsdesk_core::tickets::TicketUpdate;
use opsdesk_storage::repository::ListTicketsFilter;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

const JSONRPC_VERSION: &str = "2.0";

/// Standard JSON-RPC error codes
const ERR_INVALID_REQUEST: i64 = -32600;
const ERR_METHOD_NOT_FOUND: i64 = -32601;
const ERR_INVALID_PARAMS: i64 = -32602;

/// Tools this adapter knows how to serve
const KNOWN_TOOLS: &[(&str, &str)] = &[
    ("listTickets", "List tickets with optional status/priority/company filters"),
    ("getTicket", "Fetch one ticket by id"),
    ("updateTicket", "Apply a sparse patch to a ticket"),
    ("addReply", "Add a reply to a ticket"),
];

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    #[serde(default)]
    id: Value,
    method: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Deserialize)]
struct CallToolParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Default, Deserialize)]
struct ListTicketsArgs {
    status: Option<String>,
    priority: Option<String>,
    company_id: Option<Uuid>,
    search: Option<String>,
    #[serde(default)]
    limit: Option<i64>,
    #[serde(default)]
    offset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct GetTicketArgs {
    ticket_id: Uuid,
}

#[derive(Debug, Deserialize)]
struct UpdateTicketArgs {
    ticket_id: Uuid,
    subject: Option<String>,
    status: Option<String>,
    priority: Option<String>,
    assigned_user_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
struct AddReplyArgs {
    ticket_id: Uuid,
    body: String,
    #[serde(default)]
    is_internal: bool,
}

fn ok_response(id: Value, result: Value) -> Json<Value> {
    Json(json!({ "jsonrpc": JSONRPC_VERSION, "id": id, "result": result }))
}

fn err_response(id: Value, code: i64, message: &str) -> Json<Value> {
    Json(json!({
        "jsonrpc": JSONRPC_VERSION,
        "id": id,
        "error": { "code": code, "message": message },
    }))
}

/// The tool catalog filtered to the configured subset
fn tool_catalog(config: &McpConfig) -> Vec<Value> {
    KNOWN_TOOLS
        .iter()
        .filter(|(name, _)| config.tools.iter().any(|t| t == name))
        .map(|(name, description)| json!({ "name": name, "description": description }))
        .collect()
}

/// Gate decision for `callTool`: a rejection code+message, or `None` when
/// the call may proceed.
fn call_gate(name: &str, config: &McpConfig) -> Option<(i64, String)> {
    if !KNOWN_TOOLS.iter().any(|(known, _)| *known == name)
        || !config.tools.iter().any(|t| t == name)
    {
        return Some((ERR_METHOD_NOT_FOUND, format!("Tool '{}' is not available", name)));
    }
    if name == "updateTicket" && !config.allow_ticket_updates {
        return Some((403, "Ticket updates are disabled for this module".to_string()));
    }
    None
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// `/api/mcp/chatgpt/`: accepts envelopes on GET and POST alike; some
/// MCP clients probe with GET before switching to POST
pub async fn endpoint(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> ApiResult<Json<Value>> {
    let config = &state.config.mcp;

    if !config.enabled {
        return Err(Error::NotFound("MCP module is not enabled".to_string()).into());
    }

    let authorised = bearer_token(&headers)
        .map(|token| !config.secret_sha256.is_empty() && sha256_hex(token) == config.secret_sha256)
        .unwrap_or(false);
    if !authorised {
        warn!("MCP request with missing or invalid bearer secret");
        return Err(Error::Unauthorised("Invalid MCP credentials".to_string()).into());
    }

    let request: JsonRpcRequest = match serde_json::from_value(body) {
        Ok(req) => req,
        Err(e) => return Ok(err_response(Value::Null, ERR_INVALID_REQUEST, &e.to_string())),
    };
    if request.jsonrpc != JSONRPC_VERSION {
        return Ok(err_response(
            request.id,
            ERR_INVALID_REQUEST,
            "Unsupported JSON-RPC version",
        ));
    }

    debug!(method = %request.method, "MCP request");

    match request.method.as_str() {
        "listTools" => Ok(ok_response(
            request.id,
            json!({ "tools": tool_catalog(config) }),
        )),
        "callTool" => {
            let params: CallToolParams = match serde_json::from_value(request.params) {
                Ok(params) => params,
                Err(e) => {
                    return Ok(err_response(request.id, ERR_INVALID_PARAMS, &e.to_string()))
                }
            };

            if let Some((code, message)) = call_gate(&params.name, config) {
                return Ok(err_response(request.id, code, &message));
            }

            match call_tool(&state, &params.name, params.arguments).await {
                Ok(result) => Ok(ok_response(request.id, result)),
                Err(e) => Ok(err_response(
                    request.id,
                    e.status_code() as i64,
                    &e.to_string(),
                )),
            }
        }
        other => Ok(err_response(
            request.id,
            ERR_METHOD_NOT_FOUND,
            &format!("Unknown method '{}'", other),
        )),
    }
}

async fn call_tool(state: &AppState, name: &str, arguments: Value) -> Result<Value, Error> {
    fn args<T: serde::de::DeserializeOwned>(value: Value) -> Result<T, Error> {
        serde_json::from_value(value).map_err(|e| Error::InvalidInput(e.to_string()))
    }

    match name {
        "listTickets" => {
            let input: ListTicketsArgs = args(arguments)?;
            let filter = ListTicketsFilter {
                status: input.status,
                priority: input.priority,
                company_id: input.company_id,
                search: input.search,
                ..Default::default()
            };
            let page = Pagination {
                limit: input.limit.unwrap_or(50),
                offset: input.offset.unwrap_or(0),
            };

            let result = state.tickets.list(&filter, page).await?;
            Ok(json!({ "items": result.items, "total": result.total }))
        }
        "getTicket" => {
            let input: GetTicketArgs = args(arguments)?;
            let ticket = state.tickets.get(input.ticket_id).await?;
            // A coarse human-readable age reads better in chat output
            // than a pair of timestamps
            let age_hours = (chrono::Utc::now() - ticket.created_at).num_hours().max(0);
            Ok(json!({
                "ticket": ticket,
                "open_for": humanize_hours(age_hours),
            }))
        }
        "updateTicket" => {
            let input: UpdateTicketArgs = args(arguments)?;
            let ticket = state
                .tickets
                .update(
                    input.ticket_id,
                    TicketUpdate {
                        subject: input.subject,
                        status: input.status,
                        priority: input.priority,
                        assigned_user_id: input.assigned_user_id.map(Some),
                        ..Default::default()
                    },
                    None,
                )
                .await?;
            Ok(json!({ "ticket": ticket }))
        }
        "addReply" => {
            let input: AddReplyArgs = args(arguments)?;
            let reply = state
                .tickets
                .add_reply(input.ticket_id, None, &input.body, input.is_internal, None)
                .await?;
            Ok(json!({ "reply": reply }))
        }
        other => Err(Error::NotFound(format!("Tool '{}' not implemented", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn config(tools: &[&str], allow_updates: bool) -> McpConfig {
        McpConfig {
            enabled: true,
            secret_sha256: sha256_hex("secret"),
            tools: tools.iter().map(|t| t.to_string()).collect(),
            allow_ticket_updates: allow_updates,
        }
    }

    #[test]
    fn test_tool_catalog_respects_configured_subset() {
        let catalog = tool_catalog(&config(&["listTickets", "getTicket"], false));
        let names: Vec<&str> = catalog
            .iter()
            .map(|t| t["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["listTickets", "getTicket"]);
    }

    #[test]
    fn test_unknown_configured_tool_is_ignored() {
        let catalog = tool_catalog(&config(&["listTickets", "dropTables"], false));
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn test_call_gate_unknown_tool() {
        let gate = call_gate("dropTables", &config(&["listTickets"], false));
        assert_eq!(gate.unwrap().0, ERR_METHOD_NOT_FOUND);

        let gate = call_gate("getTicket", &config(&["listTickets"], false));
        assert_eq!(gate.unwrap().0, ERR_METHOD_NOT_FOUND);
    }

    #[test]
    fn test_update_ticket_gated_by_module_flag() {
        let cfg = config(&["listTickets", "updateTicket"], false);
        let (code, _) = call_gate("updateTicket", &cfg).unwrap();
        assert_eq!(code, 403);

        let cfg = config(&["listTickets", "updateTicket"], true);
        assert!(call_gate("updateTicket", &cfg).is_none());
    }

    #[test]
    fn test_error_response_shape() {
        let Json(body) = err_response(json!(7), 403, "no");
        assert_eq!(body["jsonrpc"], "2.0");
        assert_eq!(body["id"], 7);
        assert_eq!(body["error"]["code"], 403);
    }
}
