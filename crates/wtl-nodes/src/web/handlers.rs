//! Control-panel requests, shared by the HTTP routes and the WebSocket.
//!
//! Every request is fully validated before the store is touched, so a
//! rejected request never creates or changes an entry.

use serde_json::{Map, Value};

use super::types::StatusReply;
use crate::effect::NodeKind;
use crate::error::RequestError;
use crate::params::{ActionFlag, ParamValue, ParameterStore};

/// Slider update route.
pub const PARAMS_ROUTE: &str = "/wtl/params";
/// Apply / skip button route.
pub const ACTION_ROUTE: &str = "/wtl/action";

fn parse_body(body: &[u8]) -> Result<Value, RequestError> {
    serde_json::from_slice(body).map_err(|e| RequestError::InvalidBody(e.to_string()))
}

fn as_object(value: &Value) -> Result<&Map<String, Value>, RequestError> {
    value
        .as_object()
        .ok_or_else(|| RequestError::InvalidBody("expected a JSON object".into()))
}

/// Hosts send the node id as a string or a bare number.
fn node_id(obj: &Map<String, Value>) -> Result<String, RequestError> {
    match obj.get("node_id") {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(RequestError::MissingField("node_id")),
    }
}

fn node_kind(obj: &Map<String, Value>) -> Result<NodeKind, RequestError> {
    let code = obj
        .get("node_type")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or(RequestError::MissingField("node_type"))?;
    NodeKind::from_code(code).ok_or_else(|| RequestError::UnknownNodeType(code.to_string()))
}

/// Values for every registered param of `kind`, in registry order. Extra keys
/// are ignored; a missing or ill-typed param rejects the request.
pub fn collect_params(kind: NodeKind, obj: &Map<String, Value>) -> Result<Vec<ParamValue>, RequestError> {
    kind.params()
        .iter()
        .map(|def| {
            let raw = obj
                .get(def.name())
                .ok_or_else(|| RequestError::MissingParam(def.name().to_string()))?;
            def.coerce(raw).map_err(|reason| RequestError::InvalidParam {
                name: def.name().to_string(),
                reason,
            })
        })
        .collect()
}

/// `{"node_id", "node_type", <param>...}` → `set_params`.
pub fn update_params(store: &ParameterStore, request: &Value) -> Result<(), RequestError> {
    let obj = as_object(request)?;
    let id = node_id(obj)?;
    let kind = node_kind(obj)?;
    let values = collect_params(kind, obj)?;
    log::debug!("[{id}] {} params {:?}", kind.code(), values);
    store.set_params(&id, values);
    Ok(())
}

/// `{"node_id", "node_type", "action"}` → `set_flag`.
pub fn update_action(store: &ParameterStore, request: &Value) -> Result<ActionFlag, RequestError> {
    let obj = as_object(request)?;
    let id = node_id(obj)?;
    let kind = node_kind(obj)?;
    let raw = obj.get("action").and_then(Value::as_str).unwrap_or_default();
    let flag: ActionFlag = raw.parse().map_err(RequestError::InvalidAction)?;
    log::info!("[{id}] {} flag '{flag}' set", kind.code());
    store.set_flag(&id, flag);
    Ok(flag)
}

/// HTTP status and JSON body for a handler result.
pub fn reply<T>(result: Result<T, RequestError>) -> (u16, StatusReply) {
    match result {
        Ok(_) => (200, StatusReply::ok()),
        Err(e) => {
            log::debug!("Rejected control request: {e}");
            (400, StatusReply::error(e.to_string()))
        }
    }
}

/// Route a POST body to its handler. `None` for an unknown path.
pub fn handle_post(store: &ParameterStore, path: &str, body: &[u8]) -> Option<(u16, StatusReply)> {
    let handler: fn(&ParameterStore, &Value) -> Result<(), RequestError> = match path {
        PARAMS_ROUTE => update_params,
        ACTION_ROUTE => |store, request| update_action(store, request).map(|_| ()),
        _ => return None,
    };
    Some(reply(parse_body(body).and_then(|request| handler(store, &request))))
}
