use std::io::{Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::Receiver;
use serde_json::Value;
use tungstenite::protocol::Message;
use tungstenite::WebSocket;

use super::handlers;
use super::types::StatusReply;
use crate::error::RequestError;
use crate::params::ParameterStore;

/// Per-client loop: answer inbound control messages, forward queued previews.
pub fn run_client<S: Read + Write>(
    mut ws: WebSocket<S>,
    store: &ParameterStore,
    outbound_rx: Receiver<String>,
    shutdown: Arc<AtomicBool>,
    client_id: usize,
) {
    log::info!("Preview client {client_id} connected");

    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        // 50ms read timeout
        match ws.read() {
            Ok(Message::Text(text)) => {
                let reply = handle_client_message(store, text.as_str());
                if ws.send(Message::text(reply.to_json())).is_err() {
                    break;
                }
            }
            Ok(Message::Close(_)) => {
                log::info!("Preview client {client_id} closed connection");
                break;
            }
            Ok(Message::Ping(data)) => {
                let _ = ws.send(Message::Pong(data));
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(ref e))
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => {
                log::debug!("Preview client {client_id} read error: {e}");
                break;
            }
        }

        let mut sent_any = false;
        for msg in outbound_rx.try_iter() {
            match ws.write(Message::text(msg)) {
                Ok(()) => sent_any = true,
                Err(e) => {
                    log::debug!("Preview client {client_id} write error: {e}");
                    return;
                }
            }
        }
        if sent_any && ws.flush().is_err() {
            break;
        }
    }

    let _ = ws.close(None);
    log::info!("Preview client {client_id} disconnected");
}

/// `{"type":"params", ...}` and `{"type":"action", ...}` carry the same
/// fields as the HTTP routes.
fn handle_client_message(store: &ParameterStore, text: &str) -> StatusReply {
    let request: Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(e) => return StatusReply::error(RequestError::InvalidBody(e.to_string()).to_string()),
    };
    match request.get("type").and_then(Value::as_str) {
        Some("params") => handlers::reply(handlers::update_params(store, &request)).1,
        Some("action") => handlers::reply(handlers::update_action(store, &request)).1,
        Some(other) => {
            log::debug!("Unknown WS message type: {other}");
            StatusReply::error(format!("unknown message type '{other}'"))
        }
        None => StatusReply::error(RequestError::MissingField("type").to_string()),
    }
}
