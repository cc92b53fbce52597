pub mod client;
pub mod handlers;
pub mod server;
pub mod types;

use std::net::{SocketAddr, TcpListener};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use self::server::ClientList;
use self::types::ExecutedMessage;
use crate::effect::Frame;
use crate::params::ParameterStore;
use crate::preview::{PreviewSink, PreviewTranscoder};
use crate::settings::ServerConfig;

/// The control server: HTTP routes that write the store, and WebSocket
/// clients that receive preview pushes.
pub struct PreviewChannel {
    store: Arc<ParameterStore>,
    clients: ClientList,
    shutdown: Option<Arc<AtomicBool>>,
    accept_handle: Option<JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
    transcoder: PreviewTranscoder,
    pub config: ServerConfig,
}

impl PreviewChannel {
    pub fn new(store: Arc<ParameterStore>, config: ServerConfig) -> Self {
        Self {
            store,
            clients: Arc::new(Mutex::new(Vec::new())),
            shutdown: None,
            accept_handle: None,
            local_addr: None,
            transcoder: PreviewTranscoder::new(config.preview_pixel_budget),
            config,
        }
    }

    /// Bind `host:port` and start accepting. Returns the bound address.
    pub fn start(&mut self) -> anyhow::Result<SocketAddr> {
        self.stop();
        let listener = TcpListener::bind(self.config.bind_addr())?;
        let addr = listener.local_addr()?;
        let shutdown = Arc::new(AtomicBool::new(false));
        let handle = server::spawn_accept_loop(listener, self.store.clone(), self.clients.clone(), shutdown.clone())?;
        log::info!("Control server listening on http://{addr}");

        self.shutdown = Some(shutdown);
        self.accept_handle = Some(handle);
        self.local_addr = Some(addr);
        Ok(addr)
    }

    pub fn stop(&mut self) {
        if let Some(ref shutdown) = self.shutdown {
            shutdown.store(true, Ordering::Relaxed);
        }
        if let Some(handle) = self.accept_handle.take() {
            let _ = handle.join();
        }
        self.shutdown = None;
        self.local_addr = None;
        if let Ok(mut clients) = self.clients.lock() {
            clients.clear();
        }
    }

    pub fn is_running(&self) -> bool {
        self.shutdown.as_ref().is_some_and(|s| !s.load(Ordering::Relaxed))
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn store(&self) -> &Arc<ParameterStore> {
        &self.store
    }

    pub fn client_count(&self) -> usize {
        self.clients.lock().map(|c| c.len()).unwrap_or(0)
    }

    /// Queue a message for every client. Prunes disconnected senders; a full
    /// queue drops the message for that client only.
    pub fn broadcast_json(&self, json: &str) {
        if let Ok(mut clients) = self.clients.lock() {
            clients.retain(|tx| match tx.try_send(json.to_string()) {
                Ok(_) => true,
                Err(crossbeam_channel::TrySendError::Full(_)) => true,
                Err(crossbeam_channel::TrySendError::Disconnected(_)) => false,
            });
        }
    }

    fn encode_all(&self, identity: &str, frames: &[Frame]) -> Option<Vec<Option<String>>> {
        let encoded: Vec<Option<String>> = frames
            .iter()
            .map(|frame| match self.transcoder.encode(frame) {
                Ok(b64) => Some(b64),
                Err(e) => {
                    log::warn!("[{identity}] preview transcoding failed: {e}");
                    None
                }
            })
            .collect();
        // A lone image that failed has nothing to show; a compare pair keeps
        // the surviving side.
        if encoded.iter().all(Option::is_none) {
            return None;
        }
        Some(encoded)
    }
}

impl PreviewSink for PreviewChannel {
    fn push(&self, identity: &str, frames: &[Frame]) {
        if frames.is_empty() {
            return;
        }
        let Some(ram_preview) = self.encode_all(identity, frames) else {
            return;
        };
        match serde_json::to_string(&ExecutedMessage::new(identity, ram_preview)) {
            Ok(json) => {
                log::debug!("[{identity}] preview pushed to {} client(s)", self.client_count());
                self.broadcast_json(&json);
            }
            Err(e) => log::warn!("[{identity}] failed to serialize preview: {e}"),
        }
    }
}

impl Drop for PreviewChannel {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::time::{Duration, Instant};

    use serde_json::Value;
    use tungstenite::Message;

    use crate::params::{ActionFlag, ParamValue};

    fn started() -> (PreviewChannel, SocketAddr) {
        let config = ServerConfig {
            port: 0,
            ..ServerConfig::default()
        };
        let mut channel = PreviewChannel::new(Arc::new(ParameterStore::new()), config);
        let addr = channel.start().unwrap();
        (channel, addr)
    }

    fn http(addr: SocketAddr, method: &str, path: &str, body: &str) -> (u16, Value) {
        let mut stream = TcpStream::connect(addr).unwrap();
        let request = format!(
            "{method} {path} HTTP/1.1\r\nHost: localhost\r\nContent-Type: application/json\r\nContent-Length: {}\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(request.as_bytes()).unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        let status = response.split_whitespace().nth(1).unwrap().parse().unwrap();
        let body = response.split("\r\n\r\n").nth(1).unwrap();
        (status, serde_json::from_str(body).unwrap())
    }

    fn wait_for(mut cond: impl FnMut() -> bool) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while !cond() {
            assert!(Instant::now() < deadline, "timed out");
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn params_route_updates_store() {
        let (channel, addr) = started();
        let (status, body) = http(
            addr,
            "POST",
            "/wtl/params",
            r#"{"node_id":"n1","node_type":"bri","brightness":50}"#,
        );
        assert_eq!(status, 200);
        assert_eq!(body["status"], "ok");
        assert_eq!(channel.store().get_params("n1", &[]), vec![ParamValue::Float(50.0)]);
    }

    #[test]
    fn invalid_action_is_400_and_store_untouched() {
        let (channel, addr) = started();
        let (status, body) = http(
            addr,
            "POST",
            "/wtl/action",
            r#"{"node_id":"n1","node_type":"bri","action":"maybe"}"#,
        );
        assert_eq!(status, 400);
        assert_eq!(body["status"], "error");
        assert!(body["reason"].as_str().unwrap().contains("maybe"));
        assert!(!channel.store().contains("n1"));
    }

    #[test]
    fn unknown_node_type_is_400_and_creates_nothing() {
        let (channel, addr) = started();
        let (status, _) = http(
            addr,
            "POST",
            "/wtl/params",
            r#"{"node_id":"n2","node_type":"zzz","brightness":50}"#,
        );
        assert_eq!(status, 400);
        assert!(!channel.store().contains("n2"));
    }

    #[test]
    fn idle_connection_does_not_delay_other_requests() {
        let (channel, addr) = started();
        let _idle = TcpStream::connect(addr).unwrap();
        let _half_sent = {
            let mut s = TcpStream::connect(addr).unwrap();
            s.write_all(b"POST /wtl/action HTTP/1.1\r\nContent-Length: 90\r\n\r\n{").unwrap();
            s
        };
        std::thread::sleep(Duration::from_millis(100));

        let started_at = Instant::now();
        let (status, _) = http(
            addr,
            "POST",
            "/wtl/action",
            r#"{"node_id":"n6","node_type":"bri","action":"apply"}"#,
        );
        assert_eq!(status, 200);
        assert!(started_at.elapsed() < Duration::from_secs(1), "took {:?}", started_at.elapsed());
        assert!(channel.store().check_and_clear_flag("n6", ActionFlag::Apply));
    }

    #[test]
    fn action_route_sets_flag_and_server_survives_bad_input() {
        let (channel, addr) = started();
        assert_eq!(http(addr, "POST", "/wtl/action", "garbage").0, 400);
        let (status, _) = http(
            addr,
            "POST",
            "/wtl/action",
            r#"{"node_id":"n3","node_type":"sat","action":"apply"}"#,
        );
        assert_eq!(status, 200);
        assert!(channel.store().check_and_clear_flag("n3", ActionFlag::Apply));
        assert_eq!(http(addr, "GET", "/health", "").1["status"], "ok");
        assert_eq!(http(addr, "GET", "/nowhere", "").0, 404);
    }

    #[test]
    fn websocket_client_receives_pushes_and_sends_actions() {
        let (channel, addr) = started();
        let (mut ws, _) = tungstenite::connect(format!("ws://{addr}/ws")).unwrap();
        wait_for(|| channel.client_count() == 1);

        channel.push("n4", &[Frame::filled(2, 2, 3, 0.5), Frame::filled(2, 2, 2, 0.5)]);
        let msg = match ws.read().unwrap() {
            Message::Text(text) => serde_json::from_str::<Value>(text.as_str()).unwrap(),
            other => panic!("expected text, got {other:?}"),
        };
        assert_eq!(msg["data"]["node"], "n4");
        let previews = msg["data"]["output"]["ram_preview"].as_array().unwrap();
        assert_eq!(previews.len(), 2);
        assert!(previews[0].is_string());
        assert!(previews[1].is_null());

        ws.send(Message::text(
            r#"{"type":"action","node_id":"n4","node_type":"bri","action":"skip"}"#,
        ))
        .unwrap();
        let reply = match ws.read().unwrap() {
            Message::Text(text) => serde_json::from_str::<Value>(text.as_str()).unwrap(),
            other => panic!("expected text, got {other:?}"),
        };
        assert_eq!(reply["status"], "ok");
        assert!(channel.store().check_and_clear_flag("n4", ActionFlag::Skip));
    }

    #[test]
    fn failed_single_preview_is_not_pushed() {
        let channel = PreviewChannel::new(Arc::new(ParameterStore::new()), ServerConfig::default());
        let (tx, rx) = crossbeam_channel::bounded(4);
        channel.clients.lock().unwrap().push(tx);
        channel.push("n5", &[Frame::filled(0, 0, 3, 0.0)]);
        assert!(rx.try_recv().is_err());
        channel.push("n5", &[Frame::filled(1, 1, 3, 0.0)]);
        assert!(rx.try_recv().is_ok());
    }

    #[test]
    fn stop_clears_running_state() {
        let (mut channel, addr) = started();
        assert!(channel.is_running());
        assert_eq!(channel.local_addr(), Some(addr));
        channel.stop();
        assert!(!channel.is_running());
        assert!(channel.local_addr().is_none());
    }
}
