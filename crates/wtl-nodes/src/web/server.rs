use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;

use super::client;
use super::handlers;
use super::types::StatusReply;
use crate::params::ParameterStore;

/// Largest request accepted on the control routes.
const MAX_BODY: usize = 64 * 1024;
/// Whole-request budget for headers plus body on a plain HTTP connection.
const REQUEST_DEADLINE: Duration = Duration::from_secs(5);
/// Per-read timeout while a request is being read.
const READ_TIMEOUT: Duration = Duration::from_secs(1);

pub type ClientList = Arc<Mutex<Vec<Sender<String>>>>;

/// Spawn the accept loop on an already-bound listener.
pub fn spawn_accept_loop(
    listener: TcpListener,
    store: Arc<ParameterStore>,
    clients: ClientList,
    shutdown: Arc<AtomicBool>,
) -> anyhow::Result<JoinHandle<()>> {
    listener.set_nonblocking(true)?;
    let client_counter = Arc::new(AtomicUsize::new(0));

    let handle = thread::Builder::new()
        .name("wtl-web-accept".into())
        .spawn(move || {
            while !shutdown.load(Ordering::Relaxed) {
                match listener.accept() {
                    Ok((stream, addr)) => {
                        log::debug!("Control connection from {addr}");
                        let _ = stream.set_nonblocking(false);
                        // Each connection reads on its own thread so an idle
                        // socket can't hold up the next request.
                        let (store, clients) = (store.clone(), clients.clone());
                        let (flag, counter) = (shutdown.clone(), client_counter.clone());
                        let spawned = thread::Builder::new()
                            .name("wtl-web-conn".into())
                            .spawn(move || handle_connection(stream, &store, &clients, &flag, &counter));
                        if let Err(e) = spawned {
                            log::error!("Failed to spawn connection thread: {e}");
                        }
                    }
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(Duration::from_millis(50));
                    }
                    Err(e) => {
                        if !shutdown.load(Ordering::Relaxed) {
                            log::error!("Control server accept error: {e}");
                        }
                        break;
                    }
                }
            }
            log::info!("Control server accept thread shutting down");
        })?;

    Ok(handle)
}

fn handle_connection(
    mut stream: TcpStream,
    store: &Arc<ParameterStore>,
    clients: &ClientList,
    shutdown: &Arc<AtomicBool>,
    client_counter: &Arc<AtomicUsize>,
) {
    let deadline = Instant::now() + REQUEST_DEADLINE;
    let _ = stream.set_read_timeout(Some(READ_TIMEOUT));

    let mut buf = [0u8; 4096];
    let n = loop {
        match stream.read(&mut buf) {
            Ok(n) if n > 0 => break n,
            Err(ref e) if is_timeout(e) && Instant::now() < deadline => {}
            _ => return,
        }
    };

    if is_websocket_upgrade(&String::from_utf8_lossy(&buf[..n])) {
        let _ = stream.set_read_timeout(Some(Duration::from_millis(50)));
        let replay = ReplayStream::new(buf[..n].to_vec(), stream);
        match tungstenite::accept(replay) {
            Ok(ws) => {
                let client_id = client_counter.fetch_add(1, Ordering::Relaxed);
                let (outbound_tx, outbound_rx) = crossbeam_channel::bounded(256);
                clients
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push(outbound_tx);

                let store = store.clone();
                let flag = shutdown.clone();
                let spawned = thread::Builder::new()
                    .name(format!("wtl-web-client-{client_id}"))
                    .spawn(move || client::run_client(ws, &store, outbound_rx, flag, client_id));
                if let Err(e) = spawned {
                    log::error!("Failed to spawn WebSocket client thread: {e}");
                }
            }
            Err(e) => log::debug!("WebSocket handshake failed: {e}"),
        }
    } else {
        match read_request(&mut stream, buf[..n].to_vec(), deadline) {
            Some(request) => serve_http(&mut stream, store, &request),
            None => write_response(
                &mut stream,
                "400 Bad Request",
                &StatusReply::error("malformed request").to_json(),
            ),
        }
    }
}

fn is_timeout(e: &std::io::Error) -> bool {
    matches!(e.kind(), std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut)
}

fn is_websocket_upgrade(request: &str) -> bool {
    let lower = request.to_lowercase();
    lower.contains("upgrade: websocket") || lower.contains("upgrade:websocket")
}

#[derive(Debug, PartialEq)]
struct HttpRequest {
    method: String,
    path: String,
    body: Vec<u8>,
}

/// Read until the header block is complete and `Content-Length` bytes of body
/// have arrived. Gives up once `deadline` passes, however slowly bytes trickle in.
fn read_request(stream: &mut impl Read, mut raw: Vec<u8>, deadline: Instant) -> Option<HttpRequest> {
    let mut chunk = [0u8; 4096];
    let mut read_more = |raw: &mut Vec<u8>| -> Option<()> {
        loop {
            if Instant::now() >= deadline {
                return None;
            }
            match stream.read(&mut chunk) {
                Ok(0) => return None,
                Ok(n) => {
                    raw.extend_from_slice(&chunk[..n]);
                    return Some(());
                }
                Err(ref e) if is_timeout(e) => {}
                Err(_) => return None,
            }
        }
    };
    let header_end = loop {
        if let Some(pos) = find_header_end(&raw) {
            break pos;
        }
        if raw.len() > MAX_BODY {
            return None;
        }
        read_more(&mut raw)?;
    };

    let head = String::from_utf8_lossy(&raw[..header_end]).into_owned();
    let mut lines = head.lines();
    let mut request_line = lines.next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();
    let content_length = lines
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);
    if content_length > MAX_BODY {
        return None;
    }

    let body_start = header_end + 4;
    while raw.len() < body_start + content_length {
        read_more(&mut raw)?;
    }
    let body = raw[body_start..body_start + content_length].to_vec();
    Some(HttpRequest { method, path, body })
}

fn find_header_end(raw: &[u8]) -> Option<usize> {
    raw.windows(4).position(|w| w == b"\r\n\r\n")
}

fn serve_http(stream: &mut TcpStream, store: &ParameterStore, request: &HttpRequest) {
    let path = request.path.split('?').next().unwrap_or("/");
    log::debug!("{} {path}", request.method);

    let (status, body) = match (request.method.as_str(), path) {
        ("GET", "/health") => (200, StatusReply::ok()),
        ("POST", _) => handlers::handle_post(store, path, &request.body)
            .unwrap_or_else(|| (404, StatusReply::error(format!("no route for {path}")))),
        _ => (404, StatusReply::error(format!("no route for {path}"))),
    };
    let status_line = match status {
        200 => "200 OK",
        400 => "400 Bad Request",
        _ => "404 Not Found",
    };
    write_response(stream, status_line, &body.to_json());
}

fn write_response(stream: &mut TcpStream, status: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {status}\r\n\
         Content-Type: application/json\r\n\
         Content-Length: {}\r\n\
         Cache-Control: no-cache\r\n\
         Connection: close\r\n\
         \r\n",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.write_all(body.as_bytes());
    let _ = stream.flush();
}

/// Replays the bytes consumed while sniffing for an upgrade, then reads on.
struct ReplayStream {
    buffer: Vec<u8>,
    pos: usize,
    stream: TcpStream,
}

impl ReplayStream {
    fn new(buffer: Vec<u8>, stream: TcpStream) -> Self {
        Self {
            buffer,
            pos: 0,
            stream,
        }
    }
}

impl Read for ReplayStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.pos < self.buffer.len() {
            let remaining = &self.buffer[self.pos..];
            let n = remaining.len().min(buf.len());
            buf[..n].copy_from_slice(&remaining[..n]);
            self.pos += n;
            Ok(n)
        } else {
            self.stream.read(buf)
        }
    }
}

impl Write for ReplayStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.stream.flush()
    }
}
