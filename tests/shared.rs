#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use procwatch::collector::{ProcessEntry, ProcessTable, RawProcess};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// One request received by [`StubServer`]
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub received_at: Instant,
    pub peer: SocketAddr,
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Minimal HTTP/1.1 server answering every request with the handler's `(status, body)`.
///
/// Connections are closed after each response, so each delivery attempt is a new connection.
pub struct StubServer {
    pub addr: SocketAddr,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    handle: JoinHandle<()>,
}

impl StubServer {
    pub async fn start<F, Fut>(handler: F) -> Self
    where
        F: Fn(usize, RecordedRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = (u16, String)> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = requests.clone();
        let handle = tokio::spawn(async move {
            while let Ok((mut stream, peer)) = listener.accept().await {
                let Some(request) = read_request(&mut stream, peer).await else {
                    continue;
                };
                let index = {
                    let mut recorded = recorded.lock().unwrap();
                    recorded.push(request.clone());
                    recorded.len() - 1
                };
                let (status, body) = handler(index, request).await;
                let response = format!(
                    "HTTP/1.1 {status} Stub\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });

        Self {
            addr,
            requests,
            handle,
        }
    }

    /// Server answering every request with the same status and body
    pub async fn fixed(status: u16, body: &str) -> Self {
        let body = body.to_string();
        Self::start(move |_, _| {
            let body = body.clone();
            async move { (status, body) }
        })
        .await
    }

    pub fn url(&self) -> String {
        format!("http://{}/api/processes/", self.addr)
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Drop for StubServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer
        .windows(4)
        .position(|window| window == b"\r\n\r\n")
        .map(|pos| pos + 4)
}

async fn read_request(stream: &mut TcpStream, peer: SocketAddr) -> Option<RecordedRequest> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];
    let header_end = loop {
        let read = stream.read(&mut chunk).await.ok()?;
        if read == 0 {
            return None;
        }
        buffer.extend_from_slice(&chunk[..read]);
        if let Some(end) = find_header_end(&buffer) {
            break end;
        }
    };

    let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next()?.split(' ');
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_ascii_lowercase(), value.trim().to_string()))
        .collect();
    let content_length = headers
        .iter()
        .find(|(key, _)| key == "content-length")
        .and_then(|(_, value)| value.parse::<usize>().ok())
        .unwrap_or(0);

    while buffer.len() < header_end + content_length {
        let read = stream.read(&mut chunk).await.ok()?;
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);
    }
    let body_end = buffer.len().min(header_end + content_length);

    Some(RecordedRequest {
        received_at: Instant::now(),
        peer,
        method,
        path,
        headers,
        body: buffer[header_end..body_end].to_vec(),
    })
}

/// Returns a local url nothing listens on
pub async fn closed_url() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}/api/processes/")
}

/// Process table replaying the same scan on every call
pub struct StaticTable(pub Vec<ProcessEntry>);

impl ProcessTable for StaticTable {
    fn scan(&mut self) -> anyhow::Result<Vec<ProcessEntry>> {
        Ok(self.0.clone())
    }
}

pub fn raw_process(pid: i64, parent_pid: Option<i64>, cpu_usage: f32, memory_mb: u64) -> RawProcess {
    RawProcess {
        pid,
        name: format!("proc-{pid}"),
        cpu_usage,
        memory_bytes: memory_mb * 1024 * 1024,
        parent_pid,
        status: "running".to_string(),
        command: vec![format!("/usr/bin/proc-{pid}")],
        start_time: Some(1_700_000_000),
    }
}
