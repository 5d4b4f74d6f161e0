//! In-process HTTP/1.1 server for tests.
//!
//! Serves one scripted [`Reply`] per accepted connection, in order, and records
//! each request it read. Replies always carry `Connection: close` so the client
//! never reuses a connection across replies.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};

#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

pub struct Reply {
    writes: Vec<Vec<u8>>,
    delay: Duration,
    gate: Option<oneshot::Receiver<()>>,
}

impl Reply {
    /// Complete response with a `Content-Length` body.
    pub fn text(status: &str, body: &str) -> Self {
        Self::with_content_type(status, "text/plain; charset=utf-8", body)
    }

    pub fn json(body: &str) -> Self {
        Self::with_content_type("200 OK", "application/json", body)
    }

    fn with_content_type(status: &str, content_type: &str, body: &str) -> Self {
        let head = format!(
            "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            body.len()
        );
        Self {
            writes: vec![[head.as_bytes(), body.as_bytes()].concat()],
            delay: Duration::ZERO,
            gate: None,
        }
    }

    /// Chunked response; each element is written as its own chunk.
    pub fn chunked(status: &str, chunks: &[&[u8]]) -> Self {
        let mut reply = Self::chunked_unterminated(status, chunks);
        reply.writes.push(b"0\r\n\r\n".to_vec());
        reply
    }

    /// Chunked response whose connection closes before the final chunk.
    pub fn chunked_unterminated(status: &str, chunks: &[&[u8]]) -> Self {
        let head = format!(
            "HTTP/1.1 {status}\r\nContent-Type: text/plain; charset=utf-8\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n"
        );
        let mut writes = vec![head.into_bytes()];
        for data in chunks {
            let mut chunk = format!("{:x}\r\n", data.len()).into_bytes();
            chunk.extend_from_slice(data);
            chunk.extend_from_slice(b"\r\n");
            writes.push(chunk);
        }
        Self {
            writes,
            delay: Duration::ZERO,
            gate: None,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Hold the whole response back until `gate` fires (or its sender drops).
    pub fn gated(mut self, gate: oneshot::Receiver<()>) -> Self {
        self.gate = Some(gate);
        self
    }
}

pub struct MockServer {
    pub addr: SocketAddr,
    requests: mpsc::UnboundedReceiver<CapturedRequest>,
    hits: Arc<AtomicUsize>,
}

impl MockServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    pub async fn next_request(&mut self) -> CapturedRequest {
        tokio::time::timeout(Duration::from_secs(5), self.requests.recv())
            .await
            .expect("timed out waiting for request")
            .expect("server stopped")
    }
}

pub async fn spawn_server(replies: Vec<Reply>) -> MockServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, requests) = mpsc::unbounded_channel();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();

    tokio::spawn(async move {
        for reply in replies {
            let Ok((mut stream, _)) = listener.accept().await else {
                return;
            };

            let request = read_request(&mut stream).await;
            counter.fetch_add(1, Ordering::SeqCst);
            let _ = tx.send(request);

            if let Some(gate) = reply.gate {
                let _ = gate.await;
            }

            for (i, data) in reply.writes.iter().enumerate() {
                if i > 0 && !reply.delay.is_zero() {
                    tokio::time::sleep(reply.delay).await;
                }
                if stream.write_all(data).await.is_err() {
                    break;
                }
                let _ = stream.flush().await;
            }
            let _ = stream.shutdown().await;
        }
    });

    MockServer {
        addr,
        requests,
        hits,
    }
}

async fn read_request(stream: &mut TcpStream) -> CapturedRequest {
    let mut buf = Vec::new();
    let mut tmp = [0u8; 4096];

    let header_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let n = stream.read(&mut tmp).await.unwrap_or(0);
        if n == 0 {
            break buf.len();
        }
        buf.extend_from_slice(&tmp[..n]);
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).into_owned();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let path = request_line.next().unwrap_or_default().to_string();

    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(n, v)| (n.trim().to_lowercase(), v.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(n, _)| n == "content-length")
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);

    let body_start = (header_end + 4).min(buf.len());
    while buf.len() < body_start + content_length {
        let n = stream.read(&mut tmp).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&tmp[..n]);
    }
    let body_end = (body_start + content_length).min(buf.len());
    let body = String::from_utf8_lossy(&buf[body_start..body_end]).into_owned();

    CapturedRequest {
        method,
        path,
        headers,
        body,
    }
}
