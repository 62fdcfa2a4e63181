//! Test doubles: scripted in-memory bodies and a raw HTTP/1.1 server.
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use futures::StreamExt as _;
use futures::stream;
use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};
use tokio::net::{TcpListener, TcpStream};

use crate::errors::TransportError;
use crate::transport::ByteStream;

/// What a scripted body does after its chunks.
pub(crate) enum BodyTail {
    End,
    Hang,
    Fail(&'static str),
}

pub(crate) fn scripted_body(chunks: &[&str], tail: BodyTail) -> ByteStream {
    let raw: Vec<&[u8]> = chunks.iter().map(|chunk| chunk.as_bytes()).collect();
    scripted_bytes(&raw, tail)
}

/// Like `scripted_body`, for chunks that are not valid UTF-8.
pub(crate) fn scripted_bytes(chunks: &[&[u8]], tail: BodyTail) -> ByteStream {
    let items: Vec<Result<Bytes, TransportError>> = chunks
        .iter()
        .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
        .collect();
    let head = stream::iter(items);
    match tail {
        BodyTail::End => Box::pin(head),
        BodyTail::Hang => Box::pin(head.chain(stream::pending())),
        BodyTail::Fail(message) => Box::pin(head.chain(stream::once(async move {
            Err(TransportError::network(message))
        }))),
    }
}

/// Scripted response for one accepted connection.
#[derive(Clone, Debug)]
pub(crate) enum Reply {
    /// Chunked `text/event-stream` body. With `hold_open` the body is never
    /// terminated and the connection stays up until the client drops it.
    Sse { chunks: Vec<String>, hold_open: bool },
    Json(serde_json::Value),
    Status { status: u16, body: String },
    /// Reads the request and never answers.
    Silent,
}

impl Reply {
    pub fn sse(chunks: &[&str]) -> Self {
        Self::Sse {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            hold_open: false,
        }
    }

    pub fn sse_open(chunks: &[&str]) -> Self {
        Self::Sse {
            chunks: chunks.iter().map(|c| c.to_string()).collect(),
            hold_open: true,
        }
    }
}

#[derive(Clone, Debug)]
pub(crate) struct RecordedRequest {
    pub head: String,
    pub body: serde_json::Value,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim().eq_ignore_ascii_case(name).then(|| value.trim())
        })
    }
}

/// One scripted reply per connection, in order. Every response closes its
/// connection so the client never reuses one.
pub(crate) struct TestServer {
    pub endpoint: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    task: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub async fn start(replies: Vec<Reply>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let requests = Arc::new(Mutex::new(Vec::new()));
        let replies = Arc::new(Mutex::new(VecDeque::from(replies)));
        let recorded = requests.clone();
        let task = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                let reply = replies.lock().expect("replies").pop_front();
                let recorded = recorded.clone();
                tokio::spawn(serve(socket, reply, recorded));
            }
        });
        Self {
            endpoint: format!("http://{addr}/"),
            requests,
            task,
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("requests").clone()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    mut socket: TcpStream,
    reply: Option<Reply>,
    recorded: Arc<Mutex<Vec<RecordedRequest>>>,
) {
    let Some(request) = read_request(&mut socket).await else {
        return;
    };
    recorded.lock().expect("requests").push(request);

    match reply.unwrap_or(Reply::Status {
        status: 500,
        body: "no scripted reply".into(),
    }) {
        Reply::Json(value) => {
            write_full(&mut socket, 200, "application/json", &value.to_string()).await;
        }
        Reply::Status { status, body } => {
            write_full(&mut socket, status, "text/plain", &body).await;
        }
        Reply::Silent => {
            drain_until_closed(&mut socket).await;
            return;
        }
        Reply::Sse { chunks, hold_open } => {
            let head = "HTTP/1.1 200 OK\r\ncontent-type: text/event-stream\r\ncache-control: no-cache\r\ntransfer-encoding: chunked\r\nconnection: close\r\n\r\n";
            if socket.write_all(head.as_bytes()).await.is_err() {
                return;
            }
            for chunk in chunks.iter().filter(|c| !c.is_empty()) {
                let framed = format!("{:x}\r\n{chunk}\r\n", chunk.len());
                if socket.write_all(framed.as_bytes()).await.is_err() {
                    return;
                }
                let _ = socket.flush().await;
                tokio::task::yield_now().await;
            }
            if hold_open {
                drain_until_closed(&mut socket).await;
                return;
            }
            let _ = socket.write_all(b"0\r\n\r\n").await;
        }
    }
    let _ = socket.shutdown().await;
}

async fn drain_until_closed(socket: &mut TcpStream) {
    let mut sink = [0_u8; 256];
    while matches!(socket.read(&mut sink).await, Ok(n) if n > 0) {}
}

async fn write_full(socket: &mut TcpStream, status: u16, content_type: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {status} Scripted\r\ncontent-type: {content_type}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = socket.write_all(response.as_bytes()).await;
}

async fn read_request(socket: &mut TcpStream) -> Option<RecordedRequest> {
    let mut buf = Vec::new();
    let mut chunk = [0_u8; 4096];
    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
    };
    let head = String::from_utf8_lossy(&buf[..head_end]).into_owned();
    let content_length = head
        .lines()
        .find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case("content-length")
                .then(|| value.trim().parse::<usize>().ok())
                .flatten()
        })
        .unwrap_or(0);

    let mut body = buf[head_end + 4..].to_vec();
    while body.len() < content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        body.extend_from_slice(&chunk[..n]);
    }
    Some(RecordedRequest {
        head,
        body: serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null),
    })
}
