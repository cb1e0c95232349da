//! Fakes shared by unit tests

use async_trait::async_trait;
use futures::stream;
use std::collections::VecDeque;
use std::sync::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use crate::auth::AuthBackend;
use crate::console::LineConsole;
use crate::decision::TurnInput;
use crate::harness::{EventStream, Harness, SessionKey, StreamEvent};
use crate::{Error, Result};

/// Canned HTTP response
pub struct MockResponse {
    pub status: u16,
    pub content_type: &'static str,
    pub body: String,
}

impl MockResponse {
    pub fn json(status: u16, body: &str) -> Self {
        Self {
            status,
            content_type: "application/json",
            body: body.to_string(),
        }
    }

    pub fn sse(body: &str) -> Self {
        Self {
            status: 200,
            content_type: "text/event-stream",
            body: body.to_string(),
        }
    }
}

/// Request as seen by the mock server
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub body: String,
}

/// Serve one canned response per connection, in order. The handle
/// resolves to the recorded requests once every response is sent.
pub async fn serve(responses: Vec<MockResponse>) -> (String, JoinHandle<Vec<RecordedRequest>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());

    let handle = tokio::spawn(async move {
        let mut recorded = Vec::new();
        for response in responses {
            let (mut socket, _) = listener.accept().await.unwrap();
            recorded.push(read_request(&mut socket).await);

            let head = format!(
                "HTTP/1.1 {} Mock\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                response.status,
                response.content_type,
                response.body.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(response.body.as_bytes()).await.unwrap();
            socket.shutdown().await.ok();
        }
        recorded
    });

    (url, handle)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> RecordedRequest {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let n = socket.read(&mut chunk).await.unwrap();
        assert!(n > 0, "connection closed before headers");
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..header_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|l| l.split_once(':'))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < header_end + content_length {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }

    let mut request_line = head.lines().next().unwrap_or_default().split_whitespace();
    RecordedRequest {
        method: request_line.next().unwrap_or_default().to_string(),
        path: request_line.next().unwrap_or_default().to_string(),
        body: String::from_utf8_lossy(&buf[header_end..]).to_string(),
    }
}

/// One scripted submission
pub enum ScriptedPass {
    /// The stream yields these items
    Events(Vec<Result<StreamEvent>>),
    /// Submitting fails outright
    Reject(String),
}

/// Harness that plays back scripted passes and records every input
#[derive(Default)]
pub struct ScriptedHarness {
    passes: Mutex<VecDeque<ScriptedPass>>,
    inputs: Mutex<Vec<(SessionKey, TurnInput)>>,
}

impl ScriptedHarness {
    pub fn new(passes: Vec<ScriptedPass>) -> Self {
        Self {
            passes: Mutex::new(passes.into()),
            inputs: Mutex::new(Vec::new()),
        }
    }

    /// Convenience for passes that only yield successful events
    pub fn with_events(passes: Vec<Vec<StreamEvent>>) -> Self {
        Self::new(
            passes
                .into_iter()
                .map(|events| ScriptedPass::Events(events.into_iter().map(Ok).collect()))
                .collect(),
        )
    }

    pub fn inputs(&self) -> Vec<TurnInput> {
        self.inputs
            .lock()
            .unwrap()
            .iter()
            .map(|(_, input)| input.clone())
            .collect()
    }

    pub fn sessions(&self) -> Vec<SessionKey> {
        self.inputs
            .lock()
            .unwrap()
            .iter()
            .map(|(session, _)| session.clone())
            .collect()
    }
}

#[async_trait]
impl Harness for ScriptedHarness {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn stream(&self, session: &SessionKey, input: TurnInput) -> Result<EventStream> {
        self.inputs.lock().unwrap().push((session.clone(), input));
        // An exhausted script behaves like a run that finishes quietly
        let pass = self
            .passes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(ScriptedPass::Events(Vec::new()));
        match pass {
            ScriptedPass::Events(events) => Ok(Box::pin(stream::iter(events))),
            ScriptedPass::Reject(reason) => Err(Error::Harness(reason)),
        }
    }
}

/// Authorization backend with scripted outcomes
#[derive(Default)]
pub struct ScriptedAuth {
    outcomes: Mutex<VecDeque<Result<()>>>,
    waited: Mutex<Vec<String>>,
}

impl ScriptedAuth {
    pub fn new(outcomes: Vec<Result<()>>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes.into()),
            waited: Mutex::new(Vec::new()),
        }
    }

    /// Authorization ids waited on, in order
    pub fn waited(&self) -> Vec<String> {
        self.waited.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuthBackend for ScriptedAuth {
    async fn wait_for_completion(&self, authorization_id: &str) -> Result<()> {
        self.waited.lock().unwrap().push(authorization_id.to_string());
        self.outcomes
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(Error::Auth("no scripted outcome".to_string())))
    }
}

/// Console reading from a fixed input and writing into a buffer
pub fn console(input: &'static str) -> LineConsole<&'static [u8], Vec<u8>> {
    console_bytes(input.as_bytes())
}

/// Console over raw input bytes, which need not be valid UTF-8
pub fn console_bytes(input: &'static [u8]) -> LineConsole<&'static [u8], Vec<u8>> {
    LineConsole::new(input, Vec::new())
}

/// Everything written to a test console so far
pub fn output(console: &LineConsole<&'static [u8], Vec<u8>>) -> String {
    String::from_utf8_lossy(console.writer()).to_string()
}
