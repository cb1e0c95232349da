//! Agent server harness
//!
//! Talks to a LangGraph-style agent server over HTTP. The session key is
//! used as the server-side thread id, so the server's checkpointer keeps
//! the conversation across turns. Each submission is a streamed run in
//! `updates` mode; an update keyed `__interrupt__` carries suspensions,
//! every other update carries node output.

use async_trait::async_trait;
use futures::stream::{self, Stream, StreamExt};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde_json::{json, Value};
use std::collections::{HashSet, VecDeque};
use std::pin::Pin;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{EventStream, Harness, RenderedMessage, SessionKey, StreamEvent};
use crate::config::{Config, ToolsConfig};
use crate::decision::TurnInput;
use crate::suspension::Suspension;
use crate::{Error, Result};

/// Update key under which the server reports interrupts
const INTERRUPT_KEY: &str = "__interrupt__";

/// Harness backed by an agent server
pub struct GraphHarness {
    /// Server base URL, without trailing slash
    base_url: String,
    /// Assistant (graph) to run
    assistant_id: String,
    /// HTTP client
    client: reqwest::Client,
    /// Identity for tool authorization attribution
    user_id: String,
    /// Model identifier
    model: String,
    /// Optional system prompt
    system_prompt: Option<String>,
    /// Tool catalog selection
    tools: ToolsConfig,
    /// Threads already created on the server
    threads: Mutex<HashSet<String>>,
}

impl GraphHarness {
    /// Create a new harness. Fails if user id or model are not configured.
    pub fn new(config: &Config) -> Result<Self> {
        let mut headers = HeaderMap::new();
        if let Some(key) = &config.agent.api_key {
            headers.insert(
                "x-api-key",
                HeaderValue::from_str(key)
                    .map_err(|e| Error::Config(format!("Invalid agent API key: {}", e)))?,
            );
        }

        let mut builder = reqwest::Client::builder().default_headers(headers);
        if let Some(timeout) = config.agent.connect_timeout {
            builder = builder.connect_timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| Error::Harness(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            base_url: config.agent.url.trim_end_matches('/').to_string(),
            assistant_id: config.agent.assistant_id.clone(),
            client,
            user_id: config.user_id()?.to_string(),
            model: config.model()?.to_string(),
            system_prompt: config.system_prompt.clone(),
            tools: config.tools.clone(),
            threads: Mutex::new(HashSet::new()),
        })
    }

    /// Request body for one streamed run
    fn run_body(&self, session: &SessionKey, input: &TurnInput) -> Value {
        let mut body = json!({
            "assistant_id": self.assistant_id,
            "stream_mode": ["updates"],
            "config": {
                "configurable": {
                    "thread_id": session.as_str(),
                    "user_id": self.user_id,
                    "model": self.model,
                    "system_prompt": self.system_prompt,
                    "toolkits": self.tools.toolkits,
                    "tools": self.tools.tools,
                    "tool_limit": self.tools.limit,
                }
            }
        });

        match input {
            TurnInput::Message { role, content } => {
                body["input"] = json!({ "messages": [{ "role": role, "content": content }] });
            }
            TurnInput::Resume(resume) => {
                body["command"] = json!({ "resume": resume });
            }
        }
        body
    }

    /// Create the server-side thread for a session, once per process
    async fn ensure_thread(&self, session: &SessionKey) -> Result<()> {
        let mut threads = self.threads.lock().await;
        if threads.contains(session.as_str()) {
            return Ok(());
        }

        let url = format!("{}/threads", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&json!({
                "thread_id": session.as_str(),
                "if_exists": "do_nothing",
                "metadata": { "user_id": self.user_id },
            }))
            .send()
            .await
            .map_err(|e| Error::Harness(format!("Thread request failed: {}", e)))?;
        check_status(response).await?;

        info!(session = %session, "Thread ready");
        threads.insert(session.as_str().to_string());
        Ok(())
    }
}

#[async_trait]
impl Harness for GraphHarness {
    fn name(&self) -> &str {
        "graph"
    }

    async fn stream(&self, session: &SessionKey, input: TurnInput) -> Result<EventStream> {
        self.ensure_thread(session).await?;

        debug!(session = %session, resume = input.is_resume(), "Submitting run");
        let url = format!("{}/threads/{}/runs/stream", self.base_url, session);
        let response = self
            .client
            .post(&url)
            .header(ACCEPT, "text/event-stream")
            .json(&self.run_body(session, &input))
            .send()
            .await
            .map_err(|e| Error::Harness(format!("Run request failed: {}", e)))?;
        let response = check_status(response).await?;

        Ok(decode_events(response.bytes_stream()))
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::Harness(format!("Agent server error {}: {}", status, body)))
}

/// Turn a raw SSE body into stream events. Bytes are only pulled from
/// `body` as the returned stream is polled.
pub(crate) fn decode_events<S, B, E>(body: S) -> EventStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let state = RunState {
        body: Box::pin(body),
        decoder: SseDecoder::default(),
        pending: VecDeque::new(),
        finished: false,
    };

    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.finished {
                return None;
            }
            match state.body.next().await {
                Some(Ok(chunk)) => {
                    for frame in state.decoder.push(chunk.as_ref()) {
                        state.absorb(frame);
                    }
                }
                Some(Err(e)) => {
                    state.finished = true;
                    state
                        .pending
                        .push_back(Err(Error::Harness(format!("Stream error: {}", e))));
                }
                None => {
                    if let Some(frame) = state.decoder.finish() {
                        state.absorb(frame);
                    }
                    state.finished = true;
                }
            }
        }
    }))
}

struct RunState<S> {
    body: Pin<Box<S>>,
    decoder: SseDecoder,
    pending: VecDeque<Result<StreamEvent>>,
    finished: bool,
}

impl<S> RunState<S> {
    fn absorb(&mut self, frame: SseFrame) {
        if self.finished {
            return;
        }
        match frame.event.as_str() {
            "end" => {
                debug!("Run stream ended");
                self.finished = true;
            }
            "error" => {
                self.finished = true;
                self.pending.push_back(Err(Error::Harness(format!(
                    "Agent run failed: {}",
                    frame.data
                ))));
            }
            event if event == "updates" || event.starts_with("updates|") => {
                match parse_update(&frame.data) {
                    Ok(Some(event)) => self.pending.push_back(Ok(event)),
                    Ok(None) => {}
                    Err(e) => {
                        self.finished = true;
                        self.pending.push_back(Err(e));
                    }
                }
            }
            other => debug!("Ignoring {} event", other),
        }
    }
}

/// One dispatched server-sent event
#[derive(Debug, Clone, PartialEq)]
struct SseFrame {
    event: String,
    data: String,
}

/// Incremental SSE line decoder
#[derive(Debug, Default)]
struct SseDecoder {
    buffer: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    /// Feed bytes; returns every frame completed by them
    fn push(&mut self, bytes: &[u8]) -> Vec<SseFrame> {
        self.buffer.extend_from_slice(bytes);

        let mut frames = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&raw);
            let line = line.trim_end_matches(|c: char| c == '\n' || c == '\r');
            if let Some(frame) = self.line(line) {
                frames.push(frame);
            }
        }
        frames
    }

    /// Flush whatever is left when the body ends
    fn finish(&mut self) -> Option<SseFrame> {
        if !self.buffer.is_empty() {
            let raw = std::mem::take(&mut self.buffer);
            let line = String::from_utf8_lossy(&raw).trim_end_matches('\r').to_string();
            if let Some(frame) = self.line(&line) {
                return Some(frame);
            }
        }
        self.dispatch()
    }

    fn line(&mut self, line: &str) -> Option<SseFrame> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<SseFrame> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        Some(SseFrame {
            event: event.unwrap_or_else(|| "message".to_string()),
            data: std::mem::take(&mut self.data).join("\n"),
        })
    }
}

/// Decode one `updates` payload
fn parse_update(data: &str) -> Result<Option<StreamEvent>> {
    let chunk: Value = serde_json::from_str(data)?;
    let Value::Object(map) = chunk else {
        return Err(Error::Protocol(format!("Update is not an object: {}", data)));
    };

    if let Some(interrupts) = map.get(INTERRUPT_KEY) {
        let suspensions: Vec<Suspension> = match interrupts {
            Value::Array(items) => items.iter().map(parse_interrupt).collect(),
            Value::Null => Vec::new(),
            other => vec![parse_interrupt(other)],
        };
        if suspensions.is_empty() {
            return Ok(None);
        }
        return Ok(Some(StreamEvent::Suspended(suspensions)));
    }

    let messages = map.values().flat_map(node_messages).collect();
    Ok(Some(StreamEvent::Output(messages)))
}

fn parse_interrupt(item: &Value) -> Suspension {
    match item.get("value") {
        Some(value) => {
            let suspension = Suspension::new(value.clone());
            match item.get("id").and_then(Value::as_str) {
                Some(id) => suspension.with_id(id),
                None => suspension,
            }
        }
        None => Suspension::new(item.clone()),
    }
}

fn node_messages(update: &Value) -> Vec<RenderedMessage> {
    update
        .get("messages")
        .and_then(Value::as_array)
        .map(|messages| messages.iter().map(render_message).collect())
        .unwrap_or_default()
}

fn render_message(message: &Value) -> RenderedMessage {
    // LangChain JS serializes messages as {"lc": 1, "id": [.., "AIMessage"], "kwargs": {..}}
    let (role, body) = match message.get("kwargs") {
        Some(kwargs) => {
            let class = message
                .get("id")
                .and_then(Value::as_array)
                .and_then(|id| id.last())
                .and_then(Value::as_str)
                .unwrap_or("Message");
            (class_role(class), kwargs)
        }
        None => {
            let role = message
                .get("type")
                .or_else(|| message.get("role"))
                .and_then(Value::as_str)
                .unwrap_or("message");
            (role.to_string(), message)
        }
    };

    let mut text = content_text(body.get("content"));
    let calls = body
        .get("tool_calls")
        .and_then(Value::as_array)
        .into_iter()
        .flatten();
    for call in calls {
        let name = call.get("name").and_then(Value::as_str).unwrap_or("tool");
        let args = call.get("args").cloned().unwrap_or(Value::Null);
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(&format!("{}({})", name, args));
    }

    let rendered = RenderedMessage::new(role, text);
    match body.get("name").and_then(Value::as_str).filter(|n| !n.is_empty()) {
        Some(name) => rendered.with_name(name),
        None => rendered,
    }
}

fn class_role(class: &str) -> String {
    let base = class.strip_suffix("Chunk").unwrap_or(class);
    let base = base.strip_suffix("Message").unwrap_or(base);
    if base.is_empty() {
        "message".to_string()
    } else {
        base.to_lowercase()
    }
}

fn content_text(content: Option<&Value>) -> String {
    match content {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|part| match part {
                Value::String(s) => Some(s.clone()),
                other => other.get("text").and_then(Value::as_str).map(str::to_string),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::{Decision, Resume};
    use crate::test_support::{serve, MockResponse};

    fn test_config(url: &str) -> Config {
        let mut config = Config::default();
        config.user_id = Some("me@example.com".to_string());
        config.model = Some("gpt-4o".to_string());
        config.agent.url = url.to_string();
        config
    }

    fn chunks(parts: &[&'static str]) -> Vec<std::result::Result<&'static [u8], String>> {
        parts.iter().map(|&p| Ok(p.as_bytes())).collect()
    }

    #[test]
    fn test_sse_decoder_across_chunks() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"event: upd").is_empty());
        assert!(decoder.push(b"ates\r\ndata: {\"a\":").is_empty());
        let frames = decoder.push(b" 1}\r\n\r\n: keep-alive\n\nevent: end\ndata: null\n\n");

        assert_eq!(
            frames,
            vec![
                SseFrame {
                    event: "updates".to_string(),
                    data: "{\"a\": 1}".to_string()
                },
                SseFrame {
                    event: "end".to_string(),
                    data: "null".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_sse_decoder_multiline_data_and_finish() {
        let mut decoder = SseDecoder::default();
        assert!(decoder.push(b"data: first\ndata: second").is_empty());
        let frame = decoder.finish().unwrap();
        assert_eq!(frame.event, "message");
        assert_eq!(frame.data, "first\nsecond");
    }

    #[test]
    fn test_parse_interrupt_update() {
        let data = r#"{"__interrupt__": [
            {"value": {"authorization_required": true, "tool_name": "Youtube_SearchForVideos",
                       "authorization_response": {"id": "ac_1", "url": "https://x"}}, "id": "i1"},
            {"value": {"hitl_required": true, "tool_name": "Gmail_SendEmail", "input": {}}}
        ]}"#;

        match parse_update(data).unwrap() {
            Some(StreamEvent::Suspended(s)) => {
                assert_eq!(s.len(), 2);
                assert_eq!(s[0].id.as_deref(), Some("i1"));
                assert_eq!(s[0].value["tool_name"], "Youtube_SearchForVideos");
                assert!(s[1].id.is_none());
                assert_eq!(s[1].value["hitl_required"], true);
            }
            other => panic!("expected suspension, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_message_update() {
        let data = r#"{"agent": {"messages": [
            {"type": "ai", "content": "", "tool_calls": [{"name": "Youtube_SearchForVideos", "args": {"keywords": "chess"}}]},
            {"type": "tool", "name": "Youtube_SearchForVideos", "content": [{"type": "text", "text": "3 results"}]}
        ]}}"#;

        match parse_update(data).unwrap() {
            Some(StreamEvent::Output(messages)) => {
                assert_eq!(messages.len(), 2);
                assert_eq!(messages[0].role, "ai");
                assert_eq!(messages[0].text, r#"Youtube_SearchForVideos({"keywords":"chess"})"#);
                assert_eq!(messages[1].name.as_deref(), Some("Youtube_SearchForVideos"));
                assert_eq!(messages[1].text, "3 results");
            }
            other => panic!("expected output, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_serialized_langchain_message() {
        let data = r#"{"model_request": {"messages": [
            {"lc": 1, "type": "constructor", "id": ["langchain_core", "messages", "AIMessageChunk"],
             "kwargs": {"content": "Here you go."}}
        ]}}"#;

        match parse_update(data).unwrap() {
            Some(StreamEvent::Output(messages)) => {
                assert_eq!(messages[0].role, "ai");
                assert_eq!(messages[0].text, "Here you go.");
            }
            other => panic!("expected output, got {:?}", other),
        }
    }

    #[test]
    fn test_update_without_messages_is_empty_output() {
        assert_eq!(
            parse_update(r#"{"tools": null}"#).unwrap(),
            Some(StreamEvent::Output(Vec::new()))
        );
        assert_eq!(parse_update(r#"{"__interrupt__": []}"#).unwrap(), None);
        assert!(matches!(parse_update("[1, 2]"), Err(Error::Protocol(_))));
    }

    #[tokio::test]
    async fn test_decode_events_in_order() {
        let body = stream::iter(chunks(&[
            "event: metadata\ndata: {\"run_id\": \"r1\"}\n\n",
            "event: updates\ndata: {\"agent\": {\"messages\": [{\"type\": \"ai\", \"content\": \"Searching\"}]}}\n\n",
            "event: updates\ndata: {\"__interrupt__\": [{\"value\": {\"hitl_required\": true, \"tool_name\": \"X\"}}]}\n\n",
            "event: end\ndata: null\n\nevent: updates\ndata: {\"late\": {}}\n\n",
        ]));

        let events: Vec<_> = decode_events(body).collect().await;
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], Ok(StreamEvent::Output(m)) if m[0].text == "Searching"));
        assert!(matches!(&events[1], Ok(StreamEvent::Suspended(s)) if s.len() == 1));
    }

    #[tokio::test]
    async fn test_decode_events_error_event() {
        let body = stream::iter(chunks(&[
            "event: error\ndata: {\"message\": \"model unavailable\"}\n\n",
            "event: updates\ndata: {\"agent\": {}}\n\n",
        ]));

        let events: Vec<_> = decode_events(body).collect().await;
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], Err(Error::Harness(msg)) if msg.contains("model unavailable")));
    }

    #[tokio::test]
    async fn test_decode_events_transport_error() {
        let body = stream::iter(vec![
            Ok::<&'static [u8], String>(b"event: updates\ndata: {\"a\": {}}\n\n"),
            Err("connection reset".to_string()),
        ]);

        let events: Vec<_> = decode_events(body).collect().await;
        assert_eq!(events.len(), 2);
        assert!(events[0].is_ok());
        assert!(matches!(&events[1], Err(Error::Harness(msg)) if msg.contains("connection reset")));
    }

    #[test]
    fn test_run_body_shapes() {
        let harness = GraphHarness::new(&test_config("http://localhost")).unwrap();
        let session = SessionKey::new("thread-1");

        let body = harness.run_body(&session, &TurnInput::user("find a video about chess"));
        assert_eq!(body["input"]["messages"][0]["role"], "user");
        assert_eq!(body["config"]["configurable"]["thread_id"], "thread-1");
        assert_eq!(body["config"]["configurable"]["toolkits"][0], "Youtube");
        assert!(body.get("command").is_none());

        let single = harness.run_body(
            &session,
            &TurnInput::Resume(Resume::Single(Decision::allow())),
        );
        assert_eq!(single["command"]["resume"], json!({"authorized": true}));
        assert!(single.get("input").is_none());

        let many = harness.run_body(
            &session,
            &TurnInput::Resume(Resume::Many(vec![Decision::deny(), Decision::deny()])),
        );
        assert_eq!(
            many["command"]["resume"],
            json!([{"authorized": false}, {"authorized": false}])
        );
    }

    #[test]
    fn test_new_requires_identity() {
        let mut config = test_config("http://localhost");
        config.user_id = None;
        assert!(matches!(GraphHarness::new(&config), Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_stream_against_server() {
        let sse = "event: updates\ndata: {\"agent\": {\"messages\": [{\"type\": \"ai\", \"content\": \"Done\"}]}}\n\nevent: end\ndata: null\n\n";
        let (url, server) = serve(vec![
            MockResponse::json(200, "{}"),
            MockResponse::sse(sse),
            MockResponse::sse("event: end\ndata: null\n\n"),
        ])
        .await;

        let harness = GraphHarness::new(&test_config(&url)).unwrap();
        let session = SessionKey::new("t-1");

        let events: Vec<_> = harness
            .stream(&session, TurnInput::user("hi"))
            .await
            .unwrap()
            .collect()
            .await;
        assert!(matches!(&events[..], [Ok(StreamEvent::Output(m))] if m[0].text == "Done"));

        // The thread is only created once
        let events: Vec<_> = harness
            .stream(&session, TurnInput::Resume(Resume::Single(Decision::allow())))
            .await
            .unwrap()
            .collect()
            .await;
        assert!(events.is_empty());

        let requests = server.await.unwrap();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].path, "/threads");
        assert_eq!(requests[1].path, "/threads/t-1/runs/stream");
        let resumed: Value = serde_json::from_str(&requests[2].body).unwrap();
        assert_eq!(resumed["command"]["resume"], json!({"authorized": true}));
    }

    #[tokio::test]
    async fn test_stream_server_error() {
        let (url, _server) = serve(vec![MockResponse::json(500, "{\"detail\": \"boom\"}")]).await;
        let harness = GraphHarness::new(&test_config(&url)).unwrap();

        let result = harness
            .stream(&SessionKey::new("t-2"), TurnInput::user("hi"))
            .await;
        assert!(matches!(result, Err(Error::Harness(msg)) if msg.contains("500")));
    }
}
