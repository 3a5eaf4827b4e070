//! Generation (chat) service clients.
//!
//! The [`ChatModel`] trait has a batch call, [`complete`](ChatModel::complete),
//! and a streaming call, [`stream`](ChatModel::stream), which returns a
//! [`TextStream`]: a lazy, finite sequence of text fragments in arrival
//! order. The stream decodes the HTTP body in the consumer's task; dropping
//! it drops the response and closes the connection.
//!
//! Implementations:
//! - **[`OllamaChat`]**: `POST /api/chat`, newline-delimited JSON when streaming.
//! - **[`OpenAIChat`]**: `POST /v1/responses`, server-sent events when streaming.
//!
//! Generation requests are never retried.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, Stream, StreamExt};
use serde::Serialize;

use crate::config::GenerationConfig;

const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
const DEFAULT_OPENAI_URL: &str = "https://api.openai.com";

/// Incremental answer text. Finite, not restartable, single consumer.
pub type TextStream = BoxStream<'static, Result<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// A chat completion service.
#[async_trait]
pub trait ChatModel: Send + Sync {
    /// Returns the model identifier (e.g. `"qwen3:8b"`).
    fn model_name(&self) -> &str;

    /// Generate the full answer in one call.
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String>;

    /// Start a streaming generation.
    ///
    /// Errors before the first chunk (connection, HTTP status) are returned
    /// here; errors after that surface as `Err` items of the stream.
    async fn stream(&self, messages: &[ChatMessage]) -> Result<TextStream>;
}

/// One decoded line of a streaming response body.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum StreamEvent {
    Delta(String),
    Done,
}

type LineParser = fn(&str) -> Result<Option<StreamEvent>>;

struct LineDecoder<S> {
    body: S,
    buf: Vec<u8>,
    parse: LineParser,
    eof: bool,
    finished: bool,
}

impl<S> LineDecoder<S> {
    /// Take the next complete line; at end of body, whatever remains.
    fn next_line(&mut self) -> Option<String> {
        let line = match self.buf.iter().position(|&b| b == b'\n') {
            Some(pos) => {
                let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
                line.pop();
                line
            }
            None if self.eof && !self.buf.is_empty() => std::mem::take(&mut self.buf),
            None => return None,
        };
        let line = String::from_utf8_lossy(&line);
        Some(line.trim_end_matches('\r').to_string())
    }
}

/// Turn a byte stream into a [`TextStream`], one `parse` call per line.
///
/// Bytes are buffered until a newline so multi-byte characters split
/// across network reads are decoded intact. Empty deltas are dropped.
pub(crate) fn decode_text_stream<S, B>(body: S, parse: LineParser) -> TextStream
where
    S: Stream<Item = reqwest::Result<B>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let decoder = LineDecoder {
        body: body.boxed(),
        buf: Vec::new(),
        parse,
        eof: false,
        finished: false,
    };

    stream::unfold(decoder, |mut st| async move {
        loop {
            if st.finished {
                return None;
            }
            if let Some(line) = st.next_line() {
                if line.trim().is_empty() {
                    continue;
                }
                match (st.parse)(&line) {
                    Ok(Some(StreamEvent::Delta(text))) if text.is_empty() => continue,
                    Ok(Some(StreamEvent::Delta(text))) => return Some((Ok(text), st)),
                    Ok(Some(StreamEvent::Done)) => {
                        st.finished = true;
                        return None;
                    }
                    Ok(None) => continue,
                    Err(e) => {
                        st.finished = true;
                        return Some((Err(e), st));
                    }
                }
            }
            if st.eof {
                st.finished = true;
                return None;
            }
            match st.body.next().await {
                Some(Ok(bytes)) => st.buf.extend_from_slice(bytes.as_ref()),
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(anyhow!("generation stream interrupted: {}", e)), st));
                }
                None => st.eof = true,
            }
        }
    })
    .boxed()
}

async fn error_for_status(response: reqwest::Response, service: &str) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body_text = response.text().await.unwrap_or_default();
    bail!("{} API error {}: {}", service, status, body_text)
}

/// Client whose timeouts bound connecting and each gap between reads.
///
/// A streamed answer may run far longer than `timeout_secs` in total, so
/// the whole-request deadline is set per batch request in `send` instead.
fn http_client(config: &GenerationConfig) -> Result<reqwest::Client> {
    let timeout = Duration::from_secs(config.timeout_secs);
    Ok(reqwest::Client::builder()
        .connect_timeout(timeout)
        .read_timeout(timeout)
        .build()?)
}

// ============ Ollama ============

/// Chat model served by Ollama.
pub struct OllamaChat {
    model: String,
    url: String,
    think: bool,
    timeout: Duration,
    client: reqwest::Client,
}

impl OllamaChat {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        Ok(Self {
            model: config.model.clone(),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| DEFAULT_OLLAMA_URL.to_string()),
            think: config.think,
            timeout: Duration::from_secs(config.timeout_secs),
            client: http_client(config)?,
        })
    }

    fn body(&self, messages: &[ChatMessage], stream: bool) -> serde_json::Value {
        serde_json::json!({
            "model": self.model,
            "messages": messages,
            "stream": stream,
            "think": self.think,
        })
    }

    async fn send(&self, messages: &[ChatMessage], stream: bool) -> Result<reqwest::Response> {
        let url = format!("{}/api/chat", self.url.trim_end_matches('/'));
        let mut request = self.client.post(&url).json(&self.body(messages, stream));
        if !stream {
            request = request.timeout(self.timeout);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("Ollama connection error (is Ollama running at {}?)", self.url))?;
        error_for_status(response, "Ollama").await
    }
}

#[async_trait]
impl ChatModel for OllamaChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let json: serde_json::Value = self.send(messages, false).await?.json().await?;
        if let Some(err) = json.get("error").and_then(|e| e.as_str()) {
            bail!("Ollama error: {}", err);
        }
        json.pointer("/message/content")
            .and_then(|c| c.as_str())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("Invalid Ollama response: missing message.content"))
    }

    async fn stream(&self, messages: &[ChatMessage]) -> Result<TextStream> {
        let response = self.send(messages, true).await?;
        Ok(decode_text_stream(response.bytes_stream(), parse_ollama_line))
    }
}

/// One NDJSON object of an Ollama chat stream.
pub(crate) fn parse_ollama_line(line: &str) -> Result<Option<StreamEvent>> {
    let json: serde_json::Value =
        serde_json::from_str(line).with_context(|| format!("Invalid Ollama stream line: {}", line))?;
    if let Some(err) = json.get("error").and_then(|e| e.as_str()) {
        bail!("Ollama error: {}", err);
    }
    if let Some(text) = json.pointer("/message/content").and_then(|c| c.as_str()) {
        if !text.is_empty() {
            return Ok(Some(StreamEvent::Delta(text.to_string())));
        }
    }
    if json.get("done").and_then(|d| d.as_bool()).unwrap_or(false) {
        return Ok(Some(StreamEvent::Done));
    }
    Ok(None)
}

// ============ OpenAI ============

/// Chat model behind the OpenAI Responses API.
///
/// Requires `OPENAI_API_KEY` in the environment.
pub struct OpenAIChat {
    model: String,
    url: String,
    api_key: String,
    timeout: Duration,
    client: reqwest::Client,
}

impl OpenAIChat {
    pub fn new(config: &GenerationConfig) -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY")
            .map_err(|_| anyhow!("OPENAI_API_KEY environment variable not set"))?;
        Ok(Self {
            model: config.model.clone(),
            url: config
                .url
                .clone()
                .unwrap_or_else(|| DEFAULT_OPENAI_URL.to_string()),
            api_key,
            timeout: Duration::from_secs(config.timeout_secs),
            client: http_client(config)?,
        })
    }

    fn body(&self, messages: &[ChatMessage], stream: bool) -> serde_json::Value {
        let input: Vec<serde_json::Value> = messages
            .iter()
            .map(|m| {
                serde_json::json!({
                    "role": m.role,
                    "content": [{ "type": "input_text", "text": m.content }],
                })
            })
            .collect();
        serde_json::json!({
            "model": self.model,
            "input": input,
            "stream": stream,
        })
    }

    async fn send(&self, messages: &[ChatMessage], stream: bool) -> Result<reqwest::Response> {
        let url = format!("{}/v1/responses", self.url.trim_end_matches('/'));
        let mut request = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.body(messages, stream));
        if !stream {
            request = request.timeout(self.timeout);
        }
        let response = request
            .send()
            .await
            .context("OpenAI connection error")?;
        error_for_status(response, "OpenAI").await
    }
}

#[async_trait]
impl ChatModel for OpenAIChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, messages: &[ChatMessage]) -> Result<String> {
        let json: serde_json::Value = self.send(messages, false).await?.json().await?;
        parse_openai_output(&json)
    }

    async fn stream(&self, messages: &[ChatMessage]) -> Result<TextStream> {
        let response = self.send(messages, true).await?;
        Ok(decode_text_stream(response.bytes_stream(), parse_openai_sse_line))
    }
}

/// Concatenate every `output_text` part of a Responses API result.
pub(crate) fn parse_openai_output(json: &serde_json::Value) -> Result<String> {
    if let Some(err) = json.get("error").filter(|e| !e.is_null()) {
        bail!("OpenAI error: {}", err);
    }
    let output = json
        .get("output")
        .and_then(|o| o.as_array())
        .ok_or_else(|| anyhow!("Invalid OpenAI response: missing output array"))?;

    let text: String = output
        .iter()
        .filter_map(|item| item.get("content").and_then(|c| c.as_array()))
        .flatten()
        .filter(|part| part.get("type").and_then(|t| t.as_str()) == Some("output_text"))
        .filter_map(|part| part.get("text").and_then(|t| t.as_str()))
        .collect();

    Ok(text)
}

/// One server-sent-event line of a Responses API stream.
pub(crate) fn parse_openai_sse_line(line: &str) -> Result<Option<StreamEvent>> {
    let data = match line.strip_prefix("data:") {
        Some(data) => data.trim(),
        None => return Ok(None),
    };
    if data == "[DONE]" {
        return Ok(Some(StreamEvent::Done));
    }
    let json: serde_json::Value =
        serde_json::from_str(data).with_context(|| format!("Invalid OpenAI event: {}", data))?;
    match json.get("type").and_then(|t| t.as_str()) {
        Some("response.output_text.delta") => Ok(Some(StreamEvent::Delta(
            json.get("delta")
                .and_then(|d| d.as_str())
                .unwrap_or_default()
                .to_string(),
        ))),
        Some("response.completed") => Ok(Some(StreamEvent::Done)),
        Some("response.failed") | Some("error") => bail!("OpenAI stream error: {}", json),
        _ => Ok(None),
    }
}

/// Create the configured [`ChatModel`].
pub fn create_chat_model(config: &GenerationConfig) -> Result<Arc<dyn ChatModel>> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaChat::new(config)?)),
        "openai" => Ok(Arc::new(OpenAIChat::new(config)?)),
        other => bail!("Unknown generation provider: {}", other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bytes_stream(parts: Vec<&'static [u8]>) -> impl Stream<Item = reqwest::Result<Vec<u8>>> + Send + Unpin {
        stream::iter(parts.into_iter().map(|p| Ok(p.to_vec())))
    }

    async fn collect(stream: TextStream) -> Vec<String> {
        stream.map(|r| r.unwrap()).collect().await
    }

    #[tokio::test]
    async fn decodes_ollama_ndjson_across_read_boundaries() {
        let body = bytes_stream(vec![
            &b"{\"message\":{\"content\":\"Hel\"},\"done\":false}\n{\"mess"[..],
            &b"age\":{\"content\":\"lo\"},\"done\":false}\n"[..],
            &b"{\"message\":{\"content\":\"\"},\"done\":true}\n"[..],
        ]);
        let chunks = collect(decode_text_stream(body, parse_ollama_line)).await;
        assert_eq!(chunks, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn keeps_multibyte_characters_split_across_reads() {
        // "ü" is 0xC3 0xBC; split it between two reads.
        let body = bytes_stream(vec![
            &b"{\"message\":{\"content\":\"Gr\xC3"[..],
            &b"\xBC\xC3\x9Fe\"},\"done\":false}\n"[..],
        ]);
        let chunks = collect(decode_text_stream(body, parse_ollama_line)).await;
        assert_eq!(chunks, vec!["Grüße"]);
    }

    #[tokio::test]
    async fn handles_last_line_without_newline() {
        let body = bytes_stream(vec![&b"{\"message\":{\"content\":\"tail\"},\"done\":false}"[..]]);
        let chunks = collect(decode_text_stream(body, parse_ollama_line)).await;
        assert_eq!(chunks, vec!["tail"]);
    }

    #[tokio::test]
    async fn decodes_openai_sse_and_stops_at_completion() {
        let body = bytes_stream(vec![
            &b"event: response.created\r\ndata: {\"type\":\"response.created\"}\r\n\r\n"[..],
            &b"event: response.output_text.delta\ndata: {\"type\":\"response.output_text.delta\",\"delta\":\"A \"}\n\n"[..],
            &b"data: {\"type\":\"response.output_text.delta\",\"delta\":\"B\"}\n\n"[..],
            &b"data: {\"type\":\"response.completed\"}\n\n"[..],
            &b"data: {\"type\":\"response.output_text.delta\",\"delta\":\"ignored\"}\n\n"[..],
        ]);
        let chunks = collect(decode_text_stream(body, parse_openai_sse_line)).await;
        assert_eq!(chunks, vec!["A ", "B"]);
    }

    #[tokio::test]
    async fn stream_error_ends_the_stream() {
        let body = bytes_stream(vec![
            &b"{\"message\":{\"content\":\"ok\"}}\n"[..],
            &b"{\"error\":\"model crashed\"}\n"[..],
            &b"{\"message\":{\"content\":\"never\"}}\n"[..],
        ]);
        let items: Vec<Result<String>> = decode_text_stream(body, parse_ollama_line).collect().await;
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].as_ref().unwrap(), "ok");
        assert!(items[1].as_ref().unwrap_err().to_string().contains("model crashed"));
    }

    /// Read one HTTP request (head plus `Content-Length` body).
    async fn read_request(socket: &mut tokio::net::TcpStream) {
        use tokio::io::AsyncReadExt;

        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = socket.read(&mut chunk).await.unwrap();
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
                let len = head
                    .lines()
                    .find_map(|l| l.strip_prefix("content-length:"))
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if buf.len() >= end + 4 + len {
                    return;
                }
            }
        }
    }

    /// Answer one request with `lines`, pausing `gap` before each.
    async fn serve_slowly(lines: Vec<String>, gap: Duration) -> String {
        use tokio::io::AsyncWriteExt;

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            read_request(&mut socket).await;
            socket
                .write_all(
                    b"HTTP/1.1 200 OK\r\nContent-Type: application/x-ndjson\r\nConnection: close\r\n\r\n",
                )
                .await
                .unwrap();
            for line in lines {
                tokio::time::sleep(gap).await;
                socket.write_all(line.as_bytes()).await.unwrap();
                socket.flush().await.unwrap();
            }
            let _ = socket.shutdown().await;
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn stream_outlives_timeout_while_chunks_keep_arriving() {
        let mut lines: Vec<String> = (0..5)
            .map(|i| format!("{{\"message\":{{\"content\":\"w{} \"}},\"done\":false}}\n", i))
            .collect();
        lines.push("{\"message\":{\"content\":\"\"},\"done\":true}\n".to_string());
        // Six lines 300 ms apart: well past the one-second timeout in total,
        // but never idle for that long.
        let url = serve_slowly(lines, Duration::from_millis(300)).await;

        let config = GenerationConfig {
            url: Some(url),
            timeout_secs: 1,
            ..Default::default()
        };
        let chat = OllamaChat::new(&config).unwrap();
        let stream = chat.stream(&[ChatMessage::user("hi")]).await.unwrap();
        let items: Vec<Result<String>> = stream.collect().await;

        let chunks: Vec<String> = items.into_iter().map(|r| r.unwrap()).collect();
        assert_eq!(chunks, vec!["w0 ", "w1 ", "w2 ", "w3 ", "w4 "]);
    }

    #[test]
    fn parses_openai_batch_output() {
        let json = serde_json::json!({
            "output": [
                { "type": "reasoning", "content": [] },
                { "type": "message", "content": [
                    { "type": "output_text", "text": "First. " },
                    { "type": "output_text", "text": "Second." }
                ]}
            ]
        });
        assert_eq!(parse_openai_output(&json).unwrap(), "First. Second.");
    }

    #[test]
    fn openai_request_uses_input_text_parts() {
        let chat = OpenAIChat {
            model: "gpt-4.1".to_string(),
            url: DEFAULT_OPENAI_URL.to_string(),
            api_key: "test".to_string(),
            timeout: Duration::from_secs(1),
            client: reqwest::Client::new(),
        };
        let body = chat.body(&[ChatMessage::system("S"), ChatMessage::user("U")], true);
        assert_eq!(body["input"][0]["role"], "system");
        assert_eq!(body["input"][1]["content"][0]["type"], "input_text");
        assert_eq!(body["input"][1]["content"][0]["text"], "U");
        assert_eq!(body["stream"], true);
    }

    #[test]
    fn ollama_request_carries_think_flag() {
        let config = GenerationConfig {
            think: true,
            ..Default::default()
        };
        let chat = OllamaChat::new(&config).unwrap();
        let body = chat.body(&[ChatMessage::user("hi")], false);
        assert_eq!(body["think"], true);
        assert_eq!(body["stream"], false);
        assert_eq!(body["messages"][0]["role"], "user");
        assert_eq!(body["model"], "qwen3:8b");
    }
}
