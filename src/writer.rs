//! Response writer: abstracts "write one streaming event" vs "write one
//! final response" so the engine never touches the raw transport.
//!
//! The state machine is enforced by the type itself rather than by caller
//! discipline: `write_event` and `write_response` both check and update
//! [`WriterState`], so testable property 3 (mutual exclusion between the two
//! modes, no writes after terminal) holds regardless of what the engine
//! does.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::{GatewayError, Result};
use crate::protocol::{Response, StreamEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriterState {
    Idle,
    Streaming,
    Completed,
}

/// Callback invoked the moment the engine emits `response.created` — the
/// adapter uses it to register the in-flight cancellation entry, since the
/// response id is not known before the engine runs. A plain `FnOnce` rather
/// than an async hook: registry registration is a synchronous, non-blocking
/// mutex operation.
pub type OnFirstCreated = Box<dyn FnOnce(&str) + Send>;

/// Output side of one request. `SseWriter` and `BufferedWriter` are the two
/// implementations; exactly one of `write_event`/`write_response` may be
/// used for the lifetime of a given writer.
#[async_trait]
pub trait ResponseWriter: Send {
    async fn write_event(&mut self, event: StreamEvent) -> Result<()>;
    async fn write_response(&mut self, response: Response) -> Result<()>;
    async fn flush(&mut self) -> Result<()>;

    /// Registers the one-shot callback fired on the first `response.created`
    /// event. Implementations that never stream (pure buffered use outside
    /// of `BufferedWriter`) may ignore this.
    fn on_first_created(&mut self, callback: OnFirstCreated);

    /// Next sequence number to stamp on an outgoing event, incrementing
    /// after read. Exposed so callers building a `StreamEvent` do not need
    /// their own counter.
    fn next_sequence_number(&self) -> u64;
}

/// Streaming writer: each `write_event` call serializes one SSE frame
/// (`event: <type>\ndata: <json>\n\n`) onto a channel that axum turns into a
/// chunked `text/event-stream` body. The terminal event is followed by the
/// `data: [DONE]\n\n` sentinel (OpenAI compatibility).
pub struct SseWriter {
    sender: mpsc::Sender<std::result::Result<Bytes, std::io::Error>>,
    state: WriterState,
    sequence: AtomicU64,
    on_first_created: Option<OnFirstCreated>,
}

impl SseWriter {
    pub fn new(sender: mpsc::Sender<std::result::Result<Bytes, std::io::Error>>) -> Self {
        Self {
            sender,
            state: WriterState::Idle,
            sequence: AtomicU64::new(0),
            on_first_created: None,
        }
    }

    fn encode(event: &StreamEvent) -> Result<Bytes> {
        let json = serde_json::to_string(event)?;
        Ok(Bytes::from(format!("event: {}\ndata: {}\n\n", event.type_name(), json)))
    }

    async fn send(&self, bytes: Bytes) -> Result<()> {
        self.sender
            .send(Ok(bytes))
            .await
            .map_err(|_| GatewayError::server_error("client disconnected: SSE channel closed"))
    }
}

#[async_trait]
impl ResponseWriter for SseWriter {
    async fn write_event(&mut self, event: StreamEvent) -> Result<()> {
        if self.state == WriterState::Completed {
            return Err(GatewayError::server_error("write_event called after a terminal event"));
        }

        let is_first_created = matches!(event, StreamEvent::ResponseCreated { .. });
        let bytes = Self::encode(&event)?;
        self.send(bytes).await?;

        if is_first_created {
            self.state = WriterState::Streaming;
            if let (Some(callback), StreamEvent::ResponseCreated { ref response, .. }) =
                (self.on_first_created.take(), &event)
            {
                callback(&response.id);
            }
        }

        if event.is_terminal() {
            self.state = WriterState::Completed;
            self.send(Bytes::from_static(b"data: [DONE]\n\n")).await?;
        }

        Ok(())
    }

    async fn write_response(&mut self, _response: Response) -> Result<()> {
        Err(GatewayError::server_error(
            "write_response called on a streaming writer; use write_event",
        ))
    }

    async fn flush(&mut self) -> Result<()> {
        // Each `send` above already pushes the frame through the channel;
        // there is no application-layer buffer to flush. The channel
        // backpressure itself is the flush signal to the client socket.
        Ok(())
    }

    fn on_first_created(&mut self, callback: OnFirstCreated) {
        self.on_first_created = Some(callback);
    }

    fn next_sequence_number(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst)
    }
}

/// Buffered (non-streaming) writer: accumulates exactly one final
/// [`Response`] and hands it to the adapter as a JSON body.
pub struct BufferedWriter {
    state: WriterState,
    response: Option<Response>,
}

impl BufferedWriter {
    pub fn new() -> Self {
        Self {
            state: WriterState::Idle,
            response: None,
        }
    }

    /// Consumes the writer, returning the buffered response. Panics if
    /// called before `write_response` — a programming error in the adapter,
    /// not a runtime condition.
    pub fn into_response(self) -> Response {
        self.response.expect("BufferedWriter::into_response called before write_response")
    }
}

impl Default for BufferedWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ResponseWriter for BufferedWriter {
    async fn write_event(&mut self, _event: StreamEvent) -> Result<()> {
        Err(GatewayError::server_error(
            "write_event called on a buffered writer; use write_response",
        ))
    }

    async fn write_response(&mut self, response: Response) -> Result<()> {
        if self.state == WriterState::Completed {
            return Err(GatewayError::server_error("write_response called twice"));
        }
        self.state = WriterState::Completed;
        self.response = Some(response);
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    fn on_first_created(&mut self, _callback: OnFirstCreated) {
        // Buffered responses have no "first created" moment visible to the
        // transport; the adapter registers in-flight cancellation directly
        // from the id the engine returns instead.
    }

    fn next_sequence_number(&self) -> u64 {
        0
    }
}
