//! Server-Sent Events encoding of conversation progress.

use axum::response::sse::{Event as AxumEvent, KeepAlive};
use axum::response::{IntoResponse, Response, Sse};
use futures_util::Stream;
use modelops_core::ChatEvent;
use pin_project_lite::pin_project;
use serde_json::json;
use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    pub event_type: String,
    pub data: String,
}

impl SseEvent {
    pub fn with_type(event_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            data: data.into(),
        }
    }

    /// `tool_call` carries the tool name, `tool_update` the serialized result,
    /// `final` the `{role, content}` message and `error` the detail text.
    pub fn from_chat_event(event: &ChatEvent) -> Self {
        let data = match event {
            ChatEvent::ToolCall { name } => name.clone(),
            ChatEvent::ToolUpdate { content } => content.clone(),
            ChatEvent::Final(message) => json!({
                "role": message.role,
                "content": message.text(),
            })
            .to_string(),
            ChatEvent::Error(detail) => detail.clone(),
        };
        Self::with_type(event.event_type(), data)
    }
}

impl From<SseEvent> for AxumEvent {
    fn from(event: SseEvent) -> Self {
        AxumEvent::default().event(event.event_type).data(event.data)
    }
}

pin_project! {
    /// Converts conversation events into SSE frames.
    pub struct SseStream<S> {
        #[pin]
        inner: S,
    }
}

impl<S> SseStream<S> {
    pub fn new(stream: S) -> Self {
        Self { inner: stream }
    }
}

impl<S> Stream for SseStream<S>
where
    S: Stream<Item = ChatEvent>,
{
    type Item = std::result::Result<AxumEvent, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.project();
        match this.inner.poll_next(cx) {
            Poll::Ready(Some(event)) => {
                log::debug!("Streaming {} event", event.event_type());
                Poll::Ready(Some(Ok(SseEvent::from_chat_event(&event).into())))
            }
            Poll::Ready(None) => Poll::Ready(None),
            Poll::Pending => Poll::Pending,
        }
    }
}

pub fn create_sse_response_with_keepalive<S>(
    stream: S,
    keepalive_interval: Duration,
    keepalive_text: impl Into<String>,
) -> Response
where
    S: Stream<Item = ChatEvent> + Send + 'static,
{
    Sse::new(SseStream::new(stream))
        .keep_alive(
            KeepAlive::new()
                .interval(keepalive_interval)
                .text(keepalive_text.into()),
        )
        .into_response()
}
