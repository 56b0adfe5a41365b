//! Relays one upstream watch to an HTTP response as newline-delimited JSON
use bytes::Bytes;
use futures::{stream::BoxStream, Stream, StreamExt};
use kube::{
    api::{DynamicObject, WatchEvent},
    core::watch::Bookmark,
};
use mck_core::{identity, response, Naming, Status};
use pin_project::pin_project;
use serde::Serialize;
use std::{
    convert::Infallible,
    fmt,
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};
use tokio_util::sync::{CancellationToken, WaitForCancellationFutureOwned};
use tracing::{debug, warn};

/// Where a relay is in its life
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// Upstream watch is open, nothing relayed yet
    Connected,
    /// At least one event has been relayed
    Streaming,
    /// Upstream ended, failed, or the server is shutting down
    Closed,
}

/// A stream of response body chunks, one JSON event per chunk
///
/// Each chunk is handed to the response as soon as its event arrives. Dropping the
/// relay (for instance when the caller disconnects) drops the upstream watch with it.
#[pin_project]
pub struct Relay {
    cluster: String,
    naming: Naming,
    #[pin]
    events: BoxStream<'static, kube::Result<WatchEvent<DynamicObject>>>,
    #[pin]
    shutdown: WaitForCancellationFutureOwned,
    state: State,
}

// the wire shape of a relayed event
#[derive(Serialize)]
#[serde(tag = "type", content = "object", rename_all = "UPPERCASE")]
enum Line {
    Added(DynamicObject),
    Modified(DynamicObject),
    Deleted(DynamicObject),
    Bookmark(Bookmark),
    Error(Status),
}

impl Relay {
    /// Relay `events` read from `cluster` until they end or `shutdown` is cancelled
    ///
    /// Objects are decorated with `naming` before they are relayed.
    pub fn new<S>(cluster: String, naming: Naming, events: S, shutdown: CancellationToken) -> Self
    where
        S: Stream<Item = kube::Result<WatchEvent<DynamicObject>>> + Send + 'static,
    {
        Self {
            cluster,
            naming,
            events: events.boxed(),
            shutdown: shutdown.cancelled_owned(),
            state: State::Connected,
        }
    }

    /// Current state
    pub fn state(&self) -> State {
        self.state
    }
}

impl fmt::Debug for Relay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Relay")
            .field("cluster", &self.cluster)
            .field("state", &self.state)
            .finish()
    }
}

fn to_line(event: WatchEvent<DynamicObject>, cluster: &str, naming: Naming) -> (Line, bool) {
    let decorated = |mut obj: DynamicObject| {
        identity::decorate(&mut obj, cluster, naming);
        obj
    };
    match event {
        WatchEvent::Added(obj) => (Line::Added(decorated(obj)), false),
        WatchEvent::Modified(obj) => (Line::Modified(decorated(obj)), false),
        WatchEvent::Deleted(obj) => (Line::Deleted(decorated(obj)), false),
        WatchEvent::Bookmark(bm) => (Line::Bookmark(bm), false),
        WatchEvent::Error(err) => (Line::Error(response::upstream(&err)), true),
    }
}

fn encode(line: &Line) -> Option<Bytes> {
    match serde_json::to_vec(line) {
        Ok(mut buf) => {
            buf.push(b'\n');
            Some(Bytes::from(buf))
        }
        Err(e) => {
            warn!(error = %e, "failed to encode watch event");
            None
        }
    }
}

impl Stream for Relay {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();
        if *this.state == State::Closed {
            return Poll::Ready(None);
        }
        if this.shutdown.as_mut().poll(cx).is_ready() {
            debug!(cluster = %this.cluster, "watch closed by shutdown");
            *this.state = State::Closed;
            return Poll::Ready(None);
        }
        let (line, last) = match this.events.as_mut().poll_next(cx) {
            Poll::Pending => return Poll::Pending,
            Poll::Ready(None) => {
                debug!(cluster = %this.cluster, "upstream watch ended");
                *this.state = State::Closed;
                return Poll::Ready(None);
            }
            Poll::Ready(Some(Ok(event))) => to_line(event, this.cluster.as_str(), *this.naming),
            Poll::Ready(Some(Err(err))) => {
                warn!(cluster = %this.cluster, error = %err, "upstream watch failed");
                let status = match &err {
                    kube::Error::Api(resp) => response::upstream(resp),
                    other => response::failure(500, "InternalError", &other.to_string()),
                };
                (Line::Error(status), true)
            }
        };
        *this.state = if last { State::Closed } else { State::Streaming };
        match encode(&line) {
            Some(chunk) => Poll::Ready(Some(Ok(chunk))),
            None => {
                *this.state = State::Closed;
                Poll::Ready(None)
            }
        }
    }
}
