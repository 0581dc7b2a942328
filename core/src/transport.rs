//! Backend transport abstraction.
//!
//! The lifecycle logic only needs two capabilities from a node connection:
//! - `Transport`: send a request and get the parsed JSON response
//! - `MessageStream`: a duplex stream of JSON messages
//!
//! Credentials, endpoints and TLS stay inside the implementation, see
//! [`RestTransport`](crate::lnd::RestTransport).

use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde_json::Value;

use crate::error::Result;

/// Type alias for transport futures.
pub type TransportFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// HTTP method used to open a stream.
///
/// Server-streaming calls are opened with `Get`, calls that take a request
/// body on the stream (like sending a payment) with `Post`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMethod {
    Get,
    Post,
}

impl fmt::Display for StreamMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamMethod::Get => write!(f, "GET"),
            StreamMethod::Post => write!(f, "POST"),
        }
    }
}

/// Request/response and stream access to a node.
pub trait Transport: Send + Sync {
    /// `GET` a resource relative to the node's base URL.
    ///
    /// Non-success statuses are returned as [`Error::Api`](crate::Error::Api).
    fn get<'a>(&'a self, path: &'a str) -> TransportFuture<'a, Value>;

    /// `POST` a JSON body to a path relative to the node's base URL.
    fn post<'a>(&'a self, path: &'a str, body: Value) -> TransportFuture<'a, Value>;

    /// Open a duplex message stream.
    fn open_stream<'a>(
        &'a self,
        path: &'a str,
        method: StreamMethod,
    ) -> TransportFuture<'a, Box<dyn MessageStream>>;
}

/// A bidirectional stream of JSON messages.
///
/// The stream is owned by exactly one call. Dropping it releases the
/// underlying connection, `close` does so gracefully.
pub trait MessageStream: Send {
    fn send(&mut self, message: Value) -> TransportFuture<'_, ()>;

    /// Next message, `Ok(None)` once the peer closed the stream.
    fn receive(&mut self) -> TransportFuture<'_, Option<Value>>;

    fn close(&mut self) -> TransportFuture<'_, ()>;
}

/// Close a stream, logging instead of failing.
///
/// Used on every exit path of the stream loops so the connection is released
/// whatever the outcome was.
pub(crate) async fn release(stream: &mut dyn MessageStream, endpoint: &str) {
    if let Err(e) = stream.close().await {
        log::warn!("Failed to close {} stream: {}", endpoint, e);
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Stream that replays scripted frames and records what was sent.
    pub struct ScriptedStream {
        frames: VecDeque<Result<Value>>,
        pub sent: Arc<Mutex<Vec<Value>>>,
        pub closed: Arc<Mutex<bool>>,
    }

    impl ScriptedStream {
        pub fn new(frames: impl IntoIterator<Item = Value>) -> Self {
            Self {
                frames: frames.into_iter().map(Ok).collect(),
                sent: Arc::default(),
                closed: Arc::default(),
            }
        }

        pub fn then_fail(mut self, err: crate::Error) -> Self {
            self.frames.push_back(Err(err));
            self
        }
    }

    impl MessageStream for ScriptedStream {
        fn send(&mut self, message: Value) -> TransportFuture<'_, ()> {
            Box::pin(async move {
                self.sent.lock().unwrap().push(message);
                Ok(())
            })
        }

        fn receive(&mut self) -> TransportFuture<'_, Option<Value>> {
            Box::pin(async move { self.frames.pop_front().transpose() })
        }

        fn close(&mut self) -> TransportFuture<'_, ()> {
            Box::pin(async move {
                *self.closed.lock().unwrap() = true;
                Ok(())
            })
        }
    }
}
