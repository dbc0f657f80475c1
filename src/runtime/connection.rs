//! Connection framer: one socket, one request, one response.
//!
//! Each connection tracks an explicit framing state and owns its read and
//! write buffers. The event loop drives it by calling
//! [`ConnectionFramer::advance`] whenever the socket may have changed
//! readiness; the framer polls level-triggered readiness itself, so extra
//! calls are harmless.

use crate::http::parser::{complete_body, parse, ParseResult, SEPARATOR_LEN};
use crate::http::{Request, RequestHead};
use crate::runtime::handler::RequestHandler;
use crate::runtime::transport::Transport;
use bytes::{Buf, BytesMut};
use slab::Slab;
use std::io;
use std::mem;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace};

/// Outcome of one `advance` step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    Live,
    Closed,
}

/// Framing state of a connection.
#[derive(Debug)]
pub enum FrameState {
    /// Header terminator not seen yet.
    AwaitingHeaders {
        /// Bytes of the read buffer already searched for the terminator.
        scanned: usize,
    },
    /// Head parsed; waiting until `header_len + body_len` bytes are buffered.
    AwaitingBody {
        head: RequestHead,
        header_len: usize,
        body_len: usize,
    },
    /// Request handled; flushing the response.
    AwaitingWrite,
    /// Transport released. Terminal.
    Closed,
}

/// A single client connection and its framing state.
pub struct ConnectionFramer<T, H: ?Sized> {
    transport: Option<T>,
    handler: Arc<H>,
    state: FrameState,
    read_buf: BytesMut,
    write_buf: BytesMut,
    idle_timeout: Duration,
}

impl<T, H> ConnectionFramer<T, H>
where
    T: Transport,
    H: RequestHandler + ?Sized,
{
    /// Create a connection in the initial `AwaitingHeaders` state.
    pub fn new(transport: T, handler: Arc<H>, idle_timeout: Duration) -> Self {
        Self {
            transport: Some(transport),
            handler,
            state: FrameState::AwaitingHeaders { scanned: 0 },
            read_buf: BytesMut::new(),
            write_buf: BytesMut::new(),
            idle_timeout,
        }
    }

    pub fn state(&self) -> &FrameState {
        &self.state
    }

    /// Response bytes not yet accepted by the transport.
    pub fn pending_write(&self) -> usize {
        self.write_buf.len()
    }

    /// Perform at most one read-and-frame pass and one write attempt.
    ///
    /// A request is dispatched to the handler at most once over the
    /// connection's lifetime. Transport errors close the connection; they
    /// are never surfaced to the caller.
    pub fn advance(&mut self, max_read_chunk: usize) -> Liveness {
        let ready = match self.transport.as_mut() {
            Some(transport) => match transport.poll_ready() {
                Ok(ready) => ready,
                Err(e) => return self.fail("poll", &e),
            },
            None => return Liveness::Closed,
        };

        if ready.readable && self.is_reading() {
            if let Some(transport) = self.transport.as_mut() {
                transport.set_idle_timeout(self.idle_timeout);
            }

            loop {
                match self.fill(max_read_chunk) {
                    Ok(0) => {
                        debug!(buffered = self.read_buf.len(), "Peer closed before request completed");
                        return self.close();
                    }
                    Ok(n) => trace!(bytes = n, buffered = self.read_buf.len(), "Read"),
                    Err(e) => return self.fail("read", &e),
                }

                if let Some(request) = self.try_frame() {
                    trace!(
                        method = ?request.method(),
                        target = ?request.target(),
                        body = request.body.len(),
                        "Request framed"
                    );
                    let response = (*self.handler).handle(request);
                    self.write_buf.extend_from_slice(&response);
                    break;
                }
            }
        }

        if ready.writable && !self.write_buf.is_empty() {
            let sent = match self.transport.as_mut() {
                Some(transport) => transport.send(&self.write_buf),
                None => return Liveness::Closed,
            };
            match sent {
                Ok(n) => {
                    self.write_buf.advance(n);
                    trace!(bytes = n, remaining = self.write_buf.len(), "Wrote");
                }
                Err(e) => return self.fail("write", &e),
            }
        }

        // No keep-alive: a flushed (or empty) response ends the connection.
        if matches!(self.state, FrameState::AwaitingWrite) && self.write_buf.is_empty() {
            return self.close();
        }

        Liveness::Live
    }

    fn is_reading(&self) -> bool {
        matches!(
            self.state,
            FrameState::AwaitingHeaders { .. } | FrameState::AwaitingBody { .. }
        )
    }

    /// Append up to `max` bytes from the transport to the read buffer.
    fn fill(&mut self, max: usize) -> io::Result<usize> {
        let transport = match self.transport.as_mut() {
            Some(transport) => transport,
            None => return Ok(0),
        };

        let start = self.read_buf.len();
        self.read_buf.resize(start + max.max(1), 0);
        let result = transport.recv(&mut self.read_buf[start..]);
        let n = *result.as_ref().unwrap_or(&0);
        self.read_buf.truncate(start + n);
        result
    }

    /// Advance the framing state over the buffered bytes.
    ///
    /// Returns the request once headers and the full body are buffered,
    /// leaving any trailing bytes in the read buffer.
    fn try_frame(&mut self) -> Option<Request> {
        let framed = match mem::replace(&mut self.state, FrameState::Closed) {
            FrameState::AwaitingHeaders { scanned } => {
                // Resume so that a separator split across reads is still found.
                let from = scanned.saturating_sub(SEPARATOR_LEN - 1);
                match parse(&self.read_buf, from) {
                    ParseResult::Complete(request, consumed) => Some((request, consumed)),
                    ParseResult::PartialBody {
                        head,
                        header_len,
                        body_len,
                    } => {
                        self.state = FrameState::AwaitingBody {
                            head,
                            header_len,
                            body_len,
                        };
                        None
                    }
                    ParseResult::Incomplete => {
                        self.state = FrameState::AwaitingHeaders {
                            scanned: self.read_buf.len(),
                        };
                        None
                    }
                }
            }
            FrameState::AwaitingBody {
                head,
                header_len,
                body_len,
            } => match complete_body(head, header_len, body_len, &self.read_buf) {
                Ok(framed) => Some(framed),
                Err(head) => {
                    self.state = FrameState::AwaitingBody {
                        head,
                        header_len,
                        body_len,
                    };
                    None
                }
            },
            other => {
                self.state = other;
                None
            }
        };

        let (request, consumed) = framed?;
        self.read_buf.advance(consumed);
        self.state = FrameState::AwaitingWrite;
        Some(request)
    }

    fn fail(&mut self, op: &'static str, error: &io::Error) -> Liveness {
        debug!(op, error = %error, "Transport error");
        self.close()
    }

    /// Release the transport and discard both buffers.
    fn close(&mut self) -> Liveness {
        self.transport = None;
        self.read_buf.clear();
        self.write_buf.clear();
        self.state = FrameState::Closed;
        Liveness::Closed
    }
}

/// Registry of active connections using slab allocation.
///
/// Provides O(1) insert, lookup, and remove operations.
pub struct ConnectionRegistry<C> {
    connections: Slab<C>,
    max_connections: usize,
}

impl<C> ConnectionRegistry<C> {
    /// Create a new registry with specified maximum capacity.
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: Slab::with_capacity(max_connections),
            max_connections,
        }
    }

    /// Id the next successful `insert` will return.
    pub fn vacant_key(&self) -> usize {
        self.connections.vacant_key()
    }

    pub fn is_full(&self) -> bool {
        self.connections.len() >= self.max_connections
    }

    /// Insert a new connection into the registry.
    ///
    /// Returns `None` if the registry is at capacity.
    pub fn insert(&mut self, conn: C) -> Option<usize> {
        if self.is_full() {
            return None;
        }
        Some(self.connections.insert(conn))
    }

    pub fn get_mut(&mut self, id: usize) -> Option<&mut C> {
        self.connections.get_mut(id)
    }

    pub fn remove(&mut self, id: usize) -> Option<C> {
        self.connections.try_remove(id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }
}
