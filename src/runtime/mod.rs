//! Readiness-driven runtime for the HTTP endpoint.
//!
//! - `ConnectionFramer`: per-connection framing state machine
//! - `Transport`: the socket boundary the framer drives
//! - `RequestHandler`: the application seam invoked once per connection
//! - `Server`: mio workers that accept sockets and step their framers

mod connection;
mod handler;
mod server;
mod transport;

pub(crate) use handler::RequestHandler;
pub(crate) use server::Server;
