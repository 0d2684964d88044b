//! Typed request/response façade over the TCP runtime.
//!
//! A [`Server`] parses inbound requests with a per-connection codec and
//! hands each one to the user handler together with a [`Replier`] that
//! sends exactly one response back on the originating connection. A
//! [`Client`] serializes typed requests into a staging buffer and
//! dispatches parsed responses to its response handler.
//!
//! Both sides enforce single-writer-to-socket semantics: the server
//! through a per-connection write mutex or, when response batching is
//! enabled, a per-connection [`Batcher`](crate::batcher::Batcher) whose
//! consumer is the only writer; the client through its send mutex.

mod client;
mod server;

pub use client::{Client, ClientStatus, ResponseHandler};
pub use server::{Replier, RequestHandler, Server, ServerOpts};
