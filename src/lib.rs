//! batchline — high-throughput TCP request/response framework built
//! around a multi-producer batching engine.
//!
//! Framing is supplied by the caller as a pair of codec functions; the
//! runtime handles accept/read loops, socket tuning, single-writer
//! serialization, and coalescing of writes from many threads into
//! bounded, contiguous batches with back-pressure and timed flushing.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use batchline::{Client, Server, ServerOpts, json_lines_codec};
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize)]
//! struct Msg {
//!     text: String,
//! }
//!
//! fn main() -> Result<(), batchline::Error> {
//!     let server = Server::<Msg, Msg>::new(
//!         0,
//!         ServerOpts::default(),
//!         || {
//!             Box::new(|req, reply| {
//!                 if let (Some(req), Some(reply)) = (req, reply) {
//!                     reply.send(Msg {
//!                         text: format!("got: {}", req.text),
//!                     })?;
//!                 }
//!                 Ok(())
//!             })
//!         },
//!         || {
//!             (
//!                 json_lines_codec::<Msg>().parse,
//!                 json_lines_codec::<Msg>().write,
//!             )
//!         },
//!     )?;
//!
//!     let client = Client::<Msg, Msg>::new(
//!         "127.0.0.1",
//!         server.port(),
//!         Default::default(),
//!         Box::new(|resp, _status| {
//!             if let Some(resp) = resp {
//!                 println!("{}", resp.text);
//!             }
//!             Ok(())
//!         }),
//!         || {
//!             (
//!                 json_lines_codec::<Msg>().write,
//!                 json_lines_codec::<Msg>().parse,
//!             )
//!         },
//!     )?;
//!
//!     client.send(&Msg {
//!         text: "hello".into(),
//!     })?;
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! Data flows accept → per-connection read loop → buffer → codec →
//! handler → reply → (optional batcher) → socket. One accept thread per
//! server, one read thread per connection, and per batcher one consumer
//! thread plus one flush-timer thread. Buffers are owned by exactly one
//! thread; sockets are written by exactly one writer (mutex or batcher
//! consumer).

// ── Internal modules ────────────────────────────────────────────────────
pub(crate) mod connection;
pub(crate) mod spin;

// ── Public modules ──────────────────────────────────────────────────────
pub mod batcher;
pub mod buffer;
pub mod client;
pub mod codec;
pub mod config;
pub mod counter;
pub mod error;
pub mod metrics;
pub mod reqrep;
pub mod server;
pub mod tcp;

// ── Re-exports: Core types ──────────────────────────────────────────────

/// Multi-producer, single-consumer batch coalescer.
pub use batcher::Batcher;
/// Endian-typed growable byte buffer with a read cursor.
pub use buffer::ByteBuffer;
/// Byte order for typed buffer accessors.
pub use buffer::Endian;
/// Runtime errors.
pub use error::Error;

// ── Re-exports: Codec contract ──────────────────────────────────────────

/// A parse/write pair for one message type.
pub use codec::Codec;
/// Streaming parser for one framed message type.
pub use codec::ParseFn;
/// Result of one parse attempt.
pub use codec::Parsed;
/// Writer appending the full encoding of one message.
pub use codec::WriteFn;
/// Codec for bare 32-bit integers.
pub use codec::int32_codec;
/// Codec for newline-delimited JSON documents.
pub use codec::json_lines_codec;
/// Parse every complete frame currently in a buffer.
pub use codec::parse_all;

// ── Re-exports: Configuration ───────────────────────────────────────────

/// Options for a [`Batcher`].
pub use config::BatcherOpts;
/// Latency/throughput socket trade-off.
pub use config::Optimization;
/// Per-socket tuning knobs.
pub use config::SocketOpts;

// ── Re-exports: TCP runtime ─────────────────────────────────────────────

/// Framing-agnostic TCP client.
pub use client::TcpClient;
/// Per-connection handler factory for [`TcpServer`].
pub use server::NewConnHandler;
/// Framing-agnostic TCP server.
pub use server::TcpServer;
/// Per-connection read-loop handler.
pub use tcp::ConnHandler;
/// Single read into a buffer's spare window.
pub use tcp::read_to_buffer;
/// Short-write-safe full send.
pub use tcp::send_all;

// ── Re-exports: Request/response façade ─────────────────────────────────

/// Typed request/response client.
pub use reqrep::Client;
/// Status accompanying each response-handler call.
pub use reqrep::ClientStatus;
/// Per-connection response sender.
pub use reqrep::Replier;
/// Per-connection request handler.
pub use reqrep::RequestHandler;
/// Handler for inbound responses on a client.
pub use reqrep::ResponseHandler;
/// Typed request/response server.
pub use reqrep::Server;
/// Options for the request/response server.
pub use reqrep::ServerOpts;
