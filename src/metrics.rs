//! batchline runtime metrics.
//!
//! Counters for connection lifecycle, socket traffic, and batcher
//! activity. Each is a role-partitioned [`RoleCounter`], registered
//! with metriken for exposition by the embedding application.

use crate::counter::RoleCounter;
use metriken::metric;

// ── Connection lifecycle ─────────────────────────────────────────

#[metric(
    name = "batchline/connections/accepted",
    description = "Total connections accepted"
)]
pub static CONNECTIONS_ACCEPTED: RoleCounter = RoleCounter::new();

#[metric(
    name = "batchline/connections/closed",
    description = "Total connections closed"
)]
pub static CONNECTIONS_CLOSED: RoleCounter = RoleCounter::new();

// ── Bytes ────────────────────────────────────────────────────────

#[metric(name = "batchline/bytes/received", description = "Total bytes received")]
pub static BYTES_RECEIVED: RoleCounter = RoleCounter::new();

#[metric(name = "batchline/bytes/sent", description = "Total bytes sent")]
pub static BYTES_SENT: RoleCounter = RoleCounter::new();

// ── Batcher ──────────────────────────────────────────────────────

#[metric(
    name = "batchline/batches/consumed",
    description = "Batches handed to consumers"
)]
pub static BATCHES_CONSUMED: RoleCounter = RoleCounter::new();

#[metric(
    name = "batchline/batches/items",
    description = "Items delivered inside batches"
)]
pub static BATCH_ITEMS: RoleCounter = RoleCounter::new();

#[metric(
    name = "batchline/batches/consumer_errors",
    description = "Errors returned by batch consumers"
)]
pub static BATCH_CONSUMER_ERRORS: RoleCounter = RoleCounter::new();
