//! Role-partitioned counters for hot-path metrics.
//!
//! The runtime has a small, known thread roster: one acceptor per
//! server, one read loop per connection, one consumer per batcher, plus
//! whatever caller threads invoke the send paths. A single atomic per
//! counter would bounce its cache line between all of them, so each
//! [`RoleCounter`] keeps a separate cache-line-padded lane per roster
//! slot: the acceptor writes its own lane, connection and consumer
//! threads are striped over small per-role lane sets, and threads
//! outside the roster claim an external lane on first use. Reads sum
//! every lane.
//!
//! Runtime threads declare themselves with [`register_thread`] when
//! they start; [`RoleCounter`] implements [`metriken::Metric`] for
//! exposition.

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

const CONN_LANES: usize = 16;
const CONSUMER_LANES: usize = 8;
const EXTERNAL_LANES: usize = 8;

/// One padded counter cell. The alignment keeps neighboring lanes on
/// different cache lines.
#[repr(C, align(128))]
struct Lane(AtomicU64);

/// The runtime thread roster.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadRole {
    /// The accept loop of a server.
    Acceptor,
    /// A per-connection read loop (server or client side).
    Connection,
    /// A batcher consumer.
    Consumer,
}

/// A thread's assigned lane: its role plus, for the striped roles, the
/// lane index it was dealt.
#[derive(Debug, Clone, Copy)]
enum LaneSlot {
    Acceptor,
    Connection(usize),
    Consumer(usize),
    External(usize),
}

static NEXT_CONN_LANE: AtomicUsize = AtomicUsize::new(0);
static NEXT_CONSUMER_LANE: AtomicUsize = AtomicUsize::new(0);
static NEXT_EXTERNAL_LANE: AtomicUsize = AtomicUsize::new(0);

thread_local! {
    static SLOT: Cell<Option<LaneSlot>> = const { Cell::new(None) };
}

/// Declare the calling thread's place in the roster.
///
/// Connection and consumer threads are spawned dynamically, so they are
/// dealt stripes round-robin within their role; the acceptor has a lane
/// of its own. Threads that never register (user code on the send
/// paths) claim an external lane on first counter touch.
pub fn register_thread(role: ThreadRole) {
    let slot = match role {
        ThreadRole::Acceptor => LaneSlot::Acceptor,
        ThreadRole::Connection => {
            LaneSlot::Connection(NEXT_CONN_LANE.fetch_add(1, Ordering::Relaxed) % CONN_LANES)
        }
        ThreadRole::Consumer => {
            LaneSlot::Consumer(NEXT_CONSUMER_LANE.fetch_add(1, Ordering::Relaxed) % CONSUMER_LANES)
        }
    };
    SLOT.set(Some(slot));
}

#[inline]
fn current_slot() -> LaneSlot {
    SLOT.get().unwrap_or_else(|| {
        let slot =
            LaneSlot::External(NEXT_EXTERNAL_LANE.fetch_add(1, Ordering::Relaxed) % EXTERNAL_LANES);
        SLOT.set(Some(slot));
        slot
    })
}

/// A counter partitioned across the runtime's thread roster.
pub struct RoleCounter {
    acceptor: Lane,
    connections: [Lane; CONN_LANES],
    consumers: [Lane; CONSUMER_LANES],
    external: [Lane; EXTERNAL_LANES],
}

impl RoleCounter {
    #[allow(clippy::declare_interior_mutable_const)]
    pub const fn new() -> Self {
        const LANE: Lane = Lane(AtomicU64::new(0));
        RoleCounter {
            acceptor: LANE,
            connections: [LANE; CONN_LANES],
            consumers: [LANE; CONSUMER_LANES],
            external: [LANE; EXTERNAL_LANES],
        }
    }

    /// Increment by 1 in the calling thread's lane.
    #[inline]
    pub fn increment(&self) {
        self.add(1);
    }

    /// Add a value in the calling thread's lane.
    #[inline]
    pub fn add(&self, value: u64) {
        let lane = match current_slot() {
            LaneSlot::Acceptor => &self.acceptor,
            LaneSlot::Connection(i) => &self.connections[i],
            LaneSlot::Consumer(i) => &self.consumers[i],
            LaneSlot::External(i) => &self.external[i],
        };
        lane.0.fetch_add(value, Ordering::Relaxed);
    }

    /// Current value, summed over every lane.
    pub fn value(&self) -> u64 {
        let mut total = self.acceptor.0.load(Ordering::Relaxed);
        for lane in &self.connections {
            total += lane.0.load(Ordering::Relaxed);
        }
        for lane in &self.consumers {
            total += lane.0.load(Ordering::Relaxed);
        }
        for lane in &self.external {
            total += lane.0.load(Ordering::Relaxed);
        }
        total
    }
}

impl Default for RoleCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl metriken::Metric for RoleCounter {
    fn as_any(&self) -> Option<&dyn std::any::Any> {
        Some(self)
    }

    fn value(&self) -> Option<metriken::Value<'_>> {
        Some(metriken::Value::Counter(RoleCounter::value(self)))
    }
}
