//! Message kinds exchanged between connected components.
//!
//! Modeled as one tagged enum rather than a family of types behind a vtable,
//! since this core never needs per-kind dynamic dispatch — only the
//! scheduler and filters match on kind, and a closed enum lets that be
//! exhaustive.

use crate::ctf::trace_class::EventClass;
use std::rc::Rc;

/// A point on some stream's clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ClockSnapshot(pub u64);

/// One message flowing along a connection: an event, a packet boundary, a
/// stream boundary, a discarded-events record, or a message iterator
/// inactivity marker.
#[derive(Debug, Clone)]
pub enum Message {
    StreamBegin { stream_id: u64 },
    StreamEnd { stream_id: u64 },
    PacketBegin { stream_id: u64, clock: Option<ClockSnapshot> },
    PacketEnd { stream_id: u64, clock: Option<ClockSnapshot> },
    Event {
        stream_id: u64,
        class: Rc<EventClass>,
        clock: Option<ClockSnapshot>,
    },
    DiscardedEvents {
        stream_id: u64,
        count: u64,
        begin: Option<ClockSnapshot>,
        end: Option<ClockSnapshot>,
    },
    /// Emitted by a message iterator that made no progress but is not
    /// reporting `AGAIN` at the graph level (e.g. a live source reporting a
    /// heartbeat); distinct from [`crate::component::ConsumeResult::Again`],
    /// which is a scheduler-level suspension, not a message.
    Inactivity { clock: Option<ClockSnapshot> },
}

impl Message {
    pub fn stream_id(&self) -> Option<u64> {
        match self {
            Message::StreamBegin { stream_id }
            | Message::StreamEnd { stream_id }
            | Message::PacketBegin { stream_id, .. }
            | Message::PacketEnd { stream_id, .. }
            | Message::Event { stream_id, .. }
            | Message::DiscardedEvents { stream_id, .. } => Some(*stream_id),
            Message::Inactivity { .. } => None,
        }
    }
}
