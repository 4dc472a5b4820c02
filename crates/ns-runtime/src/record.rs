//! The minimal record shape the windowed runtime operates on: an optional
//! grouping key, an aggregated value, and an event-time timestamp (spec.md
//! §4.4's `(id, value, ts)` stream). Upstream operators project whatever a
//! query's `ns_schema::Schema` names down to this shape before it reaches
//! the runtime; the runtime itself is schema-agnostic, the way spec.md
//! §4.4 describes slice assignment purely in terms of a timestamp field.

use ns_common::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record {
    pub key: Option<u64>,
    pub value: i64,
    pub ts: Timestamp,
}

impl Record {
    #[must_use]
    pub const fn keyed(key: u64, value: i64, ts: Timestamp) -> Self {
        Self {
            key: Some(key),
            value,
            ts,
        }
    }

    #[must_use]
    pub const fn unkeyed(value: i64, ts: Timestamp) -> Self {
        Self {
            key: None,
            value,
            ts,
        }
    }
}
