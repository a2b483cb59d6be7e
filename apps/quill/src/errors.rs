use thiserror::Error;

use crate::slot::{SlotKey, SlotStatus};

/// Draft-engine error taxonomy.
///
/// Every variant is `Clone` so the most recent error can be carried on the
/// slot itself and surfaced to the frontend without losing the slot's
/// buffered content. There are no automatic retries anywhere in the crate —
/// every retry is user-initiated.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DraftError {
    /// Network or status failure while talking to the generation backend.
    /// Recoverable: buffered text is retained and the user may retry.
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed byte stream (not malformed payload content — that is
    /// tolerated). Fatal to the in-flight stream; the slot moves to Failed.
    #[error("malformed byte stream: {0}")]
    Decode(String),

    /// The acceptance call failed. The slot stays PreviewReady with its
    /// content intact; accepting again retries.
    #[error("persist failed: {0}")]
    Persist(String),

    /// A superseded generation tried to mutate the slot. Internal
    /// bookkeeping only — stale arrivals are discarded, never surfaced.
    #[error("stale result discarded for {key}")]
    Stale { key: SlotKey },

    #[error("no live draft slot for {0}")]
    SlotNotFound(SlotKey),

    #[error("cannot {op} while slot is {from:?}")]
    InvalidTransition { from: SlotStatus, op: &'static str },
}
