//! Quill — the AI draft lifecycle engine behind a personal job-search
//! tracker.
//!
//! Every AI-assisted content slot in the tracker (cover letter, LinkedIn
//! outreach, interview prep fields, follow-up notes, transcript analysis,
//! candidate answer sets) shares one contract: request generation, receive
//! an atomic or incrementally streamed result, let the user review and edit
//! the draft, then persist it — with at most one generation in flight per
//! slot while many independent slots run on one page. This crate is that
//! engine. The generation backend, the entity store, and guidance capture
//! are collaborators behind [`transport::GenerationTransport`] and
//! [`acceptance::AcceptanceSink`].

pub mod acceptance;
pub mod config;
pub mod decoder;
pub mod engine;
pub mod errors;
pub mod registry;
pub mod slot;
pub mod transport;

pub use acceptance::{AcceptanceSink, EntityCache, HttpAcceptanceSink};
pub use config::EngineConfig;
pub use decoder::{Frame, FrameDecoder};
pub use engine::DraftEngine;
pub use errors::DraftError;
pub use registry::SlotRegistry;
pub use slot::{Artifact, Candidate, ContentField, DraftSlot, SlotKey, SlotStatus};
pub use transport::{
    AtomicResult, GenerationRequest, GenerationTransport, HttpGenerationTransport, Outcome,
    TransportMode,
};
