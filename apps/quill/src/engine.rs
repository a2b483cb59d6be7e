//! Draft Engine — orchestrates the full draft lifecycle.
//!
//! Flow: trigger → transport call (atomic or streaming) → frames applied in
//! arrival order → PreviewReady → optional edit/save → accept → persisted,
//! entity cache reconciled.
//!
//! Per-key exclusivity: every trigger bumps the key's registry ticket and
//! tags its transport call with it. A second trigger on the same key
//! supersedes the first; anything the first later delivers fails the ticket
//! check and provably never mutates the visible slot. Different keys
//! proceed fully in parallel — the host drives each `trigger` future on its
//! own task.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use futures::StreamExt;
use serde_json::Value;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::acceptance::{AcceptanceSink, EntityCache};
use crate::config::EngineConfig;
use crate::decoder::Frame;
use crate::errors::DraftError;
use crate::registry::SlotRegistry;
use crate::slot::{DraftSlot, SlotKey, SlotStatus};
use crate::transport::{
    AtomicResult, FrameStream, GenerationRequest, GenerationTransport, Outcome, TransportMode,
};

#[derive(Clone)]
pub struct DraftEngine {
    registry: Arc<Mutex<SlotRegistry>>,
    transport: Arc<dyn GenerationTransport>,
    sink: Arc<dyn AcceptanceSink>,
    cache: EntityCache,
    stream_idle_timeout: Duration,
}

impl DraftEngine {
    pub fn new(
        transport: Arc<dyn GenerationTransport>,
        sink: Arc<dyn AcceptanceSink>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            registry: Arc::new(Mutex::new(SlotRegistry::new())),
            transport,
            sink,
            cache: EntityCache::new(),
            stream_idle_timeout: Duration::from_secs(config.stream_idle_timeout_secs),
        }
    }

    /// The registry mutex is held only for individual mutations, never
    /// across an await.
    fn registry(&self) -> MutexGuard<'_, SlotRegistry> {
        self.registry.lock().expect("slot registry lock poisoned")
    }

    // ── Read side ───────────────────────────────────────────────────────

    /// Snapshot of the live slot for rendering.
    pub fn slot(&self, key: SlotKey) -> Option<DraftSlot> {
        self.registry().get(key).cloned()
    }

    pub fn cached_entity(&self, entity_id: Uuid) -> Option<Value> {
        self.cache.get(entity_id)
    }

    pub fn set_guidance(&self, key: SlotKey, text: impl Into<String>) {
        self.registry().set_guidance(key, text.into());
    }

    pub fn guidance(&self, key: SlotKey) -> Option<String> {
        self.registry().guidance(key).map(str::to_string)
    }

    // ── Generation ──────────────────────────────────────────────────────

    /// Starts (or restarts) generation for a key. Installs a fresh
    /// Generating slot under a new ticket, consumes any stored guidance,
    /// and drives the transport outcome to completion. Returns when the
    /// draft is PreviewReady, the slot has Failed, or this call was
    /// superseded (in which case nothing was mutated and Ok is returned).
    pub async fn trigger(
        &self,
        key: SlotKey,
        mode: TransportMode,
        context: Value,
    ) -> Result<(), DraftError> {
        let (ticket, guidance) = {
            let mut registry = self.registry();
            let ticket = registry.begin_generation(key);
            (ticket, registry.take_guidance(key))
        };
        info!(%key, ticket, ?mode, "generation triggered");

        let request = GenerationRequest {
            key,
            mode,
            guidance,
            context,
        };

        match self.transport.generate(&request).await {
            Ok(Outcome::Atomic(result)) => self.complete_atomic(key, ticket, result),
            Ok(Outcome::Streaming(frames)) => self.drive_stream(key, ticket, frames).await,
            Err(err) => self.fail_slot(key, ticket, err),
        }
    }

    fn complete_atomic(
        &self,
        key: SlotKey,
        ticket: u64,
        result: AtomicResult,
    ) -> Result<(), DraftError> {
        let applied = self.registry().with_live(key, ticket, |slot| match result {
            AtomicResult::Answer(text) => {
                slot.append_text(&text)?;
                slot.complete()
            }
            AtomicResult::AnswerSet(texts) => slot.complete_set(texts),
            AtomicResult::Message { subject, message } => {
                let text = match subject {
                    Some(subject) => format!("Subject: {subject}\n\n{message}"),
                    None => message,
                };
                slot.append_text(&text)?;
                slot.complete()
            }
            // "No result" completes into an empty draft, not a failure.
            AtomicResult::Empty => slot.complete(),
        });
        self.finish(key, applied)
    }

    /// Applies frames strictly in arrival order until transport closure —
    /// the sole end-of-stream signal ([DONE] is only a continuation marker).
    /// Each wait is bounded by the idle timeout.
    async fn drive_stream(
        &self,
        key: SlotKey,
        ticket: u64,
        mut frames: FrameStream,
    ) -> Result<(), DraftError> {
        loop {
            let next = match timeout(self.stream_idle_timeout, frames.next()).await {
                Ok(next) => next,
                Err(_) => {
                    let reason = DraftError::Transport(format!(
                        "timed out: stream idle for more than {}s",
                        self.stream_idle_timeout.as_secs()
                    ));
                    return self.fail_slot(key, ticket, reason);
                }
            };

            match next {
                Some(Ok(frame)) => {
                    let applied = self
                        .registry()
                        .with_live(key, ticket, |slot| apply_frame(slot, frame));
                    match applied {
                        Ok(()) => {}
                        Err(DraftError::Stale { .. }) => {
                            debug!(%key, ticket, "superseded; dropping remaining stream");
                            return Ok(());
                        }
                        Err(err) => return Err(err),
                    }
                }
                Some(Err(err)) => return self.fail_slot(key, ticket, err),
                None => {
                    let applied = self.registry().with_live(key, ticket, |slot| slot.complete());
                    let done = self.finish(key, applied);
                    if done.is_ok() {
                        info!(%key, "stream complete; draft ready for review");
                    }
                    return done;
                }
            }
        }
    }

    /// A Stale outcome is bookkeeping for a superseded call, not a failure.
    fn finish(&self, key: SlotKey, applied: Result<(), DraftError>) -> Result<(), DraftError> {
        match applied {
            Ok(()) => Ok(()),
            Err(DraftError::Stale { .. }) => {
                debug!(%key, "stale result discarded");
                Ok(())
            }
            Err(err) => Err(err),
        }
    }

    fn fail_slot(&self, key: SlotKey, ticket: u64, err: DraftError) -> Result<(), DraftError> {
        let applied = self
            .registry()
            .with_live(key, ticket, |slot| slot.fail(err.clone()));
        match applied {
            Ok(()) => {
                warn!(%key, %err, "generation failed; buffered text retained");
                Err(err)
            }
            Err(DraftError::Stale { .. }) => {
                debug!(%key, "failure from superseded call discarded");
                Ok(())
            }
            Err(other) => Err(other),
        }
    }

    // ── Review and edit (local, no network) ─────────────────────────────

    pub fn begin_edit(&self, key: SlotKey) -> Result<(), DraftError> {
        self.registry().modify(key, |slot| slot.begin_edit())
    }

    pub fn save_edit(&self, key: SlotKey, text: String) -> Result<(), DraftError> {
        self.registry().modify(key, |slot| slot.save_edit(text))
    }

    pub fn begin_edit_candidate(&self, key: SlotKey, index: usize) -> Result<(), DraftError> {
        self.registry()
            .modify(key, |slot| slot.begin_edit_candidate(index))
    }

    pub fn save_candidate(
        &self,
        key: SlotKey,
        index: usize,
        text: String,
    ) -> Result<(), DraftError> {
        self.registry()
            .modify(key, |slot| slot.save_candidate(index, text))
    }

    // ── Acceptance ──────────────────────────────────────────────────────

    /// Persists the reviewed draft. On success the slot becomes Accepted and
    /// the cached authoritative entity is replaced. On failure the slot
    /// returns to PreviewReady with its content intact; the error is both
    /// returned and surfaced on the slot. Accepting an Accepted slot is a
    /// no-op.
    pub async fn accept(&self, key: SlotKey) -> Result<(), DraftError> {
        let text = {
            let outcome = self.registry().modify(key, |slot| {
                if slot.status == SlotStatus::Accepted {
                    return Ok(None);
                }
                slot.mark_accepting()?;
                Ok(Some(slot.buffer.clone()))
            })?;
            match outcome {
                Some(text) => text,
                None => {
                    debug!(%key, "already accepted; nothing to persist");
                    return Ok(());
                }
            }
        };

        match self.sink.persist(&key, &text).await {
            Ok(entity) => {
                info!(%key, "draft accepted and persisted");
                self.cache.put(key.entity_id, entity);
                self.registry().modify(key, |slot| slot.mark_accepted())
            }
            Err(err) => {
                warn!(%key, %err, "persist failed; draft retained for retry");
                self.registry()
                    .modify(key, |slot| slot.revert_accepting(err.clone()))?;
                Err(err)
            }
        }
    }

    /// Fan-out acceptance: collapses the answer set to the chosen candidate,
    /// discarding the rest, then persists it.
    pub async fn accept_candidate(&self, key: SlotKey, index: usize) -> Result<(), DraftError> {
        self.registry()
            .modify(key, |slot| slot.collapse_candidate(index))?;
        self.accept(key).await
    }

    // ── Cancel and discard ──────────────────────────────────────────────

    /// Best-effort cancellation: the server may keep producing, but the
    /// bumped ticket guarantees late arrivals never mutate the slot. The
    /// partial buffer is frozen into PreviewReady — generation is expensive
    /// to redo.
    pub fn cancel(&self, key: SlotKey) -> Result<(), DraftError> {
        let mut registry = self.registry();
        registry.bump_ticket(key);
        let applied = registry.modify(key, |slot| {
            if slot.status == SlotStatus::Generating {
                slot.complete()
            } else {
                Ok(())
            }
        });
        match applied {
            Ok(()) => {
                info!(%key, "generation canceled; partial draft retained");
                Ok(())
            }
            Err(DraftError::SlotNotFound(_)) => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Removes the live slot entirely (back to Idle for the key). Stored
    /// guidance survives for the next trigger.
    pub fn discard(&self, key: SlotKey) {
        let mut registry = self.registry();
        registry.bump_ticket(key);
        if registry.remove(key).is_some() {
            info!(%key, "draft discarded");
        }
    }
}

fn apply_frame(slot: &mut DraftSlot, frame: Frame) -> Result<(), DraftError> {
    match frame {
        Frame::Text(text) => slot.append_text(&text),
        Frame::Artifact(artifact) => slot.append_artifact(artifact),
        Frame::ParagraphBreak => slot.append_paragraph_break(),
        Frame::Continuation => Ok(()), // [DONE] is not authoritative
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
