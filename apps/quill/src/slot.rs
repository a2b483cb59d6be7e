//! Draft Slot — the per-content state machine.
//!
//! One slot exists per (entity, field) pair with generation in progress or a
//! draft awaiting review. The slot owns the text buffer (append-only while
//! Generating, frozen after), the ordered artifact list, and the last error.
//! "No live slot" is the Idle state; discard removes the slot entirely.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DraftError;

// ────────────────────────────────────────────────────────────────────────────
// Keys
// ────────────────────────────────────────────────────────────────────────────

/// Every generatable content field in the tracker. The wire name (`as_str`)
/// is both the generation endpoint segment and the entity field updated on
/// accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentField {
    CoverLetter,
    LinkedinMessage,
    QuestionsToAsk,
    PrepNotes,
    ResearchNotes,
    FollowUpNote,
    TranscriptAnalysis,
    CandidateAnswers,
}

impl ContentField {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CoverLetter => "cover_letter",
            Self::LinkedinMessage => "linkedin_message",
            Self::QuestionsToAsk => "questions_to_ask",
            Self::PrepNotes => "prep_notes",
            Self::ResearchNotes => "research_notes",
            Self::FollowUpNote => "follow_up_note",
            Self::TranscriptAnalysis => "transcript_analysis",
            Self::CandidateAnswers => "candidate_answers",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "cover_letter" => Some(Self::CoverLetter),
            "linkedin_message" => Some(Self::LinkedinMessage),
            "questions_to_ask" => Some(Self::QuestionsToAsk),
            "prep_notes" => Some(Self::PrepNotes),
            "research_notes" => Some(Self::ResearchNotes),
            "follow_up_note" => Some(Self::FollowUpNote),
            "transcript_analysis" => Some(Self::TranscriptAnalysis),
            "candidate_answers" => Some(Self::CandidateAnswers),
            _ => None,
        }
    }
}

impl fmt::Display for ContentField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one content slot: the owning entity (role or interview) plus
/// the field being drafted. At most one live slot exists per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotKey {
    pub entity_id: Uuid,
    pub field: ContentField,
}

impl SlotKey {
    pub fn new(entity_id: Uuid, field: ContentField) -> Self {
        Self { entity_id, field }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity_id, self.field)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Slot contents
// ────────────────────────────────────────────────────────────────────────────

/// Side-channel record emitted during generation, referencing a produced
/// file or asset. Independent of the text buffer; appended in arrival order
/// and never removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub kind: String,
    pub path: String,
    pub created_at: DateTime<Utc>,
}

/// One draft in a fan-out answer set. `edited` is non-None only while the
/// candidate is being edited; the saved `text` is what persists on accept.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub text: String,
    pub edited: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    Idle,
    Generating,
    PreviewReady,
    Editing,
    Accepting,
    Accepted,
    Failed,
}

impl SlotStatus {
    /// Accepted is terminal for a slot instance; regeneration replaces the
    /// instance wholesale under the same key.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Accepted)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Generating => "generating",
            Self::PreviewReady => "preview_ready",
            Self::Editing => "editing",
            Self::Accepting => "accepting",
            Self::Accepted => "accepted",
            Self::Failed => "failed",
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// State machine
// ────────────────────────────────────────────────────────────────────────────

/// Per-content draft state. The buffer is always exactly what persists on
/// accept, except while Editing, where `edited` is canonical until saved.
#[derive(Debug, Clone)]
pub struct DraftSlot {
    pub key: SlotKey,
    pub status: SlotStatus,
    /// Generated text. Append-only while Generating, frozen thereafter.
    pub buffer: String,
    /// Editable copy of the buffer. Non-None only while Editing.
    pub edited: Option<String>,
    /// Fan-out candidates. Set only when generation completed into an
    /// answer set; None for single-draft slots.
    pub candidates: Option<Vec<Candidate>>,
    pub artifacts: Vec<Artifact>,
    /// Most recent error, retained alongside the buffered content.
    pub error: Option<DraftError>,
    ticket: u64,
}

impl DraftSlot {
    /// A fresh Generating slot stamped with its supersede ticket.
    pub fn generating(key: SlotKey, ticket: u64) -> Self {
        Self {
            key,
            status: SlotStatus::Generating,
            buffer: String::new(),
            edited: None,
            candidates: None,
            artifacts: Vec::new(),
            error: None,
            ticket,
        }
    }

    /// The supersede ticket stamped at creation. Frames tagged with an older
    /// ticket than the registry's current one never reach this slot.
    pub fn ticket(&self) -> u64 {
        self.ticket
    }

    fn require(&self, expected: SlotStatus, op: &'static str) -> Result<(), DraftError> {
        if self.status == expected {
            Ok(())
        } else {
            Err(DraftError::InvalidTransition {
                from: self.status,
                op,
            })
        }
    }

    // ── Generating ──────────────────────────────────────────────────────

    pub fn append_text(&mut self, text: &str) -> Result<(), DraftError> {
        self.require(SlotStatus::Generating, "append text")?;
        self.buffer.push_str(text);
        Ok(())
    }

    /// Renders as a blank line in the assembled draft.
    pub fn append_paragraph_break(&mut self) -> Result<(), DraftError> {
        self.require(SlotStatus::Generating, "append paragraph break")?;
        self.buffer.push_str("\n\n");
        Ok(())
    }

    pub fn append_artifact(&mut self, artifact: Artifact) -> Result<(), DraftError> {
        self.require(SlotStatus::Generating, "append artifact")?;
        self.artifacts.push(artifact);
        Ok(())
    }

    /// Generation finished (atomic result applied, or the stream closed).
    /// The buffer freezes until regeneration replaces the slot.
    pub fn complete(&mut self) -> Result<(), DraftError> {
        self.require(SlotStatus::Generating, "complete")?;
        self.status = SlotStatus::PreviewReady;
        Ok(())
    }

    /// Fan-out completion: generation produced an answer set instead of a
    /// single draft. Each candidate is reviewed and edited independently.
    pub fn complete_set(&mut self, texts: Vec<String>) -> Result<(), DraftError> {
        self.require(SlotStatus::Generating, "complete into answer set")?;
        self.candidates = Some(
            texts
                .into_iter()
                .map(|text| Candidate { text, edited: None })
                .collect(),
        );
        self.status = SlotStatus::PreviewReady;
        Ok(())
    }

    /// Transport or decode failure. Buffered text is retained — generation
    /// is expensive to redo.
    pub fn fail(&mut self, error: DraftError) -> Result<(), DraftError> {
        self.require(SlotStatus::Generating, "fail")?;
        self.status = SlotStatus::Failed;
        self.error = Some(error);
        Ok(())
    }

    // ── Editing ─────────────────────────────────────────────────────────

    pub fn begin_edit(&mut self) -> Result<(), DraftError> {
        self.require(SlotStatus::PreviewReady, "begin edit")?;
        if self.candidates.is_some() {
            return Err(DraftError::InvalidTransition {
                from: self.status,
                op: "begin edit on an answer set (edit a candidate instead)",
            });
        }
        self.edited = Some(self.buffer.clone());
        self.status = SlotStatus::Editing;
        Ok(())
    }

    /// Pure local operation: the buffer is fully overwritten by the edited
    /// text. No network call.
    pub fn save_edit(&mut self, text: String) -> Result<(), DraftError> {
        self.require(SlotStatus::Editing, "save edit")?;
        self.buffer = text;
        self.edited = None;
        self.status = SlotStatus::PreviewReady;
        Ok(())
    }

    // ── Fan-out candidates ──────────────────────────────────────────────

    fn candidate_mut(&mut self, index: usize, op: &'static str) -> Result<&mut Candidate, DraftError> {
        let status = self.status;
        self.candidates
            .as_mut()
            .and_then(|c| c.get_mut(index))
            .ok_or(DraftError::InvalidTransition { from: status, op })
    }

    pub fn begin_edit_candidate(&mut self, index: usize) -> Result<(), DraftError> {
        self.require(SlotStatus::PreviewReady, "edit candidate")?;
        let candidate = self.candidate_mut(index, "edit candidate")?;
        candidate.edited = Some(candidate.text.clone());
        Ok(())
    }

    pub fn save_candidate(&mut self, index: usize, text: String) -> Result<(), DraftError> {
        self.require(SlotStatus::PreviewReady, "save candidate")?;
        let candidate = self.candidate_mut(index, "save candidate")?;
        if candidate.edited.is_none() {
            return Err(DraftError::InvalidTransition {
                from: SlotStatus::PreviewReady,
                op: "save a candidate that is not being edited",
            });
        }
        candidate.text = text;
        candidate.edited = None;
        Ok(())
    }

    /// Collapses the answer set into a single-draft slot holding the chosen
    /// candidate's saved text. The remaining candidates are discarded.
    pub fn collapse_candidate(&mut self, index: usize) -> Result<(), DraftError> {
        self.require(SlotStatus::PreviewReady, "accept candidate")?;
        let text = self
            .candidates
            .as_ref()
            .and_then(|c| c.get(index))
            .map(|c| c.text.clone())
            .ok_or(DraftError::InvalidTransition {
                from: SlotStatus::PreviewReady,
                op: "accept candidate",
            })?;
        self.buffer = text;
        self.candidates = None;
        Ok(())
    }

    // ── Acceptance ──────────────────────────────────────────────────────

    pub fn mark_accepting(&mut self) -> Result<(), DraftError> {
        self.require(SlotStatus::PreviewReady, "accept")?;
        if self.candidates.is_some() {
            return Err(DraftError::InvalidTransition {
                from: self.status,
                op: "accept an uncollapsed answer set",
            });
        }
        self.status = SlotStatus::Accepting;
        Ok(())
    }

    pub fn mark_accepted(&mut self) -> Result<(), DraftError> {
        self.require(SlotStatus::Accepting, "mark accepted")?;
        self.status = SlotStatus::Accepted;
        Ok(())
    }

    /// Persist failed: back to PreviewReady with the buffer unchanged and
    /// the error surfaced on the slot.
    pub fn revert_accepting(&mut self, error: DraftError) -> Result<(), DraftError> {
        self.require(SlotStatus::Accepting, "revert accept")?;
        self.status = SlotStatus::PreviewReady;
        self.error = Some(error);
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
