//! Replay log for non-deterministic workflow primitives.
//!
//! A workflow execution records every side effect, version decision,
//! random number, UUID, clock reading and completed timer it produces as a
//! [`ReplayMarker`], keyed by a
//! single sequence counter that advances in call order. When the execution
//! is re-delivered with that history, the markers are handed back in the
//! same order instead of being recomputed.
//!
//! ## How it works
//!
//! 1. State is built from the recorded history (possibly empty)
//! 2. Each primitive first calls [`ReplayState::replay_next`]
//! 3. `Some(value)` means the call is replaying and must not re-run its producer
//! 4. `None` means live execution: produce the value, [`ReplayState::prepare`]
//!    its marker, persist it, then [`ReplayState::commit`] it
//!
//! ```ignore
//! let value = match state.replay_next(MarkerKind::SideEffect, None)? {
//!     Some(recorded) => recorded,
//!     None => {
//!         let fresh = run_side_effect();
//!         let marker = state.prepare(MarkerKind::SideEffect, None, fresh.clone());
//!         persist(&marker).await?;
//!         state.commit(marker)?;
//!         fresh
//!     }
//! };
//! ```
//!
//! A marker whose persist fails is never committed, so the local log only
//! holds what the proxy stored.

use crate::error::DeterminismViolationError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The primitive that produced a marker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerKind {
    SideEffect,
    Version,
    Random,
    Uuid,
    /// Workflow clock reading, in nanoseconds since the Unix epoch
    Now,
    /// A durable timer that fired; the value is its length in nanoseconds
    Sleep,
}

/// One recorded non-deterministic result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayMarker {
    pub sequence: u32,
    pub kind: MarkerKind,
    /// Change id for version markers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub value: Value,
}

crate::json_property_field!(ReplayMarker, Vec<ReplayMarker>);

/// Per-execution replay state.
///
/// An execution replays while the sequence counter is behind the recorded
/// history and runs live once it catches up. An execution delivered with no
/// history at all never enters replay, even when the caller asked for one:
/// there is nothing to replay against, so `replay_requested` is kept only
/// for reporting.
#[derive(Debug, Clone, Default)]
pub struct ReplayState {
    markers: Vec<ReplayMarker>,
    history_len: usize,
    next_sequence: u32,
    replay_requested: bool,
}

impl ReplayState {
    /// State for a brand-new execution
    pub fn new() -> Self {
        Self::default()
    }

    /// State for an execution re-delivered with recorded markers
    pub fn from_history(history: Vec<ReplayMarker>, replay_requested: bool) -> Self {
        if replay_requested && history.is_empty() {
            tracing::debug!("Replay requested for an execution without history; running live");
        }
        Self {
            history_len: history.len(),
            markers: history,
            next_sequence: 0,
            replay_requested,
        }
    }

    /// True while recorded markers remain to be consumed
    pub fn is_replaying(&self) -> bool {
        (self.next_sequence as usize) < self.history_len
    }

    /// Whether the delivering side asked for a replay
    pub fn replay_requested(&self) -> bool {
        self.replay_requested
    }

    /// Sequence number the next primitive call will use
    pub fn next_sequence(&self) -> u32 {
        self.next_sequence
    }

    /// Every marker known so far: the history followed by new recordings
    pub fn markers(&self) -> &[ReplayMarker] {
        &self.markers
    }

    /// Markers recorded by live execution since this state was built
    pub fn new_markers(&self) -> &[ReplayMarker] {
        &self.markers[self.history_len..]
    }

    /// Consume the next recorded marker if replaying.
    ///
    /// Returns `Ok(None)` without advancing when history is exhausted. A
    /// recorded marker of another kind, or a version marker for another
    /// change id, is a determinism violation.
    pub fn replay_next(
        &mut self,
        kind: MarkerKind,
        label: Option<&str>,
    ) -> Result<Option<Value>, DeterminismViolationError> {
        if !self.is_replaying() {
            return Ok(None);
        }
        let marker = &self.markers[self.next_sequence as usize];
        if marker.kind != kind {
            return Err(DeterminismViolationError::KindMismatch {
                sequence: self.next_sequence,
                expected: marker.kind,
                actual: kind,
            });
        }
        if kind == MarkerKind::Version && marker.label.as_deref() != label {
            return Err(DeterminismViolationError::ChangeIdMismatch {
                sequence: self.next_sequence,
                expected: marker.label.clone().unwrap_or_default(),
                actual: label.unwrap_or_default().to_string(),
            });
        }
        let value = marker.value.clone();
        self.next_sequence += 1;
        Ok(Some(value))
    }

    /// The marker a live call would append next. Nothing changes until it
    /// is passed to [`ReplayState::commit`].
    pub fn prepare(&self, kind: MarkerKind, label: Option<&str>, value: Value) -> ReplayMarker {
        ReplayMarker {
            sequence: self.next_sequence,
            kind,
            label: label.map(str::to_string),
            value,
        }
    }

    /// Append a prepared marker. It must carry the current sequence number.
    pub fn commit(&mut self, marker: ReplayMarker) -> Result<(), DeterminismViolationError> {
        if self.is_replaying() || marker.sequence != self.next_sequence {
            return Err(DeterminismViolationError::CorruptMarker {
                sequence: marker.sequence,
                reason: format!(
                    "prepared out of turn; the log is at sequence {} of {} recorded",
                    self.next_sequence,
                    self.markers.len()
                ),
            });
        }
        self.markers.push(marker);
        self.next_sequence += 1;
        Ok(())
    }

    /// Append a freshly produced value and return its marker
    pub fn record(&mut self, kind: MarkerKind, label: Option<&str>, value: Value) -> ReplayMarker {
        let marker = self.prepare(kind, label, value);
        self.markers.push(marker.clone());
        self.next_sequence += 1;
        marker
    }
}
