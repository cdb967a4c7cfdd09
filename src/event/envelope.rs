//! event::envelope
//!
//! Event envelopes: identity, causation/correlation linkage, and the
//! recorded-command metadata that makes an event replayable.
//!
//! # Recorded commands
//!
//! There is no separate command log. Every event produced by a rebasable
//! command carries the serialized command as metadata; rebase and partial
//! publish reconstruct commands from exactly this record. Sibling events of
//! one command share a correlation id and point at the first event of the
//! command as their causation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

use crate::command::RebasableCommand;
use crate::event::payload::DomainEvent;

/// Errors from envelope metadata handling.
#[derive(Debug, Error)]
pub enum MetadataError {
    /// The recorded command payload could not be serialized.
    #[error("failed to record command: {0}")]
    Record(serde_json::Error),

    /// The recorded command payload could not be reconstructed.
    #[error("failed to reconstruct recorded command: {0}")]
    Reconstruct(serde_json::Error),
}

/// Unique identifier of a single event.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(String);

impl EventId {
    /// Generate a new unique event id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create an EventId from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Correlation id shared by all events produced by one command.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generate a new unique correlation id.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for CorrelationId {
    fn default() -> Self {
        Self::new()
    }
}

/// A serialized command, persisted as event metadata.
///
/// Stored in the tagged `{kind, payload}` representation of
/// [`RebasableCommand`]; reconstruction dispatches on the tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordedCommand(serde_json::Value);

impl RecordedCommand {
    /// Record a command for later replay.
    pub fn record(command: &RebasableCommand) -> Result<Self, MetadataError> {
        serde_json::to_value(command)
            .map(Self)
            .map_err(MetadataError::Record)
    }

    /// Reconstruct the command from its recorded representation.
    pub fn reconstruct(&self) -> Result<RebasableCommand, MetadataError> {
        serde_json::from_value(self.0.clone()).map_err(MetadataError::Reconstruct)
    }

    /// The recorded command kind tag.
    pub fn kind(&self) -> Option<&str> {
        self.0.get("type").and_then(|v| v.as_str())
    }
}

/// Metadata attached to a persisted event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EventMetadata {
    /// The command that produced this event, if it was rebasable.
    pub command: Option<RecordedCommand>,
    /// Shared by all events of one command.
    pub correlation_id: Option<CorrelationId>,
    /// Id of the first event of the producing command.
    pub causation_id: Option<EventId>,
}

/// A persisted event: payload plus identity and metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventEnvelope {
    /// Unique event identity.
    pub id: EventId,
    /// The domain event itself.
    pub payload: DomainEvent,
    /// Replay and linkage metadata.
    pub metadata: EventMetadata,
    /// Wall-clock record time.
    pub recorded_at: DateTime<Utc>,
}

impl EventEnvelope {
    /// Wrap a plain event without command metadata.
    ///
    /// Used for stream and workspace lifecycle events, which are never
    /// replayed.
    pub fn plain(payload: DomainEvent) -> Self {
        Self {
            id: EventId::new(),
            payload,
            metadata: EventMetadata::default(),
            recorded_at: Utc::now(),
        }
    }

    /// Wrap the events produced by one command.
    ///
    /// All envelopes share a fresh correlation id and carry the serialized
    /// command; every envelope after the first points at the first as its
    /// causation.
    pub fn batch_for_command(
        events: Vec<DomainEvent>,
        command: &RebasableCommand,
    ) -> Result<Vec<Self>, MetadataError> {
        let recorded = RecordedCommand::record(command)?;
        let correlation = CorrelationId::new();
        let mut envelopes = Vec::with_capacity(events.len());
        let mut first_id: Option<EventId> = None;

        for payload in events {
            let id = EventId::new();
            let causation = first_id.clone();
            if first_id.is_none() {
                first_id = Some(id.clone());
            }
            envelopes.push(Self {
                id,
                payload,
                metadata: EventMetadata {
                    command: Some(recorded.clone()),
                    correlation_id: Some(correlation.clone()),
                    causation_id: causation,
                },
                recorded_at: Utc::now(),
            });
        }

        Ok(envelopes)
    }

    /// Copy this event for publication onto another stream.
    ///
    /// The payload and metadata travel verbatim; the copy gets a fresh
    /// identity and record time.
    pub fn republished(&self) -> Self {
        Self {
            id: EventId::new(),
            payload: self.payload.clone(),
            metadata: self.metadata.clone(),
            recorded_at: Utc::now(),
        }
    }
}

/// A stable digest over an event sequence's payloads.
///
/// Identity and record times are excluded, so two replays of the same
/// commands against the same state produce equal fingerprints even though
/// every event id differs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SequenceFingerprint(String);

impl SequenceFingerprint {
    /// Compute the fingerprint of an envelope sequence, in order.
    pub fn compute(envelopes: &[EventEnvelope]) -> Self {
        let mut hasher = Sha256::new();
        for envelope in envelopes {
            // Payload serialization is deterministic: maps are BTree-backed.
            let json = serde_json::to_string(&envelope.payload)
                .expect("domain events serialize infallibly");
            hasher.update(json.as_bytes());
            hasher.update(b"\n");
        }
        Self(hex::encode(hasher.finalize()))
    }

    /// Get the fingerprint as a hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SequenceFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
