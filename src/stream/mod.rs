//! stream
//!
//! Content stream lifecycle: projection and command handler.
//!
//! # Model
//!
//! A content stream is an identified, append-only event log representing one
//! mutable branch of graph history. Its first event is always its creation
//! or fork event; once closed, nothing appends until it is reopened; removal
//! is a tombstone event, never a physical truncation.
//!
//! # Invariants
//!
//! - A stream has exactly one creation/fork event, and it comes first
//! - Version advances only through conditional append
//! - A second creation event in one log is a data-corruption signal

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::core::naming::EventStreamName;
use crate::core::types::{ContentStreamId, StreamVersion};
use crate::event::payload::DomainEvent;
use crate::event::store::{EventStore, ExpectedVersion, StoreError};
use crate::event::EventEnvelope;

/// Lifecycle state of a content stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamState {
    /// Accepts appends.
    Open,
    /// Rejects appends until reopened.
    Closed,
}

/// Errors from content stream operations.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The target stream already has events.
    #[error("content stream {0} already exists")]
    AlreadyExists(ContentStreamId),

    /// The stream has no events (or only a removal tombstone).
    #[error("content stream {0} does not exist")]
    DoesNotExist(ContentStreamId),

    /// The stream is closed and the operation requires it open.
    #[error("content stream {0} is closed")]
    IsClosed(ContentStreamId),

    /// The stream is open and the operation requires it closed.
    #[error("content stream {0} is not closed")]
    IsNotClosed(ContentStreamId),

    /// The stream's event log violates a structural invariant.
    ///
    /// Unrecoverable; never retried.
    #[error("content stream {id} is corrupt: {reason}")]
    Corrupt { id: ContentStreamId, reason: String },

    /// The event store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Materialized state of one content stream, folded from its event log.
#[derive(Debug, Clone, PartialEq)]
pub struct ContentStream {
    /// Stream identity.
    pub id: ContentStreamId,
    /// Event count.
    pub version: StreamVersion,
    /// Open or closed.
    pub state: StreamState,
    /// Whether the removal tombstone has been appended.
    pub removed: bool,
    /// Fork record: (source stream, source version at fork time).
    pub fork: Option<(ContentStreamId, StreamVersion)>,
}

impl ContentStream {
    /// Load a stream's state from the store.
    ///
    /// Returns `None` when the stream has no events. Removed streams still
    /// load (history stays queryable); callers decide whether a tombstone
    /// counts as absence.
    pub fn load(
        store: &dyn EventStore,
        id: &ContentStreamId,
    ) -> Result<Option<Self>, StreamError> {
        let envelopes = store.load(&EventStreamName::for_content_stream(id))?;
        if envelopes.is_empty() {
            return Ok(None);
        }

        let mut state = StreamState::Open;
        let mut removed = false;
        let mut fork = None;
        let mut initialized = false;

        for (position, envelope) in envelopes.iter().enumerate() {
            match &envelope.payload {
                DomainEvent::ContentStreamWasCreated { .. }
                | DomainEvent::ContentStreamWasForked { .. }
                    if position > 0 =>
                {
                    return Err(StreamError::Corrupt {
                        id: id.clone(),
                        reason: "creation or fork event is not the stream's first event".into(),
                    });
                }
                DomainEvent::ContentStreamWasCreated { .. } => {
                    initialized = true;
                }
                DomainEvent::ContentStreamWasForked {
                    source_id,
                    source_version,
                    ..
                } => {
                    initialized = true;
                    fork = Some((source_id.clone(), *source_version));
                }
                DomainEvent::ContentStreamWasClosed { .. } => {
                    state = StreamState::Closed;
                }
                DomainEvent::ContentStreamWasReopened { previous_state, .. } => {
                    state = *previous_state;
                }
                DomainEvent::ContentStreamWasRemoved { .. } => {
                    removed = true;
                }
                _ => {}
            }
        }

        if !initialized {
            return Err(StreamError::Corrupt {
                id: id.clone(),
                reason: "first event is not a creation or fork event".into(),
            });
        }

        Ok(Some(Self {
            id: id.clone(),
            version: StreamVersion::new(envelopes.len() as u64),
            state,
            removed,
            fork,
        }))
    }

    /// Whether the stream accepts appends.
    pub fn is_open(&self) -> bool {
        self.state == StreamState::Open && !self.removed
    }
}

/// Creates, forks, closes, reopens, and removes content streams.
pub struct ContentStreamCommandHandler<'a> {
    store: &'a dyn EventStore,
}

impl<'a> ContentStreamCommandHandler<'a> {
    /// Create a handler over the given store.
    pub fn new(store: &'a dyn EventStore) -> Self {
        Self { store }
    }

    fn stream_name(id: &ContentStreamId) -> EventStreamName {
        EventStreamName::for_content_stream(id)
    }

    /// Create a fresh content stream.
    ///
    /// # Errors
    ///
    /// `StreamError::AlreadyExists` when the stream already has events.
    pub fn create(&self, id: &ContentStreamId) -> Result<EventEnvelope, StreamError> {
        debug!(stream = %id, "creating content stream");
        let envelope = EventEnvelope::plain(DomainEvent::ContentStreamWasCreated {
            id: id.clone(),
        });
        self.store
            .append(
                &Self::stream_name(id),
                vec![envelope.clone()],
                ExpectedVersion::NoStream,
            )
            .map_err(|err| match err {
                StoreError::ConcurrencyConflict { .. } => {
                    StreamError::AlreadyExists(id.clone())
                }
                other => StreamError::Store(other),
            })?;
        Ok(envelope)
    }

    /// Fork a content stream off a source stream.
    ///
    /// Records the source's current version in the fork event; conflict
    /// detection at publish time compares against it.
    ///
    /// # Errors
    ///
    /// - `StreamError::DoesNotExist` when the source is absent or removed
    /// - `StreamError::IsClosed` when the source is closed
    /// - `StreamError::AlreadyExists` when the target id is taken
    pub fn fork(
        &self,
        new_id: &ContentStreamId,
        source_id: &ContentStreamId,
    ) -> Result<EventEnvelope, StreamError> {
        let source = ContentStream::load(self.store, source_id)?
            .filter(|s| !s.removed)
            .ok_or_else(|| StreamError::DoesNotExist(source_id.clone()))?;
        if source.state == StreamState::Closed {
            return Err(StreamError::IsClosed(source_id.clone()));
        }

        debug!(stream = %new_id, source = %source_id, source_version = %source.version, "forking content stream");
        let envelope = EventEnvelope::plain(DomainEvent::ContentStreamWasForked {
            id: new_id.clone(),
            source_id: source_id.clone(),
            source_version: source.version,
        });
        self.store
            .append(
                &Self::stream_name(new_id),
                vec![envelope.clone()],
                ExpectedVersion::NoStream,
            )
            .map_err(|err| match err {
                StoreError::ConcurrencyConflict { .. } => {
                    StreamError::AlreadyExists(new_id.clone())
                }
                other => StreamError::Store(other),
            })?;
        Ok(envelope)
    }

    /// Close a stream, blocking further appends until reopened.
    ///
    /// # Errors
    ///
    /// - `StreamError::DoesNotExist` when the stream is absent
    /// - `StreamError::IsClosed` when it is already closed
    pub fn close(&self, id: &ContentStreamId) -> Result<EventEnvelope, StreamError> {
        let stream = ContentStream::load(self.store, id)?
            .ok_or_else(|| StreamError::DoesNotExist(id.clone()))?;
        if stream.state == StreamState::Closed {
            return Err(StreamError::IsClosed(id.clone()));
        }

        debug!(stream = %id, "closing content stream");
        let envelope =
            EventEnvelope::plain(DomainEvent::ContentStreamWasClosed { id: id.clone() });
        self.store.append(
            &Self::stream_name(id),
            vec![envelope.clone()],
            ExpectedVersion::Exact(stream.version),
        )?;
        Ok(envelope)
    }

    /// Reopen a closed stream, restoring the recorded pre-close state.
    ///
    /// # Errors
    ///
    /// - `StreamError::DoesNotExist` when the stream is absent
    /// - `StreamError::IsNotClosed` when it is not closed
    pub fn reopen(
        &self,
        id: &ContentStreamId,
        previous_state: StreamState,
    ) -> Result<EventEnvelope, StreamError> {
        let stream = ContentStream::load(self.store, id)?
            .ok_or_else(|| StreamError::DoesNotExist(id.clone()))?;
        if stream.state != StreamState::Closed {
            return Err(StreamError::IsNotClosed(id.clone()));
        }

        debug!(stream = %id, ?previous_state, "reopening content stream");
        let envelope = EventEnvelope::plain(DomainEvent::ContentStreamWasReopened {
            id: id.clone(),
            previous_state,
        });
        self.store.append(
            &Self::stream_name(id),
            vec![envelope.clone()],
            ExpectedVersion::Exact(stream.version),
        )?;
        Ok(envelope)
    }

    /// Append the removal tombstone.
    ///
    /// History remains queryable; the stream is simply no longer in use.
    ///
    /// # Errors
    ///
    /// `StreamError::DoesNotExist` when the stream is absent.
    pub fn remove(&self, id: &ContentStreamId) -> Result<EventEnvelope, StreamError> {
        let stream = ContentStream::load(self.store, id)?
            .ok_or_else(|| StreamError::DoesNotExist(id.clone()))?;

        debug!(stream = %id, "removing content stream");
        let envelope =
            EventEnvelope::plain(DomainEvent::ContentStreamWasRemoved { id: id.clone() });
        self.store.append(
            &Self::stream_name(id),
            vec![envelope.clone()],
            ExpectedVersion::Exact(stream.version),
        )?;
        Ok(envelope)
    }
}
