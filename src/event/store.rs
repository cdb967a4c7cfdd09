//! event::store
//!
//! The event store boundary.
//!
//! # Design
//!
//! The physical log is a collaborator; the core sees it through the
//! [`EventStore`] trait: atomic conditional append and ordered replay by
//! stream name. All concurrency control happens here: every append states an
//! [`ExpectedVersion`], and a mismatch surfaces as
//! [`StoreError::ConcurrencyConflict`]. Handlers never take locks.
//!
//! [`InMemoryEventStore`] is the reference implementation, used by tests and
//! as the seed for simulator projections.

use std::collections::HashMap;
use std::sync::Mutex;

use thiserror::Error;

use crate::core::naming::EventStreamName;
use crate::core::types::StreamVersion;
use crate::event::envelope::EventEnvelope;

/// The append precondition of a conditional append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedVersion {
    /// Append regardless of the stream's current version.
    Any,
    /// The stream must not exist yet (version 0).
    NoStream,
    /// The stream must be at exactly this version.
    Exact(StreamVersion),
}

impl std::fmt::Display for ExpectedVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Any => write!(f, "any"),
            Self::NoStream => write!(f, "no stream"),
            Self::Exact(version) => write!(f, "{version}"),
        }
    }
}

/// Errors from event store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The append precondition did not hold.
    #[error("concurrency conflict on {stream}: expected version {expected}, actual {actual}")]
    ConcurrencyConflict {
        stream: EventStreamName,
        expected: String,
        actual: StreamVersion,
    },

    /// The backing store failed.
    #[error("event store backend error: {0}")]
    Backend(String),
}

/// Append-only event log, ordered per stream name.
pub trait EventStore {
    /// Conditionally append events to a stream.
    ///
    /// Appending an empty batch is a no-op that still checks the
    /// precondition. Returns the stream's version after the append.
    ///
    /// # Errors
    ///
    /// `StoreError::ConcurrencyConflict` when the stream's current version
    /// does not satisfy `expected`.
    fn append(
        &self,
        stream: &EventStreamName,
        events: Vec<EventEnvelope>,
        expected: ExpectedVersion,
    ) -> Result<StreamVersion, StoreError>;

    /// Load all events of a stream in append order.
    ///
    /// An unknown stream loads as empty.
    fn load(&self, stream: &EventStreamName) -> Result<Vec<EventEnvelope>, StoreError>;

    /// Current version (event count) of a stream. Zero for unknown streams.
    fn version(&self, stream: &EventStreamName) -> Result<StreamVersion, StoreError>;
}

/// In-memory [`EventStore`].
///
/// Interior mutability keeps the trait's `&self` contract; a mutex is
/// sufficient because command execution is single-threaded per invocation.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    streams: Mutex<HashMap<EventStreamName, Vec<EventEnvelope>>>,
}

impl InMemoryEventStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Names of every stream holding at least one event.
    ///
    /// Diagnostic helper; tests use it to assert that failed workflows
    /// leave no stray streams behind.
    pub fn stream_names(&self) -> Vec<EventStreamName> {
        match self.streams.lock() {
            Ok(streams) => streams
                .iter()
                .filter(|(_, log)| !log.is_empty())
                .map(|(name, _)| name.clone())
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}

impl EventStore for InMemoryEventStore {
    fn append(
        &self,
        stream: &EventStreamName,
        events: Vec<EventEnvelope>,
        expected: ExpectedVersion,
    ) -> Result<StreamVersion, StoreError> {
        let mut streams = self
            .streams
            .lock()
            .map_err(|_| StoreError::Backend("store mutex poisoned".into()))?;
        let log = streams.entry(stream.clone()).or_default();
        let actual = StreamVersion::new(log.len() as u64);

        let satisfied = match expected {
            ExpectedVersion::Any => true,
            ExpectedVersion::NoStream => actual == StreamVersion::initial(),
            ExpectedVersion::Exact(version) => actual == version,
        };
        if !satisfied {
            return Err(StoreError::ConcurrencyConflict {
                stream: stream.clone(),
                expected: expected.to_string(),
                actual,
            });
        }

        log.extend(events);
        Ok(StreamVersion::new(log.len() as u64))
    }

    fn load(&self, stream: &EventStreamName) -> Result<Vec<EventEnvelope>, StoreError> {
        let streams = self
            .streams
            .lock()
            .map_err(|_| StoreError::Backend("store mutex poisoned".into()))?;
        Ok(streams.get(stream).cloned().unwrap_or_default())
    }

    fn version(&self, stream: &EventStreamName) -> Result<StreamVersion, StoreError> {
        let streams = self
            .streams
            .lock()
            .map_err(|_| StoreError::Backend("store mutex poisoned".into()))?;
        Ok(StreamVersion::new(
            streams.get(stream).map_or(0, |log| log.len() as u64),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::ContentStreamId;
    use crate::event::payload::DomainEvent;

    fn stream(name: &str) -> EventStreamName {
        EventStreamName::for_content_stream(&ContentStreamId::from_string(name))
    }

    fn created(name: &str) -> EventEnvelope {
        EventEnvelope::plain(DomainEvent::ContentStreamWasCreated {
            id: ContentStreamId::from_string(name),
        })
    }

    #[test]
    fn unknown_stream_is_empty_at_version_zero() {
        let store = InMemoryEventStore::new();
        assert!(store.load(&stream("cs")).unwrap().is_empty());
        assert_eq!(store.version(&stream("cs")).unwrap(), StreamVersion::initial());
    }

    #[test]
    fn append_advances_version() {
        let store = InMemoryEventStore::new();
        let v = store
            .append(&stream("cs"), vec![created("cs")], ExpectedVersion::NoStream)
            .unwrap();
        assert_eq!(v, StreamVersion::new(1));
        assert_eq!(store.version(&stream("cs")).unwrap(), StreamVersion::new(1));
        assert_eq!(store.load(&stream("cs")).unwrap().len(), 1);
    }

    #[test]
    fn no_stream_precondition_rejects_existing_stream() {
        let store = InMemoryEventStore::new();
        store
            .append(&stream("cs"), vec![created("cs")], ExpectedVersion::NoStream)
            .unwrap();

        let err = store
            .append(&stream("cs"), vec![created("cs")], ExpectedVersion::NoStream)
            .unwrap_err();
        assert!(matches!(err, StoreError::ConcurrencyConflict { .. }));
    }

    #[test]
    fn exact_precondition_detects_interleaved_writer() {
        let store = InMemoryEventStore::new();
        store
            .append(&stream("cs"), vec![created("cs")], ExpectedVersion::NoStream)
            .unwrap();

        // A writer that read version 0 before the append above loses the race.
        let err = store
            .append(
                &stream("cs"),
                vec![created("cs")],
                ExpectedVersion::Exact(StreamVersion::initial()),
            )
            .unwrap_err();
        match err {
            StoreError::ConcurrencyConflict { actual, .. } => {
                assert_eq!(actual, StreamVersion::new(1));
            }
            other => panic!("expected concurrency conflict, got {other:?}"),
        }
    }

    #[test]
    fn any_precondition_always_appends() {
        let store = InMemoryEventStore::new();
        store
            .append(&stream("cs"), vec![created("cs")], ExpectedVersion::Any)
            .unwrap();
        store
            .append(&stream("cs"), vec![created("cs")], ExpectedVersion::Any)
            .unwrap();
        assert_eq!(store.version(&stream("cs")).unwrap(), StreamVersion::new(2));
    }

    #[test]
    fn empty_append_checks_precondition_but_writes_nothing() {
        let store = InMemoryEventStore::new();
        let v = store
            .append(&stream("cs"), vec![], ExpectedVersion::NoStream)
            .unwrap();
        assert_eq!(v, StreamVersion::initial());

        let err = store
            .append(
                &stream("cs"),
                vec![],
                ExpectedVersion::Exact(StreamVersion::new(5)),
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::ConcurrencyConflict { .. }));
    }

    #[test]
    fn streams_are_independent() {
        let store = InMemoryEventStore::new();
        store
            .append(&stream("a"), vec![created("a")], ExpectedVersion::NoStream)
            .unwrap();
        assert_eq!(store.version(&stream("b")).unwrap(), StreamVersion::initial());
    }

    #[test]
    fn load_preserves_append_order() {
        let store = InMemoryEventStore::new();
        let first = created("cs");
        let second = created("cs");
        let first_id = first.id.clone();
        let second_id = second.id.clone();

        store
            .append(&stream("cs"), vec![first], ExpectedVersion::NoStream)
            .unwrap();
        store
            .append(
                &stream("cs"),
                vec![second],
                ExpectedVersion::Exact(StreamVersion::new(1)),
            )
            .unwrap();

        let loaded = store.load(&stream("cs")).unwrap();
        assert_eq!(loaded[0].id, first_id);
        assert_eq!(loaded[1].id, second_id);
    }
}
