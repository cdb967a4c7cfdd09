//! event
//!
//! Domain events, envelopes, and the event store boundary.
//!
//! # Modules
//!
//! - [`payload`] - The domain event set
//! - [`envelope`] - Event identity, metadata, and sequence fingerprints
//! - [`store`] - Conditional-append store trait and in-memory implementation

pub mod envelope;
pub mod payload;
pub mod store;

pub use envelope::{
    CorrelationId, EventEnvelope, EventId, EventMetadata, MetadataError, RecordedCommand,
    SequenceFingerprint,
};
pub use payload::DomainEvent;
pub use store::{EventStore, ExpectedVersion, InMemoryEventStore, StoreError};
