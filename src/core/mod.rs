//! core
//!
//! Core domain types and naming rules for Folio.
//!
//! # Modules
//!
//! - [`types`] - Strong types: WorkspaceName, ContentStreamId, NodeAggregateId, etc.
//! - [`naming`] - Deterministic event-stream naming
//!
//! # Design Principles
//!
//! - Strong typing prevents invalid states at compile time
//! - Stream names are derived, never stored

pub mod naming;
pub mod types;
