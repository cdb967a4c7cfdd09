//! Folio - the write side of a branchable, multi-dimensional content store
//!
//! Folio keeps structured content as append-only event logs. A content
//! stream is one mutable branch of history; a workspace is a stable name
//! pointing at a stream, optionally building on a base workspace. Changes
//! accumulate in a workspace's stream and move between workspaces through
//! publish, rebase, partial publish, partial discard, and discard workflows.
//!
//! # Architecture
//!
//! - [`core`] - Identifier and version newtypes, event stream naming
//! - [`event`] - Domain events, envelopes, and the conditional-append store
//! - [`dimension`] - The dimension space and its variation graph
//! - [`nodetype`] - The node-type schema boundary
//! - [`graph`] - Write-side content graph projection
//! - [`constraint`] - Structural constraint checks
//! - [`command`] - The rebasable command set
//! - [`node`] - Node aggregates and the node command handler
//! - [`stream`] - Content stream lifecycle
//! - [`workspace`] - Workspaces and publication workflows
//! - [`simulator`] - Dry-run command execution
//!
//! # Correctness Invariants
//!
//! 1. Concurrency control happens only at the append boundary: every write
//!    states an expected version, and nothing takes a lock
//! 2. Events produced by a rebasable command carry the serialized command,
//!    so any stream can be replayed onto new state
//! 3. Workflows order reversible steps before destructive ones and
//!    compensate on failure
//! 4. A rejected command appends nothing

pub mod command;
pub mod constraint;
pub mod core;
pub mod dimension;
pub mod event;
pub mod graph;
pub mod node;
pub mod nodetype;
pub mod simulator;
pub mod stream;
pub mod workspace;

pub use command::RebasableCommand;
pub use core::types::{ContentStreamId, NodeAggregateId, StreamVersion, WorkspaceName};
pub use event::{EventStore, InMemoryEventStore};
pub use simulator::CommandSimulator;
pub use workspace::{RebaseStrategy, WorkspaceCommandHandler};
