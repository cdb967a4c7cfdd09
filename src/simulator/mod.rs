//! simulator
//!
//! Dry-run command execution against a workspace's current state.
//!
//! # Design
//!
//! The simulator seeds a private graph projection from a workspace's content
//! stream and executes node commands against it without appending anything
//! to the store. Callers see exactly the constraint failures and event
//! sequences a real execution would produce, then throw the simulation away
//! (or inspect [`CommandSimulator::event_stream`] for what would have been
//! written).
//!
//! Command handling is only allowed inside [`CommandSimulator::run`], and a
//! simulation cannot be started while one is in flight; the guard keeps
//! callers from mistaking simulated state for persisted state.

use thiserror::Error;
use tracing::debug;

use crate::command::RebasableCommand;
use crate::core::types::WorkspaceName;
use crate::dimension::VariationGraph;
use crate::event::envelope::MetadataError;
use crate::event::store::EventStore;
use crate::event::{EventEnvelope, SequenceFingerprint};
use crate::graph::InMemoryContentGraph;
use crate::node::handler::{NodeCommandError, NodeCommandHandler};
use crate::nodetype::NodeTypeRegistry;
use crate::workspace::{Workspace, WorkspaceError};

/// Errors from command simulation.
#[derive(Debug, Error)]
pub enum SimulatorError {
    /// `run` was called while a simulation is in flight.
    #[error("a simulation is already running")]
    AlreadyRunning,

    /// `handle` was called outside `run`.
    #[error("commands may only be handled inside a running simulation")]
    NotRunning,

    /// The workspace could not be loaded or projected.
    #[error(transparent)]
    Workspace(#[from] WorkspaceError),

    /// A simulated command was rejected.
    #[error(transparent)]
    Node(#[from] NodeCommandError),

    /// Command metadata could not be recorded.
    #[error(transparent)]
    Metadata(#[from] MetadataError),
}

/// Executes node commands against a copy of a workspace's state.
pub struct CommandSimulator<'a> {
    registry: &'a dyn NodeTypeRegistry,
    variation: &'a VariationGraph,
    graph: InMemoryContentGraph,
    appended: Vec<EventEnvelope>,
    running: bool,
}

impl<'a> CommandSimulator<'a> {
    /// Seed a simulator from a workspace's current content stream.
    pub fn for_workspace(
        store: &dyn EventStore,
        workspace: &WorkspaceName,
        registry: &'a dyn NodeTypeRegistry,
        variation: &'a VariationGraph,
    ) -> Result<Self, SimulatorError> {
        let workspace = Workspace::load(store, workspace)?
            .filter(|w| !w.removed)
            .ok_or_else(|| WorkspaceError::DoesNotExist(workspace.clone()))?;
        let graph =
            InMemoryContentGraph::for_content_stream(store, &workspace.content_stream_id)
                .map_err(WorkspaceError::from)?;

        Ok(Self {
            registry,
            variation,
            graph,
            appended: Vec::new(),
            running: false,
        })
    }

    /// Run one simulation.
    ///
    /// # Errors
    ///
    /// `SimulatorError::AlreadyRunning` on reentrant calls; otherwise
    /// whatever the closure returns.
    pub fn run<T>(
        &mut self,
        simulation: impl FnOnce(&mut Self) -> Result<T, SimulatorError>,
    ) -> Result<T, SimulatorError> {
        if self.running {
            return Err(SimulatorError::AlreadyRunning);
        }
        self.running = true;
        let result = simulation(self);
        self.running = false;
        result
    }

    /// Handle one command inside a running simulation.
    ///
    /// On success the derived events are applied to the simulated graph and
    /// recorded; nothing is persisted.
    pub fn handle(
        &mut self,
        command: &RebasableCommand,
    ) -> Result<Vec<EventEnvelope>, SimulatorError> {
        if !self.running {
            return Err(SimulatorError::NotRunning);
        }

        debug!(kind = command.kind(), "simulating node command");
        let events =
            NodeCommandHandler::new(&self.graph, self.registry, self.variation).handle(command)?;
        let envelopes = EventEnvelope::batch_for_command(events, command)?;
        for envelope in &envelopes {
            self.graph.apply(&envelope.payload);
        }
        self.appended.extend(envelopes.clone());
        Ok(envelopes)
    }

    /// Everything the simulation would have appended, in order.
    pub fn event_stream(&self) -> &[EventEnvelope] {
        &self.appended
    }

    /// Number of events the simulation has produced so far.
    pub fn current_sequence_number(&self) -> usize {
        self.appended.len()
    }

    /// Payload digest of the simulated event sequence.
    pub fn fingerprint(&self) -> SequenceFingerprint {
        SequenceFingerprint::compute(&self.appended)
    }

    /// The simulated graph state.
    pub fn graph(&self) -> &InMemoryContentGraph {
        &self.graph
    }

    /// Consume the simulator, yielding the simulated events.
    pub fn into_events(self) -> Vec<EventEnvelope> {
        self.appended
    }
}
