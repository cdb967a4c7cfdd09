//! workspace
//!
//! Workspaces: named pointers to content streams, and the publication
//! workflows that move changes between them.
//!
//! # Model
//!
//! A workspace is a stable name bound to a disposable content stream. Every
//! workflow that changes what a workspace contains (publish, rebase, partial
//! publish, partial discard, discard, change of base) swaps the pointer to a
//! freshly forked stream and retires the old one; the workspace's own event
//! log records each swap.
//!
//! # Consistency
//!
//! There is no cross-stream transaction. Workflows order their steps so
//! reversible ones come first (closing the retiring stream, which a [`Saga`]
//! compensation can reopen), the conflict-checked append to the base comes
//! next, and destructive cleanup comes last. Work that must be validated is
//! replayed in memory before anything is appended.

pub mod saga;

use std::collections::BTreeSet;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::command::RebasableCommand;
use crate::core::naming::EventStreamName;
use crate::core::types::{ContentStreamId, NodeAggregateId, StreamVersion, WorkspaceName};
use crate::dimension::VariationGraph;
use crate::event::envelope::MetadataError;
use crate::event::payload::DomainEvent;
use crate::event::store::{EventStore, ExpectedVersion, StoreError};
use crate::event::EventEnvelope;
use crate::graph::{GraphError, InMemoryContentGraph};
use crate::node::handler::{NodeCommandError, NodeCommandHandler};
use crate::nodetype::NodeTypeRegistry;
use crate::simulator::{CommandSimulator, SimulatorError};
use crate::stream::{ContentStream, ContentStreamCommandHandler, StreamError, StreamState};
use saga::Saga;

/// One command that could not be replayed during a workflow.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandConflict {
    /// Zero-based position in the replayed command sequence.
    pub sequence_number: usize,
    /// The command that failed.
    pub command: RebasableCommand,
    /// The violated constraint, rendered.
    pub reason: String,
}

/// What rebase does when a recorded command no longer replays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebaseStrategy {
    /// Abort and report every conflicting command.
    Fail,
    /// Drop conflicting commands and keep the rest.
    Force,
}

/// How the closed-stream phase of a partial publish resolved.
enum PartialOutcome {
    /// The split succeeded and the workspace moved to a fresh stream.
    Swapped,
    /// No recorded command matched the selection.
    NothingMatched,
    /// Every recorded command matched; this is a full publish.
    EverythingMatched,
}

/// Errors from workspace operations.
#[derive(Debug, Error)]
pub enum WorkspaceError {
    /// The workspace name is taken.
    #[error("workspace {0} already exists")]
    AlreadyExists(WorkspaceName),

    /// No workspace of this name exists.
    #[error("workspace {0} does not exist")]
    DoesNotExist(WorkspaceName),

    /// The operation requires a base workspace and this one has none.
    #[error("workspace {0} has no base workspace")]
    HasNoBase(WorkspaceName),

    /// The referenced base workspace does not exist.
    #[error("base workspace {0} does not exist")]
    BaseWorkspaceDoesNotExist(WorkspaceName),

    /// Following the base chain revisits a workspace.
    #[error("workspace base chain contains a cycle through {0}")]
    BaseChainContainsCycle(WorkspaceName),

    /// The base moved since this workspace forked off it.
    ///
    /// Rebase first, then retry.
    #[error(
        "base of workspace {workspace} was modified in the meantime: \
         expected version {expected}, actual {actual}"
    )]
    BaseWorkspaceModifiedInTheMeantime {
        workspace: WorkspaceName,
        expected: StreamVersion,
        actual: StreamVersion,
    },

    /// One or more recorded commands no longer replay against the base.
    #[error(
        "rebase of workspace {workspace} failed: {} command(s) could not be replayed",
        failures.len()
    )]
    RebaseFailed {
        workspace: WorkspaceName,
        failures: Vec<CommandConflict>,
    },

    /// A selection-based workflow hit a command that no longer replays.
    #[error(
        "command {} could not be replayed: {}",
        conflict.sequence_number,
        conflict.reason
    )]
    ReplayFailed { conflict: CommandConflict },

    /// A publishable event without its recorded command: corrupted history.
    #[error("event {0} is publishable but carries no recorded command")]
    MissingCommandRecord(String),

    /// The dry-run simulator could not be driven.
    #[error("command simulation failed: {0}")]
    Simulation(String),

    /// The workspace's event log violates a structural invariant.
    #[error("workspace {name} event log is corrupt: {reason}")]
    Corrupt { name: WorkspaceName, reason: String },

    /// A content stream operation failed.
    #[error(transparent)]
    Stream(#[from] StreamError),

    /// The event store failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Command metadata could not be recorded or reconstructed.
    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// The graph projection failed.
    #[error(transparent)]
    Graph(#[from] GraphError),

    /// A node command was rejected.
    #[error(transparent)]
    Node(#[from] NodeCommandError),
}

/// Materialized state of one workspace, folded from its event log.
#[derive(Debug, Clone, PartialEq)]
pub struct Workspace {
    /// The stable name.
    pub name: WorkspaceName,
    /// Base workspace; `None` for root workspaces.
    pub base: Option<WorkspaceName>,
    /// The content stream currently backing this workspace.
    pub content_stream_id: ContentStreamId,
    /// Whether the deletion tombstone has been appended.
    pub removed: bool,
}

impl Workspace {
    /// Load a workspace's state from the store.
    ///
    /// Returns `None` when the workspace has no events.
    pub fn load(
        store: &dyn EventStore,
        name: &WorkspaceName,
    ) -> Result<Option<Self>, WorkspaceError> {
        let envelopes = store.load(&EventStreamName::for_workspace(name))?;
        if envelopes.is_empty() {
            return Ok(None);
        }

        let mut base = None;
        let mut content_stream_id = None;
        let mut removed = false;

        for (position, envelope) in envelopes.iter().enumerate() {
            match &envelope.payload {
                DomainEvent::RootWorkspaceWasCreated { .. }
                | DomainEvent::WorkspaceWasCreated { .. }
                    if position > 0 =>
                {
                    return Err(WorkspaceError::Corrupt {
                        name: name.clone(),
                        reason: "creation event is not the workspace log's first event".into(),
                    });
                }
                DomainEvent::RootWorkspaceWasCreated {
                    content_stream_id: stream,
                    ..
                } => {
                    content_stream_id = Some(stream.clone());
                }
                DomainEvent::WorkspaceWasCreated {
                    base: created_base,
                    content_stream_id: stream,
                    ..
                } => {
                    base = Some(created_base.clone());
                    content_stream_id = Some(stream.clone());
                }
                _ if position == 0 => {
                    return Err(WorkspaceError::Corrupt {
                        name: name.clone(),
                        reason: "first event is not a creation event".into(),
                    });
                }
                DomainEvent::WorkspaceWasPublished {
                    new_content_stream_id,
                    ..
                }
                | DomainEvent::WorkspaceWasRebased {
                    new_content_stream_id,
                    ..
                }
                | DomainEvent::WorkspaceWasPartiallyPublished {
                    new_content_stream_id,
                    ..
                }
                | DomainEvent::WorkspaceWasPartiallyDiscarded {
                    new_content_stream_id,
                    ..
                }
                | DomainEvent::WorkspaceWasDiscarded {
                    new_content_stream_id,
                    ..
                } => {
                    content_stream_id = Some(new_content_stream_id.clone());
                }
                DomainEvent::WorkspaceBaseWasChanged {
                    new_base,
                    new_content_stream_id,
                    ..
                } => {
                    base = Some(new_base.clone());
                    content_stream_id = Some(new_content_stream_id.clone());
                }
                DomainEvent::WorkspaceWasRemoved { .. } => {
                    removed = true;
                }
                _ => {}
            }
        }

        let content_stream_id = content_stream_id.ok_or_else(|| WorkspaceError::Corrupt {
            name: name.clone(),
            reason: "first event is not a creation event".into(),
        })?;

        Ok(Some(Self {
            name: name.clone(),
            base,
            content_stream_id,
            removed,
        }))
    }
}

/// Walk the base chain starting at `name`, outermost first.
///
/// # Errors
///
/// `WorkspaceError::BaseChainContainsCycle` when a workspace reappears.
pub fn resolve_base_chain(
    store: &dyn EventStore,
    name: &WorkspaceName,
) -> Result<Vec<WorkspaceName>, WorkspaceError> {
    let mut chain = Vec::new();
    let mut seen = BTreeSet::new();
    let mut current = Some(name.clone());

    while let Some(workspace_name) = current {
        if !seen.insert(workspace_name.clone()) {
            return Err(WorkspaceError::BaseChainContainsCycle(workspace_name));
        }
        let workspace = Workspace::load(store, &workspace_name)?
            .filter(|w| !w.removed)
            .ok_or_else(|| WorkspaceError::DoesNotExist(workspace_name.clone()))?;
        chain.push(workspace_name);
        current = workspace.base;
    }
    Ok(chain)
}

/// Executes workspace commands and workflows against an event store.
pub struct WorkspaceCommandHandler<'a> {
    store: &'a dyn EventStore,
    registry: &'a dyn NodeTypeRegistry,
    variation: &'a VariationGraph,
}

impl<'a> WorkspaceCommandHandler<'a> {
    /// Create a handler over the given collaborators.
    pub fn new(
        store: &'a dyn EventStore,
        registry: &'a dyn NodeTypeRegistry,
        variation: &'a VariationGraph,
    ) -> Self {
        Self {
            store,
            registry,
            variation,
        }
    }

    fn streams(&self) -> ContentStreamCommandHandler<'a> {
        ContentStreamCommandHandler::new(self.store)
    }

    /// Load a live workspace.
    fn workspace(&self, name: &WorkspaceName) -> Result<Workspace, WorkspaceError> {
        Workspace::load(self.store, name)?
            .filter(|w| !w.removed)
            .ok_or_else(|| WorkspaceError::DoesNotExist(name.clone()))
    }

    fn base_of(&self, workspace: &Workspace) -> Result<Workspace, WorkspaceError> {
        let base_name = workspace
            .base
            .clone()
            .ok_or_else(|| WorkspaceError::HasNoBase(workspace.name.clone()))?;
        Workspace::load(self.store, &base_name)?
            .filter(|w| !w.removed)
            .ok_or(WorkspaceError::BaseWorkspaceDoesNotExist(base_name))
    }

    fn append_workspace_event(
        &self,
        name: &WorkspaceName,
        event: DomainEvent,
        expected: ExpectedVersion,
    ) -> Result<(), WorkspaceError> {
        self.store.append(
            &EventStreamName::for_workspace(name),
            vec![EventEnvelope::plain(event)],
            expected,
        )?;
        Ok(())
    }

    /// The publishable (node-structural) envelopes of a content stream.
    fn publishable(
        &self,
        stream: &ContentStreamId,
    ) -> Result<Vec<EventEnvelope>, WorkspaceError> {
        let envelopes = self
            .store
            .load(&EventStreamName::for_content_stream(stream))?;
        Ok(envelopes
            .into_iter()
            .filter(|e| e.payload.is_publishable())
            .collect())
    }

    /// Reconstruct the command sequence behind a stream's publishable
    /// events.
    ///
    /// Consecutive envelopes sharing a correlation id came from one command
    /// and count once.
    fn extract_commands(
        envelopes: &[EventEnvelope],
    ) -> Result<Vec<RebasableCommand>, WorkspaceError> {
        let mut commands = Vec::new();
        let mut previous = None;
        for envelope in envelopes {
            let record = envelope
                .metadata
                .command
                .as_ref()
                .ok_or_else(|| WorkspaceError::MissingCommandRecord(envelope.id.to_string()))?;
            let correlation = envelope.metadata.correlation_id.clone();
            if correlation.is_some() && correlation == previous {
                continue;
            }
            commands.push(record.reconstruct()?);
            previous = correlation;
        }
        Ok(commands)
    }

    /// Seed a dry-run simulator from a workspace's current state.
    fn simulator_for(
        &self,
        workspace: &WorkspaceName,
    ) -> Result<CommandSimulator<'a>, WorkspaceError> {
        CommandSimulator::for_workspace(self.store, workspace, self.registry, self.variation)
            .map_err(Self::simulation_error)
    }

    /// Replay commands in a simulation, reporting rejected ones as
    /// conflicts. The simulated events accumulate in the simulator.
    fn simulate_commands(
        simulator: &mut CommandSimulator<'_>,
        commands: &[RebasableCommand],
        collect_all: bool,
    ) -> Result<Vec<CommandConflict>, WorkspaceError> {
        simulator
            .run(|sim| {
                let mut conflicts = Vec::new();
                for (sequence_number, command) in commands.iter().enumerate() {
                    match sim.handle(command) {
                        Ok(_) => {}
                        Err(SimulatorError::Node(err)) => {
                            conflicts.push(CommandConflict {
                                sequence_number,
                                command: command.clone(),
                                reason: err.to_string(),
                            });
                            if !collect_all {
                                break;
                            }
                        }
                        Err(other) => return Err(other),
                    }
                }
                Ok(conflicts)
            })
            .map_err(Self::simulation_error)
    }

    fn simulation_error(err: SimulatorError) -> WorkspaceError {
        match err {
            SimulatorError::Workspace(err) => err,
            SimulatorError::Node(err) => WorkspaceError::Node(err),
            SimulatorError::Metadata(err) => WorkspaceError::Metadata(err),
            other => WorkspaceError::Simulation(other.to_string()),
        }
    }

    /// The fork record of a workspace's content stream.
    fn fork_record(
        &self,
        workspace: &Workspace,
    ) -> Result<(ContentStreamId, StreamVersion), WorkspaceError> {
        let state = ContentStream::load(self.store, &workspace.content_stream_id)?
            .ok_or_else(|| StreamError::DoesNotExist(workspace.content_stream_id.clone()))?;
        state.fork.ok_or_else(|| WorkspaceError::Corrupt {
            name: workspace.name.clone(),
            reason: "content stream is not a fork of the base".into(),
        })
    }

    /// The base must still be the stream this workspace forked, at the
    /// forked version. Returns that version, the append expectation against
    /// the base.
    fn require_base_unchanged(
        &self,
        workspace: &Workspace,
        base: &Workspace,
    ) -> Result<StreamVersion, WorkspaceError> {
        let (source, version) = self.fork_record(workspace)?;
        let actual = self
            .store
            .version(&EventStreamName::for_content_stream(&base.content_stream_id))?;
        if source != base.content_stream_id || actual != version {
            return Err(WorkspaceError::BaseWorkspaceModifiedInTheMeantime {
                workspace: workspace.name.clone(),
                expected: version,
                actual,
            });
        }
        Ok(version)
    }

    fn remove_retired_stream(&self, stream: &ContentStreamId) {
        if let Err(err) = self.streams().remove(stream) {
            warn!(stream = %stream, error = %err, "failed to retire content stream");
        }
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    /// Create a root workspace (no base) with a fresh content stream.
    pub fn create_root_workspace(
        &self,
        name: &WorkspaceName,
        content_stream_id: &ContentStreamId,
    ) -> Result<(), WorkspaceError> {
        if Workspace::load(self.store, name)?.is_some() {
            return Err(WorkspaceError::AlreadyExists(name.clone()));
        }

        info!(workspace = %name, stream = %content_stream_id, "creating root workspace");
        self.streams().create(content_stream_id)?;

        let mut saga = Saga::new();
        let streams = self.streams();
        saga.on_failure("remove fresh content stream", {
            let id = content_stream_id.clone();
            move || streams.remove(&id).map(|_| ())
        });

        let result = self
            .store
            .append(
                &EventStreamName::for_workspace(name),
                vec![EventEnvelope::plain(DomainEvent::RootWorkspaceWasCreated {
                    name: name.clone(),
                    content_stream_id: content_stream_id.clone(),
                })],
                ExpectedVersion::NoStream,
            )
            .map_err(|err| match err {
                StoreError::ConcurrencyConflict { .. } => {
                    WorkspaceError::AlreadyExists(name.clone())
                }
                other => WorkspaceError::Store(other),
            });

        match result {
            Ok(_) => {
                saga.commit();
                Ok(())
            }
            Err(err) => {
                saga.abort();
                Err(err)
            }
        }
    }

    /// Create a workspace on top of a base workspace.
    ///
    /// The new workspace starts on a fork of the base's current stream, so
    /// it sees all base content as of now.
    pub fn create_workspace(
        &self,
        name: &WorkspaceName,
        base: &WorkspaceName,
    ) -> Result<(), WorkspaceError> {
        if Workspace::load(self.store, name)?.is_some() {
            return Err(WorkspaceError::AlreadyExists(name.clone()));
        }
        let base_workspace = Workspace::load(self.store, base)?
            .filter(|w| !w.removed)
            .ok_or_else(|| WorkspaceError::BaseWorkspaceDoesNotExist(base.clone()))?;

        let content_stream_id = ContentStreamId::new();
        info!(workspace = %name, base = %base, stream = %content_stream_id, "creating workspace");
        self.streams()
            .fork(&content_stream_id, &base_workspace.content_stream_id)?;

        let mut saga = Saga::new();
        let streams = self.streams();
        saga.on_failure("remove forked content stream", {
            let id = content_stream_id.clone();
            move || streams.remove(&id).map(|_| ())
        });

        let result = self
            .store
            .append(
                &EventStreamName::for_workspace(name),
                vec![EventEnvelope::plain(DomainEvent::WorkspaceWasCreated {
                    name: name.clone(),
                    base: base.clone(),
                    content_stream_id: content_stream_id.clone(),
                })],
                ExpectedVersion::NoStream,
            )
            .map_err(|err| match err {
                StoreError::ConcurrencyConflict { .. } => {
                    WorkspaceError::AlreadyExists(name.clone())
                }
                other => WorkspaceError::Store(other),
            });

        match result {
            Ok(_) => {
                saga.commit();
                Ok(())
            }
            Err(err) => {
                saga.abort();
                Err(err)
            }
        }
    }

    // ------------------------------------------------------------------
    // Command execution
    // ------------------------------------------------------------------

    /// Execute a node command in a workspace, appending its events to the
    /// workspace's content stream.
    pub fn handle_node_command(
        &self,
        name: &WorkspaceName,
        command: &RebasableCommand,
    ) -> Result<Vec<EventEnvelope>, WorkspaceError> {
        let workspace = self.workspace(name)?;
        let stream = ContentStream::load(self.store, &workspace.content_stream_id)?
            .ok_or_else(|| StreamError::DoesNotExist(workspace.content_stream_id.clone()))?;
        if !stream.is_open() {
            return Err(StreamError::IsClosed(workspace.content_stream_id.clone()).into());
        }

        let graph =
            InMemoryContentGraph::for_content_stream(self.store, &workspace.content_stream_id)?;
        let events =
            NodeCommandHandler::new(&graph, self.registry, self.variation).handle(command)?;
        let envelopes = EventEnvelope::batch_for_command(events, command)?;

        debug!(workspace = %name, kind = command.kind(), events = envelopes.len(), "executing node command");
        self.store.append(
            &EventStreamName::for_content_stream(&workspace.content_stream_id),
            envelopes.clone(),
            ExpectedVersion::Exact(stream.version),
        )?;
        Ok(envelopes)
    }

    // ------------------------------------------------------------------
    // Workflows
    // ------------------------------------------------------------------

    /// Publish all of a workspace's changes to its base.
    pub fn publish(&self, name: &WorkspaceName) -> Result<(), WorkspaceError> {
        let workspace = self.workspace(name)?;
        let base = self.base_of(&workspace)?;

        // Close before taking the snapshot: a writer racing this workflow
        // either lands before the close (and is published) or is refused.
        let retiring = workspace.content_stream_id.clone();
        self.streams().close(&retiring)?;
        let mut saga = Saga::new();
        let streams = self.streams();
        saga.on_failure("reopen retiring content stream", {
            let id = retiring.clone();
            move || streams.reopen(&id, StreamState::Open).map(|_| ())
        });

        let result = (|| -> Result<bool, WorkspaceError> {
            let publishable = self.publishable(&retiring)?;
            if publishable.is_empty() {
                return Ok(false);
            }
            let base_version = self.require_base_unchanged(&workspace, &base)?;

            info!(workspace = %name, base = %base.name, events = publishable.len(), "publishing workspace");
            // The conflict-checked step: base must still be where we forked.
            self.store
                .append(
                    &EventStreamName::for_content_stream(&base.content_stream_id),
                    publishable.iter().map(EventEnvelope::republished).collect(),
                    ExpectedVersion::Exact(base_version),
                )
                .map_err(|err| match err {
                    StoreError::ConcurrencyConflict { actual, .. } => {
                        WorkspaceError::BaseWorkspaceModifiedInTheMeantime {
                            workspace: name.clone(),
                            expected: base_version,
                            actual,
                        }
                    }
                    other => WorkspaceError::Store(other),
                })?;

            let fresh = ContentStreamId::new();
            self.streams().fork(&fresh, &base.content_stream_id)?;
            self.append_workspace_event(
                name,
                DomainEvent::WorkspaceWasPublished {
                    name: name.clone(),
                    previous_content_stream_id: retiring.clone(),
                    new_content_stream_id: fresh,
                },
                ExpectedVersion::Any,
            )?;
            Ok(true)
        })();

        match result {
            Ok(true) => {
                saga.commit();
                self.remove_retired_stream(&retiring);
                Ok(())
            }
            Ok(false) => {
                debug!(workspace = %name, "nothing to publish");
                saga.abort();
                Ok(())
            }
            Err(err) => {
                saga.abort();
                Err(err)
            }
        }
    }

    /// Rebase a workspace onto its base's current state by replaying its
    /// recorded commands.
    pub fn rebase(
        &self,
        name: &WorkspaceName,
        strategy: RebaseStrategy,
    ) -> Result<(), WorkspaceError> {
        let workspace = self.workspace(name)?;
        let base = self.base_of(&workspace)?;

        info!(workspace = %name, base = %base.name, ?strategy, "rebasing workspace");
        let retiring = workspace.content_stream_id.clone();
        self.streams().close(&retiring)?;
        let mut saga = Saga::new();
        let streams = self.streams();
        saga.on_failure("reopen retiring content stream", {
            let id = retiring.clone();
            move || streams.reopen(&id, StreamState::Open).map(|_| ())
        });

        let result = (|| -> Result<(), WorkspaceError> {
            let publishable = self.publishable(&retiring)?;
            let commands = Self::extract_commands(&publishable)?;

            // Dry-run on the base first; the candidate stream is only
            // forked once the replay is known to go through.
            let mut simulator = self.simulator_for(&base.name)?;
            let conflicts = Self::simulate_commands(&mut simulator, &commands, true)?;

            if !conflicts.is_empty() && strategy == RebaseStrategy::Fail {
                return Err(WorkspaceError::RebaseFailed {
                    workspace: name.clone(),
                    failures: conflicts,
                });
            }
            if !conflicts.is_empty() {
                warn!(workspace = %name, dropped = conflicts.len(), "forced rebase dropped commands");
            }

            let candidate = ContentStreamId::new();
            self.streams().fork(&candidate, &base.content_stream_id)?;
            self.store.append(
                &EventStreamName::for_content_stream(&candidate),
                simulator.into_events(),
                ExpectedVersion::Any,
            )?;
            self.append_workspace_event(
                name,
                DomainEvent::WorkspaceWasRebased {
                    name: name.clone(),
                    previous_content_stream_id: retiring.clone(),
                    new_content_stream_id: candidate,
                },
                ExpectedVersion::Any,
            )
        })();

        match result {
            Ok(()) => {
                saga.commit();
                self.remove_retired_stream(&retiring);
                Ok(())
            }
            Err(err) => {
                saga.abort();
                Err(err)
            }
        }
    }

    /// Publish only the changes affecting the selected node aggregates,
    /// keeping the rest in the workspace.
    pub fn publish_individual_nodes(
        &self,
        name: &WorkspaceName,
        nodes: &BTreeSet<NodeAggregateId>,
    ) -> Result<(), WorkspaceError> {
        let workspace = self.workspace(name)?;
        let base = self.base_of(&workspace)?;

        // Close before reading the command log, so the split is taken from
        // a stream nobody can still append to.
        let retiring = workspace.content_stream_id.clone();
        self.streams().close(&retiring)?;
        let mut saga = Saga::new();
        let streams = self.streams();
        saga.on_failure("reopen retiring content stream", {
            let id = retiring.clone();
            move || streams.reopen(&id, StreamState::Open).map(|_| ())
        });

        let result = (|| -> Result<PartialOutcome, WorkspaceError> {
            let publishable = self.publishable(&retiring)?;
            let commands = Self::extract_commands(&publishable)?;
            let (matching, remaining): (Vec<_>, Vec<_>) = commands
                .into_iter()
                .partition(|command| command.matches_any(nodes));
            if matching.is_empty() {
                return Ok(PartialOutcome::NothingMatched);
            }
            if remaining.is_empty() {
                return Ok(PartialOutcome::EverythingMatched);
            }
            let base_version = self.require_base_unchanged(&workspace, &base)?;

            info!(
                workspace = %name,
                base = %base.name,
                published = matching.len(),
                kept = remaining.len(),
                "partially publishing workspace"
            );
            // Dry-run both halves before appending anywhere. The kept
            // commands continue on top of the published state, so the cut
            // point is the simulator's sequence number between the halves.
            let mut simulator = self.simulator_for(&base.name)?;
            let conflicts = Self::simulate_commands(&mut simulator, &matching, false)?;
            if let Some(conflict) = conflicts.into_iter().next() {
                return Err(WorkspaceError::ReplayFailed { conflict });
            }
            let cut = simulator.current_sequence_number();
            let conflicts = Self::simulate_commands(&mut simulator, &remaining, false)?;
            if let Some(conflict) = conflicts.into_iter().next() {
                return Err(WorkspaceError::ReplayFailed { conflict });
            }
            let mut published_envelopes = simulator.into_events();
            let kept_envelopes = published_envelopes.split_off(cut);

            self.store
                .append(
                    &EventStreamName::for_content_stream(&base.content_stream_id),
                    published_envelopes,
                    ExpectedVersion::Exact(base_version),
                )
                .map_err(|err| match err {
                    StoreError::ConcurrencyConflict { actual, .. } => {
                        WorkspaceError::BaseWorkspaceModifiedInTheMeantime {
                            workspace: name.clone(),
                            expected: base_version,
                            actual,
                        }
                    }
                    other => WorkspaceError::Store(other),
                })?;

            let fresh = ContentStreamId::new();
            self.streams().fork(&fresh, &base.content_stream_id)?;
            self.store.append(
                &EventStreamName::for_content_stream(&fresh),
                kept_envelopes,
                ExpectedVersion::Any,
            )?;
            self.append_workspace_event(
                name,
                DomainEvent::WorkspaceWasPartiallyPublished {
                    name: name.clone(),
                    previous_content_stream_id: retiring.clone(),
                    new_content_stream_id: fresh,
                    published_nodes: nodes.iter().cloned().collect(),
                },
                ExpectedVersion::Any,
            )?;
            Ok(PartialOutcome::Swapped)
        })();

        match result {
            Ok(PartialOutcome::Swapped) => {
                saga.commit();
                self.remove_retired_stream(&retiring);
                Ok(())
            }
            Ok(PartialOutcome::NothingMatched) => {
                debug!(workspace = %name, "selection matches no recorded changes");
                saga.abort();
                Ok(())
            }
            Ok(PartialOutcome::EverythingMatched) => {
                // The selection covers everything: reopen and publish whole.
                saga.abort();
                self.publish(name)
            }
            Err(err) => {
                saga.abort();
                Err(err)
            }
        }
    }

    /// Drop only the changes affecting the selected node aggregates,
    /// keeping the rest in the workspace.
    pub fn discard_individual_nodes(
        &self,
        name: &WorkspaceName,
        nodes: &BTreeSet<NodeAggregateId>,
    ) -> Result<(), WorkspaceError> {
        let workspace = self.workspace(name)?;
        let base = self.base_of(&workspace)?;

        let retiring = workspace.content_stream_id.clone();
        self.streams().close(&retiring)?;
        let mut saga = Saga::new();
        let streams = self.streams();
        saga.on_failure("reopen retiring content stream", {
            let id = retiring.clone();
            move || streams.reopen(&id, StreamState::Open).map(|_| ())
        });

        let result = (|| -> Result<bool, WorkspaceError> {
            let publishable = self.publishable(&retiring)?;
            let commands = Self::extract_commands(&publishable)?;
            let (discarded, kept): (Vec<_>, Vec<_>) = commands
                .into_iter()
                .partition(|command| command.matches_any(nodes));
            if discarded.is_empty() {
                return Ok(false);
            }

            info!(
                workspace = %name,
                discarded = discarded.len(),
                kept = kept.len(),
                "partially discarding workspace"
            );
            // A fresh fork of the base has none of our changes; replaying
            // the kept commands onto it drops exactly the selection. When
            // everything was selected, the bare fork is already the answer.
            let kept_envelopes = if kept.is_empty() {
                Vec::new()
            } else {
                let mut simulator = self.simulator_for(&base.name)?;
                let conflicts = Self::simulate_commands(&mut simulator, &kept, false)?;
                if let Some(conflict) = conflicts.into_iter().next() {
                    return Err(WorkspaceError::ReplayFailed { conflict });
                }
                simulator.into_events()
            };

            let fresh = ContentStreamId::new();
            self.streams().fork(&fresh, &base.content_stream_id)?;
            self.store.append(
                &EventStreamName::for_content_stream(&fresh),
                kept_envelopes,
                ExpectedVersion::Any,
            )?;
            self.append_workspace_event(
                name,
                DomainEvent::WorkspaceWasPartiallyDiscarded {
                    name: name.clone(),
                    previous_content_stream_id: retiring.clone(),
                    new_content_stream_id: fresh,
                    discarded_nodes: nodes.iter().cloned().collect(),
                },
                ExpectedVersion::Any,
            )?;
            Ok(true)
        })();

        match result {
            Ok(true) => {
                saga.commit();
                self.remove_retired_stream(&retiring);
                Ok(())
            }
            Ok(false) => {
                debug!(workspace = %name, "selection matches no recorded changes");
                saga.abort();
                Ok(())
            }
            Err(err) => {
                saga.abort();
                Err(err)
            }
        }
    }

    /// Drop all of a workspace's changes, resetting it to the base's
    /// current state.
    pub fn discard(&self, name: &WorkspaceName) -> Result<(), WorkspaceError> {
        let workspace = self.workspace(name)?;
        let base = self.base_of(&workspace)?;

        info!(workspace = %name, base = %base.name, "discarding workspace changes");
        let retiring = workspace.content_stream_id.clone();
        self.streams().close(&retiring)?;
        let mut saga = Saga::new();
        let streams = self.streams();
        saga.on_failure("reopen retiring content stream", {
            let id = retiring.clone();
            move || streams.reopen(&id, StreamState::Open).map(|_| ())
        });

        let result = (|| -> Result<(), WorkspaceError> {
            let fresh = ContentStreamId::new();
            self.streams().fork(&fresh, &base.content_stream_id)?;
            self.append_workspace_event(
                name,
                DomainEvent::WorkspaceWasDiscarded {
                    name: name.clone(),
                    previous_content_stream_id: retiring.clone(),
                    new_content_stream_id: fresh,
                },
                ExpectedVersion::Any,
            )
        })();

        match result {
            Ok(()) => {
                saga.commit();
                self.remove_retired_stream(&retiring);
                Ok(())
            }
            Err(err) => {
                saga.abort();
                Err(err)
            }
        }
    }

    /// Move a workspace onto a different base, replaying its recorded
    /// changes there.
    pub fn change_base(
        &self,
        name: &WorkspaceName,
        new_base: &WorkspaceName,
    ) -> Result<(), WorkspaceError> {
        let workspace = self.workspace(name)?;
        if workspace.base.is_none() {
            return Err(WorkspaceError::HasNoBase(name.clone()));
        }
        let new_base_workspace = Workspace::load(self.store, new_base)?
            .filter(|w| !w.removed)
            .ok_or_else(|| WorkspaceError::BaseWorkspaceDoesNotExist(new_base.clone()))?;

        // The new base's chain must not lead back to us.
        let chain = resolve_base_chain(self.store, new_base)?;
        if chain.contains(name) {
            return Err(WorkspaceError::BaseChainContainsCycle(name.clone()));
        }

        info!(workspace = %name, new_base = %new_base, "changing workspace base");
        let retiring = workspace.content_stream_id.clone();
        self.streams().close(&retiring)?;
        let mut saga = Saga::new();
        let streams = self.streams();
        saga.on_failure("reopen retiring content stream", {
            let id = retiring.clone();
            move || streams.reopen(&id, StreamState::Open).map(|_| ())
        });

        let result = (|| -> Result<(), WorkspaceError> {
            let publishable = self.publishable(&retiring)?;
            let commands = Self::extract_commands(&publishable)?;

            // Dry-run on the new base before forking anything there.
            let mut simulator = self.simulator_for(new_base)?;
            let conflicts = Self::simulate_commands(&mut simulator, &commands, true)?;
            if !conflicts.is_empty() {
                return Err(WorkspaceError::RebaseFailed {
                    workspace: name.clone(),
                    failures: conflicts,
                });
            }

            let candidate = ContentStreamId::new();
            self.streams()
                .fork(&candidate, &new_base_workspace.content_stream_id)?;
            self.store.append(
                &EventStreamName::for_content_stream(&candidate),
                simulator.into_events(),
                ExpectedVersion::Any,
            )?;
            self.append_workspace_event(
                name,
                DomainEvent::WorkspaceBaseWasChanged {
                    name: name.clone(),
                    new_base: new_base.clone(),
                    previous_content_stream_id: retiring.clone(),
                    new_content_stream_id: candidate,
                },
                ExpectedVersion::Any,
            )
        })();

        match result {
            Ok(()) => {
                saga.commit();
                self.remove_retired_stream(&retiring);
                Ok(())
            }
            Err(err) => {
                saga.abort();
                Err(err)
            }
        }
    }

    /// Delete a workspace: tombstone its log and retire its content stream.
    ///
    /// Unpublished changes are lost.
    pub fn delete(&self, name: &WorkspaceName) -> Result<(), WorkspaceError> {
        let workspace = self.workspace(name)?;

        info!(workspace = %name, "deleting workspace");
        self.append_workspace_event(
            name,
            DomainEvent::WorkspaceWasRemoved { name: name.clone() },
            ExpectedVersion::Any,
        )?;
        self.remove_retired_stream(&workspace.content_stream_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{NodeTypeName, NodeName};
    use crate::dimension::{ContentDimension, OriginDimensionSpacePoint};
    use crate::event::InMemoryEventStore;
    use crate::graph::ContentGraph;
    use crate::node::PropertyValues;
    use crate::nodetype::{InMemoryNodeTypeRegistry, NodeTypeDefinition};

    fn ws(name: &str) -> WorkspaceName {
        WorkspaceName::new(name).unwrap()
    }

    fn ty(name: &str) -> NodeTypeName {
        NodeTypeName::new(name).unwrap()
    }

    fn node(id: &str) -> NodeAggregateId {
        NodeAggregateId::from_string(id)
    }

    fn en() -> OriginDimensionSpacePoint {
        OriginDimensionSpacePoint::from_pairs([("language", "en")])
    }

    struct Fixture {
        store: InMemoryEventStore,
        registry: InMemoryNodeTypeRegistry,
        variation: VariationGraph,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                store: InMemoryEventStore::new(),
                registry: InMemoryNodeTypeRegistry::new()
                    .with_type(ty("Acme:Root"), NodeTypeDefinition::new())
                    .with_type(ty("Acme:Document"), NodeTypeDefinition::new()),
                variation: VariationGraph::new(vec![ContentDimension::new("language")
                    .value("en", None)
                    .value("de", None)]),
            }
        }

        fn handler(&self) -> WorkspaceCommandHandler<'_> {
            WorkspaceCommandHandler::new(&self.store, &self.registry, &self.variation)
        }

        /// live workspace with a root node, ready to branch off.
        fn with_live(self) -> Self {
            let handler = self.handler();
            handler
                .create_root_workspace(&ws("live"), &ContentStreamId::from_string("cs-live"))
                .unwrap();
            handler
                .handle_node_command(
                    &ws("live"),
                    &RebasableCommand::CreateRootNodeAggregate {
                        node_aggregate_id: node("root"),
                        node_type_name: ty("Acme:Root"),
                    },
                )
                .unwrap();
            self
        }
    }

    fn create_document(id: &str, name: Option<&str>) -> RebasableCommand {
        RebasableCommand::CreateNodeAggregateWithNode {
            node_aggregate_id: node(id),
            node_type_name: ty("Acme:Document"),
            parent_node_aggregate_id: node("root"),
            origin: en(),
            node_name: name.map(|n| NodeName::new(n).unwrap()),
            initial_property_values: PropertyValues::new(),
        }
    }

    mod creation {
        use super::*;

        #[test]
        fn root_workspace_owns_a_fresh_stream() {
            let fixture = Fixture::new();
            let handler = fixture.handler();
            handler
                .create_root_workspace(&ws("live"), &ContentStreamId::from_string("cs"))
                .unwrap();

            let workspace = Workspace::load(&fixture.store, &ws("live")).unwrap().unwrap();
            assert_eq!(workspace.base, None);
            assert_eq!(workspace.content_stream_id, ContentStreamId::from_string("cs"));
            assert!(ContentStream::load(&fixture.store, &workspace.content_stream_id)
                .unwrap()
                .is_some());
        }

        #[test]
        fn duplicate_workspace_name_rejected() {
            let fixture = Fixture::new();
            let handler = fixture.handler();
            handler
                .create_root_workspace(&ws("live"), &ContentStreamId::from_string("cs"))
                .unwrap();
            assert!(matches!(
                handler.create_root_workspace(&ws("live"), &ContentStreamId::from_string("cs2")),
                Err(WorkspaceError::AlreadyExists(_))
            ));
        }

        #[test]
        fn derived_workspace_forks_the_base_stream() {
            let fixture = Fixture::new().with_live();
            let handler = fixture.handler();
            handler.create_workspace(&ws("draft"), &ws("live")).unwrap();

            let draft = Workspace::load(&fixture.store, &ws("draft")).unwrap().unwrap();
            assert_eq!(draft.base, Some(ws("live")));
            let stream =
                ContentStream::load(&fixture.store, &draft.content_stream_id).unwrap().unwrap();
            assert_eq!(
                stream.fork.map(|(source, _)| source),
                Some(ContentStreamId::from_string("cs-live"))
            );

            // The draft sees live content.
            let graph =
                InMemoryContentGraph::for_content_stream(&fixture.store, &draft.content_stream_id)
                    .unwrap();
            assert!(graph.node_by_id(&node("root")).unwrap().is_some());
        }

        #[test]
        fn missing_base_rejected() {
            let fixture = Fixture::new();
            assert!(matches!(
                fixture.handler().create_workspace(&ws("draft"), &ws("missing")),
                Err(WorkspaceError::BaseWorkspaceDoesNotExist(_))
            ));
        }
    }

    mod node_commands {
        use super::*;

        #[test]
        fn events_carry_the_recorded_command() {
            let fixture = Fixture::new().with_live();
            let handler = fixture.handler();
            handler.create_workspace(&ws("draft"), &ws("live")).unwrap();

            let envelopes = handler
                .handle_node_command(&ws("draft"), &create_document("a", None))
                .unwrap();
            assert_eq!(envelopes.len(), 1);
            assert_eq!(
                envelopes[0].metadata.command.as_ref().unwrap().kind(),
                Some("create_node_aggregate_with_node")
            );
        }

        #[test]
        fn commands_against_unknown_workspace_fail() {
            let fixture = Fixture::new();
            assert!(matches!(
                fixture
                    .handler()
                    .handle_node_command(&ws("nope"), &create_document("a", None)),
                Err(WorkspaceError::DoesNotExist(_))
            ));
        }
    }

    mod command_extraction {
        use super::*;

        #[test]
        fn consecutive_correlation_counts_once() {
            let command = create_document("a", None);
            let batch = EventEnvelope::batch_for_command(
                vec![
                    DomainEvent::NodePropertiesWereSet {
                        node_aggregate_id: node("a"),
                        origin: en(),
                        property_values: PropertyValues::new(),
                    },
                    DomainEvent::NodePropertiesWereSet {
                        node_aggregate_id: node("a"),
                        origin: en(),
                        property_values: PropertyValues::new(),
                    },
                ],
                &command,
            )
            .unwrap();

            let commands = WorkspaceCommandHandler::extract_commands(&batch).unwrap();
            assert_eq!(commands.len(), 1);
            assert_eq!(commands[0], command);
        }

        #[test]
        fn missing_record_is_corruption() {
            let envelope = EventEnvelope::plain(DomainEvent::NodePropertiesWereSet {
                node_aggregate_id: node("a"),
                origin: en(),
                property_values: PropertyValues::new(),
            });
            assert!(matches!(
                WorkspaceCommandHandler::extract_commands(&[envelope]),
                Err(WorkspaceError::MissingCommandRecord(_))
            ));
        }
    }

    mod base_chain {
        use super::*;

        #[test]
        fn chain_resolves_outermost_first() {
            let fixture = Fixture::new().with_live();
            let handler = fixture.handler();
            handler.create_workspace(&ws("staging"), &ws("live")).unwrap();
            handler.create_workspace(&ws("draft"), &ws("staging")).unwrap();

            let chain = resolve_base_chain(&fixture.store, &ws("draft")).unwrap();
            assert_eq!(chain, vec![ws("draft"), ws("staging"), ws("live")]);
        }

        #[test]
        fn change_base_rejects_cycles() {
            let fixture = Fixture::new().with_live();
            let handler = fixture.handler();
            handler.create_workspace(&ws("staging"), &ws("live")).unwrap();
            handler.create_workspace(&ws("draft"), &ws("staging")).unwrap();

            // staging onto draft would make draft -> staging -> draft.
            assert!(matches!(
                handler.change_base(&ws("staging"), &ws("draft")),
                Err(WorkspaceError::BaseChainContainsCycle(_))
            ));
        }
    }

    mod corruption {
        use super::*;

        #[test]
        fn non_initial_creation_event_is_corruption() {
            let fixture = Fixture::new().with_live();
            fixture
                .store
                .append(
                    &EventStreamName::for_workspace(&ws("live")),
                    vec![EventEnvelope::plain(DomainEvent::RootWorkspaceWasCreated {
                        name: ws("live"),
                        content_stream_id: ContentStreamId::from_string("cs-other"),
                    })],
                    ExpectedVersion::Any,
                )
                .unwrap();

            assert!(matches!(
                Workspace::load(&fixture.store, &ws("live")),
                Err(WorkspaceError::Corrupt { .. })
            ));
        }

        #[test]
        fn swap_event_without_creation_is_corruption() {
            let fixture = Fixture::new();
            fixture
                .store
                .append(
                    &EventStreamName::for_workspace(&ws("orphan")),
                    vec![EventEnvelope::plain(DomainEvent::WorkspaceWasDiscarded {
                        name: ws("orphan"),
                        previous_content_stream_id: ContentStreamId::from_string("a"),
                        new_content_stream_id: ContentStreamId::from_string("b"),
                    })],
                    ExpectedVersion::Any,
                )
                .unwrap();

            assert!(matches!(
                Workspace::load(&fixture.store, &ws("orphan")),
                Err(WorkspaceError::Corrupt { .. })
            ));
        }
    }

    mod delete {
        use super::*;

        #[test]
        fn deleted_workspace_is_gone_and_its_stream_retired() {
            let fixture = Fixture::new().with_live();
            let handler = fixture.handler();
            handler.create_workspace(&ws("draft"), &ws("live")).unwrap();
            let draft = Workspace::load(&fixture.store, &ws("draft")).unwrap().unwrap();

            handler.delete(&ws("draft")).unwrap();

            assert!(matches!(
                handler.publish(&ws("draft")),
                Err(WorkspaceError::DoesNotExist(_))
            ));
            let stream =
                ContentStream::load(&fixture.store, &draft.content_stream_id).unwrap().unwrap();
            assert!(stream.removed);
        }
    }
}
