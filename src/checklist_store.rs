//! The checklist store: a single-writer actor over the checklist collection.
//!
//! Inputs are merged into one queue: the load result, command intents, and
//! the results of concurrently dispatched gateway calls. The actor applies
//! them strictly in arrival order and republishes a [`ChecklistsState`]
//! snapshot after every step. Once the first load succeeded, every change
//! to the collection is written back through the gateway.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::Instrument;

use crate::actor::{BLANK_TITLE, Resolution, enqueue, request, spawn_into, wait_for_snapshot};
use crate::command::ChecklistCommand;
use crate::config::StoreConfig;
use crate::error::{GatewayError, StoreError, error_message};
use crate::event::{DomainEvent, DomainEvents};
use crate::gateway::{ChecklistGateway, Dispatch};
use crate::model::Checklist;
use crate::snapshot::{ChecklistsState, LoadPhase};

/// A confirmed change to the collection.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ChecklistPatch {
    Added(Checklist),
    Edited(Checklist),
    Removed(String),
}

/// A gateway call derived from a command against the current state.
enum ChecklistOp {
    Create(Checklist),
    Update(Checklist),
    Delete(String),
}

/// Messages sent from [`ChecklistStore`] (and spawned gateway calls) to the
/// actor.
enum ChecklistMessage {
    /// A command intent.
    Command(ChecklistCommand),
    /// Re-issue the load and replace the collection.
    Refresh,
    /// Drop the current error message.
    ClearError,
    /// A load finished. Ignored unless `generation` is the latest.
    Loaded {
        generation: u64,
        result: Result<Vec<Checklist>, GatewayError>,
    },
    /// A concurrently dispatched command finished. `minted` is the slug
    /// reserved for an add, released now that the call is over.
    Resolved {
        minted: Option<String>,
        resolution: Resolution<ChecklistPatch>,
    },
    /// Read the current state, ordered behind queued messages.
    GetState {
        reply: oneshot::Sender<ChecklistsState>,
    },
    /// Stop the actor.
    Shutdown,
}

/// Owns the checklist collection and reduces messages into snapshots.
struct ChecklistActor<G> {
    gateway: Arc<G>,
    state: ChecklistsState,
    publisher: watch::Sender<ChecklistsState>,
    events: DomainEvents,
    inbox: mpsc::WeakSender<ChecklistMessage>,
    /// Commands that arrived before a load settled, in arrival order.
    deferred: VecDeque<ChecklistCommand>,
    /// Slugs minted for adds whose gateway call has not resolved yet.
    minting: HashSet<String>,
    generation: u64,
    load_task: Option<JoinHandle<()>>,
}

impl<G: ChecklistGateway> ChecklistActor<G> {
    async fn run(mut self, mut rx: mpsc::Receiver<ChecklistMessage>) {
        self.start_load();

        while let Some(msg) = rx.recv().await {
            match msg {
                ChecklistMessage::Command(cmd) => {
                    if self.state.phase.is_settled() {
                        self.execute(cmd).await;
                    } else {
                        tracing::debug!(command = cmd.name(), "deferring command until load");
                        self.deferred.push_back(cmd);
                    }
                }
                ChecklistMessage::Refresh => self.start_load(),
                ChecklistMessage::ClearError => {
                    if self.state.error.take().is_some() {
                        self.publish();
                    }
                }
                ChecklistMessage::Loaded { generation, result } => {
                    self.finish_load(generation, result).await;
                }
                ChecklistMessage::Resolved { minted, resolution } => {
                    self.release(minted);
                    self.apply(resolution);
                }
                ChecklistMessage::GetState { reply } => {
                    let _ = reply.send(self.state.clone());
                }
                ChecklistMessage::Shutdown => break,
            }
        }

        if let Some(task) = self.load_task.take() {
            task.abort();
        }
        tracing::debug!("checklist store stopped");
    }

    /// Begin a load, superseding any load still in flight.
    fn start_load(&mut self) {
        self.generation += 1;
        if let Some(task) = self.load_task.take() {
            task.abort();
        }
        self.state.phase = LoadPhase::Loading;
        self.publish();

        let generation = self.generation;
        let gateway = Arc::clone(&self.gateway);
        self.load_task = spawn_into(
            &self.inbox,
            async move { gateway.load_checklists().await },
            move |result| ChecklistMessage::Loaded { generation, result },
        );
    }

    async fn finish_load(&mut self, generation: u64, result: Result<Vec<Checklist>, GatewayError>) {
        if generation != self.generation {
            tracing::debug!(generation, latest = self.generation, "discarding stale load");
            return;
        }
        self.load_task = None;

        match result {
            Ok(checklists) => {
                tracing::info!(count = checklists.len(), "checklists loaded");
                self.state.checklists = checklists;
                self.state.phase = LoadPhase::Loaded;
                self.state.error = None;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to load checklists");
                self.state.phase = LoadPhase::LoadFailed;
                self.state.error = Some(error_message("failed to load checklists", &e));
            }
        }
        self.publish();

        while let Some(cmd) = self.deferred.pop_front() {
            self.execute(cmd).await;
        }
    }

    /// Turn a command into a gateway call and run it per the dispatch mode.
    async fn execute(&mut self, cmd: ChecklistCommand) {
        let span = tracing::info_span!("checklist_command", command = cmd.name());
        let Some((context, op)) = self.plan(cmd) else {
            return;
        };
        let gateway = Arc::clone(&self.gateway);
        let minted = match &op {
            ChecklistOp::Create(draft) => Some(draft.id.clone()),
            ChecklistOp::Update(_) | ChecklistOp::Delete(_) => None,
        };

        match self.gateway.dispatch() {
            Dispatch::Inline => {
                let resolution = perform(&*gateway, context, op).instrument(span).await;
                self.release(minted);
                self.apply(resolution);
            }
            Dispatch::Concurrent => {
                spawn_into(
                    &self.inbox,
                    async move { perform(&*gateway, context, op).await }.instrument(span),
                    move |resolution| ChecklistMessage::Resolved { minted, resolution },
                );
            }
        }
    }

    fn release(&mut self, minted: Option<String>) {
        if let Some(id) = minted {
            self.minting.remove(&id);
        }
    }

    /// Decide which gateway call `cmd` needs, or reject it up front.
    ///
    /// Edits and removals of unknown ids are no-ops.
    fn plan(&mut self, cmd: ChecklistCommand) -> Option<(&'static str, ChecklistOp)> {
        match cmd {
            ChecklistCommand::Add { title } => {
                let context = "failed to add checklist";
                if title.trim().is_empty() {
                    self.fail(error_message(context, &BLANK_TITLE));
                    return None;
                }
                let (state, minting) = (&self.state, &self.minting);
                let draft = Checklist::with_slug(title, |id| {
                    state.checklist(id).is_some() || minting.contains(id)
                });
                self.minting.insert(draft.id.clone());
                Some((context, ChecklistOp::Create(draft)))
            }
            ChecklistCommand::Edit { id, title } => {
                let context = "failed to edit checklist";
                if title.trim().is_empty() {
                    self.fail(error_message(context, &BLANK_TITLE));
                    return None;
                }
                if self.state.checklist(&id).is_none() {
                    tracing::debug!(%id, "edit of unknown checklist ignored");
                    return None;
                }
                Some((context, ChecklistOp::Update(Checklist { id, title })))
            }
            ChecklistCommand::Remove { id } => {
                if self.state.checklist(&id).is_none() {
                    tracing::debug!(%id, "removal of unknown checklist ignored");
                    return None;
                }
                Some(("failed to remove checklist", ChecklistOp::Delete(id)))
            }
        }
    }

    /// Apply a resolved command: record the failure or reduce the patch.
    fn apply(&mut self, resolution: Resolution<ChecklistPatch>) {
        let patch = match resolution {
            Ok(patch) => patch,
            Err(message) => {
                self.fail(message);
                return;
            }
        };

        if let ChecklistPatch::Added(checklist) = &patch {
            if self.state.checklist(&checklist.id).is_some() {
                let detail = format!("checklist '{}' already exists", checklist.id);
                self.fail(error_message("failed to add checklist", &detail));
                return;
            }
        }

        let changed = reduce(&mut self.state.checklists, &patch);
        if let ChecklistPatch::Removed(id) = patch {
            self.events.publish(DomainEvent::ChecklistRemoved { checklist_id: id });
        }
        if changed {
            self.publish();
            self.persist();
        }
    }

    fn fail(&mut self, message: String) {
        tracing::warn!(error = %message, "checklist command failed");
        self.state.error = Some(message);
        self.publish();
    }

    /// Write the collection back. Only ever called after a successful load.
    fn persist(&self) {
        if !self.state.loaded() {
            return;
        }
        if let Err(e) = self.gateway.save_checklists(&self.state.checklists) {
            tracing::error!(error = %e, "failed to save checklists");
        }
    }

    fn publish(&self) {
        self.publisher.send_replace(self.state.clone());
    }
}

/// Run `op` against the gateway and convert the outcome into a patch.
async fn perform<G: ChecklistGateway + ?Sized>(
    gateway: &G,
    context: &'static str,
    op: ChecklistOp,
) -> Resolution<ChecklistPatch> {
    let result = match op {
        ChecklistOp::Create(draft) => gateway.create_checklist(draft).await.map(ChecklistPatch::Added),
        ChecklistOp::Update(checklist) => gateway
            .update_checklist(checklist)
            .await
            .map(ChecklistPatch::Edited),
        ChecklistOp::Delete(id) => gateway
            .delete_checklist(id.clone())
            .await
            .map(|()| ChecklistPatch::Removed(id)),
    };
    result.map_err(|e| error_message(context, &e))
}

/// Apply `patch` to `checklists`. Returns whether anything changed.
fn reduce(checklists: &mut Vec<Checklist>, patch: &ChecklistPatch) -> bool {
    match patch {
        ChecklistPatch::Added(checklist) => {
            // Ids stay unique; a duplicate is never inserted.
            if checklists.iter().any(|c| c.id == checklist.id) {
                return false;
            }
            checklists.push(checklist.clone());
            true
        }
        ChecklistPatch::Edited(checklist) => {
            match checklists.iter_mut().find(|c| c.id == checklist.id) {
                Some(existing) if existing.title != checklist.title => {
                    existing.title = checklist.title.clone();
                    true
                }
                _ => false,
            }
        }
        ChecklistPatch::Removed(id) => {
            let before = checklists.len();
            checklists.retain(|c| &c.id != id);
            checklists.len() != before
        }
    }
}

/// Cloneable async handle to a running checklist store.
///
/// Commands are intents: the methods return once the message is queued,
/// not once it is applied. Use [`state`](Self::state) for a read ordered
/// behind queued commands, or [`wait_for`](Self::wait_for) to await a
/// condition on published snapshots.
#[derive(Debug, Clone)]
pub struct ChecklistStore {
    sender: mpsc::Sender<ChecklistMessage>,
    snapshots: watch::Receiver<ChecklistsState>,
}

impl ChecklistStore {
    /// Spawn the store's actor and start the initial load.
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn spawn<G: ChecklistGateway>(gateway: G, events: DomainEvents, config: &StoreConfig) -> Self {
        let (sender, rx) = mpsc::channel(config.queue_capacity);
        let (publisher, snapshots) = watch::channel(ChecklistsState::default());
        let actor = ChecklistActor {
            gateway: Arc::new(gateway),
            state: ChecklistsState::default(),
            publisher,
            events,
            inbox: sender.downgrade(),
            deferred: VecDeque::new(),
            minting: HashSet::new(),
            generation: 0,
            load_task: None,
        };
        tokio::spawn(actor.run(rx));
        Self { sender, snapshots }
    }

    /// Append a checklist titled `title`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ActorGone`] if the store has stopped.
    pub async fn add(&self, title: impl Into<String>) -> Result<(), StoreError> {
        self.command(ChecklistCommand::Add {
            title: title.into(),
        })
        .await
    }

    /// Replace the title of checklist `id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ActorGone`] if the store has stopped.
    pub async fn edit(
        &self,
        id: impl Into<String>,
        title: impl Into<String>,
    ) -> Result<(), StoreError> {
        self.command(ChecklistCommand::Edit {
            id: id.into(),
            title: title.into(),
        })
        .await
    }

    /// Remove checklist `id`. Its items are removed by the item store once
    /// the removal is confirmed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ActorGone`] if the store has stopped.
    pub async fn remove(&self, id: impl Into<String>) -> Result<(), StoreError> {
        self.command(ChecklistCommand::Remove { id: id.into() }).await
    }

    /// Queue an arbitrary command.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ActorGone`] if the store has stopped.
    pub async fn command(&self, cmd: ChecklistCommand) -> Result<(), StoreError> {
        enqueue(&self.sender, ChecklistMessage::Command(cmd)).await
    }

    /// Reload the collection from the gateway.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ActorGone`] if the store has stopped.
    pub async fn refresh(&self) -> Result<(), StoreError> {
        enqueue(&self.sender, ChecklistMessage::Refresh).await
    }

    /// Clear the error message.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ActorGone`] if the store has stopped.
    pub async fn clear_error(&self) -> Result<(), StoreError> {
        enqueue(&self.sender, ChecklistMessage::ClearError).await
    }

    /// Read the state after every message queued before this call has been
    /// handled. Concurrent gateway calls may still be in flight.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ActorGone`] if the store has stopped.
    pub async fn state(&self) -> Result<ChecklistsState, StoreError> {
        request(&self.sender, |reply| ChecklistMessage::GetState { reply }).await
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> ChecklistsState {
        self.snapshots.borrow().clone()
    }

    /// Checklists in the latest snapshot.
    pub fn checklists(&self) -> Vec<Checklist> {
        self.snapshots.borrow().checklists.clone()
    }

    /// Whether the latest snapshot is loaded.
    pub fn loaded(&self) -> bool {
        self.snapshots.borrow().loaded()
    }

    /// Error message in the latest snapshot.
    pub fn error(&self) -> Option<String> {
        self.snapshots.borrow().error.clone()
    }

    /// Receiver notified on every published snapshot.
    pub fn subscribe(&self) -> watch::Receiver<ChecklistsState> {
        self.snapshots.clone()
    }

    /// Wait up to `timeout` for a snapshot satisfying `predicate`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Timeout`] if the deadline passes first, or
    /// [`StoreError::ActorGone`] if the store stops.
    pub async fn wait_for(
        &self,
        timeout: Duration,
        predicate: impl FnMut(&ChecklistsState) -> bool,
    ) -> Result<ChecklistsState, StoreError> {
        wait_for_snapshot(&self.snapshots, timeout, predicate).await
    }

    /// Whether the actor is still running.
    pub fn is_alive(&self) -> bool {
        !self.sender.is_closed()
    }

    /// Resolve once the actor has stopped.
    pub async fn closed(&self) {
        self.sender.closed().await;
    }

    /// Stop the actor after the messages queued before this call.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ActorGone`] if the store had already stopped.
    pub async fn shutdown(&self) -> Result<(), StoreError> {
        enqueue(&self.sender, ChecklistMessage::Shutdown).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checklist(id: &str, title: &str) -> Checklist {
        Checklist {
            id: id.into(),
            title: title.into(),
        }
    }

    #[test]
    fn reduce_added_appends_in_order() {
        let mut list = vec![checklist("a", "A")];
        assert!(reduce(&mut list, &ChecklistPatch::Added(checklist("b", "B"))));
        assert_eq!(list, vec![checklist("a", "A"), checklist("b", "B")]);
    }

    #[test]
    fn reduce_added_with_known_id_is_not_inserted() {
        let mut list = vec![checklist("a", "A"), checklist("b", "B")];
        assert!(!reduce(&mut list, &ChecklistPatch::Added(checklist("a", "A2"))));
        assert_eq!(list, vec![checklist("a", "A"), checklist("b", "B")]);
    }

    #[test]
    fn reduce_edited_unknown_id_is_noop() {
        let mut list = vec![checklist("a", "A")];
        assert!(!reduce(&mut list, &ChecklistPatch::Edited(checklist("z", "Z"))));
        assert_eq!(list, vec![checklist("a", "A")]);
    }

    #[test]
    fn reduce_edited_same_title_reports_no_change() {
        let mut list = vec![checklist("a", "A")];
        assert!(!reduce(&mut list, &ChecklistPatch::Edited(checklist("a", "A"))));
        assert!(reduce(&mut list, &ChecklistPatch::Edited(checklist("a", "Renamed"))));
        assert_eq!(list[0].title, "Renamed");
    }

    #[test]
    fn reduce_removed_filters_by_id() {
        let mut list = vec![checklist("a", "A"), checklist("b", "B")];
        assert!(reduce(&mut list, &ChecklistPatch::Removed("a".into())));
        assert!(!reduce(&mut list, &ChecklistPatch::Removed("a".into())));
        assert_eq!(list, vec![checklist("b", "B")]);
    }
}
