//! The checklist item store.
//!
//! Same actor shape as [`ChecklistStore`](crate::ChecklistStore), plus the
//! active checklist and the cascade: a forwarder task turns every
//! [`DomainEvent::ChecklistRemoved`] on the bus into a message on this
//! store's queue, so the purge is ordered with everything else the store
//! handles.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::Instrument;

use crate::actor::{BLANK_TITLE, Resolution, enqueue, request, spawn_into, wait_for_snapshot};
use crate::command::ChecklistItemCommand;
use crate::config::StoreConfig;
use crate::error::{GatewayError, StoreError, error_message};
use crate::event::{DomainEvent, DomainEvents};
use crate::gateway::{ChecklistItemGateway, Dispatch, ItemScope};
use crate::model::ChecklistItem;
use crate::snapshot::{ChecklistItemsState, LoadPhase, Progress};

/// A confirmed change to the item collection.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ItemPatch {
    Added(ChecklistItem),
    Updated(ChecklistItem),
    Removed(String),
    /// Every item of the checklist was unchecked.
    Reset(String),
    /// Every item of the checklist was dropped after its removal.
    Purged(String),
}

enum ItemOp {
    Create(ChecklistItem),
    Update(ChecklistItem),
    Toggle(ChecklistItem),
    Delete(String),
    Reset(String),
}

/// Work that waits for a settled load.
enum ItemIntent {
    Command(ChecklistItemCommand),
    Cascade(String),
}

enum ItemMessage {
    Command(ChecklistItemCommand),
    SetActive(String),
    /// Forwarded from the domain event bus.
    ChecklistRemoved(String),
    Refresh,
    ClearError,
    Loaded {
        generation: u64,
        result: Result<Vec<ChecklistItem>, GatewayError>,
    },
    Resolved(Resolution<ItemPatch>),
    GetState {
        reply: oneshot::Sender<ChecklistItemsState>,
    },
    Shutdown,
}

struct ItemActor<G> {
    gateway: Arc<G>,
    scope: ItemScope,
    state: ChecklistItemsState,
    publisher: watch::Sender<ChecklistItemsState>,
    inbox: mpsc::WeakSender<ItemMessage>,
    deferred: VecDeque<ItemIntent>,
    generation: u64,
    load_task: Option<JoinHandle<()>>,
}

impl<G: ChecklistItemGateway> ItemActor<G> {
    async fn run(mut self, mut rx: mpsc::Receiver<ItemMessage>) {
        if self.scope == ItemScope::All {
            self.start_load(None);
        }

        while let Some(msg) = rx.recv().await {
            match msg {
                ItemMessage::Command(cmd) => self.submit(ItemIntent::Command(cmd)).await,
                ItemMessage::ChecklistRemoved(id) => self.submit(ItemIntent::Cascade(id)).await,
                ItemMessage::SetActive(id) => self.set_active(id),
                ItemMessage::Refresh => self.refresh(),
                ItemMessage::ClearError => {
                    if self.state.error.take().is_some() {
                        self.publish();
                    }
                }
                ItemMessage::Loaded { generation, result } => {
                    self.finish_load(generation, result).await;
                }
                ItemMessage::Resolved(resolution) => self.apply(resolution),
                ItemMessage::GetState { reply } => {
                    let _ = reply.send(self.state.clone());
                }
                ItemMessage::Shutdown => break,
            }
        }

        if let Some(task) = self.load_task.take() {
            task.abort();
        }
        tracing::debug!("checklist item store stopped");
    }

    async fn submit(&mut self, intent: ItemIntent) {
        if self.state.phase.is_settled() {
            self.handle(intent).await;
        } else if let (LoadPhase::Uninitialized, ItemIntent::Cascade(checklist_id)) =
            (self.state.phase, &intent)
        {
            // Nothing is loaded yet, and the first load reads the backend
            // after the removal.
            tracing::debug!(%checklist_id, "dropping removal before any item load");
        } else {
            tracing::debug!("deferring item intent until load");
            self.deferred.push_back(intent);
        }
    }

    async fn handle(&mut self, intent: ItemIntent) {
        match intent {
            ItemIntent::Command(cmd) => self.execute(cmd).await,
            ItemIntent::Cascade(checklist_id) => {
                tracing::info!(%checklist_id, "purging items of removed checklist");
                self.apply(Ok(ItemPatch::Purged(checklist_id)));
            }
        }
    }

    fn set_active(&mut self, id: String) {
        let same = self.state.current_checklist_id.as_deref() == Some(id.as_str());
        match self.scope {
            ItemScope::All => {
                if !same {
                    self.state.current_checklist_id = Some(id);
                    self.publish();
                }
            }
            ItemScope::PerChecklist => {
                if same && matches!(self.state.phase, LoadPhase::Loading | LoadPhase::Loaded) {
                    return;
                }
                self.state.current_checklist_id = Some(id.clone());
                self.start_load(Some(id));
            }
        }
    }

    fn refresh(&mut self) {
        match self.scope {
            ItemScope::All => self.start_load(None),
            ItemScope::PerChecklist => match self.state.current_checklist_id.clone() {
                Some(id) => self.start_load(Some(id)),
                None => tracing::debug!("refresh without an active checklist ignored"),
            },
        }
    }

    /// Begin a load, aborting and superseding any load still in flight.
    fn start_load(&mut self, checklist_id: Option<String>) {
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
            async move { gateway.load_items(checklist_id).await },
            move |result| ItemMessage::Loaded { generation, result },
        );
    }

    async fn finish_load(
        &mut self,
        generation: u64,
        result: Result<Vec<ChecklistItem>, GatewayError>,
    ) {
        if generation != self.generation {
            tracing::debug!(generation, latest = self.generation, "discarding stale item load");
            return;
        }
        self.load_task = None;

        match result {
            Ok(items) => {
                tracing::info!(
                    count = items.len(),
                    checklist_id = ?self.state.current_checklist_id,
                    "checklist items loaded"
                );
                self.state.checklist_items = items;
                self.state.phase = LoadPhase::Loaded;
                self.state.error = None;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to load checklist items");
                self.state.phase = LoadPhase::LoadFailed;
                self.state.error = Some(error_message("failed to load checklist items", &e));
            }
        }
        self.publish();

        // A replayed intent can not unsettle the phase, so the queue drains
        // completely here.
        while let Some(intent) = self.deferred.pop_front() {
            self.handle(intent).await;
        }
    }

    async fn execute(&mut self, cmd: ChecklistItemCommand) {
        let span = tracing::info_span!("item_command", command = cmd.name());
        let Some((context, op)) = self.plan(cmd) else {
            return;
        };
        let gateway = Arc::clone(&self.gateway);

        match self.gateway.dispatch() {
            Dispatch::Inline => {
                let resolution = perform(&*gateway, context, op).instrument(span).await;
                self.apply(resolution);
            }
            Dispatch::Concurrent => {
                spawn_into(
                    &self.inbox,
                    async move { perform(&*gateway, context, op).await }.instrument(span),
                    ItemMessage::Resolved,
                );
            }
        }
    }

    fn plan(&mut self, cmd: ChecklistItemCommand) -> Option<(&'static str, ItemOp)> {
        match cmd {
            ChecklistItemCommand::Add {
                checklist_id,
                title,
            } => {
                let context = "failed to add checklist item";
                if title.trim().is_empty() {
                    self.fail(error_message(context, &BLANK_TITLE));
                    return None;
                }
                Some((context, ItemOp::Create(ChecklistItem::new(checklist_id, title))))
            }
            ChecklistItemCommand::Edit { id, title } => {
                let context = "failed to edit checklist item";
                if title.trim().is_empty() {
                    self.fail(error_message(context, &BLANK_TITLE));
                    return None;
                }
                let existing = self.existing(&id)?;
                Some((context, ItemOp::Update(ChecklistItem { title, ..existing })))
            }
            ChecklistItemCommand::Remove { id } => {
                self.existing(&id)?;
                Some(("failed to remove checklist item", ItemOp::Delete(id)))
            }
            ChecklistItemCommand::Toggle { id } => {
                let existing = self.existing(&id)?;
                Some(("failed to toggle checklist item", ItemOp::Toggle(existing.toggled())))
            }
            ChecklistItemCommand::Reset { checklist_id } => Some((
                "failed to reset checklist items",
                ItemOp::Reset(checklist_id),
            )),
        }
    }

    /// Clone of item `id`, or `None` (logged) when it is unknown.
    fn existing(&self, id: &str) -> Option<ChecklistItem> {
        let found = self.state.checklist_items.iter().find(|item| item.id == id).cloned();
        if found.is_none() {
            tracing::debug!(%id, "command for unknown checklist item ignored");
        }
        found
    }

    fn apply(&mut self, resolution: Resolution<ItemPatch>) {
        let patch = match resolution {
            Ok(patch) => patch,
            Err(message) => {
                self.fail(message);
                return;
            }
        };

        if let ItemPatch::Added(item) = &patch {
            if self.scope == ItemScope::PerChecklist
                && self.state.current_checklist_id.as_deref() != Some(item.checklist_id.as_str())
            {
                tracing::debug!(
                    checklist_id = %item.checklist_id,
                    "created item belongs to an inactive checklist"
                );
                return;
            }
        }

        if reduce(&mut self.state.checklist_items, &patch) {
            self.publish();
            self.persist();
        }
    }

    fn fail(&mut self, message: String) {
        tracing::warn!(error = %message, "checklist item command failed");
        self.state.error = Some(message);
        self.publish();
    }

    fn persist(&self) {
        if !self.state.loaded() {
            return;
        }
        if let Err(e) = self.gateway.save_items(&self.state.checklist_items) {
            tracing::error!(error = %e, "failed to save checklist items");
        }
    }

    fn publish(&self) {
        self.publisher.send_replace(self.state.clone());
    }
}

async fn perform<G: ChecklistItemGateway + ?Sized>(
    gateway: &G,
    context: &'static str,
    op: ItemOp,
) -> Resolution<ItemPatch> {
    let result = match op {
        ItemOp::Create(item) => gateway.create_item(item).await.map(ItemPatch::Added),
        ItemOp::Update(item) => gateway.update_item(item).await.map(ItemPatch::Updated),
        ItemOp::Toggle(item) => gateway.toggle_item(item).await.map(ItemPatch::Updated),
        ItemOp::Delete(id) => gateway
            .delete_item(id.clone())
            .await
            .map(|()| ItemPatch::Removed(id)),
        ItemOp::Reset(checklist_id) => gateway
            .reset_items(checklist_id.clone())
            .await
            .map(|()| ItemPatch::Reset(checklist_id)),
    };
    result.map_err(|e| error_message(context, &e))
}

/// Apply `patch` to `items`. Returns whether anything changed.
fn reduce(items: &mut Vec<ChecklistItem>, patch: &ItemPatch) -> bool {
    match patch {
        ItemPatch::Added(item) | ItemPatch::Updated(item) => {
            match items.iter_mut().find(|existing| existing.id == item.id) {
                Some(existing) => {
                    let changed = existing != item;
                    *existing = item.clone();
                    changed
                }
                None if matches!(patch, ItemPatch::Added(_)) => {
                    items.push(item.clone());
                    true
                }
                // The item was removed while the update was in flight.
                None => false,
            }
        }
        ItemPatch::Removed(id) => {
            let before = items.len();
            items.retain(|item| &item.id != id);
            items.len() != before
        }
        ItemPatch::Reset(checklist_id) => {
            let mut changed = false;
            for item in items
                .iter_mut()
                .filter(|item| &item.checklist_id == checklist_id && item.checked)
            {
                item.checked = false;
                changed = true;
            }
            changed
        }
        ItemPatch::Purged(checklist_id) => {
            let before = items.len();
            items.retain(|item| &item.checklist_id != checklist_id);
            items.len() != before
        }
    }
}

/// Cloneable async handle to a running checklist item store.
#[derive(Debug, Clone)]
pub struct ChecklistItemStore {
    sender: mpsc::Sender<ItemMessage>,
    snapshots: watch::Receiver<ChecklistItemsState>,
}

impl ChecklistItemStore {
    /// Spawn the store's actor and subscribe it to `events`.
    ///
    /// With [`ItemScope::All`] the initial load starts immediately; with
    /// [`ItemScope::PerChecklist`] it waits for
    /// [`set_active_checklist`](Self::set_active_checklist).
    ///
    /// # Panics
    ///
    /// Panics if called outside a Tokio runtime.
    pub fn spawn<G: ChecklistItemGateway>(
        gateway: G,
        events: &DomainEvents,
        config: &StoreConfig,
    ) -> Self {
        let (sender, rx) = mpsc::channel(config.queue_capacity);
        let (publisher, snapshots) = watch::channel(ChecklistItemsState::default());

        // Subscribe before returning so no event published afterwards is
        // missed.
        let stream = events.stream();
        tokio::spawn(forward_removals(stream, sender.downgrade()));

        let actor = ItemActor {
            scope: gateway.scope(),
            gateway: Arc::new(gateway),
            state: ChecklistItemsState::default(),
            publisher,
            inbox: sender.downgrade(),
            deferred: VecDeque::new(),
            generation: 0,
            load_task: None,
        };
        tokio::spawn(actor.run(rx));
        Self { sender, snapshots }
    }

    /// Make `checklist_id` the active checklist.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ActorGone`] if the store has stopped.
    pub async fn set_active_checklist(&self, checklist_id: impl Into<String>) -> Result<(), StoreError> {
        enqueue(&self.sender, ItemMessage::SetActive(checklist_id.into())).await
    }

    /// Append an unchecked item titled `title` to `checklist_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ActorGone`] if the store has stopped.
    pub async fn add(
        &self,
        checklist_id: impl Into<String>,
        title: impl Into<String>,
    ) -> Result<(), StoreError> {
        self.command(ChecklistItemCommand::Add {
            checklist_id: checklist_id.into(),
            title: title.into(),
        })
        .await
    }

    /// Replace the title of item `id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ActorGone`] if the store has stopped.
    pub async fn edit(
        &self,
        id: impl Into<String>,
        title: impl Into<String>,
    ) -> Result<(), StoreError> {
        self.command(ChecklistItemCommand::Edit {
            id: id.into(),
            title: title.into(),
        })
        .await
    }

    /// Remove item `id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ActorGone`] if the store has stopped.
    pub async fn remove(&self, id: impl Into<String>) -> Result<(), StoreError> {
        self.command(ChecklistItemCommand::Remove { id: id.into() }).await
    }

    /// Flip `checked` on item `id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ActorGone`] if the store has stopped.
    pub async fn toggle(&self, id: impl Into<String>) -> Result<(), StoreError> {
        self.command(ChecklistItemCommand::Toggle { id: id.into() }).await
    }

    /// Uncheck every item of `checklist_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ActorGone`] if the store has stopped.
    pub async fn reset(&self, checklist_id: impl Into<String>) -> Result<(), StoreError> {
        self.command(ChecklistItemCommand::Reset {
            checklist_id: checklist_id.into(),
        })
        .await
    }

    /// Queue an arbitrary command.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ActorGone`] if the store has stopped.
    pub async fn command(&self, cmd: ChecklistItemCommand) -> Result<(), StoreError> {
        enqueue(&self.sender, ItemMessage::Command(cmd)).await
    }

    /// Reload items: everything, or the active checklist's items.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ActorGone`] if the store has stopped.
    pub async fn refresh(&self) -> Result<(), StoreError> {
        enqueue(&self.sender, ItemMessage::Refresh).await
    }

    /// Clear the error message.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ActorGone`] if the store has stopped.
    pub async fn clear_error(&self) -> Result<(), StoreError> {
        enqueue(&self.sender, ItemMessage::ClearError).await
    }

    /// Read the state after every message queued before this call.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::ActorGone`] if the store has stopped.
    pub async fn state(&self) -> Result<ChecklistItemsState, StoreError> {
        request(&self.sender, |reply| ItemMessage::GetState { reply }).await
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> ChecklistItemsState {
        self.snapshots.borrow().clone()
    }

    /// Items of `checklist_id` in the latest snapshot.
    pub fn items_for(&self, checklist_id: &str) -> Vec<ChecklistItem> {
        self.snapshots.borrow().items_for(checklist_id).cloned().collect()
    }

    /// Items of the active checklist in the latest snapshot.
    pub fn active_items(&self) -> Vec<ChecklistItem> {
        self.snapshots
            .borrow()
            .active_items()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Progress of `checklist_id` in the latest snapshot.
    pub fn progress(&self, checklist_id: &str) -> Progress {
        self.snapshots.borrow().progress(checklist_id)
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
    pub fn subscribe(&self) -> watch::Receiver<ChecklistItemsState> {
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
        predicate: impl FnMut(&ChecklistItemsState) -> bool,
    ) -> Result<ChecklistItemsState, StoreError> {
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
        enqueue(&self.sender, ItemMessage::Shutdown).await
    }
}

/// Forward checklist removals from the bus into the item store's queue.
///
/// The bus queue is unbounded, so removals published while the store is
/// busy wait there instead of being dropped. Exits when the bus closes or
/// the store is gone.
async fn forward_removals(
    mut stream: UnboundedReceiverStream<DomainEvent>,
    inbox: mpsc::WeakSender<ItemMessage>,
) {
    while let Some(DomainEvent::ChecklistRemoved { checklist_id }) = stream.next().await {
        let Some(tx) = inbox.upgrade() else {
            break;
        };
        if tx.send(ItemMessage::ChecklistRemoved(checklist_id)).await.is_err() {
            break;
        }
    }
}
