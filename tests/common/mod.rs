//! Scripted gateway: every call is parked until the test answers it, so
//! tests control exactly when and in which order results resolve.

#![allow(dead_code)]

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use quicklists::{
    Checklist, ChecklistGateway, ChecklistItem, ChecklistItemGateway, Dispatch, GatewayError,
    GatewayFuture, ItemScope,
};
use tokio::sync::{mpsc, oneshot};

pub const WAIT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    LoadChecklists,
    CreateChecklist(Checklist),
    UpdateChecklist(Checklist),
    DeleteChecklist(String),
    LoadItems(Option<String>),
    CreateItem(ChecklistItem),
    UpdateItem(ChecklistItem),
    ToggleItem(ChecklistItem),
    DeleteItem(String),
    ResetItems(String),
}

#[derive(Debug)]
pub enum Reply {
    Checklists(Vec<Checklist>),
    Checklist(Checklist),
    Items(Vec<ChecklistItem>),
    Item(ChecklistItem),
    Done,
}

pub struct PendingCall {
    pub op: Op,
    reply: oneshot::Sender<Result<Reply, GatewayError>>,
}

impl PendingCall {
    pub fn respond(self, reply: Reply) {
        let _ = self.reply.send(Ok(reply));
    }

    pub fn fail(self, err: GatewayError) {
        let _ = self.reply.send(Err(err));
    }

    /// Answer a create/update/toggle by echoing the record it carried.
    pub fn echo(self) {
        let reply = match &self.op {
            Op::CreateChecklist(c) | Op::UpdateChecklist(c) => Reply::Checklist(c.clone()),
            Op::CreateItem(i) | Op::UpdateItem(i) | Op::ToggleItem(i) => Reply::Item(i.clone()),
            Op::DeleteChecklist(_) | Op::DeleteItem(_) | Op::ResetItems(_) => Reply::Done,
            other => panic!("nothing to echo for {other:?}"),
        };
        self.respond(reply);
    }
}

/// Receiving side of a [`ScriptedGateway`].
pub struct Calls(mpsc::UnboundedReceiver<PendingCall>);

impl Calls {
    /// Next parked call, failing the test if none arrives in time.
    pub async fn next(&mut self) -> PendingCall {
        tokio::time::timeout(WAIT, self.0.recv())
            .await
            .expect("timed out waiting for a gateway call")
            .expect("gateway dropped")
    }

    /// Skip calls until one matches `predicate`.
    pub async fn next_matching(&mut self, predicate: impl Fn(&Op) -> bool) -> PendingCall {
        loop {
            let call = self.next().await;
            if predicate(&call.op) {
                return call;
            }
        }
    }

    /// Assert that no call arrives within a short grace period.
    pub async fn assert_idle(&mut self) {
        let result = tokio::time::timeout(Duration::from_millis(50), self.0.recv()).await;
        if let Ok(Some(call)) = result {
            panic!("unexpected gateway call: {:?}", call.op);
        }
    }
}

#[derive(Clone)]
pub struct ScriptedGateway {
    calls: mpsc::UnboundedSender<PendingCall>,
    dispatch: Dispatch,
    scope: ItemScope,
    saves: Arc<AtomicUsize>,
}

impl ScriptedGateway {
    pub fn new(dispatch: Dispatch, scope: ItemScope) -> (Self, Calls) {
        let (tx, rx) = mpsc::unbounded_channel();
        let gateway = Self {
            calls: tx,
            dispatch,
            scope,
            saves: Arc::new(AtomicUsize::new(0)),
        };
        (gateway, Calls(rx))
    }

    /// Number of `save_*` calls seen so far, across both collections.
    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    fn call(&self, op: Op) -> GatewayFuture<'static, Reply> {
        let (tx, rx) = oneshot::channel();
        let _ = self.calls.send(PendingCall { op, reply: tx });
        Box::pin(async move {
            rx.await
                .unwrap_or_else(|_| Err(GatewayError::Io(io::Error::other("call abandoned"))))
        })
    }
}

impl ChecklistGateway for ScriptedGateway {
    fn dispatch(&self) -> Dispatch {
        self.dispatch
    }

    fn load_checklists(&self) -> GatewayFuture<'_, Vec<Checklist>> {
        let reply = self.call(Op::LoadChecklists);
        Box::pin(async move {
            match reply.await? {
                Reply::Checklists(list) => Ok(list),
                other => panic!("unexpected reply {other:?}"),
            }
        })
    }

    fn save_checklists(&self, _checklists: &[Checklist]) -> Result<(), GatewayError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn create_checklist(&self, checklist: Checklist) -> GatewayFuture<'_, Checklist> {
        let reply = self.call(Op::CreateChecklist(checklist));
        Box::pin(async move {
            match reply.await? {
                Reply::Checklist(c) => Ok(c),
                other => panic!("unexpected reply {other:?}"),
            }
        })
    }

    fn update_checklist(&self, checklist: Checklist) -> GatewayFuture<'_, Checklist> {
        let reply = self.call(Op::UpdateChecklist(checklist));
        Box::pin(async move {
            match reply.await? {
                Reply::Checklist(c) => Ok(c),
                other => panic!("unexpected reply {other:?}"),
            }
        })
    }

    fn delete_checklist(&self, id: String) -> GatewayFuture<'_, ()> {
        let reply = self.call(Op::DeleteChecklist(id));
        Box::pin(async move { reply.await.map(|_| ()) })
    }
}

impl ChecklistItemGateway for ScriptedGateway {
    fn dispatch(&self) -> Dispatch {
        self.dispatch
    }

    fn scope(&self) -> ItemScope {
        self.scope
    }

    fn load_items(&self, checklist_id: Option<String>) -> GatewayFuture<'_, Vec<ChecklistItem>> {
        let reply = self.call(Op::LoadItems(checklist_id));
        Box::pin(async move {
            match reply.await? {
                Reply::Items(items) => Ok(items),
                other => panic!("unexpected reply {other:?}"),
            }
        })
    }

    fn save_items(&self, _items: &[ChecklistItem]) -> Result<(), GatewayError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn create_item(&self, item: ChecklistItem) -> GatewayFuture<'_, ChecklistItem> {
        let reply = self.call(Op::CreateItem(item));
        Box::pin(async move { expect_item(reply.await?) })
    }

    fn update_item(&self, item: ChecklistItem) -> GatewayFuture<'_, ChecklistItem> {
        let reply = self.call(Op::UpdateItem(item));
        Box::pin(async move { expect_item(reply.await?) })
    }

    fn toggle_item(&self, item: ChecklistItem) -> GatewayFuture<'_, ChecklistItem> {
        let reply = self.call(Op::ToggleItem(item));
        Box::pin(async move { expect_item(reply.await?) })
    }

    fn delete_item(&self, id: String) -> GatewayFuture<'_, ()> {
        let reply = self.call(Op::DeleteItem(id));
        Box::pin(async move { reply.await.map(|_| ()) })
    }

    fn reset_items(&self, checklist_id: String) -> GatewayFuture<'_, ()> {
        let reply = self.call(Op::ResetItems(checklist_id));
        Box::pin(async move { reply.await.map(|_| ()) })
    }
}

fn expect_item(reply: Reply) -> Result<ChecklistItem, GatewayError> {
    match reply {
        Reply::Item(item) => Ok(item),
        other => panic!("unexpected reply {other:?}"),
    }
}

pub fn checklist(id: &str, title: &str) -> Checklist {
    Checklist {
        id: id.into(),
        title: title.into(),
    }
}

pub fn item(id: &str, checklist_id: &str, checked: bool) -> ChecklistItem {
    ChecklistItem {
        id: id.into(),
        checklist_id: checklist_id.into(),
        title: format!("Item {id}"),
        checked,
    }
}
