//! Plumbing shared by the two store actors.
//!
//! Each store runs as one tokio task that owns its state and reads an
//! `mpsc` queue. Handles talk to it with fire-and-forget messages and
//! `oneshot` requests; snapshots go out over a `watch` channel. Gateway
//! calls that run concurrently post their results back into the same queue
//! through a weak sender, so a store with no live handles still shuts down.

use std::future::Future;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::error::StoreError;

/// Outcome of a gateway call, already reduced to a patch or to the
/// message that will be written into the snapshot's `error`.
pub(crate) type Resolution<P> = Result<P, String>;

/// Error detail for commands that carry a blank title.
pub(crate) const BLANK_TITLE: &str = "title must not be blank";

/// Run `fut` on its own task and post `wrap(output)` to `inbox`.
///
/// Returns `None` without spawning when every strong sender is gone, i.e.
/// nobody could observe the result anyway.
pub(crate) fn spawn_into<M, F>(
    inbox: &mpsc::WeakSender<M>,
    fut: F,
    wrap: impl FnOnce(F::Output) -> M + Send + 'static,
) -> Option<JoinHandle<()>>
where
    M: Send + 'static,
    F: Future + Send + 'static,
    F::Output: Send,
{
    let tx = inbox.upgrade()?;
    Some(tokio::spawn(async move {
        let output = fut.await;
        // A closed queue means the actor exited; the result has no reader.
        let _ = tx.send(wrap(output)).await;
    }))
}

/// Enqueue `msg`, mapping a closed queue to [`StoreError::ActorGone`].
pub(crate) async fn enqueue<M>(sender: &mpsc::Sender<M>, msg: M) -> Result<(), StoreError> {
    sender.send(msg).await.map_err(|_| StoreError::ActorGone)
}

/// Send a request built around a reply channel and await the answer.
///
/// The request is ordered behind every message already queued.
pub(crate) async fn request<M, T>(
    sender: &mpsc::Sender<M>,
    build: impl FnOnce(oneshot::Sender<T>) -> M,
) -> Result<T, StoreError> {
    let (tx, rx) = oneshot::channel();
    enqueue(sender, build(tx)).await?;
    rx.await.map_err(|_| StoreError::ActorGone)
}

/// Wait up to `timeout` for a published snapshot satisfying `predicate`.
///
/// Checks the current snapshot first, so an already-true predicate returns
/// immediately.
pub(crate) async fn wait_for_snapshot<S: Clone>(
    snapshots: &watch::Receiver<S>,
    timeout: Duration,
    predicate: impl FnMut(&S) -> bool,
) -> Result<S, StoreError> {
    let mut rx = snapshots.clone();
    let waited = tokio::time::timeout(timeout, async {
        rx.wait_for(predicate).await.map(|state| state.clone())
    })
    .await
    .map_err(|_| StoreError::Timeout)?;
    waited.map_err(|_| StoreError::ActorGone)
}
