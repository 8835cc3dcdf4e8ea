//! Upload sessions
//!
//! A session is the set of tasks produced by one `upload` call. The manager
//! keeps a handle to the shared counters and settles one task at a time;
//! callers watch the remaining count to learn when the whole batch is done.

use crate::upload::types::{SessionId, TaskId, UploadingFile};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

/// How a task left its session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Settlement {
    Succeeded,
    Failed,
    Cancelled,
}

#[derive(Debug)]
pub(crate) struct SessionCounters {
    remaining: watch::Sender<usize>,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    cancelled: AtomicUsize,
}

impl SessionCounters {
    fn new(tasks: usize) -> Self {
        let (remaining, _) = watch::channel(tasks);
        Self {
            remaining,
            succeeded: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            cancelled: AtomicUsize::new(0),
        }
    }

    pub(crate) fn settle(&self, outcome: Settlement) {
        let counter = match outcome {
            Settlement::Succeeded => &self.succeeded,
            Settlement::Failed => &self.failed,
            Settlement::Cancelled => &self.cancelled,
        };
        counter.fetch_add(1, Ordering::SeqCst);
        self.remaining.send_modify(|n| *n = n.saturating_sub(1));
    }
}

/// Handle to one batch of uploads
#[derive(Debug, Clone)]
pub struct UploadSession {
    id: SessionId,
    entries: Arc<[(TaskId, UploadingFile)]>,
    counters: Arc<SessionCounters>,
}

impl UploadSession {
    pub(crate) fn new(id: SessionId, entries: Vec<(TaskId, UploadingFile)>) -> Self {
        let counters = Arc::new(SessionCounters::new(entries.len()));
        Self {
            id,
            entries: entries.into(),
            counters,
        }
    }

    pub(crate) fn counters(&self) -> Arc<SessionCounters> {
        self.counters.clone()
    }

    /// Identifier used for this batch in log output
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Files accepted into this batch
    pub fn files(&self) -> impl Iterator<Item = &UploadingFile> {
        self.entries.iter().map(|(_, file)| file)
    }

    pub fn task_ids(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.entries.iter().map(|(id, _)| *id)
    }

    /// Number of files accepted into the batch
    ///
    /// Inputs that were skipped during expansion are not counted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Tasks that are still pending or running
    pub fn remaining(&self) -> usize {
        *self.counters.remaining.borrow()
    }

    pub fn succeeded(&self) -> usize {
        self.counters.succeeded.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> usize {
        self.counters.failed.load(Ordering::SeqCst)
    }

    pub fn cancelled(&self) -> usize {
        self.counters.cancelled.load(Ordering::SeqCst)
    }

    pub fn is_finished(&self) -> bool {
        self.remaining() == 0
    }

    /// Observe the remaining-task counter
    pub fn subscribe(&self) -> watch::Receiver<usize> {
        self.counters.remaining.subscribe()
    }

    /// Wait until every task of the batch has settled
    pub async fn finished(&self) {
        let mut rx = self.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(|remaining| *remaining == 0).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::path::RemotePath;

    fn session(n: u64) -> UploadSession {
        let entries = (0..n)
            .map(|i| {
                let target = RemotePath::parse(&format!("up/{}.txt", i)).unwrap();
                (TaskId(i), UploadingFile::new(target, format!("/tmp/{}.txt", i)))
            })
            .collect();
        UploadSession::new(SessionId(1), entries)
    }

    #[test]
    fn test_settle_counts() {
        let session = session(3);
        assert_eq!(session.remaining(), 3);
        assert_eq!(session.task_ids().collect::<Vec<_>>(), vec![TaskId(0), TaskId(1), TaskId(2)]);

        let counters = session.counters();
        counters.settle(Settlement::Succeeded);
        counters.settle(Settlement::Failed);
        assert_eq!(session.remaining(), 1);
        assert!(!session.is_finished());

        counters.settle(Settlement::Cancelled);
        assert!(session.is_finished());
        assert_eq!(
            (session.succeeded(), session.failed(), session.cancelled()),
            (1, 1, 1)
        );
    }

    #[test]
    fn test_empty_session_is_finished() {
        let session = session(0);
        assert!(session.is_empty());
        assert!(session.is_finished());
    }

    #[tokio::test]
    async fn test_finished_wakes_up() {
        let session = session(2);
        let counters = session.counters();
        let waiter = {
            let session = session.clone();
            tokio::spawn(async move { session.finished().await })
        };

        counters.settle(Settlement::Succeeded);
        counters.settle(Settlement::Succeeded);
        waiter.await.unwrap();
        assert_eq!(session.succeeded(), 2);
    }
}
