//! Scheduler state: trie, task table, pending queue, and running set
//!
//! Everything here is synchronous and lives behind the manager's single lock,
//! so an admission decision and the budget update it implies are one step.
//! The async side of the manager (event loop, transfers, eviction timers)
//! only ever drives this state through the methods below.

use crate::error::Result;
use crate::path::RemotePath;
use crate::transport::Transport;
use crate::trie::PathTrie;
use crate::upload::expand::LocalFile;
use crate::upload::listing;
use crate::upload::session::{SessionCounters, Settlement, UploadSession};
use crate::upload::types::{
    FileInfo, SchedulerStats, SessionId, TaskId, TaskState, UploadProgress, UploadingFile,
};
use bytesize::ByteSize;
use log::{debug, info, warn};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
struct TaskEntry {
    target: RemotePath,
    progress: UploadProgress,
    state: TaskState,
}

/// A unit of scheduling work, consumed once by `admit`
pub(crate) struct PendingTask {
    id: TaskId,
    file: UploadingFile,
    declared: u64,
    transport: Arc<dyn Transport>,
    session: Arc<SessionCounters>,
}

impl PartialEq for PendingTask {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PendingTask {}

impl fmt::Debug for PendingTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingTask")
            .field("id", &self.id)
            .field("file", &self.file)
            .field("declared", &self.declared)
            .finish()
    }
}

/// A task that has just been admitted and must be started
pub(crate) struct Admitted {
    pub id: TaskId,
    pub file: UploadingFile,
    pub transport: Arc<dyn Transport>,
    pub cancel: CancellationToken,
}

struct RunningTask {
    admitted_bytes: u64,
    cancel: CancellationToken,
    session: Arc<SessionCounters>,
}

pub(crate) struct State {
    byte_budget: u64,
    trie: PathTrie<TaskId>,
    tasks: HashMap<TaskId, TaskEntry>,
    queue: VecDeque<PendingTask>,
    running: HashMap<TaskId, RunningTask>,
    uploading_bytes: u64,
    drained: Vec<TaskId>,
    next_task: u64,
    next_session: u64,
}

impl State {
    pub fn new(byte_budget: u64) -> Self {
        Self {
            byte_budget,
            trie: PathTrie::new(),
            tasks: HashMap::new(),
            queue: VecDeque::new(),
            running: HashMap::new(),
            uploading_bytes: 0,
            drained: Vec::new(),
            next_task: 1,
            next_session: 1,
        }
    }

    /// Track every file in the trie, queue it, and return the batch session
    ///
    /// Files whose target collides with a tracked path of the other kind are
    /// skipped. A target that already holds an upload supersedes it.
    pub fn enqueue(&mut self, files: Vec<LocalFile>, transport: Arc<dyn Transport>) -> UploadSession {
        let session_id = SessionId(self.next_session);
        self.next_session += 1;

        let mut accepted = Vec::with_capacity(files.len());
        for file in files {
            let id = TaskId(self.next_task);
            self.next_task += 1;

            match self.trie.insert(&file.target, id) {
                Ok(replaced) => {
                    if let Some(old) = replaced {
                        // a duplicate target within this batch: the later file wins
                        match accepted.iter().position(|(queued, _)| *queued == old) {
                            Some(index) => {
                                accepted.remove(index);
                                self.tasks.remove(&old);
                            }
                            None => self.supersede(old),
                        }
                    }
                    self.tasks.insert(
                        id,
                        TaskEntry {
                            target: file.target.clone(),
                            progress: UploadProgress::new(0, file.size),
                            state: TaskState::Pending,
                        },
                    );
                    accepted.push((id, file));
                }
                Err(e) => warn!("Skipping {}: {}", file.content.display(), e),
            }
        }

        let session = UploadSession::new(
            session_id,
            accepted
                .iter()
                .map(|(id, file)| (*id, UploadingFile::new(file.target.clone(), file.content.clone())))
                .collect(),
        );

        for (id, file) in accepted {
            self.queue.push_back(PendingTask {
                id,
                file: UploadingFile::new(file.target, file.content),
                declared: file.size,
                transport: transport.clone(),
                session: session.counters(),
            });
        }

        info!("{}: queued {} file(s)", session_id, session.len());
        session
    }

    /// Admit queued tasks while the declared bytes in flight are under budget
    pub fn admit(&mut self, parent: &CancellationToken) -> Vec<Admitted> {
        let mut admitted = Vec::new();
        while self.uploading_bytes < self.byte_budget {
            let Some(task) = self.queue.pop_front() else {
                break;
            };

            self.uploading_bytes += task.declared;
            if let Some(entry) = self.tasks.get_mut(&task.id) {
                entry.state = TaskState::Running;
            }

            let cancel = parent.child_token();
            self.running.insert(
                task.id,
                RunningTask {
                    admitted_bytes: task.declared,
                    cancel: cancel.clone(),
                    session: task.session,
                },
            );
            debug!(
                "Admitted {} ({}), {} in flight",
                task.file.target,
                ByteSize::b(task.declared),
                ByteSize::b(self.uploading_bytes)
            );

            admitted.push(Admitted {
                id: task.id,
                file: task.file,
                transport: task.transport,
                cancel,
            });
        }
        admitted
    }

    /// Record a progress report from a running transfer
    pub fn apply_progress(&mut self, id: TaskId, sent: u64, total: u64) {
        let Some(entry) = self.tasks.get_mut(&id) else {
            return;
        };
        if entry.state != TaskState::Running {
            return;
        }
        entry.progress.sent = entry.progress.sent.max(sent);
        if total > 0 {
            entry.progress.total = total;
        }
    }

    /// Release a finished transfer's budget and record its outcome
    ///
    /// Completed uploads stay in the trie until the current drain is evicted;
    /// failed and cancelled ones leave it immediately. Returns the session to
    /// settle, or `None` if the task was not running.
    pub fn finish(
        &mut self,
        id: TaskId,
        outcome: Result<()>,
    ) -> Option<(Arc<SessionCounters>, Settlement)> {
        let run = self.running.remove(&id)?;
        self.uploading_bytes = self.uploading_bytes.saturating_sub(run.admitted_bytes);

        let settlement = match outcome {
            Ok(()) => {
                if let Some(entry) = self.tasks.get_mut(&id) {
                    entry.state = TaskState::Completed;
                    let done = entry.progress.total.max(entry.progress.sent);
                    entry.progress = UploadProgress::new(done, done);
                    info!("Uploaded {}", entry.target);
                }
                self.drained.push(id);
                Settlement::Succeeded
            }
            Err(e) if e.is_cancelled() => {
                info!("{} cancelled", id);
                self.drop_task(id);
                Settlement::Cancelled
            }
            Err(e) => {
                warn!("{} failed: {}", id, e);
                self.drop_task(id);
                Settlement::Failed
            }
        };
        Some((run.session, settlement))
    }

    /// Tasks completed during the drain that just ended, if `running` is empty
    pub fn take_drained(&mut self) -> Option<Vec<TaskId>> {
        if !self.running.is_empty() || self.drained.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.drained))
    }

    /// Remove completed tasks from the trie
    pub fn evict(&mut self, ids: &[TaskId]) {
        for id in ids {
            let completed = matches!(
                self.tasks.get(id),
                Some(TaskEntry { state: TaskState::Completed, .. })
            );
            if completed {
                self.drop_task(*id);
            }
        }
        debug!("Evicted {} completed upload(s)", ids.len());
    }

    /// Cancel one task
    ///
    /// A pending task is settled on the spot; a running one is signalled and
    /// settles when its transfer returns. A running task that was already
    /// signalled is not counted again.
    pub fn cancel(&mut self, id: TaskId) -> bool {
        if let Some(run) = self.running.get(&id) {
            if run.cancel.is_cancelled() {
                return false;
            }
            run.cancel.cancel();
            return true;
        }
        let Some(index) = self.queue.iter().position(|task| task.id == id) else {
            return false;
        };
        if let Some(task) = self.queue.remove(index) {
            self.drop_task(task.id);
            task.session.settle(Settlement::Cancelled);
            info!("{} cancelled before admission", task.id);
        }
        true
    }

    /// Settle every queued task as cancelled
    pub fn cancel_pending(&mut self) -> usize {
        let pending: Vec<PendingTask> = self.queue.drain(..).collect();
        for task in &pending {
            self.drop_task(task.id);
            task.session.settle(Settlement::Cancelled);
        }
        pending.len()
    }

    /// Drop every completed task without waiting for its grace period
    pub fn evict_completed(&mut self) -> usize {
        let completed: Vec<TaskId> = self
            .tasks
            .iter()
            .filter(|(_, entry)| entry.state == TaskState::Completed)
            .map(|(id, _)| *id)
            .collect();
        for id in &completed {
            self.drop_task(*id);
        }
        self.drained.clear();
        completed.len()
    }

    pub fn running_count(&self) -> usize {
        self.running.len()
    }

    /// Aggregate progress of every tracked leaf at or beneath `path`
    pub fn progress(&self, path: &RemotePath) -> Option<f64> {
        let leaves = self.trie.leaves(path);
        if leaves.is_empty() {
            return None;
        }
        let sum = leaves
            .into_iter()
            .filter_map(|id| self.tasks.get(id))
            .fold(UploadProgress::default(), |acc, entry| acc.accumulate(entry.progress));
        Some(sum.fraction())
    }

    pub fn task_progress(&self, id: TaskId) -> Option<UploadProgress> {
        self.tasks.get(&id).map(|entry| entry.progress)
    }

    pub fn task_state(&self, id: TaskId) -> Option<TaskState> {
        self.tasks.get(&id).map(|entry| entry.state)
    }

    pub fn merged_directories(&self, path: &RemotePath, server: &[String]) -> Vec<String> {
        listing::merge_directories(server, self.trie.directories(path))
    }

    pub fn merged_files(&self, path: &RemotePath, server: &[FileInfo]) -> Vec<FileInfo> {
        let tracked = self
            .trie
            .files(path)
            .into_iter()
            .map(|(name, _)| name)
            .collect();
        listing::merge_files(server, tracked)
    }

    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            pending: self.queue.len(),
            running: self.running.len(),
            uploading_bytes: self.uploading_bytes,
            tracked: self.trie.len(),
        }
    }

    fn drop_task(&mut self, id: TaskId) {
        if let Some(entry) = self.tasks.remove(&id) {
            self.trie.remove_if(&entry.target, &id);
        }
    }

    /// Retire a task whose trie leaf was just taken over by a newer upload
    fn supersede(&mut self, old: TaskId) {
        if let Some(run) = self.running.get(&old) {
            run.cancel.cancel();
            self.tasks.remove(&old);
        } else if let Some(index) = self.queue.iter().position(|task| task.id == old) {
            if let Some(task) = self.queue.remove(index) {
                self.tasks.remove(&old);
                task.session.settle(Settlement::Cancelled);
            }
        } else {
            self.tasks.remove(&old);
        }
        debug!("{} superseded by a newer upload", old);
    }
}
