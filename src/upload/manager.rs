//! The upload manager service
//!
//! `UploadManager` is an explicitly constructed, explicitly started service.
//! All tracking state sits in one `State` behind one lock. Transfers run as
//! independent tokio tasks and never touch that state directly: they post
//! progress and completion events to the manager's event loop, which applies
//! them, admits more work, and schedules grace-period evictions.

use crate::error::{Result, UploadError};
use crate::path::RemotePath;
use crate::transport::{ProgressSink, Transport};
use crate::upload::config::UploadConfig;
use crate::upload::expand;
use crate::upload::scheduler::{Admitted, State};
use crate::upload::session::UploadSession;
use crate::upload::types::{FileInfo, SchedulerStats, TaskId, TaskState, UploadProgress, UploadingFile};
use log::{debug, info};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug)]
enum Event {
    /// New work was queued
    Admit,
    Progress { id: TaskId, sent: u64, total: u64 },
    Finished { id: TaskId, outcome: Result<()> },
    Evict(Vec<TaskId>),
    Shutdown,
}

enum Lifecycle {
    Idle(UnboundedReceiver<Event>),
    Running(JoinHandle<UnboundedReceiver<Event>>),
    Stopping,
    Failed,
}

struct Shared {
    config: UploadConfig,
    state: Mutex<State>,
    events: UnboundedSender<Event>,
}

/// Coordinator for all outbound uploads of one client session
pub struct UploadManager {
    shared: Arc<Shared>,
    lifecycle: Mutex<Lifecycle>,
}

impl UploadManager {
    /// Create an idle manager; fails if `config` does not validate
    pub fn new(config: UploadConfig) -> Result<Self> {
        config.validate()?;
        let (events, rx) = unbounded_channel();
        Ok(Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::new(config.byte_budget)),
                config,
                events,
            }),
            lifecycle: Mutex::new(Lifecycle::Idle(rx)),
        })
    }

    pub fn config(&self) -> &UploadConfig {
        &self.shared.config
    }

    /// Start the event loop on the current tokio runtime
    ///
    /// Work queued before `start` is admitted as soon as the loop runs.
    pub fn start(&self) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| UploadError::manager_error(format!("No tokio runtime: {}", e)))?;

        let mut lifecycle = self.lifecycle.lock();
        let rx = match std::mem::replace(&mut *lifecycle, Lifecycle::Stopping) {
            Lifecycle::Idle(rx) => rx,
            other => {
                *lifecycle = other;
                return Err(UploadError::manager_error("Upload manager is not idle"));
            }
        };

        let handle = runtime.spawn(run(self.shared.clone(), rx));
        *lifecycle = Lifecycle::Running(handle);
        let _ = self.shared.events.send(Event::Admit);
        info!("Upload manager started ({})", self.shared.config);
        Ok(())
    }

    /// Cancel everything in flight and wait for the event loop to exit
    ///
    /// Every session still open is settled and completed uploads still inside
    /// their grace period stop being tracked. The manager can be started again.
    pub async fn stop(&self) -> Result<()> {
        let handle = {
            let mut lifecycle = self.lifecycle.lock();
            match std::mem::replace(&mut *lifecycle, Lifecycle::Stopping) {
                Lifecycle::Running(handle) => handle,
                other => {
                    *lifecycle = other;
                    return Err(UploadError::manager_error("Upload manager is not running"));
                }
            }
        };

        let _ = self.shared.events.send(Event::Shutdown);
        match handle.await {
            Ok(rx) => {
                *self.lifecycle.lock() = Lifecycle::Idle(rx);
                info!("Upload manager stopped");
                Ok(())
            }
            Err(e) => {
                *self.lifecycle.lock() = Lifecycle::Failed;
                Err(UploadError::manager_error(format!(
                    "Upload event loop failed: {}",
                    e
                )))
            }
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(*self.lifecycle.lock(), Lifecycle::Running(_))
    }

    /// Upload local files and directories into the remote `directory`
    ///
    /// Returns as soon as every file is tracked; transfers start in the
    /// background. Unreadable inputs and conflicting targets are logged and
    /// skipped. Only an invalid `directory` is an error.
    ///
    /// # Arguments
    ///
    /// * `files` - Local files, and directories whose contents are mirrored
    /// * `directory` - Remote directory the inputs land in
    /// * `transport` - Hub connection used for every file of this batch
    ///
    /// # Returns
    ///
    /// The session tracking this batch; it is already finished if nothing was
    /// accepted
    pub fn upload(
        &self,
        files: &[PathBuf],
        directory: &str,
        transport: Arc<dyn Transport>,
    ) -> Result<UploadSession> {
        let directory = RemotePath::parse(directory)?;
        let expanded = expand::expand(files, &directory);
        let session = self.shared.state.lock().enqueue(expanded, transport);
        if !session.is_empty() {
            let _ = self.shared.events.send(Event::Admit);
        }
        Ok(session)
    }

    /// Aggregate progress at or beneath `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Remote file or directory to query
    ///
    /// # Returns
    ///
    /// Bytes sent over bytes expected across every tracked file at or beneath
    /// `path`, in `[0, 1]`. `None` if nothing is tracked there or `path` is
    /// not a valid remote path.
    pub fn progress(&self, path: &str) -> Option<f64> {
        let path = parse_query(path)?;
        self.shared.state.lock().progress(&path)
    }

    pub fn task_progress(&self, id: TaskId) -> Option<UploadProgress> {
        self.shared.state.lock().task_progress(id)
    }

    pub fn task_state(&self, id: TaskId) -> Option<TaskState> {
        self.shared.state.lock().task_state(id)
    }

    /// Directory names under `path`: the server's, plus ones only uploads know about
    pub fn merged_directories(&self, path: &str, server_reported: &[String]) -> Vec<String> {
        match parse_query(path) {
            Some(path) => self
                .shared
                .state
                .lock()
                .merged_directories(&path, server_reported),
            None => server_reported.to_vec(),
        }
    }

    /// Files under `path`: the server's, plus provisional entries for uploads
    ///
    /// # Arguments
    ///
    /// * `path` - Remote directory being listed
    /// * `server_reported` - The listing the Hub returned for `path`
    ///
    /// # Returns
    ///
    /// The server entries in their original order, followed by tracked files
    /// the server did not report, sorted by name. Tracked entries have size 0
    /// and no modification time.
    pub fn merged_files(&self, path: &str, server_reported: &[FileInfo]) -> Vec<FileInfo> {
        match parse_query(path) {
            Some(path) => self.shared.state.lock().merged_files(&path, server_reported),
            None => server_reported.to_vec(),
        }
    }

    /// Cancel one task
    ///
    /// A pending task is dropped from the queue and settled at once. A running
    /// task has its transfer aborted and settles when the transfer returns.
    ///
    /// # Returns
    ///
    /// `false` if the task is neither pending nor running, or was already
    /// cancelled
    pub fn cancel(&self, id: TaskId) -> bool {
        self.shared.state.lock().cancel(id)
    }

    /// Cancel every unsettled task of `session`
    ///
    /// # Returns
    ///
    /// The number of tasks newly cancelled
    pub fn cancel_session(&self, session: &UploadSession) -> usize {
        let mut state = self.shared.state.lock();
        session.task_ids().filter(|id| state.cancel(*id)).count()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.shared.state.lock().stats()
    }
}

impl Drop for UploadManager {
    fn drop(&mut self) {
        if matches!(*self.lifecycle.lock(), Lifecycle::Running(_)) {
            let _ = self.shared.events.send(Event::Shutdown);
        }
    }
}

fn parse_query(path: &str) -> Option<RemotePath> {
    match RemotePath::parse(path) {
        Ok(path) => Some(path),
        Err(e) => {
            debug!("Ignoring query: {}", e);
            None
        }
    }
}

async fn run(shared: Arc<Shared>, mut rx: UnboundedReceiver<Event>) -> UnboundedReceiver<Event> {
    let root = CancellationToken::new();
    let mut stopping = false;

    while let Some(event) = rx.recv().await {
        let (admitted, settled, drained) = {
            let mut state = shared.state.lock();
            let settled = match event {
                Event::Admit => None,
                Event::Progress { id, sent, total } => {
                    state.apply_progress(id, sent, total);
                    continue;
                }
                Event::Evict(ids) => {
                    state.evict(&ids);
                    continue;
                }
                Event::Finished { id, outcome } => state.finish(id, outcome),
                Event::Shutdown => {
                    stopping = true;
                    let cancelled = state.cancel_pending();
                    root.cancel();
                    debug!(
                        "Shutting down: {} pending cancelled, {} running",
                        cancelled,
                        state.running_count()
                    );
                    None
                }
            };
            let admitted = if stopping {
                Vec::new()
            } else {
                state.admit(&root)
            };
            (admitted, settled, state.take_drained())
        };

        for task in admitted {
            tokio::spawn(transfer(task, shared.events.clone()));
        }
        if let Some((session, settlement)) = settled {
            session.settle(settlement);
        }
        if let Some(ids) = drained {
            schedule_eviction(ids, shared.config.grace_period_duration(), shared.events.clone());
        }

        if stopping {
            let mut state = shared.state.lock();
            if state.running_count() == 0 {
                // no loop will be left to receive the pending eviction timers
                let evicted = state.evict_completed();
                debug!("Evicted {} completed upload(s) on shutdown", evicted);
                break;
            }
        }
    }
    rx
}

fn schedule_eviction(ids: Vec<TaskId>, grace: Duration, events: UnboundedSender<Event>) {
    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        let _ = events.send(Event::Evict(ids));
    });
}

async fn transfer(task: Admitted, events: UnboundedSender<Event>) {
    let Admitted {
        id,
        file,
        transport,
        cancel,
    } = task;

    let sink = {
        let events = events.clone();
        ProgressSink::new(move |sent, total| {
            let _ = events.send(Event::Progress { id, sent, total });
        })
    };

    let outcome = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(UploadError::cancelled(format!("upload {}", file.target))),
        result = send_file(transport.as_ref(), &file, sink) => result,
    };
    let _ = events.send(Event::Finished { id, outcome });
}

async fn send_file(transport: &dyn Transport, file: &UploadingFile, progress: ProgressSink) -> Result<()> {
    let target = file.target.to_string();
    let destination = transport.request_write_location(&target).await?;
    transport.put(&file.content, &destination, progress).await?;
    transport.notify_changed().await?;
    Ok(())
}
