use crate::cancel::CancelToken;
use crate::metadata::MetadataWriter;
use crate::model::{ActionKind, ActionResult, MirrorKey, PlannedAction};
use crate::transfer::MirrorTransfer;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError, mpsc};
use std::thread;
use tracing::{debug, info, warn};

pub const CANCELLED_BEFORE_START: &str = "cancelled before start";
const WORKER_LOST: &str = "worker exited before reporting";

#[derive(Clone, Debug)]
pub enum ExecutorEvent {
    Started {
        key: MirrorKey,
        kind: ActionKind,
    },
    Finished {
        result: ActionResult,
        processed: usize,
        total: usize,
    },
}

pub type ProgressReporter<'a> = dyn Fn(&ExecutorEvent) + Send + Sync + 'a;

#[derive(Clone, Copy)]
pub struct ExecutorOptions<'a> {
    pub jobs: usize,
    pub dry_run: bool,
    pub progress: Option<&'a ProgressReporter<'a>>,
}

enum WorkerEvent {
    Started { index: usize },
    Finished { index: usize, result: ActionResult },
}

/// Runs a plan against the transfer primitive, one isolated result per key.
pub struct Executor {
    transfer: Arc<dyn MirrorTransfer>,
    metadata: Arc<MetadataWriter>,
    cancel: CancelToken,
}

impl Executor {
    pub fn new(transfer: Arc<dyn MirrorTransfer>, metadata: MetadataWriter, cancel: CancelToken) -> Self {
        Self {
            transfer,
            metadata: Arc::new(metadata),
            cancel,
        }
    }

    /// Results come back in plan order whatever order the workers finish in.
    pub fn execute(&self, plan: &[PlannedAction], options: &ExecutorOptions<'_>) -> Vec<ActionResult> {
        if options.dry_run {
            debug!(actions = plan.len(), "dry run; no action executed");
            return plan.iter().map(ActionResult::success).collect();
        }
        let jobs = options.jobs.max(1).min(plan.len().max(1));
        info!(actions = plan.len(), jobs, "executing plan");
        if jobs <= 1 {
            return self.execute_serial(plan, options.progress);
        }
        self.execute_parallel(plan, jobs, options.progress)
    }

    fn execute_serial(
        &self,
        plan: &[PlannedAction],
        progress: Option<&ProgressReporter<'_>>,
    ) -> Vec<ActionResult> {
        let total = plan.len();
        let mut results = Vec::with_capacity(total);
        for action in plan {
            let result = if self.cancel.is_cancelled() {
                ActionResult::failure(action, false, CANCELLED_BEFORE_START)
            } else {
                emit(
                    progress,
                    ExecutorEvent::Started {
                        key: action.key.clone(),
                        kind: action.kind,
                    },
                );
                run_action(self.transfer.as_ref(), &self.metadata, &self.cancel, action)
            };
            results.push(result.clone());
            emit(
                progress,
                ExecutorEvent::Finished {
                    result,
                    processed: results.len(),
                    total,
                },
            );
        }
        results
    }

    fn execute_parallel(
        &self,
        plan: &[PlannedAction],
        jobs: usize,
        progress: Option<&ProgressReporter<'_>>,
    ) -> Vec<ActionResult> {
        let total = plan.len();
        let queue: VecDeque<(usize, PlannedAction)> = plan.iter().cloned().enumerate().collect();
        let queue = Arc::new(Mutex::new(queue));
        let (tx, rx) = mpsc::channel::<WorkerEvent>();
        let mut handles = Vec::with_capacity(jobs);
        for worker in 0..jobs {
            let queue = Arc::clone(&queue);
            let tx = tx.clone();
            let transfer = Arc::clone(&self.transfer);
            let metadata = Arc::clone(&self.metadata);
            let cancel = self.cancel.clone();
            let spawned = thread::Builder::new()
                .name(format!("giternity-worker-{worker}"))
                .spawn(move || {
                    loop {
                        if cancel.is_cancelled() {
                            break;
                        }
                        let next = {
                            let mut guard = queue.lock().unwrap_or_else(PoisonError::into_inner);
                            guard.pop_front()
                        };
                        let Some((index, action)) = next else {
                            break;
                        };
                        let _ = tx.send(WorkerEvent::Started { index });
                        let result = run_action(transfer.as_ref(), &metadata, &cancel, &action);
                        let _ = tx.send(WorkerEvent::Finished { index, result });
                    }
                });
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(err) => warn!(worker, error = %err, "failed to spawn worker"),
            }
        }
        drop(tx);

        let mut slots: Vec<Option<ActionResult>> = vec![None; total];
        let mut processed = 0usize;
        while let Ok(event) = rx.recv() {
            match event {
                WorkerEvent::Started { index } => emit(
                    progress,
                    ExecutorEvent::Started {
                        key: plan[index].key.clone(),
                        kind: plan[index].kind,
                    },
                ),
                WorkerEvent::Finished { index, result } => {
                    processed += 1;
                    slots[index] = Some(result.clone());
                    emit(
                        progress,
                        ExecutorEvent::Finished {
                            result,
                            processed,
                            total,
                        },
                    );
                }
            }
        }
        for handle in handles {
            if handle.join().is_err() {
                warn!("worker panicked");
            }
        }

        // Whatever is left was never started (cancelled, or no worker came up)
        // or was lost with a panicking worker.
        let leftover: Vec<(usize, PlannedAction)> = queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for (index, action) in leftover {
            if slots[index].is_some() {
                continue;
            }
            let result = if self.cancel.is_cancelled() {
                ActionResult::failure(&action, false, CANCELLED_BEFORE_START)
            } else {
                run_action(self.transfer.as_ref(), &self.metadata, &self.cancel, &action)
            };
            processed += 1;
            slots[index] = Some(result.clone());
            emit(
                progress,
                ExecutorEvent::Finished {
                    result,
                    processed,
                    total,
                },
            );
        }

        slots
            .into_iter()
            .zip(plan)
            .map(|(slot, action)| {
                slot.unwrap_or_else(|| ActionResult::failure(action, false, WORKER_LOST))
            })
            .collect()
    }
}

fn emit(progress: Option<&ProgressReporter<'_>>, event: ExecutorEvent) {
    if let Some(progress) = progress {
        progress(&event);
    }
}

fn run_action(
    transfer: &dyn MirrorTransfer,
    metadata: &MetadataWriter,
    cancel: &CancelToken,
    action: &PlannedAction,
) -> ActionResult {
    let path = action.target_path.as_path();
    let transferred = match action.kind {
        ActionKind::Orphan => {
            info!(key = %action.key, path = %path.display(), "orphaned mirror left in place");
            return ActionResult::success(action);
        }
        ActionKind::Conflict => {
            warn!(key = %action.key, path = %path.display(), "target exists but is not a bare mirror");
            return ActionResult::failure(
                action,
                false,
                format!(
                    "{} exists but is not a bare mirror; refusing to overwrite",
                    path.display()
                ),
            );
        }
        ActionKind::Create => match action.clone_url.as_deref() {
            Some(url) => transfer.mirror_clone(url, path, cancel),
            None => return ActionResult::failure(action, false, "no clone url"),
        },
        ActionKind::Update => transfer.mirror_fetch(path, cancel),
    };
    if let Err(err) = transferred {
        warn!(key = %action.key, kind = %action.kind, error = %err, "transfer failed");
        return ActionResult::failure(action, false, err.to_string());
    }

    match metadata.write(action) {
        Ok(written) => {
            debug!(key = %action.key, kind = %action.kind, "mirror synced");
            ActionResult {
                transferred: true,
                last_modified: written.last_modified,
                description: written.description,
                ..ActionResult::success(action)
            }
        }
        Err(err) => {
            warn!(key = %action.key, error = %err, "metadata write failed");
            ActionResult::failure(action, true, format!("metadata: {err}"))
        }
    }
}
