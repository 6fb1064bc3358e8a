use crate::cancel::CancelToken;
use crate::checkout::{CheckoutResult, sync_checkouts};
use crate::config::MirrorConfig;
use crate::error::EngineError;
use crate::executor::{Executor, ExecutorOptions, ProgressReporter};
use crate::inspector::inspect_mirror_root;
use crate::metadata::MetadataWriter;
use crate::model::{ActionKind, ActionResult, PlannedAction};
use crate::plan::{PlanOptions, build_plan};
use crate::provider::RepoLister;
use crate::resolver::resolve_sources;
use crate::transfer::MirrorTransfer;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub type SharedProgress = Arc<ProgressReporter<'static>>;

/// Everything a run needs, passed explicitly instead of living in globals.
#[derive(Clone)]
pub struct MirrorContext {
    pub config: MirrorConfig,
    pub lister: Arc<dyn RepoLister>,
    pub transfer: Arc<dyn MirrorTransfer>,
    pub cancel: CancelToken,
}

#[derive(Clone, Default)]
pub struct RunOptions {
    pub dry_run: bool,
    /// Overrides the configured worker count.
    pub jobs: Option<usize>,
    pub progress: Option<SharedProgress>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct OwnerFailure {
    pub owner: String,
    pub error: String,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize)]
pub struct ActionCounts {
    pub create: usize,
    pub update: usize,
    pub orphan: usize,
    pub conflict: usize,
    pub failed: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct RunReport {
    pub dry_run: bool,
    pub plan: Vec<PlannedAction>,
    pub results: Vec<ActionResult>,
    pub resolution_failures: Vec<OwnerFailure>,
    pub checkouts: Vec<CheckoutResult>,
}

impl RunReport {
    pub fn failed(&self) -> bool {
        self.results.iter().any(|result| !result.succeeded)
            || !self.resolution_failures.is_empty()
            || self.checkouts.iter().any(|checkout| checkout.error.is_some())
    }

    pub fn counts(&self) -> ActionCounts {
        let mut counts = ActionCounts::default();
        for action in &self.plan {
            match action.kind {
                ActionKind::Create => counts.create += 1,
                ActionKind::Update => counts.update += 1,
                ActionKind::Orphan => counts.orphan += 1,
                ActionKind::Conflict => counts.conflict += 1,
            }
        }
        counts.failed = self
            .results
            .iter()
            .filter(|result| !result.succeeded)
            .count();
        counts
    }
}

/// One full run: resolve, inspect, plan, then execute and refresh checkouts
/// on the blocking pool.
///
/// Only configuration and inspection problems abort the run. Everything else
/// is reported per key or per owner in the returned report.
pub async fn run_mirror(context: &MirrorContext, options: RunOptions) -> Result<RunReport, EngineError> {
    let config = &context.config;
    let resolution = resolve_sources(config, context.lister.as_ref()).await?;
    let resolution_failures: Vec<OwnerFailure> = resolution
        .failures
        .iter()
        .map(|failure| OwnerFailure {
            owner: failure.owner.clone(),
            error: failure.source.to_string(),
        })
        .collect();
    let plan_options = PlanOptions {
        report_orphans: config.report_orphans,
        unresolved_owners: resolution.unresolved_owners(),
    };
    let sources = resolution.sources;
    debug!(sources = sources.len(), "sources resolved");

    let root = config.root.clone();
    let suffix = config.checkout_suffix.clone();
    let checkout_root = config.checkout_path.clone();
    let metadata = MetadataWriter::new(config.cgit_url.clone());
    let transfer = Arc::clone(&context.transfer);
    let cancel = context.cancel.clone();
    let jobs = options.jobs.unwrap_or(config.jobs);
    let dry_run = options.dry_run;
    let progress = options.progress;

    let task = tokio::task::spawn_blocking(move || -> Result<_, EngineError> {
        let state = inspect_mirror_root(&root, &suffix)?;
        let plan = build_plan(&sources, &state, &root, &suffix, &plan_options)?;
        log_plan(&plan, dry_run);

        let executor = Executor::new(transfer, metadata, cancel.clone());
        let results = executor.execute(
            &plan,
            &ExecutorOptions {
                jobs,
                dry_run,
                progress: progress.as_deref(),
            },
        );
        let checkouts = match checkout_root {
            Some(checkout_root) if !dry_run => {
                sync_checkouts(&plan, &results, &checkout_root, &cancel)
            }
            _ => Vec::new(),
        };
        Ok((plan, results, checkouts))
    });
    let (plan, results, checkouts) = task
        .await
        .map_err(|err| EngineError::Join(err.to_string()))??;

    let report = RunReport {
        dry_run,
        plan,
        results,
        resolution_failures,
        checkouts,
    };
    let counts = report.counts();
    if report.failed() {
        warn!(
            failed = counts.failed,
            unresolved = report.resolution_failures.len(),
            "mirror run finished with failures"
        );
    } else {
        info!(
            create = counts.create,
            update = counts.update,
            orphan = counts.orphan,
            dry_run,
            "mirror run finished"
        );
    }
    Ok(report)
}

fn log_plan(plan: &[PlannedAction], dry_run: bool) {
    for action in plan {
        debug!(
            key = %action.key,
            kind = %action.kind,
            path = %action.target_path.display(),
            "planned action"
        );
    }
    info!(actions = plan.len(), dry_run, "plan built");
}
