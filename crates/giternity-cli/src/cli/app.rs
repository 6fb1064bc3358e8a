use super::render::{ProgressLine, print_report};
use super::*;

const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";
const INTERRUPT_POLL: Duration = Duration::from_millis(250);

pub(super) enum RunOutcome {
    Finished(RunReport),
    /// Another process holds the run lock.
    Locked(PathBuf),
}

pub(super) async fn run() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    crate::logging::init(cli.verbose);

    let context = build_context(&cli)?;
    watch_for_interrupt(context.cancel.clone());
    info!(
        config = %cli.config.display(),
        root = %context.config.root.display(),
        sources = context.config.sources.len(),
        dry_run = cli.dry_run,
        "starting giternity"
    );

    match cli.repeat_interval() {
        Some(interval) => run_repeating(&cli, &context, interval).await,
        None => run_single(&cli, &context).await,
    }
}

fn build_context(cli: &Cli) -> anyhow::Result<MirrorContext> {
    let env_token = std::env::var(GITHUB_TOKEN_ENV).ok();
    let config = AppConfig::load(&cli.config)?
        .validate(env_token)
        .with_context(|| format!("invalid config {}", cli.config.display()))?;
    let lister = GitHubLister::new(&config.github)?;
    let transfer = transfer_for(config.transfer, config.github.repo_auth());
    Ok(MirrorContext {
        config,
        lister: Arc::new(lister),
        transfer,
        cancel: CancelToken::new(),
    })
}

/// Exit status after a second interrupt, as a shell reports SIGINT.
const INTERRUPT_EXIT_STATUS: i32 = 130;

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(super) enum InterruptAction {
    /// Stop scheduling work and let in-flight actions finish.
    Cancel,
    /// Give up on in-flight actions and leave immediately.
    Exit,
}

pub(super) fn interrupt_action(received: u32) -> InterruptAction {
    if received <= 1 {
        InterruptAction::Cancel
    } else {
        InterruptAction::Exit
    }
}

fn watch_for_interrupt(cancel: CancelToken) {
    tokio::spawn(async move {
        let mut received = 0u32;
        while tokio::signal::ctrl_c().await.is_ok() {
            received += 1;
            match interrupt_action(received) {
                InterruptAction::Cancel => {
                    warn!("interrupt received; finishing in-flight actions, interrupt again to exit");
                    cancel.cancel();
                }
                InterruptAction::Exit => {
                    error!("second interrupt received; exiting without waiting");
                    std::process::exit(INTERRUPT_EXIT_STATUS);
                }
            }
        }
    });
}

async fn run_single(cli: &Cli, context: &MirrorContext) -> anyhow::Result<ExitCode> {
    match run_once(cli, context).await? {
        RunOutcome::Finished(report) => {
            print_report(&mut io::stdout().lock(), &report, cli.json)?;
            Ok(exit_code(&report))
        }
        RunOutcome::Locked(path) => {
            anyhow::bail!("another giternity run holds the lock at {}", path.display())
        }
    }
}

async fn run_repeating(
    cli: &Cli,
    context: &MirrorContext,
    interval: Duration,
) -> anyhow::Result<ExitCode> {
    let mut failures: u32 = 0;
    loop {
        match run_once(cli, context).await {
            Ok(RunOutcome::Finished(report)) => {
                print_report(&mut io::stdout().lock(), &report, cli.json)?;
                if report.failed() {
                    failures = failures.saturating_add(1);
                } else {
                    failures = 0;
                }
            }
            Ok(RunOutcome::Locked(path)) => {
                warn!(path = %path.display(), "run lock held by another process; skipping run");
            }
            Err(err) => {
                error!(error = %format!("{err:#}"), "run aborted");
                failures = failures.saturating_add(1);
            }
        }
        if context.cancel.is_interrupted() {
            break;
        }
        let delay = repeat_delay(interval, failures);
        info!(delay_secs = delay.as_secs(), failures, "next run scheduled");
        if sleep_unless_interrupted(delay, &context.cancel).await {
            break;
        }
    }
    info!("repeat mode stopped");
    Ok(if failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

pub(super) async fn run_once(cli: &Cli, base: &MirrorContext) -> anyhow::Result<RunOutcome> {
    let mut context = base.clone();
    if let Some(secs) = cli.timeout {
        context.cancel = base
            .cancel
            .with_deadline(Instant::now() + Duration::from_secs(secs));
    }
    let _lock = if cli.dry_run {
        None
    } else {
        let lock_path = &context.config.lock_path;
        match RunLock::acquire(lock_path)? {
            Some(lock) => Some(lock),
            None => return Ok(RunOutcome::Locked(lock_path.clone())),
        }
    };

    let options = RunOptions {
        dry_run: cli.dry_run,
        jobs: cli.jobs(),
        progress: cli.progress.then(progress_reporter),
    };
    let started = Instant::now();
    let report = run_mirror(&context, options).await?;
    let counts = report.counts();
    info!(
        create = counts.create,
        update = counts.update,
        orphan = counts.orphan,
        conflict = counts.conflict,
        failed = counts.failed,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "run finished"
    );
    Ok(RunOutcome::Finished(report))
}

fn progress_reporter() -> SharedProgress {
    let line = Mutex::new(ProgressLine::default());
    Arc::new(move |event: &ExecutorEvent| {
        let mut line = line
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        line.render(&mut io::stderr().lock(), event);
    })
}

/// Returns true when the wait ended because of an interrupt.
async fn sleep_unless_interrupted(delay: Duration, cancel: &CancelToken) -> bool {
    let deadline = Instant::now() + delay;
    loop {
        if cancel.is_interrupted() {
            return true;
        }
        let now = Instant::now();
        if now >= deadline {
            return false;
        }
        tokio::time::sleep((deadline - now).min(INTERRUPT_POLL)).await;
    }
}

pub(super) fn exit_code(report: &RunReport) -> ExitCode {
    if report.failed() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
