use anyhow::Context;
use clap::Parser;
use giternity_core::cancel::CancelToken;
use giternity_core::config::AppConfig;
use giternity_core::engine::{MirrorContext, RunOptions, RunReport, SharedProgress, run_mirror};
use giternity_core::executor::ExecutorEvent;
use giternity_core::lockfile::RunLock;
use giternity_core::model::ActionKind;
use giternity_core::schedule::repeat_delay;
use giternity_core::transfer::transfer_for;
use giternity_providers::GitHubLister;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

mod app;
mod args;
mod render;

use args::*;

pub async fn run() -> anyhow::Result<ExitCode> {
    app::run().await
}
