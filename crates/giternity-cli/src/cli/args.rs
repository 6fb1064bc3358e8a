use super::*;
use giternity_core::config::DEFAULT_CONFIG_PATH;

#[derive(Parser, Debug)]
#[command(
    name = "giternity",
    author,
    version,
    about = "Mirror git repositories and publish cgit metadata"
)]
pub(super) struct Cli {
    #[arg(
        short,
        long,
        default_value = DEFAULT_CONFIG_PATH,
        help = "Path to the TOML config file"
    )]
    pub(super) config: PathBuf,
    #[arg(long, help = "Print the plan without touching the mirror root")]
    pub(super) dry_run: bool,
    #[arg(
        long,
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Number of mirrors transferred in parallel"
    )]
    pub(super) jobs: Option<u64>,
    #[arg(long, value_name = "SECS", help = "Stop starting new actions after this many seconds")]
    pub(super) timeout: Option<u64>,
    #[arg(
        long,
        value_name = "SECS",
        value_parser = clap::value_parser!(u64).range(1..),
        help = "Repeat the run every SECS seconds"
    )]
    pub(super) every: Option<u64>,
    #[arg(long, help = "Print the run report as JSON")]
    pub(super) json: bool,
    #[arg(long, help = "Show a progress line on stderr")]
    pub(super) progress: bool,
    #[arg(short, long, action = clap::ArgAction::Count, help = "Increase log verbosity")]
    pub(super) verbose: u8,
}

impl Cli {
    pub(super) fn jobs(&self) -> Option<usize> {
        self.jobs.map(|jobs| jobs as usize)
    }

    pub(super) fn repeat_interval(&self) -> Option<Duration> {
        self.every.map(Duration::from_secs)
    }
}
