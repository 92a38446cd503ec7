use clap::Parser;
use std::path::PathBuf;

// Build version with target info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Decode: image 0.25 (png, jpeg)\n",
    "Target: ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Load an artwork's animation through the resource cache and play it headless
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    /// Artwork id to load
    #[arg(value_name = "ILLUST_ID")]
    pub illust_id: String,

    /// Directory served as the content source
    #[arg(short = 'r', long = "root", value_name = "DIR")]
    pub root: PathBuf,

    /// How long to play before stopping (milliseconds)
    #[arg(short = 'd', long = "duration-ms", value_name = "N", default_value_t = 3000)]
    pub duration_ms: u64,

    /// Config file (overrides PICKER_CONFIG and the platform config dir)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Fetch worker threads (overrides config)
    #[arg(short = 'w', long = "workers", value_name = "N")]
    pub workers: Option<usize>,

    /// Log to file instead of stderr
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<PathBuf>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,
}
