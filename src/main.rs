use picker::cli::Args;
use picker::config::RegistryConfig;
use picker::core::accessor::Read;
use picker::core::player::FramePlayer;
use picker::core::registry::ResourceRegistry;
use picker::entities::traits::{Bounds, LogReporter, RenderSink};
use picker::entities::{Frame, IllustId};
use picker::source::DirSource;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use futures::executor::block_on;
use log::{debug, info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Render sink for headless runs: logs each draw
#[derive(Debug, Default)]
struct LogSink {
    draws: Arc<AtomicUsize>,
}

impl RenderSink for LogSink {
    fn draw(&mut self, frame: &Frame, index: usize, bounds: Bounds) {
        self.draws.fetch_add(1, Ordering::Relaxed);
        debug!(
            "draw #{} {} ({}x{} at {}x{}, {} ms)",
            index,
            frame.source(),
            frame.width(),
            frame.height(),
            bounds.width,
            bounds.height,
            frame.delay_ms()
        );
    }
}

/// 0 (default) = warn, 1 (-v) = info, 2 (-vv) = debug, 3+ (-vvv) = trace
fn level_for(verbosity: u8) -> log::LevelFilter {
    match verbosity {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    }
}

fn init_logging(args: &Args) -> Result<()> {
    let log_level = level_for(args.verbosity);

    if let Some(log_path) = &args.log_file {
        let file = std::fs::File::create(log_path)
            .with_context(|| format!("Failed to create log file: {}", log_path.display()))?;

        env_logger::Builder::new()
            .filter_level(log_level)
            .format_timestamp_millis()
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();

        info!("Logging to file: {} (level: {:?})", log_path.display(), log_level);
    } else {
        // Console logging with specified verbosity level (respects RUST_LOG if set)
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level.as_str()))
            .format_timestamp_millis()
            .init();
    }
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args)?;

    info!("Picker starting...");
    debug!("Command-line args: {:?}", args);

    let mut config = RegistryConfig::resolve(args.config.clone())?;
    if let Some(workers) = args.workers {
        config.workers = workers;
    }
    config.validate()?;
    debug!("Registry config: {:?}", config);

    let source = DirSource::new(&args.root);
    info!("Content root: {}", source.root().display());
    let registry = ResourceRegistry::new(Arc::new(source), &config, Arc::new(LogReporter));

    let id = IllustId::new(args.illust_id.clone());

    // Details are informational only; a failure here doesn't stop playback
    match block_on(registry.illust(id.clone())?.resolve()) {
        Read::Ready(illust) => info!("\"{}\" by {}", illust.illust_title, illust.user_name),
        Read::Failed(e) => warn!("No details for {}: {}", id, e),
        Read::Pending => {}
    }

    let pages = match block_on(registry.pages(id.clone())?.resolve()) {
        Read::Ready(pages) => pages,
        Read::Failed(e) => return Err(anyhow!("Failed to load pages of {}: {}", id, e)),
        Read::Pending => return Err(anyhow!("Pages of {} never settled", id)),
    };
    if !pages.is_ugoira {
        println!("{}: {} still page(s), nothing to play", id, pages.count);
        return Ok(());
    }

    let frames = match block_on(registry.ugoira(id.clone())?.resolve()) {
        Read::Ready(frames) => frames,
        Read::Failed(e) => return Err(anyhow!("Failed to load animation {}: {}", id, e)),
        Read::Pending => return Err(anyhow!("Animation {} never settled", id)),
    };
    info!(
        "Animation {}: {} frames, loop {} ms",
        id,
        frames.len(),
        frames.duration().as_millis()
    );

    let sink = LogSink::default();
    let draws = Arc::clone(&sink.draws);
    let mut player = FramePlayer::new((*frames).clone(), Box::new(sink))?;
    player.toggle();
    std::thread::sleep(Duration::from_millis(args.duration_ms));
    let state = player.toggle();
    drop(player);

    println!(
        "{}: stopped at frame {}/{} after {} draws ({:?})",
        id,
        state.index() + 1,
        frames.len(),
        draws.load(Ordering::Relaxed),
        state
    );
    for (kind, stats) in registry.stats() {
        if stats.fetches == 0 && stats.hits == 0 {
            continue;
        }
        println!(
            "  {:<14} fetches={} hits={} misses={} failures={} hit_rate={:.0}%",
            kind,
            stats.fetches,
            stats.hits,
            stats.misses,
            stats.failures,
            stats.hit_rate() * 100.0
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_levels() {
        assert_eq!(level_for(0), log::LevelFilter::Warn);
        assert_eq!(level_for(1), log::LevelFilter::Info);
        assert_eq!(level_for(2), log::LevelFilter::Debug);
        assert_eq!(level_for(3), log::LevelFilter::Trace);
        assert_eq!(level_for(9), log::LevelFilter::Trace);
        // Console filter string parses back to the same level
        let parsed: log::LevelFilter = level_for(1).as_str().parse().unwrap();
        assert_eq!(parsed, log::LevelFilter::Info);
    }
}
