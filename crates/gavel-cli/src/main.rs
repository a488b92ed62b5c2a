use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use gavel_client::session::BrowserDriver;
use gavel_client::sites::{CrexiStrategy, LoopNetStrategy, RmiStrategy};
use gavel_core::config::{PageLimit, RunConfig, SessionConfig, Viewport};
use gavel_core::pace::PaceConfig;
use gavel_core::record::Source;
use gavel_core::report::RunOutcome;
use gavel_core::retry::RetryPolicy;
use gavel_core::run::Orchestrator;
use gavel_core::traits::SiteStrategy;

#[derive(Parser)]
#[command(name = "gavel", version, about = "Commercial real-estate auction scraper")]
struct Cli {
    /// Marketplace to scrape
    #[arg(short, long, value_enum, env = "GAVEL_SOURCE")]
    source: SourceArg,

    /// Run the browser headless (pass false to watch it work)
    #[arg(long, env = "GAVEL_HEADLESS", default_value_t = true, action = clap::ArgAction::Set)]
    headless: bool,

    /// Minimum delay between navigations, in milliseconds
    #[arg(long, env = "GAVEL_REQUEST_DELAY_MS", default_value_t = 1000)]
    request_delay_ms: u64,

    /// Index pages (or load-more rounds) to visit; 0 means unbounded
    #[arg(long, env = "GAVEL_MAX_PAGES", default_value_t = 0)]
    max_pages: u32,

    /// Attempts per navigation/extraction step
    #[arg(long, default_value_t = 3)]
    max_attempts: u32,

    /// Timeout for each navigation attempt, in milliseconds
    #[arg(long, default_value_t = 30_000)]
    per_attempt_timeout_ms: u64,

    /// How long to wait for intercepted API payloads, in milliseconds
    #[arg(long, default_value_t = 10_000)]
    payload_window_ms: u64,

    /// Browser User-Agent override
    #[arg(long, env = "GAVEL_USER_AGENT")]
    user_agent: Option<String>,

    /// Browser viewport as WIDTHxHEIGHT
    #[arg(long, default_value = "1920x1080", value_parser = parse_viewport)]
    viewport: Viewport,

    /// Directory the CSV artifact is written into
    #[arg(long, env = "GAVEL_OUT_DIR", default_value = ".")]
    out_dir: PathBuf,

    /// Abort the whole run after this many seconds, exporting what we have
    #[arg(long)]
    run_deadline_secs: Option<u64>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SourceArg {
    Crexi,
    Loopnet,
    Rmi,
}

impl From<SourceArg> for Source {
    fn from(arg: SourceArg) -> Self {
        match arg {
            SourceArg::Crexi => Source::Crexi,
            SourceArg::Loopnet => Source::LoopNet,
            SourceArg::Rmi => Source::Rmi,
        }
    }
}

fn parse_viewport(value: &str) -> Result<Viewport, String> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got `{value}`"))?;
    let width = w.trim().parse().map_err(|_| format!("bad width `{w}`"))?;
    let height = h.trim().parse().map_err(|_| format!("bad height `{h}`"))?;
    Ok(Viewport { width, height })
}

fn build_config(cli: &Cli) -> RunConfig {
    let delay = Duration::from_millis(cli.request_delay_ms);
    // Jitter at half the delay, capped, keeps the pacing human-ish without
    // stretching short delays into long ones.
    let jitter = Duration::from_millis((cli.request_delay_ms / 2).min(500));

    let mut config = RunConfig::new(Source::from(cli.source));
    config.session = SessionConfig {
        headless: cli.headless,
        user_agent: cli.user_agent.clone(),
        viewport: cli.viewport,
    };
    config.pace = PaceConfig::new(delay).with_jitter(jitter);
    config.max_pages = match cli.max_pages {
        0 => PageLimit::Unbounded,
        n => PageLimit::Max(n),
    };
    config.retry = RetryPolicy::new(cli.max_attempts);
    config.per_attempt_timeout = Duration::from_millis(cli.per_attempt_timeout_ms);
    config.payload_window = Duration::from_millis(cli.payload_window_ms);
    config.out_dir = cli.out_dir.clone();
    config
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Setup tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("gavel_core=info".parse()?)
                .add_directive("gavel_client=info".parse()?)
                .add_directive("gavel_cli=info".parse()?),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = build_config(&cli);
    let source = Source::from(cli.source);

    let cancel = CancellationToken::new();

    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, exporting what we have");
            signal_cancel.cancel();
        }
    });

    if let Some(secs) = cli.run_deadline_secs {
        let deadline_cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            tracing::warn!(secs, "run deadline reached, exporting what we have");
            deadline_cancel.cancel();
        });
    }

    // Strategy selection happens once, here, off the source tag. Fatal
    // errors (session start, export) surface as a non-zero exit; a
    // partial or empty run that still exported exits zero.
    let outcome = match source {
        Source::Crexi => run_site(CrexiStrategy::new(), config, cancel).await?,
        Source::LoopNet => run_site(LoopNetStrategy::new(), config, cancel).await?,
        Source::Rmi => run_site(RmiStrategy::new(), config, cancel).await?,
    };

    print_summary(&outcome);
    Ok(())
}

async fn run_site<S: SiteStrategy>(
    strategy: S,
    config: RunConfig,
    cancel: CancellationToken,
) -> Result<RunOutcome> {
    let orchestrator = Orchestrator::new(BrowserDriver::new(), strategy, config);
    orchestrator.run(cancel).await.map_err(Into::into)
}

fn print_summary(outcome: &RunOutcome) {
    println!("artifact: {}", outcome.artifact.display());
    println!("records:  {}", outcome.records.len());
    println!("tally:    {}", outcome.tally);
    println!("stopped:  {}", outcome.stop.as_str());
    if outcome.cancelled {
        println!("note:     run was cancelled; artifact holds a partial export");
    }
    for change in &outcome.structure_changes {
        eprintln!("STRUCTURE CHANGE: {change}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_parses_both_separators() {
        assert_eq!(
            parse_viewport("1366x768").unwrap(),
            Viewport {
                width: 1366,
                height: 768
            }
        );
        assert!(parse_viewport("1366X768").is_ok());
        assert!(parse_viewport("wide").is_err());
        assert!(parse_viewport("1366x").is_err());
    }

    #[test]
    fn zero_max_pages_means_unbounded() {
        let cli = Cli::parse_from(["gavel", "--source", "crexi", "--max-pages", "0"]);
        let config = build_config(&cli);
        assert_eq!(config.max_pages, PageLimit::Unbounded);

        let cli = Cli::parse_from(["gavel", "--source", "loopnet", "--max-pages", "5"]);
        let config = build_config(&cli);
        assert_eq!(config.max_pages, PageLimit::Max(5));
    }

    #[test]
    fn source_arg_maps_to_core_source() {
        assert_eq!(Source::from(SourceArg::Crexi), Source::Crexi);
        assert_eq!(Source::from(SourceArg::Loopnet), Source::LoopNet);
        assert_eq!(Source::from(SourceArg::Rmi), Source::Rmi);
    }
}
