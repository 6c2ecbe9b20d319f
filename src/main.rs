use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{ArgGroup, Parser};
use colored::Colorize;
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use url::Url;

use plexpull::{
    DecisionFlags, NoopReporter, PlexCatalog, ProgressEvent, ProgressReporter, ReqwestClient,
    Selection, SharedProgressReporter, SyncError, SyncOptions, SyncResult, sync_catalog,
};

// Emoji with fallback for terminals without Unicode support
static DOWNLOAD: Emoji<'_, '_> = Emoji("📥 ", "[v] ");
static SUCCESS: Emoji<'_, '_> = Emoji("✅ ", "[+] ");
static FAILURE: Emoji<'_, '_> = Emoji("❌ ", "[!] ");
static PARTY: Emoji<'_, '_> = Emoji("🎉 ", "[*] ");
static CROSS: Emoji<'_, '_> = Emoji("✗ ", "x ");

/// Fetch shows, movies and playlists from a Plex Media Server
#[derive(Parser, Debug)]
#[command(name = "plexpull")]
#[command(about = "Fetch shows, movies and playlists from a Plex Media Server")]
#[command(version)]
#[command(group(ArgGroup::new("selection").required(true).args(["section", "playlist"])))]
#[command(group(ArgGroup::new("verbosity").args(["debug", "verbose", "quiet"])))]
struct Args {
    /// Base URL of the Plex Media Server, e.g. http://nas:32400
    #[arg(long, env = "PLEX_SERVER")]
    server: Url,

    /// Access token for the server
    #[arg(long, env = "PLEX_TOKEN", hide_env_values = true)]
    token: String,

    /// Destination folder
    #[arg(long)]
    target: PathBuf,

    /// Section to fetch
    #[arg(long)]
    section: Option<String>,

    /// Movie or series to fetch from the section
    #[arg(long, requires = "section")]
    name: Option<String>,

    /// Playlist to fetch
    #[arg(long)]
    playlist: Option<String>,

    /// Remove items from the playlist after downloading
    #[arg(long, requires = "playlist")]
    playlist_remove: bool,

    /// Maximum bandwidth in bytes per second
    #[arg(long, value_name = "BYTES")]
    bwlimit: Option<u32>,

    /// Show a progress bar for each transfer
    #[arg(long)]
    progress: bool,

    /// Download even if the item was already watched
    #[arg(long)]
    force: bool,

    /// Also download subtitles, thumbnails and fanart
    #[arg(long)]
    assets: bool,

    /// Download subtitles, thumbnails and fanart of watched items
    #[arg(long)]
    refresh_assets: bool,

    /// Do not fall back to a transcoded stream when a download is refused
    #[arg(long)]
    no_transcode: bool,

    /// Give up on a transfer after this many seconds without data
    #[arg(long, value_name = "SECONDS")]
    timeout: Option<u64>,

    /// Debug output
    #[arg(short, long)]
    debug: bool,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Only report errors
    #[arg(short, long)]
    quiet: bool,
}

impl Args {
    fn selection(&self) -> Result<Selection> {
        match (&self.section, &self.playlist) {
            (Some(section), None) => Ok(Selection::Section {
                section: section.clone(),
                name: self.name.clone(),
            }),
            (None, Some(name)) => Ok(Selection::Playlist { name: name.clone() }),
            _ => bail!("either --section or --playlist required"),
        }
    }

    fn options(&self) -> SyncOptions {
        SyncOptions {
            destination: self.target.clone(),
            bandwidth_limit: self.bwlimit,
            timeout: self.timeout.map(Duration::from_secs),
            flags: DecisionFlags {
                force: self.force,
                assets: self.assets,
                refresh_assets: self.refresh_assets,
            },
            allow_transcode: !self.no_transcode,
            remove_from_playlist: self.playlist_remove,
        }
    }

    fn log_level(&self) -> &'static str {
        if self.debug {
            "debug"
        } else if self.verbose {
            "info"
        } else if self.quiet {
            "error"
        } else {
            "warn"
        }
    }
}

/// Progress reporter drawing one indicatif bar per transfer
struct IndicatifReporter {
    bar: Mutex<Option<ProgressBar>>,
}

impl IndicatifReporter {
    fn new() -> Self {
        Self {
            bar: Mutex::new(None),
        }
    }

    fn start_bar(&self, file_name: &str, position: u64, total: Option<u64>) {
        let style = ProgressStyle::default_bar()
            .template(&format!(
                "  {DOWNLOAD}[{{bar:30.cyan/blue}}] {{bytes}}/{{total_bytes}} {{bytes_per_sec}} {{wide_msg}}"
            ))
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▓░");

        let bar = ProgressBar::new(total.unwrap_or(0));
        bar.set_style(style);
        bar.set_position(position);
        bar.set_message(truncate_title(file_name, 40));

        if let Ok(mut current) = self.bar.lock() {
            if let Some(old) = current.replace(bar) {
                old.finish_and_clear();
            }
        }
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressBar)) {
        if let Ok(current) = self.bar.lock()
            && let Some(bar) = current.as_ref()
        {
            f(bar);
        }
    }

    fn take_bar(&self) -> Option<ProgressBar> {
        self.bar.lock().ok().and_then(|mut current| current.take())
    }
}

impl ProgressReporter for IndicatifReporter {
    fn report(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::TraversalStarting { source } => {
                println!("{} {}", "Fetching".bold(), source.cyan());
            }

            ProgressEvent::TransferStarting {
                file_name,
                resume_offset,
                total_bytes,
                ..
            } => {
                self.start_bar(&file_name, resume_offset, total_bytes);
            }

            ProgressEvent::TransferProgress {
                bytes_transferred,
                total_bytes,
                ..
            } => {
                self.with_bar(|bar| {
                    if let Some(total) = total_bytes {
                        bar.set_length(total);
                    }
                    bar.set_position(bytes_transferred);
                });
            }

            ProgressEvent::TransferCompleted { file_name, .. } => {
                if let Some(bar) = self.take_bar() {
                    bar.finish_and_clear();
                }
                println!("  {SUCCESS}{}", truncate_title(&file_name, 60).green());
            }

            ProgressEvent::TransferFailed {
                file_name, error, ..
            } => {
                if let Some(bar) = self.take_bar() {
                    bar.finish_and_clear();
                }
                println!(
                    "  {FAILURE}{} - {}",
                    truncate_title(&file_name, 40).red(),
                    error.red()
                );
            }

            ProgressEvent::ItemSkipped { title, reason } => {
                println!("  {} {}", title.dimmed(), format!("({reason})").dimmed());
            }

            ProgressEvent::SyncCompleted { .. } => {}
        }
    }
}

fn truncate_title(title: &str, max_len: usize) -> String {
    if title.chars().count() <= max_len {
        title.to_string()
    } else {
        let head: String = title.chars().take(max_len.saturating_sub(3)).collect();
        format!("{head}...")
    }
}

fn init_logging(args: &Args) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("plexpull={}", args.log_level())));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_summary(result: &SyncResult) {
    println!(
        "\n{PARTY}{} {} downloaded, {} assets refreshed, {} skipped, {} failed",
        "Sync complete:".bold().green(),
        result.downloaded.to_string().green().bold(),
        result.assets_only.to_string().cyan(),
        result.skipped.to_string().yellow(),
        if result.failed > 0 {
            result.failed.to_string().red().bold()
        } else {
            result.failed.to_string().green()
        }
    );

    if !result.failed_items.is_empty() {
        println!("\n{}", "Failed items:".red().bold());
        for (title, error) in &result.failed_items {
            println!("  {}{} - {}", CROSS, title.yellow(), error.dimmed());
        }
    }
}

async fn run(args: &Args) -> Result<SyncResult> {
    let selection = args.selection()?;
    let options = args.options();

    let client = reqwest::Client::builder()
        .build()
        .context("Failed to create HTTP client")?;

    info!("connecting to {}", args.server);
    let catalog = PlexCatalog::new(client.clone(), args.server.clone(), args.token.as_str());

    let reporter: SharedProgressReporter = if args.progress {
        Arc::new(IndicatifReporter::new())
    } else {
        NoopReporter::shared()
    };

    let result = sync_catalog(
        &catalog,
        ReqwestClient::with_client(client),
        &selection,
        &options,
        reporter,
    )
    .await
    .context("Failed to fetch from Plex")?;

    Ok(result)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(&args);

    match run(&args).await {
        Ok(result) => {
            if !args.quiet {
                print_summary(&result);
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            let code = e.downcast_ref::<SyncError>().map_or(1, SyncError::exit_code);
            error!("{:#}", e);
            ExitCode::from(code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Result<Args, clap::Error> {
        let mut argv = vec![
            "plexpull",
            "--server",
            "http://nas:32400",
            "--token",
            "secret",
            "--target",
            "/srv/dl",
        ];
        argv.extend_from_slice(extra);
        Args::try_parse_from(argv)
    }

    #[test]
    fn section_or_playlist_is_required() {
        assert!(parse(&[]).is_err());
        assert!(parse(&["--section", "TV", "--playlist", "Later"]).is_err());
        assert!(parse(&["--section", "TV"]).is_ok());
        assert!(parse(&["--playlist", "Later"]).is_ok());
    }

    #[test]
    fn name_requires_section() {
        assert!(parse(&["--playlist", "Later", "--name", "Show"]).is_err());

        let args = parse(&["--section", "TV", "--name", "Show"]).unwrap();
        assert_eq!(
            args.selection().unwrap(),
            Selection::Section {
                section: "TV".to_string(),
                name: Some("Show".to_string()),
            }
        );
    }

    #[test]
    fn verbosity_flags_are_exclusive() {
        assert!(parse(&["--section", "TV", "-d", "-q"]).is_err());
        assert_eq!(parse(&["--section", "TV", "-v"]).unwrap().log_level(), "info");
        assert_eq!(parse(&["--section", "TV"]).unwrap().log_level(), "warn");
    }

    #[test]
    fn flags_map_to_options() {
        let args = parse(&[
            "--playlist",
            "Later",
            "--playlist-remove",
            "--bwlimit",
            "500000",
            "--timeout",
            "30",
            "--assets",
            "--no-transcode",
        ])
        .unwrap();
        let options = args.options();

        assert_eq!(options.bandwidth_limit, Some(500_000));
        assert_eq!(options.timeout, Some(Duration::from_secs(30)));
        assert!(options.flags.assets);
        assert!(!options.flags.force);
        assert!(!options.allow_transcode);
        assert!(options.remove_from_playlist);
    }

    #[test]
    fn truncate_title_respects_char_boundaries() {
        assert_eq!(truncate_title("short", 10), "short");
        assert_eq!(truncate_title("Überlänge des Films", 8), "Überl...");
    }
}
