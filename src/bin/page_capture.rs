//! Pages through books in the reader and saves every page image.
//!
//! A Chrome window opens on the reader. Log in, open a book, then return to
//! the terminal. Ctrl-C stops the current book; a second Ctrl-C, or one
//! pressed at a prompt, exits.

use book_scraper::browser::Browser;
use book_scraper::capture::{self, CaptureConfig, Interrupt};
use book_scraper::images::HttpFetcher;
use book_scraper::logging;
use book_scraper::prompt::{self, OperatorCommand};
use clap::Parser;
use anyhow::Context as _;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

/// Downloads the page images of books opened in the online reader
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Page opened in the browser for logging in
    #[arg(long, default_value = "https://eduka.lt/")]
    start_url: String,

    /// Origin that relative page image references are resolved against
    #[arg(long, default_value = "https://eduka.lt/")]
    base_url: String,

    /// Directory that receives one folder per book
    #[arg(long, default_value = ".")]
    output_dir: PathBuf,

    /// Longest wait for the next page after turning, in milliseconds
    #[arg(long, default_value_t = 1500)]
    settle_ms: u64,

    /// How long to wait for a page image to appear, in seconds
    #[arg(long, default_value_t = 10)]
    element_timeout_secs: u64,

    /// Stop a book after this many pages
    #[arg(long, default_value_t = 2000, value_parser = clap::value_parser!(u64).range(1..))]
    max_pages: u64,
}

impl Args {
    fn capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            output_dir: self.output_dir.clone(),
            settle_delay: Duration::from_millis(self.settle_ms),
            max_pages: usize::try_from(self.max_pages).unwrap_or(usize::MAX),
            ..CaptureConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    logging::init().context("init logging")?;

    let args = Args::parse();
    tracing::debug!(?args, "parsed cli");

    let config = args.capture_config();
    let fetcher = HttpFetcher::new(&args.base_url).context("build image fetcher")?;
    tracing::info!(base_url = %fetcher.base_url(), output_dir = %config.output_dir.display(), "capture configured");

    let browser = Browser::new().context("launch chrome")?;
    let viewer = browser
        .open_viewer(&args.start_url, Duration::from_secs(args.element_timeout_secs))
        .context("open reader")?;

    let interrupt = Arc::new(Interrupt::new());
    let listener = Arc::clone(&interrupt);
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if listener.request_stop() {
                println!("\nStopping after the current page... (Ctrl-C again to exit)");
            } else {
                println!("\nInterrupted. Exiting.");
                std::process::exit(130);
            }
        }
    });

    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    let mut output = std::io::stdout();

    prompt::wait_for_enter(
        &mut input,
        &mut output,
        "Browser has opened. Please log in, then press Enter in this terminal to start scraping the first book...",
    )?;

    loop {
        interrupt.begin_book();
        let outcome = capture::capture_book(&viewer, &fetcher, &config, &interrupt).await;
        interrupt.end_book();

        match outcome {
            Ok(report) => {
                tracing::info!(pages = report.pages, stop = %report.stop, folder = ?report.folder, "book finished");
            }
            Err(err) => {
                tracing::error!(error = %err, url = %viewer.url(), "book capture aborted");
                println!("An unexpected error occurred: {err}");
            }
        }

        match prompt::ask_next_book(&mut input, &mut output)? {
            OperatorCommand::NextBook => continue,
            OperatorCommand::Quit => {
                println!("User requested to quit. Exiting.");
                break;
            }
            OperatorCommand::Invalid(_) => {
                println!("Invalid input. Quitting.");
                break;
            }
        }
    }

    println!("\nScraping session finished. Closing browser.");
    Ok(())
}
