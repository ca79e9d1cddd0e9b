use book_scraper::{logging, metadata};
use clap::Parser;
use anyhow::Context as _;
use std::process::ExitCode;

/// Prints the catalogue form fields of a Pegasas book page
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// URL of the Pegasas product page
    url: String,
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

    if !metadata::is_product_url(&args.url) {
        println!("Please provide a valid Pegasas book URL.");
        return Ok(());
    }

    let data = metadata::fetch_product_page(&args.url).await;
    if data.is_empty() {
        println!("Could not find book on Pegasas.");
        return Ok(());
    }

    print!("{}", metadata::render_form(&data));
    Ok(())
}
