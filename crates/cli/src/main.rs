use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::Parser;
use ledgerscan_core::{Notice, Session, Transaction};
use ledgerscan_export::ExportArtifact;
use ledgerscan_extract::{
    ApiKeySource, ExtractionClient, ExtractionConfig, Extractor, ImagePayload, MockTransport,
};
use tracing_subscriber::EnvFilter;

/// Read a bank statement image and write a semicolon-delimited ledger CSV.
#[derive(Parser, Debug)]
#[command(name = "ledgerscan", version, about, long_about = None)]
struct Cli {
    /// Statement image (JPEG, PNG, WebP, HEIC).
    image: PathBuf,

    /// Directory the ledger file is written to.
    #[arg(short, long, default_value = ".")]
    out: PathBuf,

    /// Use this file as the recognition reply instead of calling the service.
    #[arg(long, value_name = "FILE")]
    mock_response: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let image = ImagePayload::from_path(&cli.image)
        .await
        .with_context(|| format!("reading {}", cli.image.display()))?;

    let stdout = std::io::stdout();
    let written = match &cli.mock_response {
        Some(path) => {
            let reply = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            let client = ExtractionClient::new(
                MockTransport::new(reply),
                ApiKeySource::Static(Some("mock".to_string())),
            );
            run(&client, &image, &cli.out, &mut stdout.lock()).await?
        }
        None => {
            let config = ExtractionConfig::from_env()?;
            let client = ExtractionClient::from_config(&config)?;
            run(&client, &image, &cli.out, &mut stdout.lock()).await?
        }
    };

    if let Some(path) = written {
        println!("Saved {}", path.display());
    }
    Ok(())
}

/// One extraction against a fresh session. Returns the written file, if any.
async fn run<E: Extractor>(
    extractor: &E,
    image: &ImagePayload,
    out_dir: &Path,
    out: &mut impl Write,
) -> Result<Option<PathBuf>> {
    let mut session = Session::new();
    let ticket = session.begin_extraction()?;

    let transactions = match extractor.extract(image).await {
        Ok(transactions) => transactions,
        Err(e) => {
            tracing::error!(image = %image.digest(), error = %e, "extraction failed");
            session.fail_extraction(ticket, e.user_message())?;
            bail!("{}", e.user_message());
        }
    };
    tracing::info!(
        image = %image.digest(),
        count = transactions.len(),
        "extraction finished"
    );

    if let Some(Notice::NoTransactions) = session.complete_extraction(ticket, transactions)? {
        writeln!(out, "{}", Notice::NoTransactions.message())?;
        return Ok(None);
    }

    print_table(session.transactions(), out)?;

    match ExportArtifact::build_now(session.transactions())? {
        Some(artifact) => {
            let path = artifact.write_to_dir(out_dir)?;
            tracing::info!(path = %path.display(), bytes = artifact.bytes.len(), "ledger written");
            Ok(Some(path))
        }
        None => Ok(None),
    }
}

fn print_table(transactions: &[Transaction], out: &mut impl Write) -> Result<()> {
    let width = transactions
        .iter()
        .map(|tx| tx.description.chars().count())
        .max()
        .unwrap_or(0)
        .clamp(11, 48);

    writeln!(out, "{:<10}  {:<width$}  {:>12}", "Date", "Description", "Amount")?;
    for tx in transactions {
        let description: String = tx
            .description
            .replace(['\n', '\r'], " ")
            .chars()
            .take(width)
            .collect();
        writeln!(
            out,
            "{:<10}  {:<width$}  {:>12}",
            tx.date.to_string(),
            description,
            tx.signed_display()
        )?;
    }
    writeln!(out, "{} transaction(s)", transactions.len())?;
    Ok(())
}
