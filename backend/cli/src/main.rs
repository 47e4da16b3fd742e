mod runtime;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing::info;

use slipguard_config::SlipGuardConfig;
use slipguard_core::{ExpectedPayment, LearningQueue, TemplateStore};
use slipguard_logging::init_logger;
use slipguard_pipeline::VerificationRequest;
use slipguard_store::SqliteStore;

#[derive(Parser)]
#[command(name = "slipguard")]
#[command(about = "SlipGuard — self-improving payment screenshot verification")]
#[command(version)]
struct Cli {
    /// YAML config file; built-in defaults are used when it does not exist
    #[arg(short, long, default_value = "slipguard.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the verification runtime until interrupted
    Run,
    /// Verify one OCR text file against an expected payment
    Verify {
        /// File holding the screenshot's OCR text
        #[arg(long)]
        ocr_file: PathBuf,
        /// Screenshot image, needed for the fallback path
        #[arg(long)]
        image: Option<PathBuf>,
        #[arg(long)]
        amount: f64,
        #[arg(long, default_value = "KHR")]
        currency: String,
        /// Acceptable recipient spelling; repeat for aliases
        #[arg(long = "recipient")]
        recipients: Vec<String>,
        #[arg(long)]
        account: String,
        /// Issuer hint from the invoice
        #[arg(long)]
        bank: Option<String>,
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        merchant: Option<String>,
        /// Payment due date (RFC 3339); later screenshots are rejected
        #[arg(long)]
        due: Option<DateTime<Utc>>,
    },
    /// Inspect durable issuer templates
    Templates {
        #[arg(long)]
        issuer: Option<String>,
    },
    /// Show learning queue depth
    Queue,
    /// Delete processed learning records older than the window
    Purge {
        #[arg(long, default_value_t = 7)]
        days: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let (config, from_file) = load_config(&cli.config).await?;
    init_logger(&config.logging.dir, &config.logging.level);
    if !from_file {
        info!(path = %cli.config.display(), "config file not found, using defaults");
    }

    match cli.command {
        Commands::Run => run(&config).await,
        Commands::Verify {
            ocr_file,
            image,
            amount,
            currency,
            recipients,
            account,
            bank,
            tenant,
            merchant,
            due,
        } => {
            let expected = ExpectedPayment {
                amount,
                currency,
                recipient_names: recipients,
                to_account: account,
                bank_hint: bank,
                due_date: due,
            };
            verify_once(&config, &ocr_file, image.as_deref(), expected, tenant, merchant).await
        }
        Commands::Templates { issuer } => show_templates(&config, issuer).await,
        Commands::Queue => show_queue(&config).await,
        Commands::Purge { days } => purge(&config, days).await,
    }
}

async fn load_config(path: &Path) -> Result<(SlipGuardConfig, bool)> {
    if path.exists() {
        Ok((slipguard_config::load_config(path).await?, true))
    } else {
        Ok((SlipGuardConfig::default(), false))
    }
}

async fn run(config: &SlipGuardConfig) -> Result<()> {
    let rt = runtime::build(config)?;
    let (handle, task) = rt.start_scheduler(config);
    info!("SlipGuard runtime started; press ctrl-c to stop");

    tokio::signal::ctrl_c()
        .await
        .context("failed waiting for shutdown signal")?;
    info!("shutting down");
    handle.shutdown().await;
    task.await?;

    let report = rt.pipeline.cost_report();
    info!(
        pattern_served = report.pattern_served,
        fallback_served = report.fallback_served,
        saved_usd = report.saved_usd,
        "final cost report"
    );
    Ok(())
}

async fn verify_once(
    config: &SlipGuardConfig,
    ocr_file: &Path,
    image: Option<&Path>,
    expected: ExpectedPayment,
    tenant_id: String,
    merchant_id: Option<String>,
) -> Result<()> {
    let ocr_text = tokio::fs::read_to_string(ocr_file)
        .await
        .with_context(|| format!("failed to read OCR text from {}", ocr_file.display()))?;
    let image_bytes = match image {
        Some(path) => Some(
            tokio::fs::read(path)
                .await
                .with_context(|| format!("failed to read image {}", path.display()))?,
        ),
        None => None,
    };
    let mime_type = image
        .and_then(|p| p.extension().and_then(|e| e.to_str()))
        .map(|ext| match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => "image/jpeg".to_string(),
            other => format!("image/{other}"),
        })
        .unwrap_or_else(|| "image/png".to_string());

    let rt = runtime::build(config)?;
    let request = VerificationRequest {
        ocr_text,
        image: image_bytes,
        mime_type,
        tenant_id,
        merchant_id,
        expected,
    };

    let outcome = rt.pipeline.verify(&request).await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}

async fn show_templates(config: &SlipGuardConfig, issuer: Option<String>) -> Result<()> {
    let store = SqliteStore::open(&config.store.db_path)?;
    let codes = match issuer {
        Some(code) => vec![code],
        None => store.list_issuer_codes().await?,
    };
    if codes.is_empty() {
        println!("no templates learned yet");
        return Ok(());
    }
    for code in codes {
        match store.find(&code).await? {
            Some(template) => println!("{}", serde_json::to_string_pretty(&template)?),
            None => println!("no template for issuer {code}"),
        }
    }
    Ok(())
}

async fn show_queue(config: &SlipGuardConfig) -> Result<()> {
    let store = SqliteStore::open(&config.store.db_path)?;
    let (unprocessed, processed) = store.depth().await?;
    println!("learning queue: {unprocessed} unprocessed, {processed} processed");
    Ok(())
}

async fn purge(config: &SlipGuardConfig, days: i64) -> Result<()> {
    let store = SqliteStore::open(&config.store.db_path)?;
    let purged = store.purge_processed(days).await?;
    println!("purged {purged} processed learning records older than {days} days");
    Ok(())
}
