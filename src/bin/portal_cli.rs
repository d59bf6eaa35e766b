//! eFTI portal CLI
//!
//! Drives both search flows against a live gate and waits for the result.
//!
//! Usage:
//!   cargo run --features cli --bin portal_cli -- identifiers AB-123 --gate FR --gate BO
//!   cargo run --features cli --bin portal_cli -- uil D1 --platform ttf --gate FR --out ./downloads
//!   cargo run --features cli --bin portal_cli -- note <request-id> "checked at border"
//!   cargo run --features cli --bin portal_cli -- auto-poll on
//!   cargo run --features cli --bin portal_cli -- show D1
//!
//! Configuration comes from `PORTAL_CONFIG` / `PORTAL_*` variables (a `.env`
//! file is loaded first) or from `--config`.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::mpsc::UnboundedReceiver;

use efti_portal::aggregate::GateBucket;
use efti_portal::config::AUTO_POLL_FLAG;
use efti_portal::display::transport_mode_label;
use efti_portal::notify::{wait_for_terminal, Flow};
use efti_portal::{
    ChannelNotifier, FileStore, HttpPortalApi, IdentifiersDisplay, IdentifiersSearch,
    Notification, PollingScheduler, PortalApi, PortalConfig, ResultCache, UilSearch,
};
use portal_types::{
    DangerousGoods, IdentifiersSearchRequest, NoteRequest, RequestStatus, UilSearchRequest,
};

#[derive(Parser, Debug)]
#[command(name = "portal_cli")]
#[command(version = "0.1.0")]
#[command(about = "Submit and follow eFTI gate searches")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// YAML configuration file (overrides PORTAL_CONFIG)
    #[arg(long, short = 'c', global = true)]
    config: Option<PathBuf>,

    /// Give up waiting for a result after this many seconds
    #[arg(long, global = true, default_value_t = 120)]
    wait_secs: u64,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Federated search by transport identifier
    Identifiers {
        identifier: String,

        /// Gate to query (repeatable; none means all)
        #[arg(long = "gate", short = 'g')]
        gates: Vec<String>,

        /// Identifier type: means, equipment, carried (repeatable)
        #[arg(long = "type", short = 't')]
        identifier_types: Vec<String>,

        #[arg(long)]
        mode_code: Option<String>,

        #[arg(long)]
        registration_country: Option<String>,

        /// YES, NO, or anything else for "don't care"
        #[arg(long, default_value = "")]
        dangerous_goods: String,

        /// Cache this dataset for `show` once the search completes
        #[arg(long)]
        pin: Option<String>,
    },

    /// Fetch one dataset by its Unique Identifier Link
    Uil {
        dataset_id: String,

        #[arg(long)]
        platform: String,

        #[arg(long)]
        gate: String,

        /// Write the dataset as <datasetId>.xml into this directory
        #[arg(long)]
        out: Option<PathBuf>,

        /// Attach a note once the dataset is retrieved
        #[arg(long)]
        note: Option<String>,
    },

    /// Attach a note to an earlier UIL request
    Note { request_id: String, message: String },

    /// Read or change the persisted auto-poll preference
    AutoPoll {
        #[arg(value_enum)]
        action: AutoPollAction,
    },

    /// Print a record pinned by an identifiers search
    Show { dataset_id: String },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum AutoPollAction {
    On,
    Off,
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "efti_portal=info,portal_cli=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => PortalConfig::load_from_file(path)?,
        None => PortalConfig::from_env().context("Loading portal configuration")?,
    };
    let cache = ResultCache::new(Arc::new(
        FileStore::open(&config.storage_dir)
            .with_context(|| format!("Opening cache at {}", config.storage_dir.display()))?,
    ));
    let wait = Duration::from_secs(cli.wait_secs);

    match cli.command {
        Commands::Identifiers {
            identifier,
            gates,
            identifier_types,
            mode_code,
            registration_country,
            dangerous_goods,
            pin,
        } => {
            let mut params = IdentifiersSearchRequest::new(identifier)
                .with_gates(gates)
                .with_identifier_types(identifier_types)
                .with_dangerous_goods(DangerousGoods::from_form(&dangerous_goods));
            params.mode_code = mode_code;
            params.registration_country_code = registration_country;
            run_identifiers(&config, cache, params, pin, wait).await
        }
        Commands::Uil {
            dataset_id,
            platform,
            gate,
            out,
            note,
        } => {
            let request = UilSearchRequest::new(dataset_id, platform, gate);
            run_uil(&config, cache, request, out, note, wait).await
        }
        Commands::Note {
            request_id,
            message,
        } => {
            let api = HttpPortalApi::new(&config)?;
            api.post_note(&NoteRequest::new(request_id.as_str(), message))
                .await
                .context("Posting note")?;
            println!("Note saved for {request_id}");
            Ok(())
        }
        Commands::AutoPoll { action } => {
            match action {
                AutoPollAction::On => cache.set_flag(AUTO_POLL_FLAG, true)?,
                AutoPollAction::Off => cache.set_flag(AUTO_POLL_FLAG, false)?,
                AutoPollAction::Status => {}
            }
            let enabled = cache.get_flag(AUTO_POLL_FLAG, config.auto_poll_default);
            println!("auto-poll: {}", if enabled { "on" } else { "off" });
            Ok(())
        }
        Commands::Show { dataset_id } => show(&cache, &dataset_id),
    }
}

/// Wait for `request_id` to become terminal, up to `wait`.
async fn wait_for_update(
    rx: &mut UnboundedReceiver<Notification>,
    request_id: &str,
    current: Option<RequestStatus>,
    wait: Duration,
) -> Result<RequestStatus> {
    match tokio::time::timeout(wait, wait_for_terminal(rx, request_id, current)).await {
        Ok(Some(status)) => {
            println!("Request {request_id}: {status}");
            Ok(status)
        }
        Ok(None) => bail!("Notification channel closed"),
        Err(_) => bail!("Request {request_id} still pending after {}s", wait.as_secs()),
    }
}

async fn run_identifiers(
    config: &PortalConfig,
    cache: ResultCache,
    params: IdentifiersSearchRequest,
    pin: Option<String>,
    wait: Duration,
) -> Result<()> {
    let api = Arc::new(HttpPortalApi::new(config)?);
    let (notifier, mut rx) = ChannelNotifier::channel();
    let search = Arc::new(IdentifiersSearch::new(api, cache, Arc::new(notifier), config));

    let request_id = search.submit(params).await.context("Submitting search")?;
    println!("Request saved: {request_id}");

    let scheduler = PollingScheduler::new(config.poll_interval());
    let polling = scheduler.start_polling(search.clone(), || true);
    wait_for_update(&mut rx, &request_id, search.status(), wait).await?;
    polling.cancel();

    let summary = search.summary();
    for entry in summary.entries.iter().filter(|e| e.bucket != GateBucket::NotCalled) {
        println!("  {:<4} {:<12} {}", entry.gate, entry.bucket.label(), entry.count);
    }
    for record in search.records() {
        println!(
            "{}  gate={} platform={}",
            record.dataset_id, record.gate_id, record.platform_id
        );
    }

    if let Some(dataset_id) = pin {
        search.pin_record(&dataset_id).context("Pinning record")?;
        println!("Pinned {dataset_id}; view with `show {dataset_id}`");
    }
    Ok(())
}

async fn run_uil(
    config: &PortalConfig,
    cache: ResultCache,
    request: UilSearchRequest,
    out: Option<PathBuf>,
    note: Option<String>,
    wait: Duration,
) -> Result<()> {
    let api = Arc::new(HttpPortalApi::new(config)?);
    let (notifier, mut rx) = ChannelNotifier::channel();
    let search = Arc::new(UilSearch::new(api, cache, Arc::new(notifier), config));

    let request_id = search.submit(request).await.context("Submitting UIL request")?;
    println!("Request saved: {request_id} ({})", Flow::Uil);

    let scheduler = PollingScheduler::new(config.poll_interval());
    let polling = scheduler.start_polling(search.clone(), || true);
    let current = search.get(&request_id).map(|entry| entry.status);
    wait_for_update(&mut rx, &request_id, current, wait).await?;
    polling.cancel();

    match search.open(&request_id).await {
        Ok(Some(html)) => println!("{html}"),
        Ok(None) => println!("(stylesheet produced no output)"),
        Err(e) => tracing::warn!(error = %e, "Dataset could not be rendered"),
    }

    if let Some(dir) = out {
        let file = search.download(&request_id)?;
        let path = file
            .write_to(&dir)
            .with_context(|| format!("Writing into {}", dir.display()))?;
        println!("Saved {}", path.display());
    }

    if let Some(message) = note {
        search.add_note(&request_id, &message).await?;
        println!("Note saved");
    }
    Ok(())
}

fn show(cache: &ResultCache, dataset_id: &str) -> Result<()> {
    let display = IdentifiersDisplay::load(cache, dataset_id)
        .with_context(|| format!("No pinned record {dataset_id}"))?;
    let record = display.record();
    println!(
        "{}  gate={} platform={}",
        record.dataset_id, record.gate_id, record.platform_id
    );
    for movement in display.movements() {
        let mode = movement
            .mode_code
            .as_deref()
            .and_then(transport_mode_label)
            .unwrap_or("-");
        println!(
            "  movement  mode={mode} country={}",
            movement.registration_country_code.as_deref().unwrap_or("-")
        );
    }
    for equipment in display.equipment() {
        println!(
            "  equipment #{} category={} country={}",
            equipment
                .sequence_number
                .map(|n| n.to_string())
                .unwrap_or_else(|| "-".into()),
            equipment.category_code.as_deref().unwrap_or("-"),
            equipment.registration_country_code.as_deref().unwrap_or("-")
        );
    }
    let uil = display.uil_request();
    println!(
        "UIL: portal_cli uil {} --platform {} --gate {}",
        uil.dataset_id, uil.platform_id, uil.gate_id
    );
    Ok(())
}
