use std::{path::PathBuf, sync::Arc};

use anyhow::{bail, Result};
use chrono::{Local, NaiveDate, NaiveTime};
use clap::{Args, Parser, Subcommand};
use log::{info, warn};

use crate::{
    clock::{Clock, LocalClock},
    db::Database,
    overtime::project,
    scanner::{EventSink, KioskEvent, ScannerController, SessionStatus, StdinScanner},
    settings::{parse_clock_time, KioskSettings, ScanPolicy, SettingsStore, StoreSettings},
    store::{HttpRecordStore, RecordStore},
};

#[derive(Parser)]
#[command(name = "overtime-kiosk")]
#[command(about = "Overtime time-in/time-out kiosk driven by employee QR badges")]
#[command(version)]
pub struct Cli {
    /// Settings file (falls back to $OVERTIME_KIOSK_CONFIG, then ./kiosk-settings.json)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scanner, reading one decoded payload per line from stdin
    Scan {
        /// Print kiosk events as JSON lines instead of text
        #[arg(long)]
        json: bool,
    },

    /// Approve an overtime request (local SQLite store only)
    Approve {
        #[arg(long)]
        employee: u64,

        /// Work date, defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Set an arbitrary request status (local SQLite store only)
    SetStatus {
        #[arg(long)]
        employee: u64,

        #[arg(long)]
        status: String,

        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// List overtime records for a work date
    Records {
        #[arg(long)]
        date: Option<NaiveDate>,
    },

    /// Print the effective settings
    ShowConfig,

    /// Change the scan policy and write it back to the settings file
    SetPolicy(PolicyChanges),
}

#[derive(Args, Debug, Default)]
struct PolicyChanges {
    /// First admitted time of day (HH:MM)
    #[arg(long, value_parser = clock_arg)]
    allowed_start: Option<NaiveTime>,

    /// Last admitted time of day (HH:MM)
    #[arg(long, value_parser = clock_arg)]
    allowed_end: Option<NaiveTime>,

    /// Time of day the scanner closes itself
    #[arg(long, value_parser = clock_arg)]
    shutdown_at: Option<NaiveTime>,

    /// Live durations stop growing here
    #[arg(long, value_parser = clock_arg)]
    shift_end_bound: Option<NaiveTime>,

    #[arg(long)]
    dedup_window_ms: Option<u64>,

    #[arg(long)]
    store_timeout_ms: Option<u64>,
}

fn clock_arg(raw: &str) -> Result<NaiveTime, String> {
    parse_clock_time(raw).map_err(|err| format!("{err:#}"))
}

pub async fn dispatch(cli: Cli) -> Result<()> {
    let settings = SettingsStore::new(SettingsStore::resolve_path(cli.config))?;
    info!("using settings from {}", settings.path().display());

    match cli.command.unwrap_or(Commands::Scan { json: false }) {
        Commands::Scan { json } => run_scanner(&settings, json).await,
        Commands::Approve { employee, date } => {
            let db = local_database(&settings.settings())?;
            let date = date.unwrap_or_else(today);
            db.set_request_status(employee, date, "Approved").await?;
            println!("approved overtime for employee {employee} on {date}");
            Ok(())
        }
        Commands::SetStatus {
            employee,
            status,
            date,
        } => {
            let db = local_database(&settings.settings())?;
            let date = date.unwrap_or_else(today);
            db.set_request_status(employee, date, &status).await?;
            println!("employee {employee} on {date}: {status}");
            Ok(())
        }
        Commands::Records { date } => {
            let store = open_store(&settings.settings())?;
            list_records(store.as_ref(), &settings.settings(), date.unwrap_or_else(today)).await
        }
        Commands::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&settings.settings())?);
            Ok(())
        }
        Commands::SetPolicy(changes) => {
            let policy = apply_policy_changes(&settings, changes)?;
            info!("scan policy written to {}", settings.path().display());
            println!("{}", serde_json::to_string_pretty(&policy)?);
            Ok(())
        }
    }
}

fn apply_policy_changes(settings: &SettingsStore, changes: PolicyChanges) -> Result<ScanPolicy> {
    let mut policy = settings.policy();
    if let Some(at) = changes.allowed_start {
        policy.allowed_start = at;
    }
    if let Some(at) = changes.allowed_end {
        policy.allowed_end = at;
    }
    if let Some(at) = changes.shutdown_at {
        policy.shutdown_at = at;
    }
    if let Some(at) = changes.shift_end_bound {
        policy.shift_end_bound = at;
    }
    if let Some(ms) = changes.dedup_window_ms {
        policy.dedup_window_ms = ms;
    }
    if let Some(ms) = changes.store_timeout_ms {
        policy.store_timeout_ms = ms;
    }
    settings.update_policy(policy.clone())?;
    Ok(policy)
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn open_store(settings: &KioskSettings) -> Result<Arc<dyn RecordStore>> {
    let store: Arc<dyn RecordStore> = match &settings.store {
        StoreSettings::Sqlite { path } => Arc::new(Database::new(path.clone())?),
        StoreSettings::Http { base_url, api_key } => Arc::new(HttpRecordStore::new(
            base_url,
            api_key.as_deref(),
            settings.policy.store_timeout(),
        )?),
    };
    Ok(store)
}

fn local_database(settings: &KioskSettings) -> Result<Database> {
    match &settings.store {
        StoreSettings::Sqlite { path } => Database::new(path.clone()),
        StoreSettings::Http { base_url, .. } => {
            bail!("approvals are managed by the HR backend at {base_url}")
        }
    }
}

async fn list_records(store: &dyn RecordStore, settings: &KioskSettings, date: NaiveDate) -> Result<()> {
    let records = store.records_for_date(date).await?;
    if records.is_empty() {
        println!("no overtime records for {date}");
        return Ok(());
    }

    let now = LocalClock.now();
    for record in records {
        let fmt = |time: Option<chrono::NaiveTime>| {
            time.map(|t| t.format("%H:%M:%S").to_string())
                .unwrap_or_else(|| "-".into())
        };
        let worked = project(&record, now, settings.policy.shift_end_bound)
            .map(|projection| projection.display)
            .unwrap_or_default();
        println!(
            "{:>8}  {:<10}  in {:<8}  out {:<8}  {}",
            record.employee_id,
            record.status,
            fmt(record.time_in),
            fmt(record.time_out),
            worked
        );
    }
    Ok(())
}

async fn run_scanner(settings: &SettingsStore, json: bool) -> Result<()> {
    let kiosk = settings.settings();
    let store = open_store(&kiosk)?;
    let (sink, mut events) = EventSink::channel();
    let controller = ScannerController::new(
        store,
        Arc::new(StdinScanner::new()),
        Arc::new(LocalClock),
        kiosk.policy.clone(),
        sink,
    );

    if let Err(err) = controller.start().await {
        // The refusal notice is already queued; show it before bailing.
        while let Ok(event) = events.try_recv() {
            print_event(&event, json)?;
        }
        bail!(err);
    }

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received; stopping scanner");
                controller.stop().await;
                break;
            }
            event = events.recv() => {
                let Some(event) = event else { break };
                print_event(&event, json)?;
                if let KioskEvent::SessionChanged(snapshot) = &event {
                    if snapshot.status == SessionStatus::Stopped {
                        warn!("scanner session ended ({:?})", snapshot.stop_reason);
                        break;
                    }
                }
            }
        }
    }

    while let Ok(event) = events.try_recv() {
        print_event(&event, json)?;
    }
    Ok(())
}

fn print_event(event: &KioskEvent, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
        return Ok(());
    }

    match event {
        KioskEvent::Notice(notice) => {
            println!("[{}] {}", notice.level.as_str(), notice.message);
        }
        KioskEvent::SessionChanged(snapshot) => {
            println!("[session] {:?}", snapshot.status);
        }
        KioskEvent::Durations(projections) => {
            for projection in projections {
                println!(
                    "[duration] employee {}: {} ({})",
                    projection.employee_id,
                    projection.display,
                    projection.stage.as_str()
                );
            }
        }
    }
    Ok(())
}
