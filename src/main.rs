mod auth;
mod cli;
mod config;
mod models;
mod portal;
mod scheduler;
mod storage;
mod store;
mod transcript;
mod validation;

use anyhow::Result;
use clap::Parser;
use std::cell::RefCell;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "bookmycare", about = "Healthcare portal: appointments, blood, medicine")]
pub struct Args {
    #[arg(short = 'c', long, help = "Run one command and exit")]
    pub command: Option<String>,

    #[arg(long, env = "BOOKMYCARE_DATA_DIR", help = "Directory holding the snapshot")]
    pub data_dir: Option<PathBuf>,

    #[arg(long, help = "Storage key of the snapshot")]
    pub key: Option<String>,

    #[arg(long, help = "Keep state in memory only")]
    pub ephemeral: bool,

    #[arg(long, help = "Activity log directory")]
    pub activity_dir: Option<PathBuf>,

    #[arg(long, help = "Config file path")]
    pub config: Option<PathBuf>,

    #[arg(long, help = "List hospitals, specializations and blood types and exit")]
    pub list_catalog: bool,

    #[arg(long, help = "Echo activity events to stderr")]
    pub trace: bool,

    #[arg(long, help = "Print the effective settings on startup")]
    pub verbose: bool,
}

fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    if args.list_catalog {
        cli::print_catalog();
        return Ok(ExitCode::SUCCESS);
    }

    let mut cfg = if let Some(config_path) = &args.config {
        config::Config::load_from(config_path)?
    } else {
        config::Config::load().unwrap_or_else(|e| {
            eprintln!("Warning: failed to load config, using defaults: {}", e);
            config::Config::default()
        })
    };

    // CLI overrides
    if let Some(dir) = &args.data_dir {
        cfg.storage.data_dir = Some(dir.clone());
    }
    if let Some(key) = &args.key {
        cfg.storage.key = Some(key.clone());
    }

    if let Err(errors) = cfg.validate() {
        for error in &errors {
            eprintln!("Config error {}", error);
        }
        return Err(anyhow::anyhow!(
            "Invalid configuration ({} error(s))",
            errors.len()
        ));
    }

    let data_dir = cfg.storage.data_dir();
    let key = cfg.storage.key().to_string();

    if args.verbose {
        eprintln!("[DEBUG] Data dir: {}", data_dir.display());
        eprintln!("[DEBUG] Snapshot key: {}", key);
        eprintln!("[DEBUG] Queue capacity: {}", cfg.queue.capacity());
        eprintln!(
            "[DEBUG] Verification delay: {} ms",
            cfg.medicine.verification_delay_ms()
        );
    }

    let storage: cli::DynStorage = if args.ephemeral {
        Box::new(storage::MemoryStorage::new())
    } else {
        Box::new(storage::FileStorage::new(&data_dir)?)
    };
    let (store, outcome) = store::ClientStore::open(storage, &key)?;

    let session_id = uuid::Uuid::new_v4().to_string();
    let activity_dir = args
        .activity_dir
        .clone()
        .unwrap_or_else(|| data_dir.join("activity"));
    let mut transcript =
        transcript::Transcript::new(&activity_dir.join(format!("{}.jsonl", session_id)), &session_id)?;
    transcript.set_echo(args.trace);

    match &outcome {
        store::LoadOutcome::Empty => transcript.session_start("empty", 0)?,
        store::LoadOutcome::Restored { .. } => {
            transcript.session_start("restored", store.state().users.len())?
        }
        store::LoadOutcome::Discarded { error } => {
            eprintln!(
                "Warning: stored data under '{}' is unreadable, starting fresh: {}",
                key, error
            );
            transcript.snapshot_discarded(error)?;
            transcript.session_start("discarded", 0)?;
        }
    }

    let ctx = cli::Context {
        args,
        session_id,
        transcript: RefCell::new(transcript),
        portal: RefCell::new(portal::Portal::new(store, cfg)),
        active_tab: RefCell::new(portal::Tab::Home),
        logged_save: RefCell::new(0),
    };

    if let Some(command) = ctx.args.command.clone() {
        if cli::run_once(&ctx, &command)? {
            Ok(ExitCode::SUCCESS)
        } else {
            Ok(ExitCode::FAILURE)
        }
    } else {
        cli::run_repl(ctx)?;
        Ok(ExitCode::SUCCESS)
    }
}
