//! `cardest` binary: run the responder loop or a one-off local estimate.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing::error;

use cardest::common::log;
use cardest::inference::EstimateSource;
use cardest::{
    AppCfg, CardError, CardResult, ControlBlock, EstimateRequest, OpcodeDispatcher, PollLoop,
};

#[derive(Parser, Debug)]
#[command(name = "cardest", version, about = "Learned cardinality estimation responder")]
struct Args {
    /// Root holding `models/` (overrides CARDEST_DATA_ROOT).
    #[arg(long, global = true)]
    data_root: Option<PathBuf>,

    /// Emit JSON log lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve requests from a shared-memory control block.
    Serve(ServeArgs),
    /// Estimate one scan against the local model store.
    Estimate(EstimateArgs),
}

#[derive(Parser, Debug)]
struct ServeArgs {
    /// Backing file of the control block (overrides CARDEST_IPC_PATH).
    #[arg(long)]
    ipc: Option<PathBuf>,

    /// Create and size the backing file instead of attaching to an existing one.
    #[arg(long)]
    create: bool,

    /// Shell command that answers forwarded queries on stdin/stdout.
    #[arg(long)]
    query_cmd: Option<String>,

    #[arg(long)]
    poll_interval_us: Option<u64>,
}

#[derive(Parser, Debug)]
struct EstimateArgs {
    #[arg(long)]
    namespace: String,

    #[arg(long)]
    entity: String,

    #[arg(long, default_value = "")]
    filter: String,

    /// `|`-separated order keys.
    #[arg(long, default_value = "")]
    order: String,

    #[arg(long)]
    input_count: u64,
}

fn main() -> ExitCode {
    let args = Args::parse();
    let mut cfg = AppCfg::load();
    if let Some(root) = &args.data_root {
        cfg.data_root = root.clone();
    }
    cfg.log_json |= args.log_json;
    log::init(&cfg);

    let result = match args.cmd {
        Command::Serve(serve_args) => serve(cfg, serve_args),
        Command::Estimate(estimate_args) => estimate(&cfg, estimate_args),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(ev = "fatal", code = err.code() as u32, error = %err);
            eprintln!("cardest: {err}");
            ExitCode::FAILURE
        }
    }
}

fn serve(mut cfg: AppCfg, args: ServeArgs) -> CardResult<()> {
    if let Some(path) = args.ipc {
        cfg.ipc_path = Some(path);
    }
    if let Some(cmd) = args.query_cmd {
        cfg.query_cmd = Some(cmd);
    }
    if let Some(us) = args.poll_interval_us {
        cfg.poll_interval_us = us;
    }
    cfg.validate()?;

    let path = cfg
        .ipc_path
        .clone()
        .ok_or_else(|| CardError::Config("no control block path; pass --ipc".to_string()))?;
    let block = if args.create {
        ControlBlock::create(&path)?
    } else {
        ControlBlock::open(&path)?
    };

    let dispatcher = OpcodeDispatcher::from_cfg(&cfg);
    PollLoop::new(block, dispatcher, cfg.poll_interval()).run()
}

fn estimate(cfg: &AppCfg, args: EstimateArgs) -> CardResult<()> {
    let mut dispatcher = OpcodeDispatcher::from_cfg(cfg);
    let req = EstimateRequest::new(
        args.namespace,
        args.entity,
        args.filter,
        args.order,
        args.input_count,
    );
    let estimate = dispatcher.predictor_mut().estimate(&req);
    println!("{}", estimate.value);
    if let EstimateSource::Passthrough { reason } = &estimate.source {
        eprintln!("passthrough: {reason}");
    }
    Ok(())
}
