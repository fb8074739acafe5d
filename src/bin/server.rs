//! Speech gateway binary.
//!
//! Usage:
//!   speech-gateway serve --backend-program melo-synth --speakers config.json
//!   speech-gateway serve                     # degraded mode, silent audio only
//!   speech-gateway patch-dict --source <lite>/dicdir --target <full>/dicdir
//!
//! Every `serve` flag also reads an environment variable (see `--help`).
//! Log verbosity follows `RUST_LOG`.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::runtime::Builder;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use speech_gateway::{
    command::CommandBackend,
    config::GatewayConfig,
    dictfix::{self, PatchOutcome},
    scratch, server, BackendState, Gateway, SynthesisBackend,
};

#[derive(Debug, Parser)]
#[command(
    name = "speech-gateway",
    about = "HTTP gateway for a text-to-speech backend",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run the HTTP gateway
    Serve(GatewayConfig),
    /// Fill an empty dictionary data directory from a bundled copy
    PatchDict(PatchDictArgs),
}

#[derive(Debug, Args)]
struct PatchDictArgs {
    /// Bundled ("lite") dictionary directory
    #[arg(long)]
    source: PathBuf,

    /// Dictionary directory the text front-end loads
    #[arg(long)]
    target: PathBuf,

    /// Written to `<target>/../version` when missing
    #[arg(long, default_value = dictfix::DEFAULT_VERSION)]
    version: String,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "speech_gateway=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Command::Serve(config) => serve(config),
        Command::PatchDict(args) => patch_dict(args),
    }
}

fn serve(config: GatewayConfig) -> anyhow::Result<()> {
    let addr = config.bind_addr()?;

    let root = config.scratch_root();
    match scratch::sweep_stale(&root, config.scratch_max_age()) {
        Ok(0) => {}
        Ok(n) => tracing::info!(removed = n, root = %root.display(), "swept stale scratch entries"),
        Err(e) => tracing::warn!(error = %format!("{e:#}"), "scratch sweep failed"),
    }

    // Exactly one load attempt; failure only degrades the service.
    let backend = if config.backend_program.is_some() {
        BackendState::acquire(|| {
            let backend = CommandBackend::from_config(&config)?;
            Ok(Arc::new(backend) as Arc<dyn SynthesisBackend>)
        })
    } else {
        BackendState::skipped("no backend program configured")
    };

    let gateway = Arc::new(Gateway::new(backend, config.gateway_options()));

    let runtime = Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime
        .block_on(server::serve(addr, gateway))
        .context("server terminated unexpectedly")
}

fn patch_dict(args: PatchDictArgs) -> anyhow::Result<()> {
    let outcome = dictfix::patch_dictionary(&args.source, &args.target, &args.version)?;
    let message = match outcome {
        PatchOutcome::Copied => "dictionary copied",
        PatchOutcome::Replaced => "empty dictionary replaced",
        PatchOutcome::AlreadyPresent => {
            "dictionary already present; delete the target directory to force a fresh copy"
        }
    };
    println!("{}: {}", args.target.display(), message);
    Ok(())
}
