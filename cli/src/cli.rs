use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "lotto", version, about = "Operator CLI for the Lazy Superheroes lottery contracts")]
pub struct Cli {
    /// Emit one JSON object (with a top-level `success` flag) instead of
    /// human-readable output.
    #[arg(long, global = true)]
    pub json: bool,
    /// Answer yes to every confirmation prompt.
    #[arg(long, global = true)]
    pub yes: bool,
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone, Default)]
pub struct MultiSigOpts {
    /// Route the call through the multi-sig coordinator.
    #[arg(long)]
    pub multisig: bool,
    #[arg(long, value_parser = ["interactive", "offline"], default_value = "interactive")]
    pub workflow: String,
    /// Offline workflow: freeze, write the artifact, and stop.
    #[arg(long)]
    pub export_only: bool,
    /// Artifact file the offline workflow writes.
    #[arg(long, default_value = "multisig-artifact.json")]
    pub artifact: PathBuf,
    /// Signer files to merge before submitting.
    #[arg(long, value_delimiter = ',')]
    pub signatures: Vec<PathBuf>,
    /// Distinct signers required.
    #[arg(long, default_value_t = 2)]
    pub threshold: usize,
    /// Labels for the interactive signers, parallel to --keyfiles.
    #[arg(long, value_delimiter = ',')]
    pub signers: Vec<String>,
    /// Files each holding one ED25519 seed in hex.
    #[arg(long, value_delimiter = ',')]
    pub keyfiles: Vec<PathBuf>,
    /// Print a walkthrough of the multi-sig workflows and exit.
    #[arg(long)]
    pub multisig_help: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Contract configuration snapshot
    Info,
    /// List every pool with status, win rate and entry fee
    Pools,
    /// Single-pool detail including the prize manifest
    Pool { pool_id: u64 },
    /// Pending entries and prizes per pool (defaults to the operator)
    User { account: Option<String> },
    /// Purchase entries, reconciling the fee-token allowance first
    Buy { pool_id: u64, count: u64 },
    /// Roll entries; rolls everything pending when no count is given
    Roll { pool_id: u64, count: Option<u64> },
    /// Claim all pending prizes across pools
    Claim,
    /// Liveness and configuration snapshot across every configured contract
    Health,
    /// Decoded event log for one contract
    /// (lotto|storage|gas-station|trade-lotto|delegate-registry)
    Events { contract: String },
    /// Admin setters, multi-sig capable
    Admin {
        #[command(subcommand)]
        action: AdminAction,
        #[command(flatten)]
        multisig: MultiSigOpts,
    },
    /// Sign an exported multi-sig artifact and write a signer file
    SignArtifact {
        file: PathBuf,
        /// Signer label recorded in the signature entry.
        #[arg(long, default_value = "operator")]
        label: String,
        /// Sign with this key file instead of PRIVATE_KEY.
        #[arg(long)]
        keyfile: Option<PathBuf>,
    },
    /// Merge signer files into an artifact and submit
    SubmitArtifact {
        file: PathBuf,
        #[arg(long, value_delimiter = ',')]
        signatures: Vec<PathBuf>,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum AdminAction {
    Pause,
    Unpause,
    SetBurn { percent: u64 },
}
