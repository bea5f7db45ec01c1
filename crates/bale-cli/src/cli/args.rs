use std::path::PathBuf;

use bale_core::SecurityPolicy;
use clap::{Args, Parser, Subcommand};

use super::commands::cert::CertCmd;

#[derive(Parser, Debug)]
#[command(
    name = "bale",
    version,
    about = "Build, sign and verify deterministic package archives"
)]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build a .bale archive from one or more spec files
    Build(BuildArgs),
    /// Verify an archive against the trust store
    Verify(VerifyArgs),
    /// Manage signing certificates and the trust store
    Cert(CertArgs),
    /// Print the bale version
    Version,
}

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Spec files; the .balespec extension may be omitted
    #[arg(required = true, value_name = "SPEC")]
    pub specs: Vec<PathBuf>,

    /// Directory the archive is written to [env: BALE_OUTPUT_DIR] [default: .]
    #[arg(long, short = 'o')]
    pub output_dir: Option<PathBuf>,

    /// Overwrite an existing archive
    #[arg(long, short)]
    pub force: bool,

    /// Print one JSON build report per spec instead of the summary
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Archive to verify
    pub archive: PathBuf,

    /// Security policy: no, almost-no, low, medium or high
    /// [env: BALE_SECURITY_POLICY] [default: high]
    #[arg(long, short)]
    pub policy: Option<SecurityPolicy>,

    /// Trust store directory [env: BALE_TRUST_DIR] [default: ~/.bale/trust]
    #[arg(long)]
    pub trust_dir: Option<PathBuf>,

    /// Print the verification report as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct CertArgs {
    #[command(subcommand)]
    pub cmd: CertCmd,

    /// Trust store directory [env: BALE_TRUST_DIR] [default: ~/.bale/trust]
    #[arg(long, global = true)]
    pub trust_dir: Option<PathBuf>,
}
