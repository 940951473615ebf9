use clap::Parser;
use clap_complete::Shell;
use clap_verbosity_flag::{Verbosity, WarnLevel};
use hybrid_submit::core::version;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "hsubmit",
    author,
    version = version(),
    about = "Submit GPU jobs to Slurm or Kubernetes under per-team quotas."
)]
pub struct HSubmit {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub verbose: Verbosity<WarnLevel>,

    /// Path to the settings file
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,
}

#[derive(Debug, Parser)]
pub enum Commands {
    /// Validate a job manifest and submit it to the matching backend
    Submit(SubmitArgs),
    /// Show the GPU ceiling that applies to a team
    Quota {
        /// Team name as written in manifests
        team: String,
    },
    /// Print the batch script or Kubernetes manifest a job would produce
    Render {
        /// Path to the job manifest (YAML)
        #[arg(long)]
        config: PathBuf,
    },
    /// Generate tab-completion scripts for your shell
    #[command(arg_required_else_help = true)]
    Completions {
        /// The shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Debug, Parser)]
pub struct SubmitArgs {
    /// Path to the job manifest (YAML)
    #[arg(long)]
    pub config: PathBuf,

    /// Render and report without contacting any backend
    #[arg(long)]
    pub dry_run: bool,
}
