use clap::{Parser, Subcommand};
use std::path::PathBuf;

const VERSION: &str = env!("CARGO_PKG_VERSION");

/// fwts - Git worktree workflow manager
#[derive(Debug, Parser)]
#[command(
    name = "fwts",
    about = "Git worktree workflow manager for feature development",
    version = VERSION,
    help_template = "\
{before-help}{name} {version}
{about-with-newline}
{usage-heading} {usage}

{all-args}{after-help}

EXAMPLES:
    fwts new feature-x            # Create a worktree for branch feature-x
    fwts remove feature-x         # Run cleanup hooks and remove the worktree
    fwts status                   # Reconcile and print all worktrees
    fwts tui                      # Live dashboard
    fwts init                     # Write a starter .fwts.toml in this repo
"
)]
pub struct Cli {
    /// Path to the project config file (default: .fwts.toml found upward from cwd)
    #[arg(long, short = 'c', global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Create a worktree for a branch, run setup hooks and start its session
    New {
        /// Branch to check out (created from the base branch if missing)
        branch: String,
        /// Base branch to create from (default: project base branch)
        #[arg(long, short = 'b')]
        base: Option<String>,
        /// Do not attach to the tmux session after setup
        #[arg(long)]
        no_attach: bool,
    },
    /// Run cleanup hooks, tear down the session and remove a worktree
    #[command(alias = "rm")]
    Remove {
        /// Branch whose worktree should be removed
        branch: String,
        /// Proceed past cleanup hook failures and uncommitted changes
        #[arg(long, short = 'f')]
        force: bool,
        /// Also delete the local branch after removal
        #[arg(long)]
        delete_branch: bool,
    },
    /// Non-interactive list of registered worktrees
    List {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Reconcile the registry with git and print a status table
    Status,
    /// Interactive dashboard over all worktrees
    Tui,
    /// Write a starter config file
    Init {
        /// Write the shared config under the user config dir instead
        #[arg(long)]
        global: bool,
    },
}
