pub mod executor;
pub mod symlinks;

pub use executor::{
    run_phase, HookContext, HookPhase, HookResult, HookStatus, PhaseOutcome, PhaseReport,
};
pub use symlinks::link_shared_files;
