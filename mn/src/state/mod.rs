//! Snapshot engine and crash recovery

mod engine;
mod recovery;

pub use engine::StateEngine;
pub use recovery::{
    RecoveryOptions, RecoveryResult, check_needs_recovery, cleanup_orphans, find_recovery_point, recover,
    recover_project,
};
