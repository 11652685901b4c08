//! The Actor and Sentinel agents

mod actor;
mod sentinel;
mod veto;

pub use actor::{Actor, ActorContext, MAX_ACTOR_ITERATIONS};
pub use sentinel::{Sentinel, SentinelContext, generate_correction_directive, verification_hash};
pub use veto::check_veto_conditions;
