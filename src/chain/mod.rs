//! Chain orchestration: company configuration, plan compilation and the run
//! lifecycle.

pub mod config;
pub mod improve;
pub mod plan;
pub mod runner;

pub use config::{ChainConfig, ChainStep, CompanyConfig, CompanySource, PhaseConfigEntry};
pub use crate::phase::PhaseInvocation;
pub use improve::self_task_improve;
pub use plan::ChainPlan;
pub use runner::{ChatChain, RunOptions, relocate_log};
