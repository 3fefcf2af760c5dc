pub mod canonical;
pub mod config;
pub mod connection;
pub mod error;
pub mod event;
pub mod fsm;
pub mod handlers;
pub mod listener;
pub mod reactor;
pub mod scheduling;
pub mod state_machine;
pub mod states;

#[cfg(test)]
mod testing;

pub use config::Config;
pub use error::{Error, Result};
pub use fsm::{NextStep, PhaseDecision};
pub use listener::{run_main_listener, serve};
pub use state_machine::{finalize_request, PhaseEngine, PipelineDriver};
