//! Schema module - Configuration, parameter and ledger types for paddy runs.

mod config;
mod ledger;
mod parameter;
mod report;
mod seed;

pub use config::*;
pub use ledger::*;
pub use parameter::*;
pub use report::*;
pub use seed::*;
