//! Compute module - Sowing, pollination and propagation for paddy field runs.

mod objectives;
mod pollination;
mod propagation;
mod rng;
mod runner;
mod sowing;

pub use pollination::*;
pub use propagation::*;
pub use rng::*;
pub use runner::*;
pub use sowing::*;
