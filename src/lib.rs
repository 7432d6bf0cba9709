mod client;
mod coordinator;
mod error;
mod logger;
mod protocol;
mod types;

pub use client::DitraClient;
pub use coordinator::{CoordinatorBuilder, CoordinatorState, EnergyCoordinator};
pub use error::{Error, Result};
pub use logger::MessageLogMode;
pub use types::*;
