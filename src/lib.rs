pub mod cli;
pub mod error;
pub mod guard;
pub mod pipeline;
pub mod roadmap;
pub mod state;

pub use error::{GearError, Result};
