// Public API - data types, probing, and the trace engine
pub mod cli;
pub mod config;
pub mod error;
pub mod export;
pub mod lookup;
pub mod probe;
pub mod state;
pub mod trace;

pub use error::{TraceError, TraceResult};
