pub mod engine;
pub mod hop;

pub use engine::*;
pub use hop::*;
