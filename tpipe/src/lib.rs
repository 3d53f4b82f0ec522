pub mod errors;
pub mod launcher;
pub mod logging;
pub mod parser;
pub mod pipeline;
pub mod pipes;
pub mod resolve;
pub mod signals;
pub mod timekeeper;
pub mod types;

pub use pipeline::{Outcome, Pipeline};
