pub mod cmd;
pub mod config;
pub mod db;
pub mod devices;
mod error;
pub mod library;
pub mod paths;
pub mod queue;
pub mod source;
pub mod timecode;
pub mod tools;
pub mod ytdlp;

pub use error::{EngineError, Result};
