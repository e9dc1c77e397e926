//! Core module - shared infrastructure for webpilot
//!
//! This module contains foundational types, configuration, and error handling
//! used throughout the application.

pub mod config;
pub mod error;
pub mod task;
pub mod types;

pub use config::Config;
pub use error::{PilotError, Result};
pub use task::{load_tasks, Task};
pub use types::*;
