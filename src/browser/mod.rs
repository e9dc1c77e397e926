//! Browser automation module
//!
//! Defines the driver boundary and wraps agent-browser CLI for web automation.

mod driver;
mod executor;
mod snapshot;

pub use driver::{ActionOutcome, BrowserDriver, PageElement, PageView, Snapshot};
pub use executor::AgentBrowserDriver;
pub use snapshot::{ref_for, ref_index, RawSnapshot};
