//! Helpers for testing boundaries and coordinators.
//!
//! When writing tests, keep the following points in mind:
//!
//!  - In every test, call [`setup`]. This will set up the logger so that all
//!    console output is captured by the test runner.
//!
//!  - Prefer `#[tokio::test(start_paused = true)]` and drive timer-based
//!    producers with `tokio::time::sleep` checkpoints; paused time advances
//!    deterministically to the next due timer once all tasks are idle.

use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::fmt;

/// Setup the test environment.
///
///  - Initializes logs: The logger only captures logs from the `pagelet`
///    crates and mutes everything else.
pub fn setup() {
    fmt()
        .with_env_filter(EnvFilter::new("pagelet=trace,pagelet_cache=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

/// A concrete view for integration tests: named panels in one of the three
/// user-visible states, or a whole page of them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Panel {
    /// The section's placeholder is showing.
    Loading(String),
    /// The section rendered its value.
    Ready(String, String),
    /// The section rendered its error fallback.
    Failed(String, String),
    /// The assembled page.
    Page(Vec<Panel>),
}

impl Panel {
    pub fn loading(section: &str) -> Self {
        Panel::Loading(section.to_owned())
    }

    pub fn ready(section: &str, content: impl Into<String>) -> Self {
        Panel::Ready(section.to_owned(), content.into())
    }

    pub fn failed(section: &str, error: impl Into<String>) -> Self {
        Panel::Failed(section.to_owned(), error.into())
    }
}
