//! Application state management
//!
//! Contains shared state accessible across all handlers.

use crate::config::Settings;
use crate::coordinator::SchemaCoordinator;
use crate::source::PostgresSource;
use std::sync::Arc;

/// Application state shared across all handlers
pub struct AppState {
    /// Snapshot pair, cached diagram and highlight windows
    pub coordinator: SchemaCoordinator,

    /// Introspection source; `None` runs the service in push-only mode
    pub source: Option<PostgresSource>,
}

impl AppState {
    pub fn new(settings: &Settings, source: Option<PostgresSource>) -> Self {
        Self {
            coordinator: SchemaCoordinator::new(settings.layout.clone(), settings.highlight.duration),
            source,
        }
    }
}

/// Type alias for shared state
pub type SharedState = Arc<AppState>;
