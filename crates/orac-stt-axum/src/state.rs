//! Shared application state type.

use std::sync::Arc;

use crate::bootstrap::AppContext;

/// Application state shared across all handlers: an Arc-wrapped
/// [`AppContext`] built once by the composition root.
pub type AppState = Arc<AppContext>;
