//! Shared process state handed to every route handler.

use std::sync::Arc;

use flowrunner_manager::ExecutionManager;

#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<ExecutionManager>,
}
