//! State shared across admin handlers.

use std::sync::Arc;

use crate::runner::AppRunner;

#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<AppRunner>,
}

impl AppState {
    pub fn new(runner: Arc<AppRunner>) -> Self {
        Self { runner }
    }
}
