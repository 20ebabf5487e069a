use axum::extract::FromRef;
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::{
    config::Config,
    repository::{TaskRepository, UserRepository},
};

#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(pool: SqlitePool, config: Config) -> Self {
        Self {
            pool,
            config: Arc::new(config),
        }
    }
}

impl FromRef<AppState> for Arc<Config> {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}

impl FromRef<AppState> for TaskRepository {
    fn from_ref(state: &AppState) -> Self {
        TaskRepository::new(state.pool.clone())
    }
}

impl FromRef<AppState> for UserRepository {
    fn from_ref(state: &AppState) -> Self {
        UserRepository::new(state.pool.clone())
    }
}
