use crate::{
    config::Config,
    database::Database,
    errors::Result,
    services::UploadStore,
    storage::create_storage,
};
use std::sync::Arc;

pub mod auth;
pub mod files;
pub mod health;
pub mod user;

#[derive(Clone)]
pub struct AppState {
    pub database: Database,
    pub store: Arc<UploadStore>,
    pub config: Config,
}

impl AppState {
    /// Wires the configured storage backend and the upload store.
    pub fn new(database: Database, config: Config) -> Result<Self> {
        let storage = create_storage(&config.storage)?;
        let store = UploadStore::new(database.clone(), storage, config.store.clone())?;

        Ok(Self {
            database,
            store: Arc::new(store),
            config,
        })
    }
}
