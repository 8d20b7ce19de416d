pub mod commands;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

use std::path::Path;

use tracing::info;

use crate::commands::AppState;
use crate::error::AppResult;

const DATABASE_FILE: &str = "dayweave.sqlite";
const LOG_DIR: &str = "logs";

/// Initialise logging and storage under `data_dir` and wire the
/// production collaborators.
pub fn bootstrap(data_dir: &Path) -> AppResult<AppState> {
    std::fs::create_dir_all(data_dir)?;
    crate::utils::logger::init_logging(&data_dir.join(LOG_DIR))?;

    let pool = crate::db::DbPool::new(data_dir.join(DATABASE_FILE))?;
    let state = AppState::new(pool)?;

    info!(target: "app::bootstrap", data_dir = %data_dir.display(), "dayweave core ready");
    Ok(state)
}
