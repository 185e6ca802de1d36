pub mod ledger;
pub mod migrations;
pub mod models;
pub mod store;

pub use store::LedgerStore;

use anyhow::Result;
use std::path::Path;

pub fn open_store(data_file: &str) -> Result<LedgerStore> {
    let path = Path::new(data_file);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    Ok(LedgerStore::new(path))
}
