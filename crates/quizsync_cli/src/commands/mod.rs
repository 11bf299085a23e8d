//! CLI command implementations.

pub mod full;
pub mod status;
pub mod sync;

use quizsync_engine::{CatalogLookup, SyncConfig, SyncEngine};
use quizsync_store::{
    FileKeyValue, FileRemoteStore, KeyValueBackend, KeyValueLocalStore, RemoteConfig,
};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// Local key holding the remembered device ID.
const DEVICE_ID_KEY: &str = "device_id";

/// Engine over the file-backed stores.
pub type CliEngine = SyncEngine<KeyValueLocalStore<FileKeyValue>, FileRemoteStore, CatalogLookup>;

/// Everything a command needs.
pub struct Context {
    /// The engine.
    pub engine: CliEngine,
    /// The question catalog shared with the engine.
    pub catalog: Arc<CatalogLookup>,
}

impl Context {
    /// Opens the stores and builds the engine.
    pub fn open(
        local_path: &Path,
        remote_path: &Path,
        catalog_path: Option<&Path>,
        user: Option<&str>,
        device: Option<&str>,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let backend = FileKeyValue::open_with_create_dirs(local_path)?;
        let device_id = resolve_device_id(&backend, device)?;

        let remote = FileRemoteStore::open(remote_path, RemoteConfig::default())?;
        if let Some(user) = user {
            remote.sign_in(user)?;
            info!(user, "signed in");
        }

        let catalog = match catalog_path {
            Some(path) => {
                let catalog = CatalogLookup::from_json_file(path)
                    .map_err(|e| format!("Cannot load catalog {}: {e}", path.display()))?;
                debug!(questions = catalog.len(), "catalog loaded");
                catalog
            }
            None => CatalogLookup::new(),
        };
        let catalog = Arc::new(catalog);

        let engine = SyncEngine::new(
            SyncConfig::new(device_id),
            Arc::new(KeyValueLocalStore::new(backend)),
            Arc::new(remote),
            catalog.clone(),
        );
        Ok(Self { engine, catalog })
    }
}

/// Returns the explicit device ID, or the remembered one, generating and
/// remembering a new one on first use.
fn resolve_device_id(
    backend: &FileKeyValue,
    explicit: Option<&str>,
) -> Result<String, Box<dyn std::error::Error>> {
    if let Some(device) = explicit {
        return Ok(device.to_string());
    }
    if let Some(device) = backend.get(DEVICE_ID_KEY)? {
        return Ok(device);
    }
    let device = Uuid::new_v4().to_string();
    backend.set(DEVICE_ID_KEY, device.clone())?;
    info!(device_id = %device, "generated device id");
    Ok(device)
}
