//! Filesystem-backed model store.
//!
//! Layout under `cfg.data_root`:
//!
//! ```text
//! models/<id>.json
//! models/entities/<namespace>/<entity>.json
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::trace;

use crate::common::config::AppCfg;
use crate::common::error::{CardError, CardResult};

use super::domain::ModelStore;

/// Store rooted at `<data_root>/models`.
pub struct FsModelStore {
    root: PathBuf,
}

impl FsModelStore {
    pub fn new(cfg: &AppCfg) -> Self {
        Self::at(cfg.data_root.join("models"))
    }

    /// Store rooted directly at `root`.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn model_path(&self, id: &str) -> Option<PathBuf> {
        safe_component(id).then(|| self.root.join(format!("{id}.json")))
    }

    fn entity_path(&self, namespace: &str, entity: &str) -> Option<PathBuf> {
        (safe_component(namespace) && safe_component(entity)).then(|| {
            self.root
                .join("entities")
                .join(namespace)
                .join(format!("{entity}.json"))
        })
    }

    /// Write artefact bytes for a global model, creating directories as needed.
    pub fn put_model(&self, id: &str, bytes: &[u8]) -> CardResult<()> {
        let path = self
            .model_path(id)
            .ok_or_else(|| CardError::ModelNotFound(id.to_string()))?;
        write_file(&path, bytes)
    }

    /// Write artefact bytes for an entity histogram model.
    pub fn put_entity_model(&self, namespace: &str, entity: &str, bytes: &[u8]) -> CardResult<()> {
        let path = self.entity_path(namespace, entity).ok_or_else(|| {
            CardError::ModelNotFound(format!("{namespace}.{entity}"))
        })?;
        write_file(&path, bytes)
    }
}

impl ModelStore for FsModelStore {
    fn model_bytes(&self, id: &str) -> CardResult<Option<Vec<u8>>> {
        match self.model_path(id) {
            Some(path) => read_optional(&path),
            None => Ok(None),
        }
    }

    fn entity_model_bytes(&self, namespace: &str, entity: &str) -> CardResult<Option<Vec<u8>>> {
        match self.entity_path(namespace, entity) {
            Some(path) => read_optional(&path),
            None => Ok(None),
        }
    }
}

/// Names that stay inside their directory.
fn safe_component(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\', '\0'])
}

fn read_optional(path: &Path) -> CardResult<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => {
            trace!(ev = "model_read", path = %path.display(), len = bytes.len());
            Ok(Some(bytes))
        }
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> CardResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, bytes)?;
    Ok(())
}
