//! Persistence of fitted estimators.

extern crate nalgebra as na;

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::{
    error::{Result, SparseLmError},
    model::{FittedModel, ParamValue, Regressor},
};

pub(crate) const BINCODE_CONFIG: bincode::config::Configuration = bincode::config::standard()
    .with_little_endian()
    .with_variable_int_encoding();

/// A fitted estimator as it is written to a store: its name, its
/// hyperparameters and its fitted state. Step timings are not persisted.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredModel {
    pub name: String,
    pub params: BTreeMap<String, ParamValue>,
    pub fitted: FittedModel,
}

impl StoredModel {
    pub fn from_regressor(model: &dyn Regressor) -> Result<Self> {
        let fitted = model
            .fitted()
            .ok_or_else(|| SparseLmError::NotFitted(model.name().to_string()))?;
        Ok(StoredModel {
            name: model.name().to_string(),
            params: model.get_params(),
            fitted: fitted.clone(),
        })
    }

    pub fn predict(&self, x: &na::DMatrix<f64>) -> Result<na::DVector<f64>> {
        self.fitted.predict(x)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serde::encode_to_vec(self, BINCODE_CONFIG)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let (value, _): (StoredModel, _) = bincode::serde::decode_from_slice(bytes, BINCODE_CONFIG)?;
        Ok(value)
    }
}

/// A keyed store of fitted models.
pub trait ModelStore: Send + Sync {
    fn save(&self, id: &str, model: &StoredModel) -> Result<()>;
    fn load(&self, id: &str) -> Result<StoredModel>;
    fn delete(&self, id: &str) -> Result<()>;
    fn contains(&self, id: &str) -> Result<bool>;
}

/// Stores models in memory. Values are cloned when read.
#[derive(Debug, Default)]
pub struct MemoryModelStore {
    models: RwLock<HashMap<String, StoredModel>>,
}

impl MemoryModelStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<E>(_: E) -> SparseLmError {
    SparseLmError::InvalidData("model store lock poisoned".to_string())
}

impl ModelStore for MemoryModelStore {
    fn save(&self, id: &str, model: &StoredModel) -> Result<()> {
        self.models
            .write()
            .map_err(poisoned)?
            .insert(id.to_string(), model.clone());
        Ok(())
    }

    fn load(&self, id: &str) -> Result<StoredModel> {
        self.models
            .read()
            .map_err(poisoned)?
            .get(id)
            .cloned()
            .ok_or_else(|| SparseLmError::ModelNotFound(id.to_string()))
    }

    fn delete(&self, id: &str) -> Result<()> {
        self.models
            .write()
            .map_err(poisoned)?
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| SparseLmError::ModelNotFound(id.to_string()))
    }

    fn contains(&self, id: &str) -> Result<bool> {
        Ok(self.models.read().map_err(poisoned)?.contains_key(id))
    }
}

/// Stores models as bincode files named `<root>/<prefix><id>.bin`.
///
/// # Example
///
/// ```rust
/// # use sparselm_core::storage::LocalModelStore;
/// # use std::path::Path;
///
/// let store = LocalModelStore::new(Path::new("/tmp/models"), "exp1_");
/// assert!(store.file_path("lasso").ends_with("exp1_lasso.bin"));
/// ```
#[derive(Clone, Debug)]
pub struct LocalModelStore {
    root: PathBuf,
    prefix: String,
}

impl LocalModelStore {
    pub fn new(root: &Path, prefix: &str) -> Self {
        LocalModelStore {
            root: root.to_path_buf(),
            prefix: prefix.to_string(),
        }
    }

    pub fn file_path(&self, id: &str) -> PathBuf {
        self.root.join(format!("{}{}.bin", self.prefix, id))
    }
}

impl ModelStore for LocalModelStore {
    fn save(&self, id: &str, model: &StoredModel) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        let path = self.file_path(id);
        std::fs::write(&path, model.to_bytes()?)?;
        tracing::debug!("saved model {} to {}", id, path.display());
        Ok(())
    }

    fn load(&self, id: &str) -> Result<StoredModel> {
        let path = self.file_path(id);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SparseLmError::ModelNotFound(id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        StoredModel::from_bytes(&bytes)
    }

    fn delete(&self, id: &str) -> Result<()> {
        match std::fs::remove_file(self.file_path(id)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(SparseLmError::ModelNotFound(id.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    fn contains(&self, id: &str) -> Result<bool> {
        Ok(self.file_path(id).try_exists()?)
    }
}
