//! Named artifact store shared by every stage.
//!
//! Stages never talk to each other directly: each reads its declared inputs
//! from the store and writes its declared outputs back. `SledStore` keeps
//! artifacts on disk so separate pipeline invocations can build on each
//! other; `MemoryStore` lives for one process.

pub mod artifact;

use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

pub use artifact::{Artifact, FromArtifact};

use crate::error::{PipelineError, Result};

#[cfg_attr(test, mockall::automock)]
pub trait ArtifactStore: Send {
    fn get(&self, name: &str) -> Result<Option<Artifact>>;

    /// Insert or replace
    fn put(&mut self, name: &str, artifact: Artifact) -> Result<()>;

    fn contains(&self, name: &str) -> Result<bool>;

    fn names(&self) -> Result<Vec<String>>;
}

/// Typed helpers available on every store.
pub trait StoreExt {
    fn require(&self, name: &str) -> Result<Artifact>;

    fn load<T: FromArtifact>(&self, name: &str) -> Result<T>;

    fn save<T: Into<Artifact>>(&mut self, name: &str, value: T) -> Result<()>;
}

impl<S: ArtifactStore + ?Sized> StoreExt for S {
    fn require(&self, name: &str) -> Result<Artifact> {
        self.get(name)?
            .ok_or_else(|| PipelineError::MissingArtifact(name.to_string()))
    }

    fn load<T: FromArtifact>(&self, name: &str) -> Result<T> {
        T::from_artifact(name, self.require(name)?)
    }

    fn save<T: Into<Artifact>>(&mut self, name: &str, value: T) -> Result<()> {
        self.put(name, value.into())
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    artifacts: BTreeMap<String, Artifact>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArtifactStore for MemoryStore {
    fn get(&self, name: &str) -> Result<Option<Artifact>> {
        Ok(self.artifacts.get(name).cloned())
    }

    fn put(&mut self, name: &str, artifact: Artifact) -> Result<()> {
        self.artifacts.insert(name.to_string(), artifact);
        Ok(())
    }

    fn contains(&self, name: &str) -> Result<bool> {
        Ok(self.artifacts.contains_key(name))
    }

    fn names(&self) -> Result<Vec<String>> {
        Ok(self.artifacts.keys().cloned().collect())
    }
}

/// On-disk store; values are JSON and every put is flushed.
pub struct SledStore {
    db: sled::Db,
}

impl SledStore {
    pub fn open(path: &Path) -> Result<Self> {
        let db = sled::open(path)?;
        info!("Artifact store opened at {} ({} artifacts)", path.display(), db.len());
        Ok(Self { db })
    }
}

impl ArtifactStore for SledStore {
    fn get(&self, name: &str) -> Result<Option<Artifact>> {
        match self.db.get(name)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put(&mut self, name: &str, artifact: Artifact) -> Result<()> {
        let bytes = serde_json::to_vec(&artifact)?;
        debug!("Storing artifact '{}' ({}, {} bytes)", name, artifact.kind(), bytes.len());
        self.db.insert(name, bytes)?;
        self.db.flush()?;
        Ok(())
    }

    fn contains(&self, name: &str) -> Result<bool> {
        Ok(self.db.contains_key(name)?)
    }

    fn names(&self) -> Result<Vec<String>> {
        self.db
            .iter()
            .keys()
            .map(|key| Ok(String::from_utf8_lossy(&key?).into_owned()))
            .collect()
    }
}
