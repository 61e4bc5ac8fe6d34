//! Pool membership supplied to the exporter.
//!
//! Pools are read from a definitions file (YAML, JSON or TOML, chosen by
//! extension). Pods reference containers by id and both are resolved to
//! display names through lookup tables, the same way a pool policy resolves
//! them through its pod/container cache:
//!
//! ```yaml
//! pools:
//!   - name: "shared[0]"
//!     def_name: shared
//!     cpus: "0-3"
//!     mems: "0"
//!     pods:
//!       pod-uid-a: [ctr-1, ctr-2]
//! pods:
//!   - id: pod-uid-a
//!     name: web-0
//! containers:
//!   - id: ctr-1
//!     name: web-0/nginx
//! ```

use ahash::AHashMap as HashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

use crate::pool::PoolDescriptor;

/// Errors while loading pool definitions.
#[derive(Error, Debug)]
pub enum PoolSourceError {
    #[error("failed to read pool definitions {path}: {error}")]
    Read {
        path: PathBuf,
        #[source]
        error: io::Error,
    },

    #[error("failed to parse pool definitions {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("pool '{0}' is defined more than once")]
    DuplicatePool(String),
}

/// Supplies the current pool table for one collection pass.
pub trait PoolSource: Send + Sync {
    fn pools(&self) -> Result<BTreeMap<String, PoolDescriptor>, PoolSourceError>;
}

/// A fixed pool table.
impl PoolSource for BTreeMap<String, PoolDescriptor> {
    fn pools(&self) -> Result<BTreeMap<String, PoolDescriptor>, PoolSourceError> {
        Ok(self.clone())
    }
}

/// One pool definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolDefinition {
    /// Pretty name of the pool instance, e.g. `shared[0]`.
    pub name: String,
    /// Name of the pool definition the instance was created from.
    #[serde(default, alias = "def-name")]
    pub def_name: Option<String>,
    #[serde(default)]
    pub cpus: String,
    #[serde(default)]
    pub mems: String,
    /// Pod id -> container ids.
    #[serde(default)]
    pub pods: BTreeMap<String, Vec<String>>,
}

/// Pod id to name mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PodEntry {
    pub id: String,
    pub name: String,
}

/// Container id to name mapping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerEntry {
    pub id: String,
    pub name: String,
}

/// Root of a pool definitions file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoolDefinitions {
    #[serde(default)]
    pub pools: Vec<PoolDefinition>,
    #[serde(default)]
    pub pods: Vec<PodEntry>,
    #[serde(default)]
    pub containers: Vec<ContainerEntry>,
}

impl PoolDefinitions {
    /// Resolves the definitions into descriptors keyed by pool name.
    ///
    /// Pods are visited in id order. For each pod the names of its known
    /// containers are appended, then the pod's own name; unknown ids are
    /// skipped. Names are joined with `,`.
    pub fn resolve(&self) -> Result<BTreeMap<String, PoolDescriptor>, PoolSourceError> {
        let pod_names: HashMap<&str, &str> = self
            .pods
            .iter()
            .map(|p| (p.id.as_str(), p.name.as_str()))
            .collect();
        let container_names: HashMap<&str, &str> = self
            .containers
            .iter()
            .map(|c| (c.id.as_str(), c.name.as_str()))
            .collect();

        let mut out = BTreeMap::new();
        for def in &self.pools {
            let mut pods = Vec::new();
            let mut containers = Vec::new();
            for (pod_id, container_ids) in &def.pods {
                for container_id in container_ids {
                    match container_names.get(container_id.as_str()) {
                        Some(name) => containers.push(*name),
                        None => debug!("Pool {}: unknown container {}", def.name, container_id),
                    }
                }
                match pod_names.get(pod_id.as_str()) {
                    Some(name) => pods.push(*name),
                    None => debug!("Pool {}: unknown pod {}", def.name, pod_id),
                }
            }

            let descriptor = PoolDescriptor {
                pool_name: def.name.clone(),
                definition_name: def.def_name.clone().unwrap_or_else(|| definition_of(&def.name)),
                processor_set: def.cpus.clone(),
                memory_set: def.mems.clone(),
                container_names: containers.join(","),
                pod_names: pods.join(","),
            };

            if out.insert(def.name.clone(), descriptor).is_some() {
                return Err(PoolSourceError::DuplicatePool(def.name.clone()));
            }
        }

        Ok(out)
    }
}

/// `shared[0]` -> `shared`.
fn definition_of(pool_name: &str) -> String {
    pool_name
        .split_once('[')
        .map(|(def, _)| def)
        .unwrap_or(pool_name)
        .to_string()
}

/// Parses pool definitions, picking the format from the file extension.
pub fn parse_pool_definitions(path: &Path, content: &str) -> Result<PoolDefinitions, PoolSourceError> {
    let parse_err = |message: String| PoolSourceError::Parse {
        path: path.to_path_buf(),
        message,
    };

    match path.extension().and_then(|s| s.to_str()) {
        Some("json") => serde_json::from_str(content).map_err(|e| parse_err(e.to_string())),
        Some("toml") => toml::from_str(content).map_err(|e| parse_err(e.to_string())),
        _ => serde_yaml::from_str(content).map_err(|e| parse_err(e.to_string())),
    }
}

/// Pool source backed by a definitions file, re-read on every pass.
#[derive(Debug, Clone)]
pub struct PoolFile {
    path: PathBuf,
}

impl PoolFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the raw definitions.
    pub fn load(&self) -> Result<PoolDefinitions, PoolSourceError> {
        let content = fs::read_to_string(&self.path).map_err(|error| PoolSourceError::Read {
            path: self.path.clone(),
            error,
        })?;
        parse_pool_definitions(&self.path, &content)
    }
}

impl PoolSource for PoolFile {
    fn pools(&self) -> Result<BTreeMap<String, PoolDescriptor>, PoolSourceError> {
        let pools = self.load()?.resolve()?;
        debug!("Loaded {} pools from {}", pools.len(), self.path.display());
        Ok(pools)
    }
}
