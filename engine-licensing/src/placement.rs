//! Persisting license files on a standalone host or across a cluster.
//!
//! Placement is decided once per call by probing for cluster membership:
//!
//! - **Standalone**: the license bytes are written to a fixed file under the
//!   caller's root directory, replacing any previous license.
//! - **Clustered**: the bytes are stored as a new immutable config named
//!   `com.docker.license-N`, where `N` follows the highest existing version.
//!
//! Neither path reads back or verifies what it wrote. Concurrent placements
//! are not coordinated; in a cluster the store's unique-name rule decides
//! between racing writers, and the loser fails without retrying.

use crate::error::{LicenseError, LicenseResult, PlacementStage};
use crate::version::{VersionedName, next_version};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

/// File name of the standalone license.
pub const LICENSE_FILENAME: &str = "docker.lic";

/// Name prefix of versioned license configs.
pub const LICENSE_NAME_PREFIX: &str = "com.docker.license";

/// Permissions of the standalone license file (owner rw, group/other r).
pub const LICENSE_FILE_MODE: u32 = 0o644;

/// Failure reported by a cluster backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// An object with the requested name already exists.
    #[error("name already in use: {0}")]
    NameConflict(String),

    /// The backend cannot be reached, or this node is not part of a cluster.
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// The backend refused the request.
    #[error("request rejected: {0}")]
    Rejected(String),
}

/// Answers whether this node can reach a cluster control plane.
pub trait ClusterProbe {
    /// Succeeds only if cluster nodes can be listed.
    fn probe(&self) -> Result<(), BackendError>;
}

/// A cluster-wide store of named, immutable configs.
pub trait ConfigStore {
    /// Lists the names of configs whose name starts with `prefix`.
    fn list_names(&self, prefix: &str) -> Result<Vec<String>, BackendError>;

    /// Creates a config, failing with [`BackendError::NameConflict`] if the
    /// name is taken.
    fn create(&self, artifact: &LicenseArtifact) -> Result<(), BackendError>;
}

/// A license config as submitted to a [`ConfigStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LicenseArtifact {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub data: Vec<u8>,
}

/// Placement settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlacementConfig {
    /// File name of the standalone license under the root directory.
    pub license_filename: String,
    /// Prefix of versioned cluster config names.
    pub name_prefix: String,
    /// Labels attached to every cluster config.
    pub labels: BTreeMap<String, String>,
    /// Unix permission bits of the standalone license file.
    pub file_mode: u32,
}

impl Default for PlacementConfig {
    fn default() -> Self {
        let labels = [
            ("com.docker.ucp.access.label", "/"),
            ("com.docker.ucp.collection", "swarm"),
            ("com.docker.ucp.collection.root", "true"),
            ("com.docker.ucp.collection.swarm", "true"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            license_filename: LICENSE_FILENAME.to_string(),
            name_prefix: LICENSE_NAME_PREFIX.to_string(),
            labels,
            file_mode: LICENSE_FILE_MODE,
        }
    }
}

/// Where a license ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    /// Written to a file on this host.
    HostFile { path: PathBuf },
    /// Stored as a versioned cluster config.
    ClusterConfig { name: VersionedName },
}

/// A destination for license bytes.
pub trait LicenseSink {
    /// Persists `license` verbatim.
    fn store(&self, license: &[u8]) -> LicenseResult<Placement>;
}

/// Writes the license to a single file, overwriting previous content.
#[derive(Debug, Clone)]
pub struct HostFileSink {
    path: PathBuf,
    mode: u32,
}

impl HostFileSink {
    /// Targets `config.license_filename` under `root_dir`.
    #[must_use]
    pub fn new(root_dir: &Path, config: &PlacementConfig) -> Self {
        Self {
            path: root_dir.join(&config.license_filename),
            mode: config.file_mode,
        }
    }

    /// Returns the target file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl LicenseSink for HostFileSink {
    fn store(&self, license: &[u8]) -> LicenseResult<Placement> {
        write_license_file(&self.path, license, self.mode).map_err(|e| {
            LicenseError::distribution(
                PlacementStage::WriteFile,
                format!("{}: {e}", self.path.display()),
            )
        })?;
        info!(path = %self.path.display(), size_bytes = license.len(), "License written to host");
        Ok(Placement::HostFile {
            path: self.path.clone(),
        })
    }
}

#[cfg(unix)]
fn write_license_file(path: &Path, data: &[u8], mode: u32) -> std::io::Result<()> {
    use std::fs::{OpenOptions, Permissions};
    use std::io::Write;
    use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(mode)
        .open(path)?;
    file.write_all(data)?;
    // mode() only applies on creation
    file.set_permissions(Permissions::from_mode(mode))?;
    Ok(())
}

#[cfg(not(unix))]
fn write_license_file(path: &Path, data: &[u8], _mode: u32) -> std::io::Result<()> {
    std::fs::write(path, data)
}

/// Stores the license as the next versioned config in a cluster store.
pub struct ClusterConfigSink<'a, S: ?Sized> {
    store: &'a S,
    prefix: String,
    labels: BTreeMap<String, String>,
}

impl<'a, S: ConfigStore + ?Sized> ClusterConfigSink<'a, S> {
    #[must_use]
    pub fn new(store: &'a S, config: &PlacementConfig) -> Self {
        Self {
            store,
            prefix: config.name_prefix.clone(),
            labels: config.labels.clone(),
        }
    }

    fn next_name(&self) -> LicenseResult<VersionedName> {
        let existing = self.store.list_names(&self.prefix).map_err(|e| {
            LicenseError::distribution(
                PlacementStage::ListVersions,
                format!("unable to list existing configs: {e}"),
            )
        })?;
        let version = next_version(&existing, &self.prefix);
        debug!(
            prefix = %self.prefix,
            existing = existing.len(),
            version,
            "Resolved next license version"
        );
        Ok(VersionedName::new(self.prefix.as_str(), version))
    }

    fn create(&self, name: &VersionedName, license: &[u8]) -> Result<(), BackendError> {
        self.store.create(&LicenseArtifact {
            name: name.to_string(),
            labels: self.labels.clone(),
            data: license.to_vec(),
        })
    }
}

impl<S: ConfigStore + ?Sized> LicenseSink for ClusterConfigSink<'_, S> {
    fn store(&self, license: &[u8]) -> LicenseResult<Placement> {
        let name = self.next_name()?;
        self.create(&name, license).map_err(|e| {
            if let BackendError::NameConflict(_) = &e {
                warn!(name = %name, "License config name taken by a concurrent writer");
            }
            LicenseError::distribution(
                PlacementStage::CreateArtifact,
                format!("failed to create license {name}: {e}"),
            )
        })?;
        info!(name = %name, size_bytes = license.len(), "License stored as cluster config");
        Ok(Placement::ClusterConfig { name })
    }
}

/// Chooses a [`LicenseSink`] from cluster membership and stores licenses.
#[derive(Debug, Clone, Default)]
pub struct Distributor {
    config: PlacementConfig,
}

impl Distributor {
    #[must_use]
    pub fn new(config: PlacementConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &PlacementConfig {
        &self.config
    }

    /// Probes once and returns the sink for this node's mode.
    pub fn select_sink<'a, P, S>(
        &self,
        probe: &P,
        store: &'a S,
        root_dir: &Path,
    ) -> Box<dyn LicenseSink + 'a>
    where
        P: ClusterProbe + ?Sized,
        S: ConfigStore + ?Sized,
    {
        match probe.probe() {
            Ok(()) => {
                debug!("Cluster detected, placing license as versioned config");
                Box::new(ClusterConfigSink::new(store, &self.config))
            }
            Err(e) => {
                debug!(reason = %e, "No cluster available, placing license on host");
                Box::new(HostFileSink::new(root_dir, &self.config))
            }
        }
    }

    /// Stores raw license bytes on this host or in the cluster.
    ///
    /// # Errors
    ///
    /// Returns [`LicenseError::DistributionFailed`] if listing, creating or
    /// writing fails.
    pub fn place<P, S>(
        &self,
        license: &[u8],
        probe: &P,
        store: &S,
        root_dir: &Path,
    ) -> LicenseResult<Placement>
    where
        P: ClusterProbe + ?Sized,
        S: ConfigStore + ?Sized,
    {
        self.select_sink(probe, store, root_dir).store(license)
    }
}

/// Stores raw license bytes with the default [`PlacementConfig`].
pub fn place<P, S>(
    license: &[u8],
    probe: &P,
    store: &S,
    root_dir: &Path,
) -> LicenseResult<Placement>
where
    P: ClusterProbe + ?Sized,
    S: ConfigStore + ?Sized,
{
    Distributor::default().place(license, probe, store, root_dir)
}
