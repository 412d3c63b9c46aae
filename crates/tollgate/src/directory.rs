//! Member cluster directory.
//!
//! Resolves the placement hint stored on an approved signup to the URLs a
//! provisioned user is sent to. The first configured cluster receives every
//! approval that does not name one.

use tollgate_config::MemberCluster;

/// Routes placement hints to member clusters.
///
/// Created once at startup from configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterDirectory {
    clusters: Vec<MemberCluster>,
}

impl ClusterDirectory {
    pub fn new(clusters: Vec<MemberCluster>) -> Self {
        Self { clusters }
    }

    /// The cluster approvals land on when none is named.
    pub fn default_cluster(&self) -> Option<&MemberCluster> {
        self.clusters.first()
    }

    /// Returns the cluster with the given name.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::ClusterNotFound`] if no cluster of that name
    /// is configured.
    pub fn cluster(&self, name: &str) -> Result<&MemberCluster, DirectoryError> {
        self.clusters
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| DirectoryError::ClusterNotFound(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.clusters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clusters.is_empty()
    }
}

/// Errors that can occur during directory lookups.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("cluster not found: {0}")]
    ClusterNotFound(String),
}
