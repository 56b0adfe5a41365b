//! One client per backend cluster, fixed for the life of the process
use kube::Client;
use mck_core::SEPARATOR;
use std::{collections::HashMap, sync::Arc};
use thiserror::Error;

/// Reasons a set of clusters cannot form a registry
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// No clusters were configured
    #[error("at least one cluster must be configured")]
    Empty,

    /// Two entries share a name
    #[error("cluster {0:?} is configured twice")]
    Duplicate(String),

    /// A name is empty or contains the identity separator
    #[error("cluster name {0:?} must be non-empty and must not contain '.'")]
    InvalidName(String),

    /// The host cluster is not one of the entries
    #[error("host cluster {0:?} is not a configured cluster")]
    UnknownHost(String),
}

/// Check cluster names before any client is built
pub fn validate<'a>(names: impl IntoIterator<Item = &'a str>, host: &str) -> Result<(), RegistryError> {
    let mut seen = std::collections::HashSet::new();
    for name in names {
        if name.is_empty() || name.contains(SEPARATOR) {
            return Err(RegistryError::InvalidName(name.to_string()));
        }
        if !seen.insert(name) {
            return Err(RegistryError::Duplicate(name.to_string()));
        }
    }
    if seen.is_empty() {
        return Err(RegistryError::Empty);
    }
    if !seen.contains(host) {
        return Err(RegistryError::UnknownHost(host.to_string()));
    }
    Ok(())
}

/// Read-only snapshot of the clients for every backend cluster
///
/// Cloning is cheap and every clone sees the same snapshot. Iteration order over
/// members is unspecified.
#[derive(Clone)]
pub struct Registry {
    inner: Arc<Inner>,
}

struct Inner {
    members: HashMap<String, Client>,
    host: String,
    host_client: Client,
}

impl Registry {
    /// Build a registry from named clients
    ///
    /// `host` names the cluster that answers discovery requests.
    pub fn new(
        members: impl IntoIterator<Item = (String, Client)>,
        host: impl Into<String>,
    ) -> Result<Self, RegistryError> {
        let host = host.into();
        let mut map = HashMap::new();
        for (name, client) in members {
            if map.contains_key(&name) {
                return Err(RegistryError::Duplicate(name));
            }
            map.insert(name, client);
        }
        validate(map.keys().map(String::as_str), &host)?;
        let host_client = map
            .get(&host)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownHost(host.clone()))?;
        Ok(Self {
            inner: Arc::new(Inner {
                members: map,
                host,
                host_client,
            }),
        })
    }

    /// Client for `cluster`
    pub fn get(&self, cluster: &str) -> Result<&Client, mck_core::Error> {
        self.inner
            .members
            .get(cluster)
            .ok_or_else(|| mck_core::Error::UnknownCluster(cluster.to_string()))
    }

    /// Name of the cluster answering discovery
    pub fn host_name(&self) -> &str {
        &self.inner.host
    }

    /// Client of the cluster answering discovery
    pub fn host(&self) -> &Client {
        &self.inner.host_client
    }

    /// Every member, in unspecified order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Client)> {
        self.inner.members.iter().map(|(name, client)| (name.as_str(), client))
    }

    /// Number of members
    pub fn len(&self) -> usize {
        self.inner.members.len()
    }

    /// Always false; a registry holds at least one member
    pub fn is_empty(&self) -> bool {
        self.inner.members.is_empty()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.inner.members.keys().collect();
        names.sort();
        f.debug_struct("Registry")
            .field("members", &names)
            .field("host", &self.inner.host)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_names_and_host() {
        assert_eq!(validate(["a", "b"], "a"), Ok(()));
        assert_eq!(validate([], "a"), Err(RegistryError::Empty));
        assert_eq!(validate(["a", "a"], "a"), Err(RegistryError::Duplicate("a".into())));
        assert_eq!(validate(["a", "b.c"], "a"), Err(RegistryError::InvalidName("b.c".into())));
        assert_eq!(validate([""], ""), Err(RegistryError::InvalidName("".into())));
        assert_eq!(validate(["a"], "z"), Err(RegistryError::UnknownHost("z".into())));
    }
}
