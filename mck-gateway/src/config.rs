//! Gateway configuration file and the clients built from it
use crate::registry::{self, Registry, RegistryError};
use kube::{
    config::{InClusterError, KubeConfigOptions, Kubeconfig, KubeconfigError},
    Client,
};
use serde::Deserialize;
use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
    time::Duration,
};
use thiserror::Error;
use tracing::info;

/// Errors raised while loading configuration or connecting to clusters
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file could not be read
    #[error("failed to read {path:?}: {source}")]
    Read {
        /// File that was read
        path: PathBuf,
        /// Underlying io error
        #[source]
        source: std::io::Error,
    },

    /// The file is not a valid configuration document
    #[error("failed to parse configuration: {0}")]
    Parse(#[source] serde_yaml::Error),

    /// The cluster list is unusable
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// A kubeconfig could not be loaded for a cluster
    #[error("cluster {cluster:?}: {source}")]
    Kubeconfig {
        /// Cluster being configured
        cluster: String,
        /// Underlying kubeconfig error
        #[source]
        source: KubeconfigError,
    },

    /// In-cluster credentials could not be loaded
    #[error("cluster {cluster:?}: {source}")]
    InCluster {
        /// Cluster being configured
        cluster: String,
        /// Underlying in-cluster error
        #[source]
        source: InClusterError,
    },

    /// A client could not be built from a loaded configuration
    #[error("cluster {cluster:?}: {source}")]
    Client {
        /// Cluster being configured
        cluster: String,
        /// Underlying client error
        #[source]
        source: kube::Error,
    },
}

/// Top level configuration document
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Address the gateway listens on
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Cluster answering discovery, the first listed cluster when unset
    #[serde(default)]
    pub host_cluster: Option<String>,

    /// Seconds in-flight requests get to finish on shutdown
    #[serde(default = "default_grace")]
    pub shutdown_grace_seconds: u64,

    /// Backend clusters
    pub clusters: Vec<ClusterConfig>,
}

/// How to reach one backend cluster
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
    /// Name callers address the cluster by
    pub name: String,

    /// Use the service account the gateway runs as
    #[serde(default)]
    pub in_cluster: bool,

    /// Kubeconfig file, the default kubeconfig when unset
    #[serde(default)]
    pub kubeconfig: Option<PathBuf>,

    /// Context inside the kubeconfig
    #[serde(default)]
    pub context: Option<String>,
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 2473))
}

fn default_grace() -> u64 {
    30
}

impl Config {
    /// Read and validate a configuration file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml(&raw)
    }

    /// Parse and validate a configuration document
    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(raw).map_err(ConfigError::Parse)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the cluster list without connecting anywhere
    pub fn validate(&self) -> Result<(), ConfigError> {
        registry::validate(self.clusters.iter().map(|c| c.name.as_str()), self.host())?;
        Ok(())
    }

    /// Name of the cluster answering discovery
    pub fn host(&self) -> &str {
        match &self.host_cluster {
            Some(host) => host,
            None => self.clusters.first().map(|c| c.name.as_str()).unwrap_or_default(),
        }
    }

    /// Shutdown grace period
    pub fn grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_seconds)
    }

    /// Connect a client to every cluster
    pub async fn registry(&self) -> Result<Registry, ConfigError> {
        self.validate()?;
        let mut members = Vec::with_capacity(self.clusters.len());
        for cluster in &self.clusters {
            let client = cluster.client().await?;
            info!(cluster = %cluster.name, "registered cluster");
            members.push((cluster.name.clone(), client));
        }
        Ok(Registry::new(members, self.host())?)
    }
}

impl ClusterConfig {
    async fn client(&self) -> Result<Client, ConfigError> {
        let config = if self.in_cluster {
            kube::Config::incluster().map_err(|source| ConfigError::InCluster {
                cluster: self.name.clone(),
                source,
            })?
        } else {
            let options = KubeConfigOptions {
                context: self.context.clone(),
                ..KubeConfigOptions::default()
            };
            let kubeconfig = match &self.kubeconfig {
                Some(path) => Kubeconfig::read_from(path),
                None => Kubeconfig::read(),
            };
            let loaded = match kubeconfig {
                Ok(kubeconfig) => kube::Config::from_custom_kubeconfig(kubeconfig, &options).await,
                Err(e) => Err(e),
            };
            loaded.map_err(|source| ConfigError::Kubeconfig {
                cluster: self.name.clone(),
                source,
            })?
        };
        Client::try_from(config).map_err(|source| ConfigError::Client {
            cluster: self.name.clone(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_with_defaults() {
        let config = Config::from_yaml(
            r#"
clusters:
  - name: local
    inCluster: true
  - name: east
    kubeconfig: /etc/mck/east.yaml
    context: east-admin
"#,
        )
        .unwrap();
        assert_eq!(config.listen, "0.0.0.0:2473".parse().unwrap());
        assert_eq!(config.host(), "local");
        assert_eq!(config.grace(), Duration::from_secs(30));
        assert!(config.clusters[0].in_cluster);
        assert_eq!(config.clusters[1].context.as_deref(), Some("east-admin"));
    }

    #[test]
    fn rejects_bad_cluster_lists() {
        let dotted = Config::from_yaml("clusters:\n  - name: a.b\n").unwrap_err();
        assert!(matches!(dotted, ConfigError::Registry(RegistryError::InvalidName(_))));

        let empty = Config::from_yaml("clusters: []\n").unwrap_err();
        assert!(matches!(empty, ConfigError::Registry(RegistryError::Empty)));

        let host = Config::from_yaml("hostCluster: west\nclusters:\n  - name: east\n").unwrap_err();
        assert!(matches!(host, ConfigError::Registry(RegistryError::UnknownHost(_))));

        let garbage = Config::from_yaml("clusters: 7\n").unwrap_err();
        assert!(matches!(garbage, ConfigError::Parse(_)));
    }
}
