//! A single Kubernetes API surface in front of many clusters
//!
//! Callers address a backend cluster through the namespace or name in the path
//! (`<cluster>.<local>`), through the `cluster` label of a submitted object, or
//! through a `cluster` term in a label selector. Collection lists without such
//! addressing span every cluster.
//!
//! ```no_run
//! use mck_gateway::{config::Config, server, Gateway};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn wrapper() -> anyhow::Result<()> {
//! let config = Config::load("mck.yaml".as_ref())?;
//! let registry = config.registry().await?;
//! let gateway = Gateway::new(registry, CancellationToken::new());
//! let listener = tokio::net::TcpListener::bind(config.listen).await?;
//! server::serve(listener, gateway, config.grace()).await?;
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod config;
pub mod discovery;
pub mod handlers;
pub use handlers::{Call, Gateway, Reply};
pub mod registry;
pub use registry::Registry;
pub mod relay;
pub mod server;

mod error;
pub use error::{Error, Result};
