//! Client-less building blocks of the multi-cluster gateway
//!
//! This crate holds everything the gateway needs that does not talk to a cluster:
//! the request path grammar, the identity codec that folds a cluster name into
//! namespaces and names, label selector handling for the reserved `cluster` key,
//! query option shapes, and the outward status object.

pub mod identity;
pub use identity::{Identity, Naming, Placement, CLUSTER_LABEL, SEPARATOR};

pub mod labels;
pub use labels::{ClusterSelector, Expression, Selector};

pub mod op;
pub use op::{Discovery, Operation, Route, Scope, Verb};

pub mod params;

pub mod response;
pub use response::Status;

mod error;
pub use error::{Error, ErrorKind};

/// Convenient alias for `Result<T, Error>`
pub type Result<T, E = Error> = std::result::Result<T, E>;
