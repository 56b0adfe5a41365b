use thiserror::Error;

/// Client-side failures detected before any cluster is contacted
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The path does not match any shape of the API grammar
    #[error("the server could not find the requested resource: {0}")]
    PathShape(String),

    /// The path shape is known but the verb is not served for it
    #[error("method {verb} is not supported for {resource}")]
    MethodNotSupported {
        /// Resource the request addressed, for diagnostics
        resource: String,
        /// The rejected HTTP verb
        verb: String,
    },

    /// The request named a cluster that is not registered
    #[error("unknown cluster {0:?}")]
    UnknownCluster(String),

    /// The request carried no cluster where exactly one is required
    #[error("a single cluster must be selected with the {0:?} label for this operation")]
    MissingCluster(&'static str),

    /// An encoded namespace or name did not hold exactly one separator
    #[error("malformed identity {0:?}: expected <cluster>.<name>")]
    MalformedIdentity(String),

    /// Query parameters or the request body could not be decoded
    #[error("failed to decode request: {0}")]
    Decode(String),
}

/// Discriminant of every failure the gateway reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unrecognized path or unsupported verb
    PathShape,
    /// Cluster absent from the registry, or not supplied where required
    UnknownCluster,
    /// Encoded identity violated the one-separator rule
    MalformedIdentity,
    /// The addressed cluster failed the call
    Upstream,
    /// Request body or query failed to parse
    Decode,
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::PathShape(_) | Error::MethodNotSupported { .. } => ErrorKind::PathShape,
            Error::UnknownCluster(_) | Error::MissingCluster(_) => ErrorKind::UnknownCluster,
            Error::MalformedIdentity(_) => ErrorKind::MalformedIdentity,
            Error::Decode(_) => ErrorKind::Decode,
        }
    }

    /// Suggested HTTP status code and machine-readable reason
    pub fn code_and_reason(&self) -> (u16, &'static str) {
        match self {
            Error::PathShape(_) => (404, "NotFound"),
            Error::MethodNotSupported { .. } => (405, "MethodNotAllowed"),
            _ => (400, "BadRequest"),
        }
    }
}
