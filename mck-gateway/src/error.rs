use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use mck_core::{response, ErrorKind, Status};
use thiserror::Error;
use tracing::warn;

/// Possible errors when serving a gateway request
#[derive(Error, Debug)]
pub enum Error {
    /// The request itself was at fault
    #[error(transparent)]
    Request(#[from] mck_core::Error),

    /// The addressed cluster failed the call
    #[error("cluster {cluster:?}: {source}")]
    Upstream {
        /// Cluster that failed
        cluster: String,
        /// What the client for that cluster reported
        #[source]
        source: kube::Error,
    },

    /// A request body was not a valid object
    #[error("failed to decode request body: {0}")]
    Body(#[source] serde_json::Error),

    /// A value produced by the gateway could not be serialized
    #[error("failed to encode {what}: {source}")]
    Encode {
        /// What was being encoded
        what: &'static str,
        /// Serializer failure
        #[source]
        source: serde_json::Error,
    },
}

impl Error {
    pub(crate) fn upstream(cluster: &str, source: kube::Error) -> Self {
        Error::Upstream {
            cluster: cluster.to_string(),
            source,
        }
    }

    pub(crate) fn encode(what: &'static str) -> impl FnOnce(serde_json::Error) -> Self {
        move |source| Error::Encode { what, source }
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Request(e) => e.kind(),
            Error::Upstream { .. } | Error::Encode { .. } => ErrorKind::Upstream,
            Error::Body(_) => ErrorKind::Decode,
        }
    }

    /// The status object returned to the caller
    pub fn status(&self) -> Status {
        match self {
            Error::Request(e) => e.status(),
            Error::Upstream {
                source: kube::Error::Api(resp),
                ..
            } => response::upstream(resp),
            Error::Upstream { .. } | Error::Encode { .. } => {
                response::failure(500, "InternalError", &self.to_string())
            }
            Error::Body(_) => response::failure(400, "BadRequest", &self.to_string()),
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.status();
        let code = status
            .code
            .and_then(|c| u16::try_from(c).ok())
            .and_then(|c| StatusCode::from_u16(c).ok())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if code.is_server_error() {
            warn!(error = %self, "request failed");
        }
        (code, Json(status)).into_response()
    }
}

/// Convenient alias for `Result<T, Error>`
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    fn json_error() -> serde_json::Error {
        serde_json::from_str::<serde_json::Value>("{").unwrap_err()
    }

    #[test]
    fn caller_and_gateway_faults_get_distinct_codes() {
        let body = Error::Body(json_error());
        assert_eq!(body.status().code, Some(400));
        assert_eq!(body.into_response().status(), StatusCode::BAD_REQUEST);

        let encode = Error::encode("discovery document")(json_error());
        assert_eq!(encode.kind(), ErrorKind::Upstream);
        let status = encode.status();
        assert_eq!(status.code, Some(500));
        assert_eq!(status.reason.as_deref(), Some("InternalError"));
        assert_eq!(encode.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
