//! Status objects returned to callers
//!
//! Every failure leaves the gateway as the `meta/v1` [`Status`] a cluster would send,
//! whether the gateway raised it or a cluster did.
use kube_core::{
    response::{Status as Reply, StatusCause as ReplyCause, StatusSummary},
    ErrorResponse,
};

pub use k8s_openapi::apimachinery::pkg::apis::meta::v1::{Status, StatusCause, StatusDetails};

const SUCCESS: &str = "Success";
const FAILURE: &str = "Failure";

/// A failed `Status` with a code, a machine-readable reason and a message
pub fn failure(code: u16, reason: &str, message: &str) -> Status {
    Status {
        status: Some(FAILURE.into()),
        code: Some(i32::from(code)),
        reason: Some(reason.into()),
        message: Some(message.into()),
        ..Status::default()
    }
}

/// Render the error body a cluster answered with, as the cluster phrased it
pub fn upstream(err: &ErrorResponse) -> Status {
    Status {
        status: Some(err.status.clone()).filter(|s| !s.is_empty()),
        ..failure(err.code, &err.reason, &err.message)
    }
}

/// Render a `Status` a cluster returned in place of an object
pub fn from_reply(reply: &Reply) -> Status {
    let details = reply.details.as_ref().map(|d| StatusDetails {
        name: non_empty(&d.name),
        group: non_empty(&d.group),
        kind: non_empty(&d.kind),
        uid: non_empty(&d.uid),
        retry_after_seconds: Some(d.retry_after_seconds)
            .filter(|s| *s > 0)
            .and_then(|s| i32::try_from(s).ok()),
        causes: Some(d.causes.iter().map(cause).collect()).filter(|c: &Vec<_>| !c.is_empty()),
    });
    Status {
        status: reply.status.map(|s| match s {
            StatusSummary::Success => SUCCESS.into(),
            StatusSummary::Failure => FAILURE.into(),
        }),
        code: Some(i32::from(reply.code)).filter(|c| *c != 0),
        message: non_empty(&reply.message),
        reason: non_empty(&reply.reason),
        details,
        ..Status::default()
    }
}

fn cause(c: &ReplyCause) -> StatusCause {
    StatusCause {
        field: non_empty(&c.field),
        message: non_empty(&c.message),
        reason: non_empty(&c.reason),
    }
}

fn non_empty(s: &str) -> Option<String> {
    Some(s).filter(|s| !s.is_empty()).map(String::from)
}

impl crate::Error {
    /// The `Status` sent back for this error
    pub fn status(&self) -> Status {
        let (code, reason) = self.code_and_reason();
        let status = failure(code, reason, &self.to_string());
        match self {
            crate::Error::MethodNotSupported { resource, .. } => Status {
                details: Some(StatusDetails {
                    kind: Some(resource.clone()),
                    ..StatusDetails::default()
                }),
                ..status
            },
            _ => status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use assert_json_diff::assert_json_eq;
    use serde_json::json;

    #[test]
    fn renders_gateway_failures() {
        let status = Error::UnknownCluster("z".into()).status();
        assert_json_eq!(
            serde_json::to_value(&status).unwrap(),
            json!({
                "kind": "Status",
                "apiVersion": "v1",
                "metadata": {},
                "status": "Failure",
                "code": 400,
                "reason": "BadRequest",
                "message": "unknown cluster \"z\""
            })
        );

        let status = Error::MethodNotSupported {
            resource: "deployments.apps".into(),
            verb: "PUT".into(),
        }
        .status();
        assert_eq!(status.code, Some(405));
        assert_eq!(status.reason.as_deref(), Some("MethodNotAllowed"));
        assert_eq!(status.details.unwrap().kind.as_deref(), Some("deployments.apps"));

        assert_eq!(Error::PathShape("/x".into()).status().code, Some(404));
    }

    #[test]
    fn passes_cluster_errors_through() {
        let upstream_err: ErrorResponse = serde_json::from_value(json!({
            "status": "Failure",
            "message": "configmaps \"cm\" not found",
            "reason": "NotFound",
            "code": 404
        }))
        .unwrap();
        let status = upstream(&upstream_err);
        assert_eq!(status.status.as_deref(), Some("Failure"));
        assert_eq!(status.code, Some(404));
        assert_eq!(status.reason.as_deref(), Some("NotFound"));
        assert_eq!(status.message.as_deref(), Some("configmaps \"cm\" not found"));
    }

    #[test]
    fn converts_cluster_status_replies() {
        let reply: Reply = serde_json::from_value(json!({
            "status": "Success",
            "code": 200,
            "details": {"name": "cm", "kind": "configmaps", "uid": "u-1"}
        }))
        .unwrap();
        assert_json_eq!(
            serde_json::to_value(from_reply(&reply)).unwrap(),
            json!({
                "kind": "Status",
                "apiVersion": "v1",
                "metadata": {},
                "status": "Success",
                "code": 200,
                "details": {"name": "cm", "kind": "configmaps", "uid": "u-1"}
            })
        );
    }
}
