//! Discovery and schema documents, answered by the host cluster alone
//!
//! Members are assumed to serve compatible resources; their documents are never
//! merged or compared.
use crate::{Error, Registry, Result};
use http::{Request, Uri};
use mck_core::Discovery;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// Fetch a discovery document from the host cluster
pub async fn document(registry: &Registry, doc: &Discovery) -> Result<Value> {
    let host = registry.host();
    let upstream = |e| Error::upstream(registry.host_name(), e);
    debug!(?doc, host = registry.host_name(), "discovery");
    let value = match doc {
        Discovery::CoreVersions => to_json(host.list_core_api_versions().await.map_err(upstream)?)?,
        Discovery::CoreResources { version } => {
            to_json(host.list_core_api_resources(version).await.map_err(upstream)?)?
        }
        Discovery::Groups => to_json(host.list_api_groups().await.map_err(upstream)?)?,
        Discovery::Group { group } => {
            let groups = host.list_api_groups().await.map_err(upstream)?;
            let found = groups.groups.into_iter().find(|g| &g.name == group).ok_or_else(|| {
                mck_core::Error::PathShape(format!("/apis/{group}"))
            })?;
            let mut value = to_json(found)?;
            if let Some(obj) = value.as_object_mut() {
                obj.insert("kind".into(), "APIGroup".into());
                obj.insert("apiVersion".into(), "v1".into());
            }
            value
        }
        Discovery::GroupResources { group, version } => to_json(
            host.list_api_group_resources(&format!("{group}/{version}"))
                .await
                .map_err(upstream)?,
        )?,
    };
    Ok(value)
}

/// The aggregated OpenAPI v2 document of the host cluster, as raw JSON text
pub async fn openapi(registry: &Registry) -> Result<String> {
    let mut req = Request::new(vec![]);
    *req.uri_mut() = Uri::from_static("/openapi/v2");
    registry
        .host()
        .request_text(req)
        .await
        .map_err(|e| Error::upstream(registry.host_name(), e))
}

/// Version of the host cluster's API server
pub async fn version(registry: &Registry) -> Result<Value> {
    let info = registry
        .host()
        .apiserver_version()
        .await
        .map_err(|e| Error::upstream(registry.host_name(), e))?;
    to_json(info)
}

fn to_json<T: Serialize>(doc: T) -> Result<Value> {
    serde_json::to_value(doc).map_err(Error::encode("discovery document"))
}
