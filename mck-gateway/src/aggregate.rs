//! Operations that are not bound to one cluster by the path
//!
//! A collection list visits every registered cluster (or those its selector names)
//! and concatenates what they return. Creates at a collection resolve their cluster
//! from the submitted object.
use crate::{handlers::api, Error, Registry, Result};
use futures::future::try_join_all;
use kube::api::{DynamicObject, ObjectList};
use mck_core::{
    identity::{self, localize},
    params::{ListQuery, WriteQuery},
    ClusterSelector, Operation,
};
use serde_json::json;
use tracing::{debug, warn};

/// List a collection across clusters
///
/// Items are concatenated in registry iteration order, which is unspecified. The first
/// member failure fails the whole list. The list-level `resourceVersion` and `continue`
/// are cleared since they only mean something to a single cluster.
pub async fn list(registry: &Registry, op: &Operation, q: &ListQuery) -> Result<ObjectList<DynamicObject>> {
    let (selector, clusters) = ClusterSelector::split(q.label_selector.as_deref())?;
    if let Some(named) = clusters.named() {
        for cluster in &named {
            registry.get(cluster)?;
        }
    }
    let lp = q.list_params(selector)?;

    let targets: Vec<_> = registry.iter().filter(|(name, _)| clusters.admits(name)).collect();
    debug!(%op, clusters = targets.len(), "fan-out list");
    let lists = try_join_all(targets.into_iter().map(|(cluster, client)| {
        let lp = &lp;
        async move {
            let mut list = api(client, op, None)
                .list(lp)
                .await
                .map_err(|e| Error::upstream(cluster, e))?;
            for obj in &mut list.items {
                identity::decorate(obj, cluster, op.naming());
            }
            Ok::<_, Error>(list)
        }
    }))
    .await?;

    let mut lists = lists.into_iter();
    let mut merged = match lists.next() {
        Some(first) => first,
        None => empty_list(op)?,
    };
    for list in lists {
        merged.items.extend(list.items);
    }
    merged.metadata.resource_version = None;
    merged.metadata.continue_ = None;
    merged.metadata.remaining_item_count = None;
    Ok(merged)
}

fn empty_list(op: &Operation) -> Result<ObjectList<DynamicObject>> {
    serde_json::from_value(json!({
        "apiVersion": op.api_version(),
        "kind": "List",
        "metadata": {},
        "items": [],
    }))
    .map_err(Error::encode("empty list"))
}

/// Create an object, in the cluster named by the path or by the object itself
pub async fn create(registry: &Registry, op: &Operation, q: &WriteQuery, body: &[u8]) -> Result<DynamicObject> {
    let mut obj: DynamicObject = serde_json::from_slice(body).map_err(Error::Body)?;
    let placement = localize(&mut obj.metadata, &op.scope, op.naming())?;
    if let Some(label) = &placement.overridden {
        warn!(%label, cluster = %placement.cluster, "body cluster label conflicts with path, using path");
    }
    let cluster = placement.cluster.as_str();
    let client = registry.get(cluster)?;
    let pp = q.post_params()?;
    let namespace = op.scope.namespace().or(obj.metadata.namespace.as_deref());
    debug!(%op, %cluster, ?namespace, "create");
    let mut created = api(client, op, namespace)
        .create(&pp, &obj)
        .await
        .map_err(|e| Error::upstream(cluster, e))?;
    identity::decorate(&mut created, cluster, op.naming());
    Ok(created)
}
