//! Operations against exactly one resolved cluster
use crate::{aggregate, relay::Relay, Error, Registry, Result};
use axum::{extract::Query, http::Uri};
use bytes::Bytes;
use either::Either;
use kube::{
    api::{Api, ApiResource, DynamicObject, GroupVersionKind, ObjectList},
    Client,
};
use mck_core::{
    identity::{self, localize, localize_patch},
    params::{self, DeleteQuery, GetQuery, ListQuery, PatchBody, WriteQuery},
    ClusterSelector, Operation, Scope, Verb,
};
use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Shared state of every request
#[derive(Clone, Debug)]
pub struct Gateway {
    registry: Registry,
    shutdown: CancellationToken,
}

/// A routed resource request
#[derive(Debug)]
pub struct Call {
    /// Parsed operation descriptor
    pub op: Operation,
    /// Request URI, for query options
    pub uri: Uri,
    /// Request `Content-Type`, for patches
    pub content_type: Option<String>,
    /// Request body
    pub body: Bytes,
}

/// The result of a resource operation
#[derive(Debug)]
pub enum Reply {
    /// A single object
    Object(DynamicObject),
    /// A newly created object
    Created(DynamicObject),
    /// A list of objects
    List(ObjectList<DynamicObject>),
    /// A status reported by the cluster in place of an object
    Status(kube::core::response::Status),
    /// An open watch
    Watch(Relay),
}

impl Gateway {
    /// Serve requests from `registry` until `shutdown` is cancelled
    pub fn new(registry: Registry, shutdown: CancellationToken) -> Self {
        Self { registry, shutdown }
    }

    /// The clusters this gateway fronts
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Cancelled when the server is shutting down
    pub fn shutdown(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Execute a routed resource request
    pub async fn execute(&self, mut call: Call) -> Result<Reply> {
        if let Scope::PlainName { .. } = call.op.scope {
            let cluster = selected_cluster(&call.uri)?;
            let scope = std::mem::replace(&mut call.op.scope, Scope::Collection);
            call.op.scope = scope.bind(&cluster);
        }
        let op = &call.op;
        debug!(%op, cluster = op.cluster(), "dispatch");
        match (op.verb, &op.scope) {
            (Verb::List, Scope::Collection) => {
                let q: ListQuery = query(&call.uri)?;
                aggregate::list(&self.registry, op, &q).await.map(Reply::List)
            }
            (Verb::List, _) => self.list(op, &query(&call.uri)?).await.map(Reply::List),
            (Verb::Watch, _) => self.watch(op, &query(&call.uri)?).await.map(Reply::Watch),
            (Verb::Create, _) => {
                let q: WriteQuery = query(&call.uri)?;
                aggregate::create(&self.registry, op, &q, &call.body)
                    .await
                    .map(Reply::Created)
            }
            (Verb::DeleteCollection, _) => self.delete_collection(op, &call).await,
            (Verb::Get, _) => self.get(op, &query(&call.uri)?).await.map(Reply::Object),
            (Verb::Replace, _) => self.replace(op, &query(&call.uri)?, &call.body).await.map(Reply::Object),
            (Verb::Patch, _) => self.patch(op, &query(&call.uri)?, &call).await.map(Reply::Object),
            (Verb::Delete, _) => self.delete(op, &call).await,
        }
    }

    // the one cluster of a collection call: the path when it names one, otherwise the selector
    fn collection_target(&self, op: &Operation, clusters: &ClusterSelector) -> Result<String> {
        let cluster = match op.cluster() {
            Some(path) => {
                if !clusters.admits(path) {
                    warn!(cluster = path, "selector cluster term conflicts with path, using path");
                }
                path.to_string()
            }
            None => clusters.single()?,
        };
        self.registry.get(&cluster)?;
        Ok(cluster)
    }

    async fn list(&self, op: &Operation, q: &ListQuery) -> Result<ObjectList<DynamicObject>> {
        let (selector, clusters) = ClusterSelector::split(q.label_selector.as_deref())?;
        let cluster = self.collection_target(op, &clusters)?;
        let lp = q.list_params(selector)?;
        let client = self.registry.get(&cluster)?;
        let mut list = api(client, op, op.scope.namespace())
            .list(&lp)
            .await
            .map_err(|e| Error::upstream(&cluster, e))?;
        for obj in &mut list.items {
            identity::decorate(obj, &cluster, op.naming());
        }
        Ok(list)
    }

    async fn watch(&self, op: &Operation, q: &ListQuery) -> Result<Relay> {
        let (selector, clusters) = ClusterSelector::split(q.label_selector.as_deref())?;
        // resolved before anything is opened upstream
        let cluster = self.collection_target(op, &clusters)?;
        let wp = q.watch_params(selector);
        let client = self.registry.get(&cluster)?;
        let events = api(client, op, op.scope.namespace())
            .watch(&wp, q.watch_version())
            .await
            .map_err(|e| Error::upstream(&cluster, e))?;
        debug!(%cluster, resource = %op.resource, "watch opened");
        Ok(Relay::new(cluster, op.naming(), events, self.shutdown.clone()))
    }

    async fn delete_collection(&self, op: &Operation, call: &Call) -> Result<Reply> {
        let lq: ListQuery = query(&call.uri)?;
        let dq: DeleteQuery = query(&call.uri)?;
        let (selector, clusters) = ClusterSelector::split(lq.label_selector.as_deref())?;
        let cluster = self.collection_target(op, &clusters)?;
        let lp = lq.list_params(selector)?;
        let dp = dq.delete_params(params::delete_options(&call.body)?)?;
        let client = self.registry.get(&cluster)?;
        let res = api(client, op, op.scope.namespace())
            .delete_collection(&dp, &lp)
            .await
            .map_err(|e| Error::upstream(&cluster, e))?;
        Ok(match res {
            Either::Left(mut list) => {
                for obj in &mut list.items {
                    identity::decorate(obj, &cluster, op.naming());
                }
                Reply::List(list)
            }
            Either::Right(status) => Reply::Status(status),
        })
    }

    async fn get(&self, op: &Operation, q: &GetQuery) -> Result<DynamicObject> {
        let (cluster, name) = object_target(op)?;
        let client = self.registry.get(cluster)?;
        let api = api(client, op, op.scope.namespace());
        let res = match op.scope.subresource() {
            Some(sub) => api.get_subresource(sub, name).await,
            None => api.get_with(name, &q.into()).await,
        };
        let mut obj = res.map_err(|e| Error::upstream(cluster, e))?;
        identity::decorate(&mut obj, cluster, op.naming());
        Ok(obj)
    }

    async fn replace(&self, op: &Operation, q: &WriteQuery, body: &[u8]) -> Result<DynamicObject> {
        let (cluster, name) = object_target(op)?;
        let mut obj: DynamicObject = serde_json::from_slice(body).map_err(Error::Body)?;
        let placement = localize(&mut obj.metadata, &op.scope, op.naming())?;
        if let Some(label) = &placement.overridden {
            warn!(%label, %cluster, "body cluster label conflicts with path, using path");
        }
        let pp = q.post_params()?;
        let client = self.registry.get(cluster)?;
        let api = api(client, op, op.scope.namespace());
        let res = match op.scope.subresource() {
            Some(sub) => {
                let data = serde_json::to_vec(&obj).map_err(Error::encode("subresource body"))?;
                api.replace_subresource(sub, name, &pp, data).await
            }
            None => api.replace(name, &pp, &obj).await,
        };
        let mut obj = res.map_err(|e| Error::upstream(cluster, e))?;
        identity::decorate(&mut obj, cluster, op.naming());
        Ok(obj)
    }

    async fn patch(&self, op: &Operation, q: &WriteQuery, call: &Call) -> Result<DynamicObject> {
        let (cluster, name) = object_target(op)?;
        let mut body = PatchBody::parse(call.content_type.as_deref(), &call.body)?;
        if let Some(doc) = body.document_mut() {
            match localize_patch(doc, &op.scope) {
                Some(label) if label != cluster => {
                    warn!(%label, %cluster, "patch cluster label conflicts with path, using path")
                }
                _ => {}
            }
        }
        let pp = q.patch_params()?;
        let patch = body.into_patch();
        let client = self.registry.get(cluster)?;
        let api = api(client, op, op.scope.namespace());
        let res = match op.scope.subresource() {
            Some(sub) => api.patch_subresource(sub, name, &pp, &patch).await,
            None => api.patch(name, &pp, &patch).await,
        };
        let mut obj = res.map_err(|e| Error::upstream(cluster, e))?;
        identity::decorate(&mut obj, cluster, op.naming());
        Ok(obj)
    }

    async fn delete(&self, op: &Operation, call: &Call) -> Result<Reply> {
        let (cluster, name) = object_target(op)?;
        let dq: DeleteQuery = query(&call.uri)?;
        let dp = dq.delete_params(params::delete_options(&call.body)?)?;
        let client = self.registry.get(cluster)?;
        let res = api(client, op, op.scope.namespace())
            .delete(name, &dp)
            .await
            .map_err(|e| Error::upstream(cluster, e))?;
        Ok(match res {
            Either::Left(mut obj) => {
                identity::decorate(&mut obj, cluster, op.naming());
                Reply::Object(obj)
            }
            Either::Right(status) => Reply::Status(status),
        })
    }
}

// the one cluster the selector names, for objects whose path carries none
fn selected_cluster(uri: &Uri) -> Result<String> {
    let q: ListQuery = query(uri)?;
    let (_, clusters) = ClusterSelector::split(q.label_selector.as_deref())?;
    Ok(clusters.single()?)
}

// cluster and local name of an object addressed by the path
fn object_target(op: &Operation) -> Result<(&str, &str)> {
    match (op.cluster(), op.scope.name()) {
        (Some(cluster), Some(name)) => Ok((cluster, name)),
        _ => Err(mck_core::Error::PathShape(op.to_string()).into()),
    }
}

/// Dynamic api handle for the resource of `op`
pub(crate) fn api(client: &Client, op: &Operation, namespace: Option<&str>) -> Api<DynamicObject> {
    let gvk = GroupVersionKind::gvk(&op.group, &op.version, "");
    let ar = ApiResource::from_gvk_with_plural(&gvk, &op.resource);
    match namespace {
        Some(ns) => Api::namespaced_with(client.clone(), ns, &ar),
        None => Api::all_with(client.clone(), &ar),
    }
}

/// Decode query options from a request URI
pub(crate) fn query<T: DeserializeOwned>(uri: &Uri) -> Result<T> {
    Query::<T>::try_from_uri(uri)
        .map(|Query(q)| q)
        .map_err(|e| mck_core::Error::Decode(e.body_text()).into())
}
