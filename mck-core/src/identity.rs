//! Folding a cluster name into namespaces and names
//!
//! Objects leaving the gateway carry their source cluster twice: in the `cluster`
//! label, and joined onto the namespace (or onto the name for cluster-scoped kinds)
//! as `<cluster>.<local>`. Objects entering the gateway have both removed again
//! before they reach the addressed cluster. See [`Naming`] for names left unencoded.
use crate::{op::Scope, Error, Result};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube_core::DynamicObject;
use serde_json::Value;
use std::{fmt, str::FromStr};

/// Joins a cluster name and a local namespace or name
pub const SEPARATOR: char = '.';

/// Reserved label key carrying the cluster name on objects and in selectors
pub const CLUSTER_LABEL: &str = "cluster";

/// A cluster name paired with a namespace or name local to that cluster
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Identity {
    /// Registered cluster name
    pub cluster: String,
    /// Namespace or name as the cluster itself knows it
    pub local: String,
}

impl Identity {
    /// Pair a cluster with a local value
    pub fn new(cluster: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            cluster: cluster.into(),
            local: local.into(),
        }
    }

    /// Split an encoded value on its separator
    ///
    /// Exactly one separator must be present, with text on both sides.
    pub fn decode(encoded: &str) -> Result<Self> {
        let mut parts = encoded.split(SEPARATOR);
        match (parts.next(), parts.next(), parts.next()) {
            (Some(cluster), Some(local), None) if !cluster.is_empty() && !local.is_empty() => {
                Ok(Self::new(cluster, local))
            }
            _ => Err(Error::MalformedIdentity(encoded.to_string())),
        }
    }

    /// The `<cluster>.<local>` form
    pub fn encode(&self) -> String {
        encode(&self.cluster, &self.local)
    }
}

impl FromStr for Identity {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::decode(s)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{SEPARATOR}{}", self.cluster, self.local)
    }
}

/// Join a cluster name and a local value
pub fn encode(cluster: &str, local: &str) -> String {
    format!("{cluster}{SEPARATOR}{local}")
}

/// How the names of a resource's cluster-scoped objects are exposed
///
/// Custom resource definitions are named `<plural>.<group>`, which already holds the
/// separator, so their names are left as the cluster knows them and the `cluster`
/// label or selector term places them instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Naming {
    /// `<cluster>.<name>`
    Encoded,
    /// The local name, untouched
    Plain,
}

impl Naming {
    /// Naming used by the resource `resource` of API group `group`
    pub fn of(group: &str, resource: &str) -> Self {
        match (group, resource) {
            ("apiextensions.k8s.io", "customresourcedefinitions") => Naming::Plain,
            _ => Naming::Encoded,
        }
    }
}

/// Rewrite an object read from `cluster` into its gateway-wide form
///
/// Namespaced objects get an encoded namespace, cluster-scoped objects an encoded name
/// unless `naming` is [`Naming::Plain`]. The `cluster` label is set in every case.
pub fn decorate(obj: &mut DynamicObject, cluster: &str, naming: Naming) {
    decorate_meta(&mut obj.metadata, cluster, naming)
}

fn decorate_meta(meta: &mut ObjectMeta, cluster: &str, naming: Naming) {
    match meta.namespace.as_mut().filter(|ns| !ns.is_empty()) {
        Some(ns) => {
            let encoded = encode(cluster, ns);
            *ns = encoded;
        }
        None if naming == Naming::Encoded => {
            if let Some(name) = meta.name.as_mut().filter(|n| !n.is_empty()) {
                let encoded = encode(cluster, name);
                *name = encoded;
            }
        }
        None => {}
    }
    meta.labels
        .get_or_insert_with(Default::default)
        .insert(CLUSTER_LABEL.to_string(), cluster.to_string());
}

/// Remove the `cluster` label, returning its value
pub fn take_cluster_label(meta: &mut ObjectMeta) -> Option<String> {
    let labels = meta.labels.as_mut()?;
    let cluster = labels.remove(CLUSTER_LABEL);
    if labels.is_empty() {
        meta.labels = None;
    }
    cluster
}

/// Where a submitted object is sent once its addressing has been read
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Placement {
    /// Cluster that receives the object
    pub cluster: String,
    /// A `cluster` label on the body that disagreed with the path and was ignored
    pub overridden: Option<String>,
}

/// Strip gateway addressing from an object submitted under `scope`
///
/// The path identity wins whenever one exists. Bare collection endpoints fall back to
/// the `cluster` label, then to an encoded namespace, then to an encoded name unless
/// `naming` leaves names plain.
pub fn localize(meta: &mut ObjectMeta, scope: &Scope, naming: Naming) -> Result<Placement> {
    let labelled = take_cluster_label(meta);
    match scope {
        Scope::Namespace(ns) | Scope::NamespacedName { namespace: ns, .. } => {
            meta.namespace = Some(ns.local.clone());
            Ok(placed(&ns.cluster, labelled))
        }
        Scope::Name { name, .. } => {
            meta.name = Some(name.local.clone());
            meta.namespace = None;
            Ok(placed(&name.cluster, labelled))
        }
        Scope::PlainName { name, .. } => {
            meta.name = Some(name.clone());
            meta.namespace = None;
            labelled
                .map(|cluster| Placement {
                    cluster,
                    overridden: None,
                })
                .ok_or(Error::MissingCluster(CLUSTER_LABEL))
        }
        Scope::Collection => localize_unscoped(meta, labelled, naming),
    }
}

fn placed(cluster: &str, labelled: Option<String>) -> Placement {
    Placement {
        cluster: cluster.to_string(),
        overridden: labelled.filter(|l| l != cluster),
    }
}

fn localize_unscoped(meta: &mut ObjectMeta, labelled: Option<String>, naming: Naming) -> Result<Placement> {
    let namespace = match meta.namespace.as_deref() {
        Some(ns) if ns.contains(SEPARATOR) => Some(Identity::decode(ns)?),
        _ => None,
    };
    if let Some(ns) = &namespace {
        meta.namespace = Some(ns.local.clone());
    }

    if let Some(cluster) = labelled {
        // a name encoded for the same cluster is a round-tripped read
        if namespace.is_none() && naming == Naming::Encoded {
            if let Some(id) = meta.name.as_deref().and_then(|n| Identity::decode(n).ok()) {
                if id.cluster == cluster {
                    meta.name = Some(id.local);
                }
            }
        }
        return Ok(Placement {
            cluster,
            overridden: None,
        });
    }
    if let Some(ns) = namespace {
        return Ok(Placement {
            cluster: ns.cluster,
            overridden: None,
        });
    }
    match meta.name.as_deref() {
        Some(name) if meta.namespace.is_none() && naming == Naming::Encoded && name.contains(SEPARATOR) => {
            let id = Identity::decode(name)?;
            meta.name = Some(id.local);
            Ok(Placement {
                cluster: id.cluster,
                overridden: None,
            })
        }
        _ => Err(Error::MissingCluster(CLUSTER_LABEL)),
    }
}

/// Strip gateway addressing from a merge or apply patch body
///
/// Returns the removed `cluster` label value, if any.
pub fn localize_patch(patch: &mut Value, scope: &Scope) -> Option<String> {
    let meta = patch.get_mut("metadata")?.as_object_mut()?;
    match scope {
        Scope::Namespace(ns) | Scope::NamespacedName { namespace: ns, .. } => {
            if meta.contains_key("namespace") {
                meta.insert("namespace".into(), Value::String(ns.local.clone()));
            }
        }
        Scope::Name { name, .. } => {
            if meta.contains_key("name") {
                meta.insert("name".into(), Value::String(name.local.clone()));
            }
        }
        Scope::PlainName { .. } | Scope::Collection => {}
    }
    let labels = meta.get_mut("labels")?.as_object_mut()?;
    let cluster = labels.remove(CLUSTER_LABEL)?;
    if labels.is_empty() {
        meta.remove("labels");
    }
    cluster.as_str().map(String::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_json_diff::assert_json_eq;
    use serde_json::json;

    #[test]
    fn decode_reverses_encode() {
        for (cluster, local) in [("a", "default"), ("east-1", "kube-system"), ("x", "y")] {
            let encoded = encode(cluster, local);
            let id = Identity::decode(&encoded).unwrap();
            assert_eq!(id, Identity::new(cluster, local));
            assert_eq!(id.to_string(), encoded);
            assert_eq!(encoded.parse::<Identity>().unwrap().encode(), encoded);
        }
    }

    #[test]
    fn decode_rejects_wrong_separator_counts() {
        for bad in ["default", "a.b.c", "", ".default", "a.", "."] {
            let err = Identity::decode(bad).unwrap_err();
            assert_eq!(err, Error::MalformedIdentity(bad.into()), "{bad:?}");
        }
    }

    fn object(value: Value) -> DynamicObject {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn decorate_encodes_namespace_or_name() {
        let mut pod = object(json!({
            "apiVersion": "v1", "kind": "Pod",
            "metadata": {"name": "web", "namespace": "default"}
        }));
        decorate(&mut pod, "a", Naming::Encoded);
        assert_eq!(pod.metadata.namespace.as_deref(), Some("a.default"));
        assert_eq!(pod.metadata.name.as_deref(), Some("web"));
        assert_eq!(pod.metadata.labels.unwrap()["cluster"], "a");

        let mut ns = object(json!({
            "apiVersion": "v1", "kind": "Namespace",
            "metadata": {"name": "default", "labels": {"team": "x"}}
        }));
        decorate(&mut ns, "b", Naming::Encoded);
        assert_eq!(ns.metadata.name.as_deref(), Some("b.default"));
        let labels = ns.metadata.labels.unwrap();
        assert_eq!(labels["cluster"], "b");
        assert_eq!(labels["team"], "x");
    }

    #[test]
    fn path_identity_wins_over_label() {
        let mut meta = ObjectMeta {
            name: Some("cm".into()),
            namespace: Some("b.default".into()),
            labels: Some([("cluster".to_string(), "b".to_string())].into()),
            ..ObjectMeta::default()
        };
        let scope = Scope::Namespace(Identity::new("a", "default"));
        let placement = localize(&mut meta, &scope, Naming::Encoded).unwrap();
        assert_eq!(placement.cluster, "a");
        assert_eq!(placement.overridden.as_deref(), Some("b"));
        assert_eq!(meta.namespace.as_deref(), Some("default"));
        assert_eq!(meta.labels, None);
    }

    #[test]
    fn unscoped_bodies_resolve_label_then_namespace_then_name() {
        let mut labelled = ObjectMeta {
            name: Some("cm".into()),
            namespace: Some("default".into()),
            labels: Some([("cluster".to_string(), "a".to_string())].into()),
            ..ObjectMeta::default()
        };
        assert_eq!(localize(&mut labelled, &Scope::Collection, Naming::Encoded).unwrap().cluster, "a");
        assert_eq!(labelled.namespace.as_deref(), Some("default"));

        let mut by_namespace = ObjectMeta {
            name: Some("cm".into()),
            namespace: Some("b.default".into()),
            ..ObjectMeta::default()
        };
        assert_eq!(localize(&mut by_namespace, &Scope::Collection, Naming::Encoded).unwrap().cluster, "b");
        assert_eq!(by_namespace.namespace.as_deref(), Some("default"));

        let mut by_name = ObjectMeta {
            name: Some("c.my-ns".into()),
            ..ObjectMeta::default()
        };
        assert_eq!(localize(&mut by_name, &Scope::Collection, Naming::Encoded).unwrap().cluster, "c");
        assert_eq!(by_name.name.as_deref(), Some("my-ns"));

        let mut round_tripped = ObjectMeta {
            name: Some("a.my-ns".into()),
            labels: Some([("cluster".to_string(), "a".to_string())].into()),
            ..ObjectMeta::default()
        };
        localize(&mut round_tripped, &Scope::Collection, Naming::Encoded).unwrap();
        assert_eq!(round_tripped.name.as_deref(), Some("my-ns"));
    }

    #[test]
    fn unscoped_body_without_cluster_is_rejected() {
        let mut meta = ObjectMeta {
            name: Some("cm".into()),
            namespace: Some("default".into()),
            ..ObjectMeta::default()
        };
        let err = localize(&mut meta, &Scope::Collection, Naming::Encoded).unwrap_err();
        assert_eq!(err, Error::MissingCluster("cluster"));

        let mut bad = ObjectMeta {
            namespace: Some("a.b.c".into()),
            ..ObjectMeta::default()
        };
        let err = localize(&mut bad, &Scope::Collection, Naming::Encoded).unwrap_err();
        assert_eq!(err, Error::MalformedIdentity("a.b.c".into()));
    }

    #[test]
    fn crd_names_survive_a_round_trip() {
        let naming = Naming::of("apiextensions.k8s.io", "customresourcedefinitions");
        assert_eq!(naming, Naming::Plain);
        assert_eq!(Naming::of("", "nodes"), Naming::Encoded);

        let mut crd = object(json!({
            "apiVersion": "apiextensions.k8s.io/v1", "kind": "CustomResourceDefinition",
            "metadata": {"name": "tests.argoproj.io"}
        }));
        decorate(&mut crd, "a", naming);
        assert_eq!(crd.metadata.name.as_deref(), Some("tests.argoproj.io"));
        assert_eq!(crd.metadata.labels.as_ref().unwrap()["cluster"], "a");

        // submitted back as read, it lands on the same cluster under the same name
        let placement = localize(&mut crd.metadata, &Scope::Collection, naming).unwrap();
        assert_eq!(placement.cluster, "a");
        assert_eq!(crd.metadata.name.as_deref(), Some("tests.argoproj.io"));
        assert_eq!(crd.metadata.labels, None);

        let mut unlabelled = ObjectMeta {
            name: Some("tests.argoproj.io".into()),
            ..ObjectMeta::default()
        };
        let err = localize(&mut unlabelled, &Scope::Collection, naming).unwrap_err();
        assert_eq!(err, Error::MissingCluster("cluster"));
    }

    #[test]
    fn patch_bodies_lose_cluster_label() {
        let mut patch = json!({
            "metadata": {"namespace": "a.default", "labels": {"cluster": "a"}},
            "data": {"k": "v"}
        });
        let scope = Scope::NamespacedName {
            namespace: Identity::new("a", "default"),
            name: "cm".into(),
            subresource: None,
        };
        assert_eq!(localize_patch(&mut patch, &scope).as_deref(), Some("a"));
        assert_json_eq!(
            patch,
            json!({"metadata": {"namespace": "default"}, "data": {"k": "v"}})
        );

        let mut untouched = json!({"spec": {"replicas": 2}});
        assert_eq!(localize_patch(&mut untouched, &scope), None);
        assert_json_eq!(untouched, json!({"spec": {"replicas": 2}}));
    }
}
