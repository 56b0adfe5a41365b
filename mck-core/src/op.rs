//! Request path grammar
//!
//! Every inbound path is mapped onto exactly one [`Route`] from its segment shape and
//! HTTP verb alone. The body is never consulted. Shapes after the `/api/{v}` or
//! `/apis/{g}/{v}` prefix are:
//!
//! | segments | meaning |
//! |---|---|
//! | `{res}` | collection spanning every cluster |
//! | `{res}/{cluster.name}` | cluster-scoped object |
//! | `{res}/{cluster.name}/{sub}` | subresource of a cluster-scoped object |
//! | `namespaces/{cluster.ns}/{res}` | namespaced collection in one cluster |
//! | `namespaces/{cluster.ns}/{res}/{name}` | namespaced object |
//! | `namespaces/{cluster.ns}/{res}/{name}/{sub}` | subresource of a namespaced object |
//!
//! Resources with [`Naming::Plain`] take their cluster-scoped names unencoded.
use crate::{Error, Identity, Naming, Result};
use http::Method;
use std::fmt;

/// What an inbound path asks for
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Route {
    /// Discovery document, answered by the host cluster
    Discovery(Discovery),
    /// Operation on resources of one or more clusters
    Resource(Operation),
}

/// Discovery documents served from the host cluster
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Discovery {
    /// `/api`
    CoreVersions,
    /// `/api/{version}`
    CoreResources {
        /// Legacy API version, normally `v1`
        version: String,
    },
    /// `/apis`
    Groups,
    /// `/apis/{group}`
    Group {
        /// API group name
        group: String,
    },
    /// `/apis/{group}/{version}`
    GroupResources {
        /// API group name
        group: String,
        /// Version inside the group
        version: String,
    },
}

/// An operation descriptor
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Operation {
    /// Action to perform
    pub verb: Verb,
    /// API group, empty for the legacy core family
    pub group: String,
    /// API version
    pub version: String,
    /// Plural resource name
    pub resource: String,
    /// Where the operation is aimed
    pub scope: Scope,
}

/// Verbs the gateway serves
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verb {
    /// GET on a collection
    List,
    /// GET on a collection with `watch=true`
    Watch,
    /// POST on a collection
    Create,
    /// DELETE on a collection
    DeleteCollection,
    /// GET on an object
    Get,
    /// PUT on an object
    Replace,
    /// PATCH on an object
    Patch,
    /// DELETE on an object
    Delete,
}

/// Addressing carried by the path
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Scope {
    /// No namespace or name in the path
    Collection,
    /// A namespace of one cluster
    Namespace(Identity),
    /// A cluster-scoped object addressed by encoded name
    Name {
        /// Cluster and local object name
        name: Identity,
        /// Trailing subresource segment
        subresource: Option<String>,
    },
    /// A cluster-scoped object whose name carries no cluster
    ///
    /// The cluster comes from elsewhere in the request; see [`Scope::bind`].
    PlainName {
        /// Object name as the cluster knows it
        name: String,
        /// Trailing subresource segment
        subresource: Option<String>,
    },
    /// A namespaced object
    NamespacedName {
        /// Cluster and local namespace
        namespace: Identity,
        /// Object name inside that namespace
        name: String,
        /// Trailing subresource segment
        subresource: Option<String>,
    },
}

impl Route {
    /// Map a request path and verb onto a route
    ///
    /// `watch` is the `watch` query flag, which turns a collection GET into a watch.
    pub fn parse(method: &Method, path: &str, watch: bool) -> Result<Self> {
        let trimmed = path.strip_prefix('/').unwrap_or(path);
        let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
        let segments: Vec<&str> = trimmed.split('/').collect();
        if segments.iter().any(|s| s.is_empty()) {
            return Err(Error::PathShape(path.to_string()));
        }
        let discovery = match segments.as_slice() {
            ["api"] => Discovery::CoreVersions,
            ["api", version] => Discovery::CoreResources {
                version: version.to_string(),
            },
            ["api", version, rest @ ..] => {
                return Operation::parse(method, "", version, rest, watch).map(Route::Resource)
            }
            ["apis"] => Discovery::Groups,
            ["apis", group] => Discovery::Group {
                group: group.to_string(),
            },
            ["apis", group, version] => Discovery::GroupResources {
                group: group.to_string(),
                version: version.to_string(),
            },
            ["apis", group, version, rest @ ..] => {
                return Operation::parse(method, group, version, rest, watch).map(Route::Resource)
            }
            _ => return Err(Error::PathShape(path.to_string())),
        };
        if *method != Method::GET {
            return Err(Error::MethodNotSupported {
                resource: path.to_string(),
                verb: method.to_string(),
            });
        }
        Ok(Route::Discovery(discovery))
    }
}

impl Operation {
    fn parse(method: &Method, group: &str, version: &str, rest: &[&str], watch: bool) -> Result<Self> {
        let (resource, scope) = match *rest {
            [res] => (res, Scope::Collection),
            ["namespaces", ns, res] => (res, Scope::Namespace(Identity::decode(ns)?)),
            [res, name] => (res, Scope::object(Naming::of(group, res), name, None)?),
            [res, name, sub] => (res, Scope::object(Naming::of(group, res), name, Some(sub))?),
            ["namespaces", ns, res, name] => (res, Scope::NamespacedName {
                namespace: Identity::decode(ns)?,
                name: name.to_string(),
                subresource: None,
            }),
            ["namespaces", ns, res, name, sub] => (res, Scope::NamespacedName {
                namespace: Identity::decode(ns)?,
                name: name.to_string(),
                subresource: Some(sub.to_string()),
            }),
            _ => {
                let prefix = if group.is_empty() { "/api".to_string() } else { format!("/apis/{group}") };
                return Err(Error::PathShape(format!("{prefix}/{version}/{}", rest.join("/"))));
            }
        };

        let collection = matches!(scope, Scope::Collection | Scope::Namespace(_));
        let subresource = scope.subresource().is_some();
        let verb = match (collection, subresource, method.as_str(), watch) {
            (true, _, "GET", true) => Verb::Watch,
            (true, _, "GET", false) => Verb::List,
            (true, _, "POST", _) => Verb::Create,
            (true, _, "DELETE", _) => Verb::DeleteCollection,
            (false, _, "GET", _) => Verb::Get,
            (false, _, "PUT", _) => Verb::Replace,
            (false, _, "PATCH", _) => Verb::Patch,
            (false, false, "DELETE", _) => Verb::Delete,
            _ => {
                return Err(Error::MethodNotSupported {
                    resource: qualified(group, resource),
                    verb: method.to_string(),
                })
            }
        };

        Ok(Self {
            verb,
            group: group.to_string(),
            version: version.to_string(),
            resource: resource.to_string(),
            scope,
        })
    }

    /// `group/version`, or just `version` for the legacy family
    pub fn api_version(&self) -> String {
        if self.group.is_empty() {
            self.version.clone()
        } else {
            format!("{}/{}", self.group, self.version)
        }
    }

    /// How cluster-scoped names of this resource are exposed
    pub fn naming(&self) -> Naming {
        Naming::of(&self.group, &self.resource)
    }

    /// Cluster named by the path, if the path names one
    pub fn cluster(&self) -> Option<&str> {
        self.scope.identity().map(|id| id.cluster.as_str())
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} {}", self.verb, qualified(&self.group, &self.resource))
    }
}

fn qualified(group: &str, resource: &str) -> String {
    if group.is_empty() {
        resource.to_string()
    } else {
        format!("{resource}.{group}")
    }
}

impl Scope {
    fn object(naming: Naming, name: &str, subresource: Option<&str>) -> Result<Self> {
        let subresource = subresource.map(String::from);
        Ok(match naming {
            Naming::Encoded => Scope::Name {
                name: Identity::decode(name)?,
                subresource,
            },
            Naming::Plain => Scope::PlainName {
                name: name.to_string(),
                subresource,
            },
        })
    }

    /// Attach `cluster` to a plain name, leaving every other scope as it is
    pub fn bind(self, cluster: &str) -> Self {
        match self {
            Scope::PlainName { name, subresource } => Scope::Name {
                name: Identity::new(cluster, name),
                subresource,
            },
            other => other,
        }
    }

    /// The cluster identity the path carries
    pub fn identity(&self) -> Option<&Identity> {
        match self {
            Scope::Collection | Scope::PlainName { .. } => None,
            Scope::Namespace(ns) | Scope::NamespacedName { namespace: ns, .. } => Some(ns),
            Scope::Name { name, .. } => Some(name),
        }
    }

    /// Local namespace inside the addressed cluster
    pub fn namespace(&self) -> Option<&str> {
        match self {
            Scope::Namespace(ns) | Scope::NamespacedName { namespace: ns, .. } => Some(&ns.local),
            _ => None,
        }
    }

    /// Local object name inside the addressed cluster
    pub fn name(&self) -> Option<&str> {
        match self {
            Scope::Name { name, .. } => Some(&name.local),
            Scope::NamespacedName { name, .. } | Scope::PlainName { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Trailing subresource segment
    pub fn subresource(&self) -> Option<&str> {
        match self {
            Scope::Name { subresource, .. }
            | Scope::PlainName { subresource, .. }
            | Scope::NamespacedName { subresource, .. } => subresource.as_deref(),
            _ => None,
        }
    }
}
