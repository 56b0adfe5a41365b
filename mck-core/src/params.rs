//! Query and body option shapes, decoded the way the API server spells them
//!
//! Each shape converts into the parameter type the upstream client expects.
//! Unknown query keys are ignored.
use crate::{Error, Result};
use kube_core::params::{
    DeleteParams, GetParams, ListParams, Patch, PatchParams, PostParams, Preconditions, PropagationPolicy,
    ValidationDirective, VersionMatch, WatchParams,
};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Options of list, watch and delete-collection calls
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ListQuery {
    /// Raw label selector, still carrying any `cluster` term
    pub label_selector: Option<String>,
    /// Field selector, forwarded untouched
    pub field_selector: Option<String>,
    /// Server-side timeout
    pub timeout_seconds: Option<u32>,
    /// Page size, applied per cluster
    pub limit: Option<u32>,
    /// Pagination token
    #[serde(rename = "continue")]
    pub continue_token: Option<String>,
    /// Resource version to list or watch from
    pub resource_version: Option<String>,
    /// How `resource_version` is interpreted
    pub resource_version_match: Option<String>,
    /// Turns a list into a watch
    #[serde(deserialize_with = "flag")]
    pub watch: bool,
    /// Ask for bookmark events on a watch
    #[serde(deserialize_with = "flag")]
    pub allow_watch_bookmarks: bool,
    /// Ask for synthetic initial events on a watch
    #[serde(deserialize_with = "flag")]
    pub send_initial_events: bool,
}

impl ListQuery {
    /// Parameters for a list, with the selector already stripped of cluster terms
    pub fn list_params(&self, label_selector: Option<String>) -> Result<ListParams> {
        let mut lp = ListParams::default();
        lp.label_selector = label_selector;
        lp.field_selector = self.field_selector.clone();
        lp.timeout = self.timeout_seconds;
        lp.limit = self.limit;
        lp.continue_token = self.continue_token.clone();
        lp.resource_version = self.resource_version.clone();
        lp.version_match = match self.resource_version_match.as_deref() {
            None | Some("") => None,
            Some("NotOlderThan") => Some(VersionMatch::NotOlderThan),
            Some("Exact") => Some(VersionMatch::Exact),
            Some(other) => return Err(Error::Decode(format!("unknown resourceVersionMatch {other:?}"))),
        };
        Ok(lp)
    }

    /// Parameters for a watch, with the selector already stripped of cluster terms
    pub fn watch_params(&self, label_selector: Option<String>) -> WatchParams {
        let mut wp = WatchParams::default();
        wp.label_selector = label_selector;
        wp.field_selector = self.field_selector.clone();
        wp.timeout = self.timeout_seconds;
        wp.bookmarks = self.allow_watch_bookmarks;
        wp.send_initial_events = self.send_initial_events;
        wp
    }

    /// Version a watch starts from
    ///
    /// `"0"` starts from any cached state when the caller gave none.
    pub fn watch_version(&self) -> &str {
        match self.resource_version.as_deref() {
            Some(rv) if !rv.is_empty() => rv,
            _ => "0",
        }
    }
}

/// Just the `watch` flag, read before a request is routed
#[derive(Deserialize, Debug, Default, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct WatchFlag {
    /// Turns a collection read into a watch
    #[serde(deserialize_with = "flag")]
    pub watch: bool,
}

/// Options of a get call
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct GetQuery {
    /// Resource version to read at
    pub resource_version: Option<String>,
}

impl From<&GetQuery> for GetParams {
    fn from(q: &GetQuery) -> Self {
        let mut gp = GetParams::default();
        gp.resource_version = q.resource_version.clone();
        gp
    }
}

/// Options of create, update and patch calls
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct WriteQuery {
    /// `All` for a dry run
    pub dry_run: Option<String>,
    /// Actor making the change
    pub field_manager: Option<String>,
    /// Force server-side apply through conflicts
    #[serde(deserialize_with = "flag")]
    pub force: bool,
    /// `Strict`, `Warn` or `Ignore`
    pub field_validation: Option<String>,
}

impl WriteQuery {
    /// Parameters for create and replace calls
    pub fn post_params(&self) -> Result<PostParams> {
        let mut pp = PostParams::default();
        pp.dry_run = dry_run(self.dry_run.as_deref())?;
        pp.field_manager = self.field_manager.clone();
        Ok(pp)
    }

    /// Parameters for patch calls
    pub fn patch_params(&self) -> Result<PatchParams> {
        let mut pp = PatchParams::default();
        pp.dry_run = dry_run(self.dry_run.as_deref())?;
        pp.force = self.force;
        pp.field_manager = self.field_manager.clone();
        pp.field_validation = match self.field_validation.as_deref() {
            None | Some("") => None,
            Some("Strict") => Some(ValidationDirective::Strict),
            Some("Warn") => Some(ValidationDirective::Warn),
            Some("Ignore") => Some(ValidationDirective::Ignore),
            Some(other) => return Err(Error::Decode(format!("unknown fieldValidation {other:?}"))),
        };
        Ok(pp)
    }
}

/// Options of delete calls given in the query
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DeleteQuery {
    /// `All` for a dry run
    pub dry_run: Option<String>,
    /// Seconds before the object is removed
    pub grace_period_seconds: Option<u32>,
    /// `Orphan`, `Background` or `Foreground`
    pub propagation_policy: Option<String>,
}

/// Options of delete calls given as a `DeleteOptions` body
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DeleteOptions {
    /// `["All"]` for a dry run
    pub dry_run: Vec<String>,
    /// Seconds before the object is removed
    pub grace_period_seconds: Option<u32>,
    /// `Orphan`, `Background` or `Foreground`
    pub propagation_policy: Option<String>,
    /// Deprecated switch for orphaning dependents
    pub orphan_dependents: Option<bool>,
    /// Must hold for the delete to go ahead
    pub preconditions: Option<DeletePreconditions>,
}

/// Preconditions section of a `DeleteOptions` body
#[derive(Deserialize, Debug, Default, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct DeletePreconditions {
    /// Expected resource version
    pub resource_version: Option<String>,
    /// Expected uid
    pub uid: Option<String>,
}

impl DeleteQuery {
    /// Merge query options with an optional body; the body wins
    pub fn delete_params(&self, body: Option<DeleteOptions>) -> Result<DeleteParams> {
        let body = body.unwrap_or_default();
        let mut dp = DeleteParams::default();
        dp.dry_run = body.dry_run.iter().any(|d| d == "All") || dry_run(self.dry_run.as_deref())?;
        dp.grace_period_seconds = body.grace_period_seconds.or(self.grace_period_seconds);
        let policy = body.propagation_policy.as_deref().or(self.propagation_policy.as_deref());
        dp.propagation_policy = match policy {
            None | Some("") if body.orphan_dependents == Some(true) => Some(PropagationPolicy::Orphan),
            None | Some("") => None,
            Some("Orphan") => Some(PropagationPolicy::Orphan),
            Some("Background") => Some(PropagationPolicy::Background),
            Some("Foreground") => Some(PropagationPolicy::Foreground),
            Some(other) => return Err(Error::Decode(format!("unknown propagationPolicy {other:?}"))),
        };
        dp.preconditions = body.preconditions.map(|p| {
            let mut pre = Preconditions::default();
            pre.resource_version = p.resource_version;
            pre.uid = p.uid;
            pre
        });
        Ok(dp)
    }
}

/// Parse a `DeleteOptions` body, treating an empty body as absent
pub fn delete_options(body: &[u8]) -> Result<Option<DeleteOptions>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(|e| Error::Decode(format!("DeleteOptions: {e}")))
}

fn dry_run(value: Option<&str>) -> Result<bool> {
    match value {
        None | Some("") => Ok(false),
        Some("All") => Ok(true),
        Some(other) => Err(Error::Decode(format!("unknown dryRun value {other:?}"))),
    }
}

// query flags accept the same spellings as the API server
fn flag<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    // only an explicit false turns a flag off
    let raw = String::deserialize(deserializer)?;
    Ok(!matches!(raw.to_ascii_lowercase().as_str(), "false" | "0"))
}

/// A patch body, typed by the request `Content-Type`
#[derive(Debug, Clone, PartialEq)]
pub enum PatchBody {
    /// `application/merge-patch+json`
    Merge(Value),
    /// `application/strategic-merge-patch+json`
    Strategic(Value),
    /// `application/apply-patch+yaml`
    Apply(Value),
    /// `application/json-patch+json`
    Json(json_patch::Patch),
}

impl PatchBody {
    /// Decode `body` according to `content_type`
    pub fn parse(content_type: Option<&str>, body: &[u8]) -> Result<Self> {
        let mime = content_type
            .and_then(|ct| ct.split(';').next())
            .map(str::trim)
            .unwrap_or_default();
        let json = |body: &[u8]| serde_json::from_slice(body).map_err(|e| Error::Decode(format!("patch: {e}")));
        match mime {
            "application/merge-patch+json" => json(body).map(PatchBody::Merge),
            "application/strategic-merge-patch+json" => json(body).map(PatchBody::Strategic),
            "application/apply-patch+yaml" => serde_yaml::from_slice(body)
                .map(PatchBody::Apply)
                .map_err(|e| Error::Decode(format!("apply patch: {e}"))),
            "application/json-patch+json" => serde_json::from_slice(body)
                .map(PatchBody::Json)
                .map_err(|e| Error::Decode(format!("json patch: {e}"))),
            other => Err(Error::Decode(format!("unsupported patch content type {other:?}"))),
        }
    }

    /// The object document of merge-style patches
    pub fn document_mut(&mut self) -> Option<&mut Value> {
        match self {
            PatchBody::Merge(v) | PatchBody::Strategic(v) | PatchBody::Apply(v) => Some(v),
            PatchBody::Json(_) => None,
        }
    }

    /// Into the upstream client's patch type
    pub fn into_patch(self) -> Patch<Value> {
        match self {
            PatchBody::Merge(v) => Patch::Merge(v),
            PatchBody::Strategic(v) => Patch::Strategic(v),
            PatchBody::Apply(v) => Patch::Apply(v),
            PatchBody::Json(p) => Patch::Json(p),
        }
    }
}
