//! Remote document store collaborator.
//!
//! The store holds JSON documents addressed by slash-separated paths. It is
//! reached through [`DocumentStore`]; [`HttpDocumentStore`] speaks the REST
//! convention (`{base}/{path}.json`), [`MemoryStore`] keeps everything in
//! process for tests and local runs.
//!
//! The typed readers at the bottom of this module are the only place raw
//! documents are turned into engine values.

use std::collections::{BTreeMap, HashSet};
use std::future::Future;
use std::sync::{Arc, RwLock};

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::StoreError;
use crate::models::{
    ControllerSchedule, DoseLogEntry, PefReading, RawStatusDocument, StatusDocument, SubjectId,
};

// ---

/// Inclusive bounds on the ordering field of a query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryRange {
    pub start_at: Option<i64>,
    pub end_at: Option<i64>,
}

impl QueryRange {
    fn contains(&self, value: i64) -> bool {
        self.start_at.map_or(true, |s| value >= s) && self.end_at.map_or(true, |e| value <= e)
    }
}

/// Asynchronous access to the remote document store.
///
/// Calls complete independently; nothing is assumed about the relative
/// order of in-flight requests.
pub trait DocumentStore: Clone + Send + Sync + 'static {
    /// Read one document. `None` when nothing is stored at `path`.
    fn get(&self, path: &str) -> impl Future<Output = Result<Option<Value>, StoreError>> + Send;

    /// Children of `path` whose numeric `order_by` field lies within `range`,
    /// ordered by that field.
    fn query(
        &self,
        path: &str,
        order_by: &str,
        range: QueryRange,
    ) -> impl Future<Output = Result<Vec<Value>, StoreError>> + Send;

    /// Overwrite the document at `path`.
    fn set(&self, path: &str, value: Value) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Apply several path writes as one patch.
    fn update(
        &self,
        patch: BTreeMap<String, Value>,
    ) -> impl Future<Output = Result<(), StoreError>> + Send;
}

// --- HTTP client

/// REST client for the remote store.
#[derive(Debug, Clone)]
pub struct HttpDocumentStore {
    // ---
    client: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl HttpDocumentStore {
    // ---
    pub fn new(base_url: impl Into<String>, auth_token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth_token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}.json", self.base_url, path.trim_matches('/'))
    }

    fn auth_params(&self) -> Vec<(&'static str, String)> {
        self.auth_token
            .iter()
            .map(|token| ("auth", token.clone()))
            .collect()
    }

    async fn read_json(path: &str, response: reqwest::Response) -> Result<Value, StoreError> {
        // ---
        let response = check_status(path, response)?;
        let body = response.bytes().await?;
        if body.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&body).map_err(|source| StoreError::Decode {
            path: path.to_string(),
            source,
        })
    }
}

fn check_status(path: &str, response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if !status.is_success() {
        return Err(StoreError::Status {
            path: path.to_string(),
            status: status.as_u16(),
        });
    }
    Ok(response)
}

impl DocumentStore for HttpDocumentStore {
    // ---
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        // ---
        let url = self.url(path);
        debug!("Store GET {}", url);

        let response = self.client.get(&url).query(&self.auth_params()).send().await?;
        let value = Self::read_json(path, response).await?;
        Ok((!value.is_null()).then_some(value))
    }

    async fn query(
        &self,
        path: &str,
        order_by: &str,
        range: QueryRange,
    ) -> Result<Vec<Value>, StoreError> {
        // ---
        let url = self.url(path);
        let mut params = self.auth_params();
        params.push(("orderBy", format!("\"{order_by}\"")));
        if let Some(start) = range.start_at {
            params.push(("startAt", start.to_string()));
        }
        if let Some(end) = range.end_at {
            params.push(("endAt", end.to_string()));
        }
        debug!("Store QUERY {} orderBy={} {:?}", url, order_by, range);

        let response = self.client.get(&url).query(&params).send().await?;
        let value = Self::read_json(path, response).await?;

        // The REST API answers with an unordered object keyed by child id
        Ok(ordered_children(value, order_by, range))
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        // ---
        let url = self.url(path);
        debug!("Store PUT {}", url);

        let response = self
            .client
            .put(&url)
            .query(&self.auth_params())
            .json(&value)
            .send()
            .await?;
        check_status(path, response)?;
        Ok(())
    }

    async fn update(&self, patch: BTreeMap<String, Value>) -> Result<(), StoreError> {
        // ---
        let url = self.url("");
        debug!("Store PATCH {} ({} paths)", url, patch.len());

        let response = self
            .client
            .patch(&url)
            .query(&self.auth_params())
            .json(&patch)
            .send()
            .await?;
        check_status("/", response)?;
        Ok(())
    }
}

// --- In-memory store

/// Store kept in process memory, sharing one JSON tree between clones.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    // ---
    root: Arc<RwLock<Value>>,
    failing: Arc<RwLock<HashSet<String>>>,
}

impl MemoryStore {
    // ---
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing JSON tree.
    pub fn with_root(root: Value) -> Self {
        Self {
            root: Arc::new(RwLock::new(root)),
            failing: Arc::default(),
        }
    }

    /// Make every read of `path` fail, as an unreachable store would.
    pub fn fail_reads_of(&self, path: &str) {
        if let Ok(mut failing) = self.failing.write() {
            failing.insert(normalize(path));
        }
    }

    fn check_readable(&self, path: &str) -> Result<(), StoreError> {
        let failing = self
            .failing
            .read()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))?;
        if failing.contains(&normalize(path)) {
            return Err(StoreError::Unavailable(format!("read of '{path}' failed")));
        }
        Ok(())
    }

    fn read(&self, path: &str) -> Result<Option<Value>, StoreError> {
        // ---
        self.check_readable(path)?;
        let root = self
            .root
            .read()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))?;

        let mut node = &*root;
        for segment in segments(path) {
            match node.get(segment) {
                Some(child) => node = child,
                None => return Ok(None),
            }
        }
        Ok((!node.is_null()).then(|| node.clone()))
    }

    fn write(&self, path: &str, value: Value) -> Result<(), StoreError> {
        // ---
        let mut root = self
            .root
            .write()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".into()))?;
        write_at(&mut root, &segments(path), value);
        Ok(())
    }
}

impl DocumentStore for MemoryStore {
    // ---
    async fn get(&self, path: &str) -> Result<Option<Value>, StoreError> {
        self.read(path)
    }

    async fn query(
        &self,
        path: &str,
        order_by: &str,
        range: QueryRange,
    ) -> Result<Vec<Value>, StoreError> {
        let value = self.read(path)?.unwrap_or(Value::Null);
        Ok(ordered_children(value, order_by, range))
    }

    async fn set(&self, path: &str, value: Value) -> Result<(), StoreError> {
        self.write(path, value)
    }

    async fn update(&self, patch: BTreeMap<String, Value>) -> Result<(), StoreError> {
        for (path, value) in patch {
            self.write(&path, value)?;
        }
        Ok(())
    }
}

fn normalize(path: &str) -> String {
    segments(path).join("/")
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn write_at(node: &mut Value, path: &[&str], value: Value) {
    // ---
    let Some((first, rest)) = path.split_first() else {
        *node = value;
        return;
    };
    if !node.is_object() {
        *node = Value::Object(Map::new());
    }
    if let Value::Object(map) = node {
        let child = map.entry(first.to_string()).or_insert(Value::Null);
        write_at(child, rest, value);
    }
}

/// Children of an object document filtered by `range` on `order_by` and
/// sorted by it. Children without a numeric `order_by` field are dropped.
fn ordered_children(value: Value, order_by: &str, range: QueryRange) -> Vec<Value> {
    // ---
    let children: Vec<Value> = match value {
        Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
        Value::Array(items) => items,
        _ => Vec::new(),
    };

    let mut keyed: Vec<(i64, Value)> = children
        .into_iter()
        .filter_map(|child| {
            let key = child.get(order_by).and_then(Value::as_i64)?;
            range.contains(key).then_some((key, child))
        })
        .collect();
    keyed.sort_by_key(|(key, _)| *key);
    keyed.into_iter().map(|(_, child)| child).collect()
}

// --- Store layout and typed reads

pub fn child_path(subject_id: &str) -> String {
    format!("children/{subject_id}")
}

pub fn schedule_path(subject_id: &str) -> String {
    format!("children/{subject_id}/controllerSchedule")
}

pub fn dose_log_path(subject_id: &str) -> String {
    format!("children/{subject_id}/doseLog")
}

pub fn pef_log_path(subject_id: &str) -> String {
    format!("children/{subject_id}/pefLog")
}

pub fn pef_zone_path(subject_id: &str) -> String {
    format!("children/{subject_id}/pefZone")
}

pub fn parent_children_path(parent_id: &str) -> String {
    format!("parents/{parent_id}/children")
}

/// Status document of one child, `None` when the child has no document.
pub async fn fetch_status<S: DocumentStore>(
    store: &S,
    subject_id: &str,
) -> Result<Option<StatusDocument>, StoreError> {
    // ---
    let path = child_path(subject_id);
    let Some(value) = store.get(&path).await? else {
        return Ok(None);
    };
    let raw: RawStatusDocument =
        serde_json::from_value(value).map_err(|source| StoreError::Decode { path, source })?;
    Ok(Some(raw.into_status(subject_id)))
}

/// The child's controller schedule. A stored schedule that fails to decode
/// is treated as not configured.
pub async fn fetch_schedule<S: DocumentStore>(
    store: &S,
    subject_id: &str,
) -> Result<Option<ControllerSchedule>, StoreError> {
    // ---
    let path = schedule_path(subject_id);
    let Some(value) = store.get(&path).await? else {
        return Ok(None);
    };
    match serde_json::from_value(value) {
        Ok(schedule) => Ok(Some(schedule)),
        Err(e) => {
            warn!("Ignoring invalid schedule at {}: {}", path, e);
            Ok(None)
        }
    }
}

pub async fn fetch_dose_log<S: DocumentStore>(
    store: &S,
    subject_id: &str,
    range: QueryRange,
) -> Result<Vec<DoseLogEntry>, StoreError> {
    let path = dose_log_path(subject_id);
    let values = store.query(&path, "timestampMillis", range).await?;
    Ok(decode_records(&path, values))
}

pub async fn fetch_pef_log<S: DocumentStore>(
    store: &S,
    subject_id: &str,
    range: QueryRange,
) -> Result<Vec<PefReading>, StoreError> {
    let path = pef_log_path(subject_id);
    let values = store.query(&path, "timestampMillis", range).await?;
    Ok(decode_records(&path, values))
}

/// Ids of the children linked to a parent account.
pub async fn fetch_children<S: DocumentStore>(
    store: &S,
    parent_id: &str,
) -> Result<Vec<SubjectId>, StoreError> {
    // ---
    let value = store.get(&parent_children_path(parent_id)).await?;
    let ids = match value {
        Some(Value::Object(map)) => map
            .into_iter()
            .filter(|(_, linked)| linked.as_bool().unwrap_or(true))
            .map(|(id, _)| id)
            .collect(),
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|item| item.as_str().map(String::from))
            .collect(),
        _ => Vec::new(),
    };
    Ok(ids)
}

fn decode_records<T: DeserializeOwned>(path: &str, values: Vec<Value>) -> Vec<T> {
    // ---
    let mut records = Vec::with_capacity(values.len());
    for (i, item) in values.into_iter().enumerate() {
        match serde_json::from_value::<T>(item) {
            Ok(record) => records.push(record),
            Err(e) => {
                debug!("Skipping record {} under {}: {}", i, path, e);
            }
        }
    }
    records
}
