use crate::attachment::DocumentAttachment;
use crate::client::Body;
use crate::database::Database;
use serde_json::{Map, Value};
use sofa_core::util::quoted;
use sofa_core::{Error, Headers, Query, Result};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

/// A JSON document stored in a [`Database`].
///
/// Lifecycle: new → identified (id set) → persisted (revision known, after
/// `save` or `find`) → deleted (after `remove`).
///
/// Operations that need `id` or `revision` check them before any request is
/// sent and return [`Error::Precondition`] when they are missing.
#[derive(Debug, Clone, Default)]
pub struct Document {
    database: Option<Arc<Database>>,
    id: String,
    rev: String,
    deleted: bool,
    fields: Map<String, Value>,
    attachments: BTreeMap<String, DocumentAttachment>,
}

impl Document {
    pub fn new(database: Arc<Database>) -> Self {
        Self {
            database: Some(database),
            ..Default::default()
        }
    }

    pub fn with_data(database: Arc<Database>, data: Map<String, Value>) -> Self {
        let mut document = Self::new(database);
        document.set_data(data);
        document
    }

    pub fn set_database(&mut self, database: Arc<Database>) {
        self.database = Some(database);
    }

    pub fn database(&self) -> Result<&Arc<Database>> {
        self.database
            .as_ref()
            .ok_or_else(|| Error::precondition("document is not bound to a database"))
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    pub fn set_rev(&mut self, rev: impl Into<String>) {
        self.rev = rev.into();
    }

    pub fn set_deleted(&mut self, deleted: bool) {
        self.deleted = deleted;
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn rev(&self) -> &str {
        &self.rev
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Merge `data` into the document.
    ///
    /// `_id`, `_rev`, `_deleted` and `_attachments` update the matching
    /// properties; every other key lands in the field mapping.
    pub fn set_data(&mut self, data: impl IntoIterator<Item = (String, Value)>) {
        for (key, value) in data {
            match key.as_str() {
                "_id" => {
                    if let Some(id) = scalar_string(&value) {
                        self.id = id;
                    }
                }
                "_rev" => {
                    if let Some(rev) = scalar_string(&value) {
                        self.rev = rev;
                    }
                }
                "_deleted" => {
                    if !value.is_null() {
                        self.deleted = truthy(&value);
                    }
                }
                "_attachments" => {
                    if let Value::Object(stubs) = value {
                        for (name, stub) in stubs {
                            let attachment = DocumentAttachment::from_stub(&name, &stub);
                            self.attachments.insert(name, attachment);
                        }
                    }
                }
                _ => {
                    self.fields.insert(key, value);
                }
            }
        }
    }

    /// Set a single field (reserved keys are routed like `set_data`).
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.set_data([(key.into(), value.into())]);
    }

    pub fn get_data(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Field mapping, reserved keys excluded
    pub fn data(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn remove_field(&mut self, key: &str) -> Option<Value> {
        self.fields.remove(key)
    }

    pub fn set_attachment(&mut self, attachment: DocumentAttachment) {
        self.attachments
            .insert(attachment.file_name().to_string(), attachment);
    }

    pub fn attachment(&self, name: &str) -> Option<&DocumentAttachment> {
        self.attachments.get(name)
    }

    pub fn attachment_mut(&mut self, name: &str) -> Option<&mut DocumentAttachment> {
        self.attachments.get_mut(name)
    }

    pub fn attachments(&self) -> &BTreeMap<String, DocumentAttachment> {
        &self.attachments
    }

    pub fn unset_attachment(&mut self, name: &str) -> Option<DocumentAttachment> {
        self.attachments.remove(name)
    }

    pub fn unset_attachments(&mut self) {
        self.attachments.clear();
    }

    /// JSON body as sent to the server.
    pub fn to_value(&self) -> Value {
        let mut body = Map::new();
        if !self.id.is_empty() {
            body.insert("_id".to_string(), Value::String(self.id.clone()));
        }
        if !self.rev.is_empty() {
            body.insert("_rev".to_string(), Value::String(self.rev.clone()));
        }
        if self.deleted {
            body.insert("_deleted".to_string(), Value::Bool(true));
        }
        for (key, value) in &self.fields {
            body.insert(key.clone(), value.clone());
        }
        let attachments = self
            .attachments
            .iter()
            .filter_map(|(name, attachment)| Some((name.clone(), attachment.embedded()?)))
            .collect::<Map<_, _>>();
        if !attachments.is_empty() {
            body.insert("_attachments".to_string(), Value::Object(attachments));
        }
        Value::Object(body)
    }

    pub(crate) fn path(&self) -> Result<String> {
        if self.id.is_empty() {
            return Err(Error::precondition("_id field could not be empty"));
        }
        Ok(format!("{}/{}", self.database()?.name(), self.id))
    }

    /// HEAD the document; true when the status is one of `expected`.
    pub async fn ping(&self, expected: &[u16]) -> Result<bool> {
        let path = self.path()?;
        let mut headers = Headers::new();
        if !self.rev.is_empty() {
            headers.set("If-None-Match", quoted(&self.rev));
        }

        let response = self.database()?.client().head(&path, None, headers).await?;
        Ok(response.status_in(expected))
    }

    pub async fn is_exists(&self) -> Result<bool> {
        self.ping(&[200, 304]).await
    }

    pub async fn is_not_modified(&self) -> Result<bool> {
        if self.rev.is_empty() {
            return Err(Error::precondition("_rev field could not be empty"));
        }
        self.ping(&[304]).await
    }

    pub async fn find(&self, query: Option<&Query>) -> Result<Value> {
        let path = self.path()?;
        let response = self
            .database()?
            .client()
            .get(&path, query, Headers::new())
            .await?;
        Ok(response.into_data())
    }

    /// Revision history, if the server returned one
    pub async fn find_revisions(&self) -> Result<Option<Value>> {
        let mut query = Query::new();
        query.set("revs", true);
        let mut data = self.find(Some(&query)).await?;
        Ok(data.get_mut("_revisions").map(Value::take))
    }

    /// POST the document to its database.
    ///
    /// An empty id is replaced with a generated one first. The `id` and `rev`
    /// the server answers with are applied to this document.
    pub async fn save(&mut self, batch: bool, full_commit: bool) -> Result<Value> {
        let database = self.database()?.clone();

        if self.id.is_empty() {
            self.id = uuid::Uuid::new_v4().simple().to_string();
            debug!("Assigned generated id {}", self.id);
        }

        for attachment in self.attachments.values_mut() {
            if attachment.file().is_some() {
                attachment.read_file(true).await?;
            }
        }

        let mut headers = Headers::new();
        headers.set("Content-Type", "application/json");
        if full_commit {
            headers.set("X-Couch-Full-Commit", "true");
        }

        let response = database
            .client()
            .post(
                database.name(),
                batch_query(batch).as_ref(),
                Body::Json(self.to_value()),
                headers,
            )
            .await?;

        let data = response.into_data();
        if let Some(id) = data.get("id").and_then(Value::as_str) {
            self.id = id.to_string();
        }
        if let Some(rev) = data.get("rev").and_then(Value::as_str) {
            self.rev = rev.to_string();
        }
        Ok(data)
    }

    /// DELETE the document at its current revision.
    pub async fn remove(&mut self, batch: bool, full_commit: bool) -> Result<Value> {
        if self.id.is_empty() || self.rev.is_empty() {
            return Err(Error::precondition(
                "both _id and _rev fields could not be empty",
            ));
        }
        let path = self.path()?;

        let mut headers = Headers::new();
        headers.set("If-Match", self.rev.as_str());
        if full_commit {
            headers.set("X-Couch-Full-Commit", "true");
        }

        let response = self
            .database()?
            .client()
            .delete(&path, batch_query(batch).as_ref(), headers)
            .await?;

        let data = response.into_data();
        if data.get("ok").and_then(Value::as_bool) == Some(true) {
            self.deleted = true;
            if let Some(rev) = data.get("rev").and_then(Value::as_str) {
                self.rev = rev.to_string();
            }
        }
        Ok(data)
    }

    /// COPY the document to `destination`.
    pub async fn copy(&self, destination: &str, batch: bool, full_commit: bool) -> Result<Value> {
        let revision = (!self.rev.is_empty()).then_some(self.rev.as_str());
        self.copy_with(revision, destination, batch, full_commit).await
    }

    /// Copy a specific revision of this document.
    pub async fn copy_from(&self, revision: &str, destination: &str) -> Result<Value> {
        if revision.is_empty() {
            return Err(Error::precondition("source revision could not be empty"));
        }
        self.copy_with(Some(revision), destination, false, false)
            .await
    }

    /// Copy onto an existing document, which needs its current revision.
    pub async fn copy_to(&self, destination: &str, destination_rev: &str) -> Result<Value> {
        if destination_rev.is_empty() {
            return Err(Error::precondition("destination revision could not be empty"));
        }
        let revision = (!self.rev.is_empty()).then_some(self.rev.as_str());
        let destination = format!("{}?rev={}", destination, destination_rev);
        self.copy_with(revision, &destination, false, false).await
    }

    async fn copy_with(
        &self,
        revision: Option<&str>,
        destination: &str,
        batch: bool,
        full_commit: bool,
    ) -> Result<Value> {
        let path = self.path()?;

        let mut headers = Headers::new();
        if let Some(revision) = revision {
            headers.set("If-Match", revision);
        }
        headers.set("Destination", destination);
        if full_commit {
            headers.set("X-Couch-Full-Commit", "true");
        }

        let response = self
            .database()?
            .client()
            .copy(&path, batch_query(batch).as_ref(), headers)
            .await?;
        Ok(response.into_data())
    }
}

pub(crate) fn batch_query(batch: bool) -> Option<Query> {
    batch.then(|| {
        let mut query = Query::new();
        query.set("batch", "ok");
        query
    })
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
        Value::String(s) => !s.is_empty() && s != "0",
        Value::Array(items) => !items.is_empty(),
        Value::Object(_) => true,
        Value::Null => false,
    }
}
