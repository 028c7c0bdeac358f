use crate::client::Body;
use crate::database::Database;
use crate::document::{batch_query, Document};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde_json::{json, Map, Value};
use sofa_core::util::{encode_path_segment, quoted};
use sofa_core::{Error, Headers, Query, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Loaded attachment bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentData {
    Raw(Vec<u8>),
    Base64(String),
}

/// Result of fetching an attachment
#[derive(Debug, Clone)]
pub struct AttachmentContent {
    pub content: Vec<u8>,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    /// `md5-<value>` taken from `Content-MD5` or the `ETag`
    pub digest: String,
}

/// A file attached to a [`Document`].
///
/// Remote operations take the owning document explicitly; it must be bound
/// to a database and carry an id. The local file is read lazily by
/// [`read_file`](Self::read_file), `save` and the serializers.
#[derive(Debug, Clone, Default)]
pub struct DocumentAttachment {
    file: Option<PathBuf>,
    file_name: String,
    data: Option<AttachmentData>,
    data_length: Option<u64>,
    content_type: Option<String>,
    digest: Option<String>,
}

impl DocumentAttachment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attachment sourced from a local file, named after its base name.
    pub fn from_file(file: impl Into<PathBuf>) -> Self {
        let mut attachment = Self::default();
        attachment.set_file(file);
        attachment
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    /// Build from an entry of a document's `_attachments` object.
    pub fn from_stub(name: &str, stub: &Value) -> Self {
        let text = |key: &str| stub.get(key).and_then(Value::as_str).map(str::to_string);
        Self {
            file: None,
            file_name: name.to_string(),
            data: text("data").map(AttachmentData::Base64),
            data_length: stub.get("length").and_then(Value::as_u64),
            content_type: text("content_type"),
            digest: text("digest"),
        }
    }

    /// Point at a local file; the name follows the file's base name.
    pub fn set_file(&mut self, file: impl Into<PathBuf>) {
        let file = file.into();
        self.file_name = file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.file = Some(file);
    }

    pub fn set_file_name(&mut self, file_name: impl Into<String>) {
        self.file_name = file_name.into();
    }

    pub fn set_content_type(&mut self, content_type: impl Into<String>) {
        self.content_type = Some(content_type.into());
    }

    pub fn set_digest(&mut self, digest: impl Into<String>) {
        self.digest = Some(digest.into());
    }

    pub fn file(&self) -> Option<&Path> {
        self.file.as_deref()
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn data(&self) -> Option<&AttachmentData> {
        self.data.as_ref()
    }

    /// Length of the raw content, before any base64 encoding
    pub fn data_length(&self) -> Option<u64> {
        self.data_length
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    fn target(&self, document: &Document, require_rev: bool) -> Result<(Arc<Database>, String)> {
        if document.id().is_empty() {
            return Err(Error::precondition("attachment document _id is required"));
        }
        if require_rev && document.rev().is_empty() {
            return Err(Error::precondition("attachment document _rev is required"));
        }
        if self.file_name.is_empty() {
            return Err(Error::precondition("attachment file name is required"));
        }

        let database = document.database()?.clone();
        let path = format!(
            "{}/{}/{}",
            database.name(),
            document.id(),
            encode_path_segment(&self.file_name)
        );
        Ok((database, path))
    }

    /// Revision query plus digest precondition shared by HEAD and GET.
    fn conditional(&self, document: &Document) -> (Query, Headers) {
        let mut query = Query::new();
        if !document.rev().is_empty() {
            query.set("rev", document.rev());
        }
        let mut headers = Headers::new();
        if let Some(digest) = self.digest.as_deref().filter(|d| !d.is_empty()) {
            headers.set("If-None-Match", quoted(digest));
        }
        (query, headers)
    }

    /// HEAD the attachment; true when the status is one of `expected`.
    pub async fn ping(&self, document: &Document, expected: &[u16]) -> Result<bool> {
        let (database, path) = self.target(document, false)?;
        let (query, headers) = self.conditional(document);

        let response = database.client().head(&path, Some(&query), headers).await?;
        Ok(response.status_in(expected))
    }

    /// GET the attachment. Statuses other than 200 and 304 yield `None`.
    pub async fn find(&self, document: &Document) -> Result<Option<AttachmentContent>> {
        let (database, path) = self.target(document, false)?;
        let (query, headers) = self.conditional(document);

        let response = database.client().get(&path, Some(&query), headers).await?;
        if !response.status_in(&[200, 304]) {
            return Ok(None);
        }

        let digest = match response.header("Content-MD5") {
            Some(md5) => format!("md5-{}", md5),
            None => format!(
                "md5-{}",
                response.header("ETag").unwrap_or_default().trim_matches('"')
            ),
        };

        Ok(Some(AttachmentContent {
            content_type: response.header("Content-Type").map(str::to_string),
            content_length: response
                .header("Content-Length")
                .and_then(|len| len.trim().parse().ok()),
            digest,
            content: response.into_body(),
        }))
    }

    /// PUT the local file as raw bytes under the document's current revision.
    pub async fn save(&mut self, document: &Document) -> Result<Value> {
        let (database, path) = self.target(document, true)?;
        self.read_file(false).await?;

        let body = match &self.data {
            Some(AttachmentData::Raw(bytes)) => bytes.clone(),
            Some(AttachmentData::Base64(encoded)) => encoded.clone().into_bytes(),
            None => Vec::new(),
        };

        let mut headers = Headers::new();
        headers.set("If-Match", document.rev());
        if let Some(content_type) = &self.content_type {
            headers.set("Content-Type", content_type.as_str());
        }

        let response = database
            .client()
            .put(&path, None, Body::Bytes(body), headers)
            .await?;
        Ok(response.into_data())
    }

    pub async fn remove(
        &self,
        document: &Document,
        batch: bool,
        full_commit: bool,
    ) -> Result<Value> {
        let (database, path) = self.target(document, true)?;

        let mut headers = Headers::new();
        headers.set("If-Match", document.rev());
        if full_commit {
            headers.set("X-Couch-Full-Commit", "true");
        }

        let response = database
            .client()
            .delete(&path, batch_query(batch).as_ref(), headers)
            .await?;
        Ok(response.into_data())
    }

    /// Load the local file, detecting its content type.
    ///
    /// With `encode` the data is stored base64-encoded; the recorded length
    /// is always that of the raw bytes.
    pub async fn read_file(&mut self, encode: bool) -> Result<()> {
        let file = self
            .file
            .as_ref()
            .ok_or_else(|| Error::precondition("attachment has no source file"))?;

        let bytes = tokio::fs::read(file).await.map_err(|source| Error::Io {
            path: file.clone(),
            source,
        })?;

        self.content_type = Some(detect_content_type(&bytes).to_string());
        self.data_length = Some(bytes.len() as u64);
        self.data = Some(if encode {
            AttachmentData::Base64(STANDARD.encode(&bytes))
        } else {
            AttachmentData::Raw(bytes)
        });
        Ok(())
    }

    /// `{data, content_type}` for embedding under `_attachments`.
    pub async fn to_array(&mut self, encode: bool) -> Result<Value> {
        self.read_file(encode).await?;
        let data = match &self.data {
            Some(AttachmentData::Base64(encoded)) => Value::String(encoded.clone()),
            Some(AttachmentData::Raw(bytes)) => match std::str::from_utf8(bytes) {
                Ok(text) => Value::String(text.to_string()),
                Err(_) => {
                    return Err(Error::precondition(
                        "attachment data is not valid UTF-8, encode it as base64",
                    ))
                }
            },
            None => Value::Null,
        };
        Ok(json!({"data": data, "content_type": self.content_type}))
    }

    pub async fn to_json(&mut self) -> Result<String> {
        let value = self.to_array(true).await?;
        Ok(serde_json::to_string(&value)?)
    }

    /// Entry for the parent document body: inline when base64 data is
    /// loaded, otherwise a stub that keeps the server-side copy. `None` for
    /// a bare name with nothing behind it locally or remotely.
    pub(crate) fn embedded(&self) -> Option<Value> {
        match &self.data {
            Some(AttachmentData::Base64(encoded)) if self.file.is_some() => {
                Some(json!({"data": encoded, "content_type": self.content_type}))
            }
            None if self.file.is_none() && self.digest.is_none() => None,
            _ => {
                let mut stub = Map::new();
                stub.insert("stub".to_string(), Value::Bool(true));
                if let Some(content_type) = &self.content_type {
                    stub.insert("content_type".to_string(), json!(content_type));
                }
                Some(Value::Object(stub))
            }
        }
    }
}

/// Sniff a MIME type from file content.
fn detect_content_type(bytes: &[u8]) -> &'static str {
    if bytes.is_empty() {
        return "application/x-empty";
    }
    if let Some(kind) = infer::get(bytes) {
        return kind.mime_type();
    }
    if !bytes.contains(&0) && std::str::from_utf8(bytes).is_ok() {
        "text/plain"
    } else {
        "application/octet-stream"
    }
}
