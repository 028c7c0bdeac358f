use serde_json::Value;
use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::error::{Error, Result};
use crate::util::url_encode;

/// Ordered query parameters.
pub type QueryParams = Vec<(String, Value)>;

/// Anything that can list documents for a set of query parameters.
#[async_trait::async_trait]
pub trait DocumentLister: Send + Sync {
    async fn get_document_all(&self, params: &QueryParams) -> Result<Value>;
}

/// URL query builder.
///
/// The serialized form is computed once: after the first call to
/// [`Query::as_query_string`] that yields a non-empty string, later changes
/// to the parameters are not reflected in it. Build a new `Query` instead.
#[derive(Clone, Default)]
pub struct Query {
    database: Option<Arc<dyn DocumentLister>>,
    data: QueryParams,
    data_string: OnceLock<String>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from existing parameters, keys kept as given.
    pub fn from_params(data: QueryParams) -> Self {
        Self {
            data,
            ..Default::default()
        }
    }

    pub fn with_database(database: Arc<dyn DocumentLister>) -> Self {
        Self {
            database: Some(database),
            ..Default::default()
        }
    }

    pub fn set_database(&mut self, database: Arc<dyn DocumentLister>) {
        self.database = Some(database);
    }

    pub fn database(&self) -> Option<&Arc<dyn DocumentLister>> {
        self.database.as_ref()
    }

    /// Set a parameter; the key is trimmed and lowercased.
    pub fn set(&mut self, key: &str, value: impl Into<Value>) -> &mut Self {
        let key = key.trim().to_lowercase();
        self.insert(key, value.into());
        self
    }

    fn insert(&mut self, key: String, value: Value) {
        match self.data.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.data.push((key, value)),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.data.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn skip(&mut self, num: u64) -> &mut Self {
        self.insert("skip".to_string(), num.into());
        self
    }

    pub fn limit(&mut self, num: u64) -> &mut Self {
        self.insert("limit".to_string(), num.into());
        self
    }

    pub fn attachments(&mut self, include: bool) -> &mut Self {
        self.insert("attachments".to_string(), include.into());
        self
    }

    pub fn to_array(&self) -> &QueryParams {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Serialized `key=value&...` form, memoized.
    pub fn as_query_string(&self) -> String {
        if let Some(cached) = self.data_string.get() {
            return cached.clone();
        }

        let serialized = self
            .data
            .iter()
            .map(|(key, value)| {
                format!("{}={}", url_encode(key), url_encode(&render_value(value)))
            })
            .collect::<Vec<_>>()
            .join("&");

        // Empty results stay uncached so a later `set` still shows up
        if !serialized.is_empty() {
            let _ = self.data_string.set(serialized.clone());
        }
        serialized
    }

    /// List documents matching these parameters through the bound database.
    pub async fn run(&self) -> Result<Value> {
        let database = self.database.as_ref().ok_or_else(|| {
            Error::Config("set a database on the query before running it".to_string())
        })?;
        database.get_document_all(&self.data).await
    }
}

/// Render a parameter value the way the server expects it.
fn render_value(value: &Value) -> String {
    match value {
        Value::Bool(true) => "true".to_string(),
        Value::Bool(false) => "false".to_string(),
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_query_string())
    }
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("data", &self.data)
            .field("bound", &self.database.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[test]
    fn test_keys_normalized_and_values_encoded() {
        let mut query = Query::new();
        query
            .set("  StartKey ", "a b")
            .set("include_docs", true)
            .set("descending", false)
            .set("keys", json!(["x", "y"]));

        assert_eq!(
            query.to_string(),
            "startkey=a+b&include_docs=true&descending=false&keys=%5B%22x%22%2C%22y%22%5D"
        );
        assert_eq!(query.get("startkey"), Some(&json!("a b")));
    }

    #[test]
    fn test_keys_are_encoded() {
        let mut query = Query::new();
        query.set("start key", "a").set("a&b", "c");
        assert_eq!(query.to_string(), "start+key=a&a%26b=c");
    }

    #[test]
    fn test_set_overwrites_in_place() {
        let mut query = Query::new();
        query.set("limit", 5).set("skip", 2).set("LIMIT", 10);
        assert_eq!(query.as_query_string(), "limit=10&skip=2");
    }

    #[test]
    fn test_convenience_setters() {
        let mut query = Query::new();
        query.skip(20).limit(10).attachments(true);
        assert_eq!(query.to_string(), "skip=20&limit=10&attachments=true");
    }

    #[test]
    fn test_serialization_is_memoized() {
        let mut query = Query::new();
        query.set("limit", 1);
        let first = query.to_string();
        assert_eq!(first, query.to_string());

        // Cached string wins over later changes
        query.set("skip", 5);
        assert_eq!(query.to_string(), "limit=1");
        assert_eq!(query.to_array().len(), 2);
    }

    #[test]
    fn test_empty_serialization_not_cached() {
        let mut query = Query::new();
        assert_eq!(query.to_string(), "");
        query.set("revs", true);
        assert_eq!(query.to_string(), "revs=true");
    }

    #[tokio::test]
    async fn test_run_requires_database() {
        let query = Query::new();
        let err = query.run().await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    struct RecordingLister {
        seen: Mutex<Vec<QueryParams>>,
    }

    #[async_trait::async_trait]
    impl DocumentLister for RecordingLister {
        async fn get_document_all(&self, params: &QueryParams) -> Result<Value> {
            self.seen.lock().unwrap().push(params.clone());
            Ok(json!({"total_rows": 0, "rows": []}))
        }
    }

    #[tokio::test]
    async fn test_run_delegates_to_database() {
        let lister = Arc::new(RecordingLister {
            seen: Mutex::new(Vec::new()),
        });
        let mut query = Query::with_database(lister.clone());
        query.limit(3);

        let result = query.run().await.unwrap();
        assert_eq!(result["total_rows"], json!(0));

        let seen = lister.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0], vec![("limit".to_string(), json!(3))]);
    }
}
