use crate::client::{Body, Client};
use crate::document::Document;
use serde_json::Value;
use sofa_core::{DocumentLister, Error, Headers, Query, QueryParams, Result};
use std::sync::Arc;

/// A named database on the server.
///
/// Documents hold an `Arc<Database>` to reach the client; share one
/// instance across them.
#[derive(Debug)]
pub struct Database {
    name: String,
    client: Arc<Client>,
}

impl Database {
    pub fn new(client: Arc<Client>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            client,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn client(&self) -> &Arc<Client> {
        &self.client
    }

    /// Whether the database exists
    pub async fn ping(&self) -> Result<bool> {
        let response = self.client.head(&self.name, None, Headers::new()).await?;
        Ok(response.status_code() == 200)
    }

    pub async fn info(&self) -> Result<Value> {
        let response = self.client.get(&self.name, None, Headers::new()).await?;
        Ok(response.into_data())
    }

    pub async fn create(&self) -> Result<Value> {
        let response = self
            .client
            .put(&self.name, None, Body::Empty, Headers::new())
            .await?;
        Ok(response.into_data())
    }

    /// Delete the database and everything in it
    pub async fn drop_database(&self) -> Result<Value> {
        let response = self.client.delete(&self.name, None, Headers::new()).await?;
        Ok(response.into_data())
    }

    /// List documents through `_all_docs`
    pub async fn get_document_all(&self, params: &QueryParams) -> Result<Value> {
        let query = Query::from_params(params.clone());
        let response = self
            .client
            .get(&format!("{}/_all_docs", self.name), Some(&query), Headers::new())
            .await?;
        Ok(response.into_data())
    }

    /// A query bound to this database
    pub fn query(self: &Arc<Self>) -> Query {
        Query::with_database(self.clone())
    }

    /// A new document bound to this database
    pub fn document(self: &Arc<Self>, id: impl Into<String>) -> Document {
        let mut document = Document::new(self.clone());
        document.set_id(id);
        document
    }

    /// Fetch and hydrate a document; `None` unless the server answers 200.
    pub async fn get_document(self: &Arc<Self>, id: &str) -> Result<Option<Document>> {
        if id.is_empty() {
            return Err(Error::precondition("_id field could not be empty"));
        }
        let response = self
            .client
            .get(&format!("{}/{}", self.name, id), None, Headers::new())
            .await?;
        if response.status_code() != 200 {
            return Ok(None);
        }

        let mut document = Document::new(self.clone());
        if let Value::Object(data) = response.into_data() {
            document.set_data(data);
        }
        Ok(Some(document))
    }
}

#[async_trait::async_trait]
impl DocumentLister for Database {
    async fn get_document_all(&self, params: &QueryParams) -> Result<Value> {
        Database::get_document_all(self, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockAgent;
    use serde_json::json;
    use sofa_core::{ClientConfig, Method};

    fn database(agent: &Arc<MockAgent>) -> Arc<Database> {
        let client = Client::with_agent(ClientConfig::new("http://couch:5984"), agent.clone());
        Arc::new(Database::new(Arc::new(client), "books"))
    }

    #[tokio::test]
    async fn test_query_run_lists_all_docs() {
        let agent = MockAgent::new();
        agent.push_json(200, json!({"total_rows": 1, "offset": 0, "rows": [{"id": "doc1"}]}));
        let db = database(&agent);

        let mut query = db.query();
        query.limit(10).set("include_docs", true);
        let result = query.run().await.unwrap();

        assert_eq!(result["total_rows"], json!(1));
        let request = agent.last_request();
        assert_eq!(request.method(), Method::Get);
        assert_eq!(
            request.uri(),
            "http://couch:5984/books/_all_docs?limit=10&include_docs=true"
        );
    }

    #[tokio::test]
    async fn test_get_document_hydrates() {
        let agent = MockAgent::new();
        agent.push_json(200, json!({"_id": "doc1", "_rev": "3-ccc", "title": "Dune"}));
        agent.push_json(404, json!({"error": "not_found"}));
        let db = database(&agent);

        let doc = db.get_document("doc1").await.unwrap().unwrap();
        assert_eq!(doc.id(), "doc1");
        assert_eq!(doc.rev(), "3-ccc");
        assert_eq!(doc.get_data("title"), Some(&json!("Dune")));

        assert!(db.get_document("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_document_requires_id() {
        let agent = MockAgent::new();
        agent.push_json(200, json!({"db_name": "books", "doc_count": 3}));
        let db = database(&agent);

        let err = db.get_document("").await.unwrap_err();
        assert!(err.is_precondition());
        assert_eq!(agent.request_count(), 0);
    }

    #[tokio::test]
    async fn test_database_level_calls() {
        let agent = MockAgent::new();
        agent.push_json(201, json!({"ok": true}));
        agent.push_status(200);
        agent.push_json(200, json!({"db_name": "books", "doc_count": 0}));
        agent.push_json(200, json!({"ok": true}));
        let db = database(&agent);

        assert_eq!(db.create().await.unwrap()["ok"], json!(true));
        assert!(db.ping().await.unwrap());
        assert_eq!(db.info().await.unwrap()["db_name"], json!("books"));
        db.drop_database().await.unwrap();

        let methods: Vec<_> = agent.requests().iter().map(|r| r.method()).collect();
        assert_eq!(
            methods,
            vec![Method::Put, Method::Head, Method::Get, Method::Delete]
        );
        assert!(agent
            .requests()
            .iter()
            .all(|r| r.uri() == "http://couch:5984/books"));
    }
}
