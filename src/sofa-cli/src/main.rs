use anyhow::{bail, Context, Result};
use serde_json::{json, Value};
use sofa_rs::{Client, ClientConfig, Database, DocumentAttachment};
use std::path::Path;
use std::sync::Arc;

mod telemetry;

const USAGE: &str = "usage:
  sofa ping <db> <id>
  sofa get <db> <id>
  sofa all-docs <db> [limit]
  sofa attach <db> <id> <rev> <file>";

#[tokio::main]
async fn main() -> Result<()> {
    let _guard = telemetry::init_telemetry(Path::new("./logs"))?;

    let config = ClientConfig::load("sofa.json").unwrap_or_else(|e| {
        tracing::warn!("Failed to load sofa.json ({}), using defaults", e);
        ClientConfig::default()
    });
    tracing::info!("Server: {}", config.base_url());
    tracing::info!("  HTTP version: {:?}", config.http_version);
    tracing::info!("  Connect timeout: {}s", config.timeout_secs);

    let args: Vec<String> = std::env::args().skip(1).collect();
    let client = Arc::new(Client::with_config(config));

    let output = run(client, &args).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn run(client: Arc<Client>, args: &[String]) -> Result<Value> {
    let args: Vec<&str> = args.iter().map(String::as_str).collect();
    let database = |name: &str| Arc::new(Database::new(client.clone(), name));

    match args.as_slice() {
        ["ping", db, id] => {
            let exists = database(*db).document(*id).is_exists().await?;
            Ok(json!({"id": id, "exists": exists}))
        }
        ["get", db, id] => Ok(database(*db).document(*id).find(None).await?),
        ["all-docs", db] => Ok(database(*db).query().run().await?),
        ["all-docs", db, limit] => {
            let limit = limit.parse().context("limit must be a number")?;
            let mut query = database(*db).query();
            query.limit(limit);
            Ok(query.run().await?)
        }
        ["attach", db, id, rev, file] => {
            let mut document = database(*db).document(*id);
            document.set_rev(*rev);
            let mut attachment = DocumentAttachment::from_file(*file);
            let result = attachment
                .save(&document)
                .await
                .with_context(|| format!("Failed to attach {}", file))?;
            Ok(result)
        }
        _ => bail!(USAGE),
    }
}
