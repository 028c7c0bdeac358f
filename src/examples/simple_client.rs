//! Simple Client Example
//!
//! Creates a database, saves a document, attaches a file and lists what is
//! stored. Needs a server on http://localhost:5984.
//!
//! Run with: cargo run --example simple_client

use sofa_rs::{Client, Database, DocumentAttachment};
use std::sync::Arc;

#[tokio::main]
async fn main() -> sofa_rs::Result<()> {
    println!("Simple sofa client example\n");

    let client = Arc::new(Client::new("http://localhost:5984"));
    let db = Arc::new(Database::new(client, "sofa_example"));
    if !db.ping().await? {
        db.create().await?;
    }
    println!("Database ready: {}\n", db.name());

    let mut doc = db.document("dune");
    doc.set("title", "Dune");
    doc.set("year", 1965);
    let saved = doc.save(false, false).await?;
    println!("Saved: {}", saved);
    println!("   id={} rev={}\n", doc.id(), doc.rev());

    let notes = std::env::temp_dir().join("dune-notes.txt");
    std::fs::write(&notes, "Fear is the mind-killer.").map_err(|source| sofa_rs::Error::Io {
        path: notes.clone(),
        source,
    })?;
    let mut attachment = DocumentAttachment::from_file(&notes);
    let attached = attachment.save(&doc).await?;
    println!("Attached {}: {}\n", attachment.file_name(), attached);

    let mut query = db.query();
    query.limit(10).set("include_docs", true);
    let listing = query.run().await?;
    println!("All documents: {}", listing);

    Ok(())
}
