#![allow(dead_code)]

use bson::{Bson, doc};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use querylayer::prelude::*;

/// One connection under test, created through the registry.
pub struct Backend {
    pub label: &'static str,
    pub manager: DocumentManager,
    pub schema: Arc<dyn SchemaManager>,
}

pub struct Fixture {
    pub ann: Document,
    pub bob: Document,
    pub cid: Document,
    pub posts: Vec<Document>,
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A fresh SQLite in-memory database and a fresh in-memory document store,
/// both with `people` and `posts` tables.
pub async fn backends() -> Vec<Backend> {
    init_tracing();

    let config = DatabaseConfig::new("sql")
        .connection("sql", ConnectionConfig::sqlite(":memory:"))
        .connection("docs", ConnectionConfig::memory());
    let registry = ConnectionRegistry::boot(config, &DriverTable::default()).await.unwrap();

    let mut backends = Vec::new();

    for (label, connection) in [("sqlite", "sql"), ("memory", "docs")] {
        let manager = registry.document_manager(Some(connection)).await.unwrap();
        let schema = registry.schema(Some(connection)).await.unwrap();

        schema
            .create_table(&TableBlueprint::new("people").string("name").integer("age"))
            .await
            .unwrap();
        schema
            .create_table(&TableBlueprint::new("posts").string("title").string("author_id"))
            .await
            .unwrap();

        backends.push(Backend { label, manager, schema });
    }

    backends
}

pub fn id_of(document: &Document) -> String {
    document.get_str("id").unwrap().to_string()
}

/// Ann (31) wrote p1 and p2, Bob (24) and Cid (40) wrote nothing, p3 has no author.
pub async fn seed(manager: &DocumentManager) -> Fixture {
    let people = manager
        .table("people")
        .insert_many(vec![
            doc! { "name": "Ann", "age": 31_i64 },
            doc! { "name": "Bob", "age": 24_i64 },
            doc! { "name": "Cid", "age": 40_i64 },
        ])
        .await
        .unwrap();

    let ann_id = id_of(&people[0]);
    let posts = manager
        .table("posts")
        .insert_many(vec![
            doc! { "title": "p1", "author_id": ann_id.as_str() },
            doc! { "title": "p2", "author_id": ann_id.as_str() },
            doc! { "title": "p3", "author_id": Bson::Null },
        ])
        .await
        .unwrap();

    let mut people = people.into_iter();

    Fixture {
        ann: people.next().unwrap(),
        bob: people.next().unwrap(),
        cid: people.next().unwrap(),
        posts,
    }
}

pub fn names(rows: &[Document]) -> Vec<String> {
    rows.iter()
        .map(|row| row.get_str("name").unwrap_or_default().to_string())
        .collect()
}

pub fn titles(rows: &[Document]) -> Vec<String> {
    rows.iter()
        .map(|row| row.get_str("title").unwrap_or_default().to_string())
        .collect()
}
