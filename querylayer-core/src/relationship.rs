//! Belongs-to and has-many resolution.
//!
//! Relationships are resolved with one secondary query against the target
//! table, through the same [`QueryExecutor`] as the primary query. Neither
//! backend's join support is assumed.
//!
//! # Example
//!
//! ```ignore
//! use querylayer::relationship::{Relationship, RelationshipResolver};
//!
//! let author = Relationship::belongs_to("author_id", "id", "people");
//! let owner = RelationshipResolver::new(executor.as_ref())
//!     .belongs_to(&post, &author)
//!     .await?;
//! ```

use bson::Bson;

use crate::{
    document::{Document, present},
    error::DatabaseResult,
    executor::QueryExecutor,
    expression::{Connective, Predicate, QueryExpression},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    BelongsTo,
    HasMany,
}

/// Describes how a document relates to rows of another table.
#[derive(Debug, Clone, PartialEq)]
pub struct Relationship {
    pub kind: RelationKind,
    /// Field of the source document holding the key.
    pub local_key: String,
    /// Field of the target rows compared against the local key.
    pub foreign_key: String,
    pub foreign_table: String,
    /// Extra equality conditions on the target rows.
    pub filter: Option<Document>,
}

impl Relationship {
    /// The source document holds the target's key (`post.author_id -> people.id`).
    pub fn belongs_to(
        local_key: impl Into<String>,
        foreign_key: impl Into<String>,
        foreign_table: impl Into<String>,
    ) -> Self {
        Self {
            kind: RelationKind::BelongsTo,
            local_key: local_key.into(),
            foreign_key: foreign_key.into(),
            foreign_table: foreign_table.into(),
            filter: None,
        }
    }

    /// Target rows hold the source's key (`people.id <- posts.author_id`).
    pub fn has_many(
        local_key: impl Into<String>,
        foreign_key: impl Into<String>,
        foreign_table: impl Into<String>,
    ) -> Self {
        Self {
            kind: RelationKind::HasMany,
            ..Self::belongs_to(local_key, foreign_key, foreign_table)
        }
    }

    pub fn with_filter(mut self, filter: Document) -> Self {
        self.filter = Some(filter);
        self
    }

    /// The lookup for `key`, or `None` when the key is absent.
    fn expression(&self, document: &Document) -> Option<QueryExpression> {
        let key = present(document, &self.local_key)?;

        let mut expression = key_lookup(&self.foreign_table, &self.foreign_key, vec![key.clone()]);

        for (field, value) in self.filter.iter().flatten() {
            expression.push_where(Connective::And, Predicate::eq(field.as_str(), value.clone()));
        }

        if self.kind == RelationKind::BelongsTo {
            expression.limit = Some(1);
        }

        Some(expression)
    }
}

/// Rows of `table` whose `foreign_key` equals one of `keys`.
///
/// This is the one query shape behind relationship resolution and emulated
/// joins. A single key compiles to an equality, several to `IN`.
pub fn key_lookup(table: &str, foreign_key: &str, keys: Vec<Bson>) -> QueryExpression {
    let predicate = match <[Bson; 1]>::try_from(keys) {
        Ok([key]) => Predicate::eq(foreign_key, key),
        Err(keys) => Predicate::is_in(foreign_key, keys),
    };

    let mut expression = QueryExpression::new(table);
    expression.push_where(Connective::And, predicate);
    expression
}

/// Runs relationship lookups against one executor.
#[derive(Debug, Clone, Copy)]
pub struct RelationshipResolver<'a> {
    executor: &'a dyn QueryExecutor,
}

impl<'a> RelationshipResolver<'a> {
    pub fn new(executor: &'a dyn QueryExecutor) -> Self {
        Self { executor }
    }

    /// Returns the related row, or `None` when the local key is absent or nothing matches.
    pub async fn belongs_to(&self, document: &Document, relationship: &Relationship) -> DatabaseResult<Option<Document>> {
        let Some(expression) = relationship.expression(document) else {
            return Ok(None);
        };

        Ok(self.executor.select(&expression).await?.into_iter().next())
    }

    /// Returns every related row; empty when the local key is absent or nothing matches.
    pub async fn has_many(&self, document: &Document, relationship: &Relationship) -> DatabaseResult<Vec<Document>> {
        let Some(expression) = relationship.expression(document) else {
            return Ok(Vec::new());
        };

        self.executor.select(&expression).await
    }

    /// Resolves either kind into a value suitable for embedding: a document or
    /// `null` for belongs-to, an array for has-many.
    pub async fn resolve(&self, document: &Document, relationship: &Relationship) -> DatabaseResult<Bson> {
        Ok(match relationship.kind {
            RelationKind::BelongsTo => self
                .belongs_to(document, relationship)
                .await?
                .map(Bson::Document)
                .unwrap_or(Bson::Null),
            RelationKind::HasMany => Bson::Array(
                self.has_many(document, relationship)
                    .await?
                    .into_iter()
                    .map(Bson::Document)
                    .collect(),
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        error::DatabaseError,
        executor::{BackendKind, Transaction, WriteOutcome},
    };
    use async_trait::async_trait;
    use bson::doc;
    use std::sync::Mutex;

    #[derive(Debug, Default)]
    struct CannedExecutor {
        rows: Vec<Document>,
        seen: Mutex<Vec<QueryExpression>>,
    }

    #[async_trait]
    impl QueryExecutor for CannedExecutor {
        fn backend(&self) -> BackendKind {
            BackendKind::Document
        }

        async fn select(&self, expression: &QueryExpression) -> DatabaseResult<Vec<Document>> {
            self.seen.lock().unwrap().push(expression.clone());
            Ok(self.rows.clone())
        }

        async fn count(&self, _expression: &QueryExpression) -> DatabaseResult<u64> {
            Ok(self.rows.len() as u64)
        }

        async fn execute(&self, _expression: &QueryExpression) -> DatabaseResult<WriteOutcome> {
            Err(DatabaseError::Unsupported("read only".into()))
        }

        async fn truncate(&self, _table: &str) -> DatabaseResult<()> {
            Ok(())
        }

        async fn begin(&self) -> DatabaseResult<Transaction> {
            Err(DatabaseError::Unsupported("read only".into()))
        }
    }

    #[test]
    fn key_lookups_use_equality_for_one_key_and_in_for_several() {
        let one = key_lookup("people", "id", vec![Bson::from("a1")]);
        assert_eq!(one.require_table().unwrap(), "people");
        assert_eq!(one.wheres[0].predicate, Predicate::eq("id", "a1"));

        let several = key_lookup("people", "id", vec![Bson::from("a1"), Bson::from("a2")]);
        assert_eq!(several.wheres[0].predicate, Predicate::is_in("id", ["a1", "a2"]));
    }

    #[tokio::test]
    async fn absent_local_key_skips_the_query() {
        let executor = CannedExecutor { rows: vec![doc! { "id": "a1" }], ..Default::default() };
        let resolver = RelationshipResolver::new(&executor);

        let post = doc! { "id": "p1", "author_id": Bson::Null };

        assert_eq!(resolver.belongs_to(&post, &Relationship::belongs_to("author_id", "id", "people")).await.unwrap(), None);
        assert!(resolver.has_many(&post, &Relationship::has_many("comment_id", "id", "comments")).await.unwrap().is_empty());
        assert!(executor.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn each_lookup_is_a_single_query() {
        let executor = CannedExecutor { rows: vec![doc! { "id": "c1" }, doc! { "id": "c2" }], ..Default::default() };
        let resolver = RelationshipResolver::new(&executor);

        let relationship = Relationship::has_many("id", "post_id", "comments").with_filter(doc! { "approved": true });
        let comments = resolver.has_many(&doc! { "id": "p1" }, &relationship).await.unwrap();

        assert_eq!(comments.len(), 2);

        let seen = executor.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].wheres.len(), 2);
        assert_eq!(seen[0].limit, None);
    }

    #[tokio::test]
    async fn resolve_embeds_null_or_arrays() {
        let executor = CannedExecutor::default();
        let resolver = RelationshipResolver::new(&executor);
        let post = doc! { "id": "p1", "author_id": "a9" };

        assert_eq!(
            resolver.resolve(&post, &Relationship::belongs_to("author_id", "id", "people")).await.unwrap(),
            Bson::Null
        );
        assert_eq!(
            resolver.resolve(&post, &Relationship::has_many("id", "post_id", "comments")).await.unwrap(),
            Bson::Array(Vec::new())
        );
    }
}
