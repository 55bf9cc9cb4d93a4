use async_trait::async_trait;
use bson::Bson;
use std::{collections::HashSet, sync::Arc};
use tracing::{debug, warn};

use crate::{
    document::{
        Document, DocumentCompiler, DocumentExt, JoinEmulator,
        compiler::requires_post_processing, join::lookup_path,
    },
    driver::{DocumentDriver, DocumentTransaction},
    error::{DatabaseError, DatabaseResult},
    executor::{BackendKind, QueryExecutor, Transaction, TransactionHandle, WriteOutcome},
    expression::{Column, Mutation, QueryExpression},
    identifier::IdentifierConcern,
};

/// [`QueryExecutor`] for document stores.
#[derive(Debug, Clone)]
pub struct DocumentExecutor {
    driver: Arc<dyn DocumentDriver>,
    compiler: DocumentCompiler,
}

impl DocumentExecutor {
    pub fn new(driver: Arc<dyn DocumentDriver>) -> Self {
        Self { driver, compiler: DocumentCompiler::new() }
    }

    pub fn driver(&self) -> &Arc<dyn DocumentDriver> {
        &self.driver
    }

    pub fn compiler(&self) -> &DocumentCompiler {
        &self.compiler
    }

    async fn select_rows(&self, expression: &QueryExpression) -> DatabaseResult<Vec<Document>> {
        let table = expression.require_table()?;
        let query = self.compiler.compile_find(expression)?;

        debug!(collection = %table, filter = %query.filter, sort = ?query.sort, "finding documents");

        let mut rows = self
            .driver
            .find(table, &query)
            .await?
            .into_iter()
            .map(|document| self.compiler.identifiers().to_canonical_document(document))
            .collect::<Vec<_>>();

        if expression.has_joins() {
            rows = JoinEmulator::new(self.driver.as_ref())
                .apply(rows, &expression.joins)
                .await?;
        }

        if !expression.groups.is_empty() {
            rows = first_per_key(rows, &expression.groups);
        }

        if !expression.distinct.is_empty() {
            let columns = expression.distinct.iter().map(|name| Column::new(name.as_str())).collect::<Vec<_>>();
            rows = first_per_key(select_columns(rows, &columns, &[]), &expression.distinct);
        } else if !expression.columns.is_empty() {
            let targets = expression.joins.iter().map(|join| join.target.as_str()).collect::<Vec<_>>();
            rows = select_columns(rows, &expression.columns, &targets);
        }

        if requires_post_processing(expression) {
            let skip = usize::try_from(expression.offset.unwrap_or(0)).unwrap_or(usize::MAX);
            let take = expression
                .limit
                .map(|limit| usize::try_from(limit).unwrap_or(usize::MAX))
                .unwrap_or(usize::MAX);

            rows = rows.into_iter().skip(skip).take(take).collect();
        }

        Ok(rows)
    }

    async fn count_rows(&self, expression: &QueryExpression) -> DatabaseResult<u64> {
        let table = expression.require_table()?;

        if requires_post_processing(expression) {
            return Ok(self.select_rows(&expression.for_count()).await?.len() as u64);
        }

        let filter = self.compiler.compile_filter(&expression.wheres)?;
        debug!(collection = %table, filter = %filter, "counting documents");

        self.driver.count(table, &filter).await
    }

    async fn insert(&self, table: &str, documents: &[Document]) -> DatabaseResult<WriteOutcome> {
        let identifiers = self.compiler.identifiers();
        let mut natives = Vec::with_capacity(documents.len());

        for document in documents {
            let document = document.clone().strip_undefined();
            let native = if document.has_id() {
                identifiers.to_native_document(document)?
            } else {
                let mut native = Document::new();
                native.insert(identifiers.native_field(), identifiers.generate_id());
                native.extend(document.into_iter().filter(|(key, _)| key != crate::document::ID_FIELD));
                native
            };

            natives.push(native);
        }

        debug!(collection = %table, documents = natives.len(), "inserting documents");
        self.driver.insert_many(table, natives.clone()).await?;

        Ok(WriteOutcome {
            affected: natives.len() as u64,
            inserted: natives
                .into_iter()
                .map(|native| identifiers.to_canonical_document(native))
                .collect(),
        })
    }

    async fn update(&self, table: &str, expression: &QueryExpression, values: &Document) -> DatabaseResult<WriteOutcome> {
        reject_joins(expression, "update")?;

        let filter = self.compiler.compile_filter(&expression.wheres)?;
        let set = values.without_id().strip_undefined();
        if set.is_empty() {
            return Ok(WriteOutcome::default());
        }

        debug!(collection = %table, filter = %filter, fields = set.len(), "updating documents");

        Ok(WriteOutcome {
            affected: self.driver.update_many(table, &filter, &set).await?,
            inserted: Vec::new(),
        })
    }

    async fn delete(&self, table: &str, expression: &QueryExpression) -> DatabaseResult<WriteOutcome> {
        reject_joins(expression, "delete")?;

        let filter = self.compiler.compile_filter(&expression.wheres)?;
        debug!(collection = %table, filter = %filter, "deleting documents");

        Ok(WriteOutcome {
            affected: self.driver.delete_many(table, &filter).await?,
            inserted: Vec::new(),
        })
    }
}

#[async_trait]
impl QueryExecutor for DocumentExecutor {
    fn backend(&self) -> BackendKind {
        BackendKind::Document
    }

    async fn select(&self, expression: &QueryExpression) -> DatabaseResult<Vec<Document>> {
        match self.select_rows(expression).await {
            Err(DatabaseError::InvalidIdentifier(reason)) => {
                warn!(table = ?expression.table, %reason, "unparseable identifier in select, returning no rows");
                Ok(Vec::new())
            }
            result => result,
        }
    }

    async fn count(&self, expression: &QueryExpression) -> DatabaseResult<u64> {
        match self.count_rows(expression).await {
            Err(DatabaseError::InvalidIdentifier(reason)) => {
                warn!(table = ?expression.table, %reason, "unparseable identifier in count, returning 0");
                Ok(0)
            }
            result => result,
        }
    }

    async fn execute(&self, expression: &QueryExpression) -> DatabaseResult<WriteOutcome> {
        let table = expression.require_table()?;

        match &expression.mutation {
            Mutation::Insert(documents) => self.insert(table, documents).await,
            Mutation::Update(values) => self.update(table, expression, values).await,
            Mutation::Delete => self.delete(table, expression).await,
            Mutation::Select => Err(DatabaseError::Unsupported(
                "execute called without a write payload".to_string(),
            )),
        }
    }

    async fn truncate(&self, table: &str) -> DatabaseResult<()> {
        debug!(collection = %table, "truncating collection");
        self.driver.delete_many(table, &Document::new()).await?;
        Ok(())
    }

    async fn begin(&self) -> DatabaseResult<Transaction> {
        let transaction = self.driver.begin().await?;
        debug!("began document transaction");

        let scoped = DocumentExecutor { driver: transaction.driver(), compiler: self.compiler.clone() };

        Ok(Transaction::new(Arc::new(scoped), Box::new(DocumentTransactionHandle(transaction))))
    }
}

#[derive(Debug)]
struct DocumentTransactionHandle(Box<dyn DocumentTransaction>);

#[async_trait]
impl TransactionHandle for DocumentTransactionHandle {
    async fn commit(&self) -> DatabaseResult<()> {
        self.0.commit().await
    }

    async fn rollback(&self) -> DatabaseResult<()> {
        self.0.rollback().await
    }
}

fn reject_joins(expression: &QueryExpression, statement: &str) -> DatabaseResult<()> {
    if expression.has_joins() {
        return Err(DatabaseError::Unsupported(format!("joins in a {statement} on a document connection")));
    }

    Ok(())
}

/// Keeps the first row for each distinct combination of `columns`.
fn first_per_key(rows: Vec<Document>, columns: &[String]) -> Vec<Document> {
    let mut seen = HashSet::new();

    rows.into_iter()
        .filter(|row| {
            let key = columns
                .iter()
                .map(|column| lookup_path(row, column).cloned().unwrap_or(Bson::Null))
                .collect::<Vec<_>>();

            seen.insert(format!("{key:?}"))
        })
        .collect()
}

/// Reduces rows to the selected columns under their output names, keeping join targets.
fn select_columns(rows: Vec<Document>, columns: &[Column], targets: &[&str]) -> Vec<Document> {
    rows.into_iter()
        .map(|row| {
            let mut selected = Document::new();

            for column in columns {
                if let Some(value) = lookup_path(&row, &column.name) {
                    selected.insert(column.output_name(), value.clone());
                }
            }
            for target in targets {
                if let Some(value) = row.get(*target) {
                    selected.insert(*target, value.clone());
                }
            }

            selected
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn grouping_keeps_the_first_row_per_key() {
        let rows = vec![
            doc! { "name": "a", "team": "x" },
            doc! { "name": "b", "team": "y" },
            doc! { "name": "c", "team": "x" },
        ];

        let grouped = first_per_key(rows, &["team".to_string()]);

        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[1].get_str("name").unwrap(), "b");
    }

    #[test]
    fn selection_applies_aliases_and_keeps_join_targets() {
        let rows = vec![doc! { "id": "1", "name": "Alice", "age": 30, "team": { "id": "t" } }];

        let selected = select_columns(rows, &[Column::aliased("name", "full_name")], &["team"]);

        assert_eq!(selected[0], doc! { "full_name": "Alice", "team": { "id": "t" } });
    }
}
