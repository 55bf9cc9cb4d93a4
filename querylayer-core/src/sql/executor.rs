use async_trait::async_trait;
use bson::Bson;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::{
    document::{Document, DocumentExt, ID_FIELD},
    driver::{SqlDriver, SqlTransaction},
    error::{DatabaseError, DatabaseResult},
    executor::{BackendKind, QueryExecutor, Transaction, TransactionHandle, WriteOutcome},
    expression::{JoinClause, Mutation, Predicate, QueryExpression, WhereClause},
    identifier::{IdentifierConcern, TextIdConcern},
    sql::{JoinColumns, SqlCompiler, run_query, run_statement},
};

/// [`QueryExecutor`] for SQL databases.
#[derive(Debug, Clone)]
pub struct RelationalExecutor {
    driver: Arc<dyn SqlDriver>,
    compiler: SqlCompiler,
    identifiers: TextIdConcern,
}

impl RelationalExecutor {
    pub fn new(driver: Arc<dyn SqlDriver>) -> Self {
        let compiler = SqlCompiler::new(driver.dialect());

        Self { driver, compiler, identifiers: TextIdConcern }
    }

    pub fn driver(&self) -> &Arc<dyn SqlDriver> {
        &self.driver
    }

    pub fn compiler(&self) -> &SqlCompiler {
        &self.compiler
    }

    /// Looks up the column list of every joined table.
    async fn join_columns(&self, joins: &[JoinClause]) -> DatabaseResult<JoinColumns> {
        let mut columns = JoinColumns::new();

        for join in joins {
            if columns.contains_key(&join.target) {
                continue;
            }

            let statement = self.compiler.dialect().table_columns(&join.table);
            let names = run_query(self.driver.as_ref(), &statement)
                .await?
                .into_iter()
                .filter_map(|row| row.get_str("name").ok().map(str::to_string))
                .collect();

            columns.insert(join.target.clone(), names);
        }

        Ok(columns)
    }

    /// Rejects identifier values the id concern cannot parse.
    fn check_identifiers(&self, clauses: &[WhereClause]) -> DatabaseResult<()> {
        for clause in clauses {
            match &clause.predicate {
                Predicate::Compare { column, value: Bson::String(id), .. } if is_id_column(column) => {
                    self.identifiers.to_native_id(id)?;
                }
                Predicate::In { column, values, .. } if is_id_column(column) => {
                    for value in values {
                        if let Bson::String(id) = value {
                            self.identifiers.to_native_id(id)?;
                        }
                    }
                }
                Predicate::Group(clauses) => self.check_identifiers(clauses)?,
                _ => {}
            }
        }

        Ok(())
    }

    async fn select_rows(&self, expression: &QueryExpression) -> DatabaseResult<Vec<Document>> {
        self.check_identifiers(&expression.wheres)?;

        let columns = self.join_columns(&expression.joins).await?;
        let statement = self.compiler.compile_select(expression, &columns)?;
        let rows = run_query(self.driver.as_ref(), &statement).await?;

        Ok(rows
            .into_iter()
            .map(|row| fold_joined_row(row, &expression.joins))
            .map(|row| self.identifiers.to_canonical_document(row))
            .collect())
    }

    async fn count_rows(&self, expression: &QueryExpression) -> DatabaseResult<u64> {
        self.check_identifiers(&expression.wheres)?;

        let columns = self.join_columns(&expression.joins).await?;
        let statement = self.compiler.compile_count(expression, &columns)?;
        let rows = run_query(self.driver.as_ref(), &statement).await?;

        Ok(rows
            .first()
            .and_then(|row| match row.get("aggregate") {
                Some(Bson::Int64(count)) => u64::try_from(*count).ok(),
                Some(Bson::Int32(count)) => u64::try_from(*count).ok(),
                Some(Bson::Double(count)) => Some(*count as u64),
                _ => None,
            })
            .unwrap_or(0))
    }

    async fn insert(&self, table: &str, documents: &[Document]) -> DatabaseResult<WriteOutcome> {
        let mut outcome = WriteOutcome::default();

        for document in documents {
            let document = document.clone().strip_undefined();
            let document = if document.has_id() {
                document
            } else {
                let mut with_id = Document::new();
                with_id.insert(ID_FIELD, self.identifiers.generate_id());
                with_id.extend(document.into_iter().filter(|(key, _)| key != ID_FIELD));
                with_id
            };

            let native = self.identifiers.to_native_document(document)?;
            let statement = self.compiler.compile_insert(table, &native)?;

            outcome.affected += run_statement(self.driver.as_ref(), &statement).await?;
            outcome.inserted.push(self.identifiers.to_canonical_document(native));
        }

        Ok(outcome)
    }

    async fn update(&self, expression: &QueryExpression, values: &Document) -> DatabaseResult<WriteOutcome> {
        self.check_identifiers(&expression.wheres)?;

        let values = values.without_id().strip_undefined();
        if values.is_empty() {
            return Ok(WriteOutcome::default());
        }

        let statement = self.compiler.compile_update(expression, &values)?;

        Ok(WriteOutcome {
            affected: run_statement(self.driver.as_ref(), &statement).await?,
            inserted: Vec::new(),
        })
    }

    async fn delete(&self, expression: &QueryExpression) -> DatabaseResult<WriteOutcome> {
        self.check_identifiers(&expression.wheres)?;

        let statement = self.compiler.compile_delete(expression)?;

        Ok(WriteOutcome {
            affected: run_statement(self.driver.as_ref(), &statement).await?,
            inserted: Vec::new(),
        })
    }
}

#[async_trait]
impl QueryExecutor for RelationalExecutor {
    fn backend(&self) -> BackendKind {
        BackendKind::Relational
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
            Mutation::Update(values) => self.update(expression, values).await,
            Mutation::Delete => self.delete(expression).await,
            Mutation::Select => Err(DatabaseError::Unsupported(
                "execute called without a write payload".to_string(),
            )),
        }
    }

    async fn truncate(&self, table: &str) -> DatabaseResult<()> {
        run_statement(self.driver.as_ref(), &self.compiler.compile_truncate(table)).await?;
        Ok(())
    }

    async fn begin(&self) -> DatabaseResult<Transaction> {
        let transaction = self.driver.begin().await?;
        debug!(dialect = ?self.compiler.dialect(), "began relational transaction");

        let scoped = RelationalExecutor {
            driver: transaction.driver(),
            compiler: self.compiler.clone(),
            identifiers: self.identifiers,
        };

        Ok(Transaction::new(Arc::new(scoped), Box::new(RelationalTransaction(transaction))))
    }
}

#[derive(Debug)]
struct RelationalTransaction(Box<dyn SqlTransaction>);

#[async_trait]
impl TransactionHandle for RelationalTransaction {
    async fn commit(&self) -> DatabaseResult<()> {
        self.0.commit().await
    }

    async fn rollback(&self) -> DatabaseResult<()> {
        self.0.rollback().await
    }
}

fn is_id_column(column: &str) -> bool {
    column == ID_FIELD || column.rsplit('.').next() == Some(ID_FIELD)
}

/// Moves `"<target>.<column>"` keys into a nested document under `target`.
///
/// A join that matched nothing leaves `target: null`. A row produced only by
/// the joined side of a right/full join has a null `id`; its null base columns
/// are dropped.
fn fold_joined_row(mut row: Document, joins: &[JoinClause]) -> Document {
    if joins.is_empty() {
        return row;
    }

    let mut nested = Vec::with_capacity(joins.len());
    for join in joins {
        let prefix = format!("{}.", join.target);
        let keys = row
            .keys()
            .filter(|key| key.starts_with(&prefix))
            .cloned()
            .collect::<Vec<_>>();

        if keys.is_empty() {
            continue;
        }

        let mut joined = Document::new();
        for key in keys {
            if let Some(value) = row.remove(&key) {
                joined.insert(&key[prefix.len()..], value);
            }
        }

        let matched = joined.values().any(|value| !matches!(value, Bson::Null));
        nested.push((join.target.clone(), if matched { Bson::Document(joined) } else { Bson::Null }));
    }

    if matches!(row.get(ID_FIELD), Some(Bson::Null)) {
        row = row
            .into_iter()
            .filter(|(_, value)| !matches!(value, Bson::Null))
            .collect();
    }

    for (target, value) in nested {
        row.insert(target, value);
    }

    row
}
