//! The fluent query surface used by application code.
//!
//! A [`DocumentManager`] wraps the executor of one connection. Every call to
//! [`DocumentManager::table`] starts a fresh [`TableQuery`], a by-value
//! builder over a [`QueryExpression`]. Builder methods consume and return the
//! query; terminal methods borrow it and work on clones, so one partially
//! built query can serve several terminals.
//!
//! # Example
//!
//! ```ignore
//! use querylayer::prelude::*;
//!
//! let manager = registry.document_manager(None).await?;
//!
//! let alice = manager.table("people").insert_one(doc! { "name": "Alice", "age": 30 }).await?;
//! let adults = manager
//!     .table("people")
//!     .where_("age", Operator::Gte, 18)
//!     .order_by("name", Direction::Asc)
//!     .get()
//!     .await?;
//! ```

use bson::Bson;
use futures::future::BoxFuture;
use std::sync::Arc;
use tracing::{info, warn};

use crate::{
    document::{Document, DocumentExt, ID_FIELD},
    error::{DatabaseError, DatabaseResult},
    executor::{BackendKind, QueryExecutor},
    expression::{
        Binding, Column, Connective, Direction, EagerLoad, JoinClause, JoinKind, Mutation,
        Operator, OrderBy, Predicate, QueryExpression, TableRef,
    },
    page::{Page, PaginationParams},
    relationship::{Relationship, RelationshipResolver},
    validator::DocumentValidator,
};

/// Entry point for queries and transactions on one connection.
#[derive(Debug, Clone)]
pub struct DocumentManager {
    executor: Arc<dyn QueryExecutor>,
    validator: DocumentValidator,
}

impl DocumentManager {
    pub fn new(executor: Arc<dyn QueryExecutor>) -> Self {
        Self { executor, validator: DocumentValidator::new() }
    }

    /// Replaces the validator run before writes. With a
    /// [suppressed](DocumentValidator::suppressed) validator, writes that fail
    /// validation are skipped instead of raising.
    pub fn with_validator(mut self, validator: DocumentValidator) -> Self {
        self.validator = validator;
        self
    }

    pub fn executor(&self) -> &Arc<dyn QueryExecutor> {
        &self.executor
    }

    pub fn backend(&self) -> BackendKind {
        self.executor.backend()
    }

    /// Starts a query bound to `name`.
    pub fn table(&self, name: impl Into<String>) -> TableQuery {
        TableQuery {
            manager: self.clone(),
            expression: QueryExpression::new(name),
        }
    }

    /// Starts a query with no table. CRUD terminals fail with
    /// [`DatabaseError::MissingTable`] until [`TableQuery::table`] is called.
    pub fn query(&self) -> TableQuery {
        TableQuery {
            manager: self.clone(),
            expression: QueryExpression::unbound(),
        }
    }

    pub fn resolver(&self) -> RelationshipResolver<'_> {
        RelationshipResolver::new(self.executor.as_ref())
    }

    /// Runs `f` inside a transaction.
    ///
    /// `f` receives a manager bound to the transaction; only work issued
    /// through it is part of the transaction. Other users of this connection
    /// wait until it finishes, so `f` must not use the outer manager.
    ///
    /// Commits when `f` returns `Ok`. When `f` returns `Err`, rolls back and
    /// returns that error; a failing rollback is logged and does not replace it.
    ///
    /// # Example
    ///
    /// ```ignore
    /// manager
    ///     .transaction(|tx| Box::pin(async move {
    ///         tx.table("accounts").update_one(debit).await?;
    ///         tx.table("accounts").update_one(credit).await?;
    ///         Ok(())
    ///     }))
    ///     .await?;
    /// ```
    pub async fn transaction<T, F>(&self, f: F) -> DatabaseResult<T>
    where
        F: for<'t> FnOnce(&'t DocumentManager) -> BoxFuture<'t, DatabaseResult<T>>,
    {
        let transaction = self.executor.begin().await?;
        let scoped = DocumentManager { executor: transaction.executor().clone(), validator: self.validator };
        info!(backend = ?self.backend(), "transaction started");

        let result = f(&scoped).await;
        drop(scoped);

        match result {
            Ok(value) => {
                transaction.commit().await?;
                info!(backend = ?self.backend(), "transaction committed");
                Ok(value)
            }
            Err(error) => {
                if let Err(rollback_error) = transaction.rollback().await {
                    warn!(error = %rollback_error, "rollback failed");
                }
                info!(backend = ?self.backend(), %error, "transaction rolled back");
                Err(error)
            }
        }
    }
}

/// Options for [`TableQuery::find_one`] and [`TableQuery::find_many`].
///
/// Every `filter` entry becomes an equality condition. With partial search,
/// string values match as case-insensitive substrings. Fuzzy search matches
/// values containing the characters of the string in order, ignoring case.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindOptions {
    pub filter: Document,
    pub allow_partial_search: bool,
    pub use_fuzzy_search: bool,
    pub order: Vec<(String, Direction)>,
    pub limit: Option<u64>,
    pub skip: Option<u64>,
}

impl FindOptions {
    pub fn new(filter: Document) -> Self {
        Self { filter, ..Self::default() }
    }

    pub fn partial(mut self) -> Self {
        self.allow_partial_search = true;
        self
    }

    pub fn fuzzy(mut self) -> Self {
        self.use_fuzzy_search = true;
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.order.push((column.into(), direction));
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, skip: u64) -> Self {
        self.skip = Some(skip);
        self
    }

    fn predicate(&self, column: &str, value: &Bson) -> Predicate {
        match value {
            Bson::String(text) if self.use_fuzzy_search => Predicate::like(column, Predicate::subsequence_pattern(text)),
            Bson::String(text) if self.allow_partial_search => Predicate::like(column, Predicate::contains_pattern(text)),
            other => Predicate::eq(column, other.clone()),
        }
    }
}

/// A fluent query over one table or collection.
#[derive(Debug, Clone)]
pub struct TableQuery {
    manager: DocumentManager,
    expression: QueryExpression,
}

impl TableQuery {
    pub fn expression(&self) -> &QueryExpression {
        &self.expression
    }

    pub fn into_expression(self) -> QueryExpression {
        self.expression
    }

    pub fn table(mut self, name: impl Into<String>) -> Self {
        self.expression.set_table(name);
        self
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        if let Some(table) = self.expression.table.as_mut() {
            table.alias = Some(alias.into());
        } else {
            self.expression.table = Some(TableRef { name: String::new(), alias: Some(alias.into()) });
        }
        self
    }

    pub fn select<C: Into<Column>>(mut self, columns: impl IntoIterator<Item = C>) -> Self {
        self.expression.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn distinct<C: Into<String>>(mut self, columns: impl IntoIterator<Item = C>) -> Self {
        self.expression.distinct.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn where_(mut self, column: impl Into<String>, op: Operator, value: impl Into<Bson>) -> Self {
        self.expression.push_where(Connective::And, Predicate::compare(column, op, value));
        self
    }

    pub fn where_eq(self, column: impl Into<String>, value: impl Into<Bson>) -> Self {
        self.where_(column, Operator::Eq, value)
    }

    pub fn or_where(mut self, column: impl Into<String>, op: Operator, value: impl Into<Bson>) -> Self {
        self.expression.push_where(Connective::Or, Predicate::compare(column, op, value));
        self
    }

    pub fn where_in<V: Into<Bson>>(mut self, column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        self.expression.push_where(Connective::And, Predicate::is_in(column, values));
        self
    }

    pub fn where_not_in<V: Into<Bson>>(mut self, column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        self.expression.push_where(
            Connective::And,
            Predicate::In {
                column: column.into(),
                values: values.into_iter().map(Into::into).collect(),
                negated: true,
            },
        );
        self
    }

    pub fn where_between(mut self, column: impl Into<String>, low: impl Into<Bson>, high: impl Into<Bson>) -> Self {
        self.expression.push_where(
            Connective::And,
            Predicate::Between { column: column.into(), low: low.into(), high: high.into(), negated: false },
        );
        self
    }

    pub fn where_null(mut self, column: impl Into<String>) -> Self {
        self.expression.push_where(Connective::And, Predicate::Null { column: column.into(), negated: false });
        self
    }

    pub fn where_not_null(mut self, column: impl Into<String>) -> Self {
        self.expression.push_where(Connective::And, Predicate::Null { column: column.into(), negated: true });
        self
    }

    /// Case-insensitive pattern match with `%`/`_` wildcards, on every backend.
    pub fn where_like(mut self, column: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.expression.push_where(Connective::And, Predicate::like(column, pattern));
        self
    }

    /// A raw SQL fragment with `?` placeholders. Document connections reject it.
    pub fn where_raw<V: Into<Bson>>(mut self, sql: impl Into<String>, bindings: impl IntoIterator<Item = V>) -> Self {
        self.expression.push_where(
            Connective::And,
            Predicate::Raw {
                sql: sql.into(),
                bindings: bindings.into_iter().map(Binding::new).collect(),
            },
        );
        self
    }

    /// Adds a parenthesized group built by `build` on an empty query.
    pub fn where_group(mut self, connective: Connective, build: impl FnOnce(TableQuery) -> TableQuery) -> Self {
        let group = build(self.manager.query()).expression.wheres;
        self.expression.push_where(connective, Predicate::Group(group));
        self
    }

    pub fn join(self, kind: JoinKind, table: impl Into<String>, local_key: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        self.join_clause(JoinClause::new(kind, table, local_key, foreign_key))
    }

    /// Adds a prepared join, e.g. one with a custom target property.
    pub fn join_clause(mut self, join: JoinClause) -> Self {
        self.expression.joins.push(join);
        self
    }

    pub fn inner_join(self, table: impl Into<String>, local_key: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        self.join(JoinKind::Inner, table, local_key, foreign_key)
    }

    pub fn left_join(self, table: impl Into<String>, local_key: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        self.join(JoinKind::Left, table, local_key, foreign_key)
    }

    pub fn right_join(self, table: impl Into<String>, local_key: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        self.join(JoinKind::Right, table, local_key, foreign_key)
    }

    pub fn full_join(self, table: impl Into<String>, local_key: impl Into<String>, foreign_key: impl Into<String>) -> Self {
        self.join(JoinKind::Full, table, local_key, foreign_key)
    }

    pub fn cross_join(self, table: impl Into<String>) -> Self {
        self.join_clause(JoinClause::cross(table))
    }

    pub fn group_by<C: Into<String>>(mut self, columns: impl IntoIterator<Item = C>) -> Self {
        self.expression.groups.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: Direction) -> Self {
        self.expression.orders.push(OrderBy { column: column.into(), direction });
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.expression.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.expression.offset = Some(offset);
        self
    }

    /// Embeds the resolved relationship under `name` in every returned row.
    pub fn with(mut self, name: impl Into<String>, relationship: Relationship) -> Self {
        self.expression.with.push(EagerLoad { name: name.into(), relationship });
        self
    }

    /// Runs the select and resolves eager loads.
    pub async fn get(&self) -> DatabaseResult<Vec<Document>> {
        self.expression.require_table()?;

        let mut rows = self.manager.executor.select(&self.expression).await?;
        if self.expression.with.is_empty() {
            return Ok(rows);
        }

        let resolver = self.manager.resolver();
        for row in &mut rows {
            for load in &self.expression.with {
                let related = resolver.resolve(row, &load.relationship).await?;
                row.insert(load.name.as_str(), related);
            }
        }

        Ok(rows)
    }

    pub async fn first(&self) -> DatabaseResult<Option<Document>> {
        Ok(self.clone().limit(1).get().await?.into_iter().next())
    }

    /// Counts matching rows, ignoring limit and offset.
    pub async fn count(&self) -> DatabaseResult<u64> {
        self.expression.require_table()?;

        self.manager.executor.count(&self.expression).await
    }

    pub async fn exists(&self) -> DatabaseResult<bool> {
        Ok(self.count().await? > 0)
    }

    /// Returns the row with the given id, or `None`. Malformed ids count as not found.
    pub async fn find_by_id(&self, id: &str) -> DatabaseResult<Option<Document>> {
        self.clone().where_eq(ID_FIELD, id).first().await
    }

    pub async fn find_one(&self, options: FindOptions) -> DatabaseResult<Option<Document>> {
        self.clone().apply(options).first().await
    }

    pub async fn find_many(&self, options: FindOptions) -> DatabaseResult<Vec<Document>> {
        self.clone().apply(options).get().await
    }

    fn apply(mut self, options: FindOptions) -> Self {
        for (column, value) in &options.filter {
            self.expression.push_where(Connective::And, options.predicate(column, value));
        }
        for (column, direction) in options.order {
            self = self.order_by(column, direction);
        }
        if let Some(limit) = options.limit {
            self = self.limit(limit);
        }
        if let Some(skip) = options.skip {
            self = self.offset(skip);
        }

        self
    }

    /// Inserts one document, returning it with its generated `id`.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::InvalidDocument`] if the document already has an `id`.
    pub async fn insert_one(&self, document: Document) -> DatabaseResult<Document> {
        self.insert_many(vec![document])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| DatabaseError::InvalidDocument("document failed validation and was not inserted".to_string()))
    }

    /// Inserts documents, returning them with their generated ids.
    ///
    /// Nothing is written if any document already has an `id`.
    pub async fn insert_many(&self, documents: Vec<Document>) -> DatabaseResult<Vec<Document>> {
        self.expression.require_table()?;
        if !self.manager.validator.require_without_id(&documents)? || documents.is_empty() {
            return Ok(Vec::new());
        }

        let mut expression = self.expression.clone();
        expression.mutation = Mutation::Insert(documents);

        Ok(self.manager.executor.execute(&expression).await?.inserted)
    }

    /// Updates the row identified by the document's `id` with its other fields.
    pub async fn update_one(&self, document: Document) -> DatabaseResult<u64> {
        self.update_many(vec![document]).await
    }

    /// Updates each document by `id`. Nothing is written if any document lacks an `id`.
    pub async fn update_many(&self, documents: Vec<Document>) -> DatabaseResult<u64> {
        self.expression.require_table()?;
        if !self.manager.validator.require_contains_id(&documents)? {
            return Ok(0);
        }

        let mut affected = 0;
        for document in documents {
            let id = document.get(ID_FIELD).cloned().unwrap_or(Bson::Null);
            let mut expression = self.scoped(Predicate::eq(ID_FIELD, id));
            expression.mutation = Mutation::Update(document.without_id());

            affected += self.manager.executor.execute(&expression).await?.affected;
        }

        Ok(affected)
    }

    /// Deletes the row identified by the document's `id`.
    pub async fn delete_one(&self, document: Document) -> DatabaseResult<u64> {
        self.delete_many(vec![document]).await
    }

    /// Deletes every document by `id` in one statement. Nothing is deleted if any lacks an `id`.
    pub async fn delete_many(&self, documents: Vec<Document>) -> DatabaseResult<u64> {
        self.expression.require_table()?;
        if !self.manager.validator.require_contains_id(&documents)? || documents.is_empty() {
            return Ok(0);
        }

        let ids = documents
            .iter()
            .filter_map(|document| document.get(ID_FIELD).cloned())
            .collect::<Vec<_>>();

        let mut expression = self.scoped(Predicate::is_in(ID_FIELD, ids));
        expression.mutation = Mutation::Delete;

        Ok(self.manager.executor.execute(&expression).await?.affected)
    }

    /// Sets `values` on every row matching the current where-clauses.
    pub async fn update(&self, values: Document) -> DatabaseResult<u64> {
        self.expression.require_table()?;

        let mut expression = self.expression.clone();
        expression.mutation = Mutation::Update(values);

        Ok(self.manager.executor.execute(&expression).await?.affected)
    }

    /// Deletes every row matching the current where-clauses.
    pub async fn delete(&self) -> DatabaseResult<u64> {
        self.expression.require_table()?;

        let mut expression = self.expression.clone();
        expression.mutation = Mutation::Delete;

        Ok(self.manager.executor.execute(&expression).await?.affected)
    }

    /// Removes every row of the bound table, keeping the table.
    pub async fn truncate(&self) -> DatabaseResult<()> {
        let table = self.expression.require_table()?;

        self.manager.executor.truncate(table).await
    }

    /// Finds the row of the bound table whose `foreign_key` equals `document[local_key]`.
    pub async fn belongs_to(&self, document: &Document, local_key: &str, foreign_key: &str) -> DatabaseResult<Option<Document>> {
        let relationship = Relationship::belongs_to(local_key, foreign_key, self.expression.require_table()?);

        self.manager.resolver().belongs_to(document, &relationship).await
    }

    /// Finds the rows of the bound table whose `foreign_key` equals `document[local_key]`.
    pub async fn has_many(&self, document: &Document, local_key: &str, foreign_key: &str) -> DatabaseResult<Vec<Document>> {
        let relationship = Relationship::has_many(local_key, foreign_key, self.expression.require_table()?);

        self.manager.resolver().has_many(document, &relationship).await
    }

    /// Fetches one page plus the total count of the unpaged query.
    pub async fn paginate(&self, params: PaginationParams) -> DatabaseResult<Page<Document>> {
        let total = self.clone().count().await?;
        let items = self
            .clone()
            .offset(params.offset())
            .limit(params.per_page)
            .get()
            .await?;

        Ok(Page::from_total(items, total, &params))
    }

    /// The current expression narrowed by `predicate`, keeping existing
    /// `OR` clauses inside their own group.
    fn scoped(&self, predicate: Predicate) -> QueryExpression {
        let mut expression = self.expression.clone();

        if !expression.wheres.is_empty() {
            let existing = std::mem::take(&mut expression.wheres);
            expression.push_where(Connective::And, Predicate::Group(existing));
        }
        expression.push_where(Connective::And, predicate);

        expression
    }
}

impl From<TableQuery> for QueryExpression {
    fn from(query: TableQuery) -> Self {
        query.expression
    }
}
