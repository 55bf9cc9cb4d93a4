//! Schema description and the schema manager interface.
//!
//! Relational connections execute real DDL. Document connections map the
//! same calls onto collection management and refuse operations the store
//! has no equivalent for (see [`SchemaManager::alter_table`]).
//!
//! # Example
//!
//! ```ignore
//! use querylayer::schema::{TableBlueprint, ColumnType};
//!
//! let people = TableBlueprint::new("people")
//!     .string("name")
//!     .integer("age")
//!     .index(["name"], false);
//!
//! schema.create_table(&people).await?;
//! ```

use async_trait::async_trait;
use bson::Bson;
use std::fmt::Debug;

use crate::{document::ID_FIELD, error::DatabaseResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Uuid,
    String(u32),
    Text,
    Integer,
    BigInteger,
    Float,
    Boolean,
    Json,
    Timestamp,
    Binary,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    pub name: String,
    pub kind: ColumnType,
    pub nullable: bool,
    pub unique: bool,
    pub primary: bool,
    pub default: Option<Bson>,
}

impl ColumnDefinition {
    pub fn new(name: impl Into<String>, kind: ColumnType) -> Self {
        Self {
            name: name.into(),
            kind,
            nullable: true,
            unique: false,
            primary: false,
            default: None,
        }
    }

    /// The `id` column injected when a blueprint does not declare one.
    pub fn uuid_primary_key() -> Self {
        Self::new(ID_FIELD, ColumnType::Uuid).primary()
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn primary(mut self) -> Self {
        self.primary = true;
        self.nullable = false;
        self
    }

    pub fn default_value(mut self, value: impl Into<Bson>) -> Self {
        self.default = Some(value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexDefinition {
    pub name: Option<String>,
    pub columns: Vec<String>,
    pub unique: bool,
}

impl IndexDefinition {
    pub fn new<C: Into<String>>(columns: impl IntoIterator<Item = C>, unique: bool) -> Self {
        Self {
            name: None,
            columns: columns.into_iter().map(Into::into).collect(),
            unique,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The explicit name, or `<table>_<col>_<col>_index`.
    pub fn index_name(&self, table: &str) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("{}_{}_index", table, self.columns.join("_")),
        }
    }
}

/// Description of a table (or collection) to create.
#[derive(Debug, Clone, PartialEq)]
pub struct TableBlueprint {
    pub name: String,
    pub columns: Vec<ColumnDefinition>,
    pub indexes: Vec<IndexDefinition>,
}

impl TableBlueprint {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn column(mut self, column: ColumnDefinition) -> Self {
        self.columns.push(column);
        self
    }

    pub fn string(self, name: impl Into<String>) -> Self {
        self.column(ColumnDefinition::new(name, ColumnType::String(255)))
    }

    pub fn text(self, name: impl Into<String>) -> Self {
        self.column(ColumnDefinition::new(name, ColumnType::Text))
    }

    pub fn integer(self, name: impl Into<String>) -> Self {
        self.column(ColumnDefinition::new(name, ColumnType::Integer))
    }

    pub fn float(self, name: impl Into<String>) -> Self {
        self.column(ColumnDefinition::new(name, ColumnType::Float))
    }

    pub fn boolean(self, name: impl Into<String>) -> Self {
        self.column(ColumnDefinition::new(name, ColumnType::Boolean))
    }

    pub fn json(self, name: impl Into<String>) -> Self {
        self.column(ColumnDefinition::new(name, ColumnType::Json))
    }

    pub fn timestamp(self, name: impl Into<String>) -> Self {
        self.column(ColumnDefinition::new(name, ColumnType::Timestamp))
    }

    pub fn index<C: Into<String>>(mut self, columns: impl IntoIterator<Item = C>, unique: bool) -> Self {
        self.indexes.push(IndexDefinition::new(columns, unique));
        self
    }

    /// Returns `true` if the caller declared a primary key or an `id` column.
    pub fn declares_primary_key(&self) -> bool {
        self.columns
            .iter()
            .any(|column| column.primary || column.name == ID_FIELD)
    }
}

/// A single change applied by [`SchemaManager::alter_table`].
#[derive(Debug, Clone, PartialEq)]
pub enum AlterOperation {
    AddColumn(ColumnDefinition),
    DropColumn(String),
    ChangeColumn(ColumnDefinition),
    RenameColumn { from: String, to: String },
    AddIndex(IndexDefinition),
    DropIndex(String),
}

/// Schema operations for one connection.
#[async_trait]
pub trait SchemaManager: Send + Sync + Debug {
    /// Creates a table. Relational backends inject a UUID `id` primary key
    /// when the blueprint does not declare one.
    async fn create_table(&self, blueprint: &TableBlueprint) -> DatabaseResult<()>;

    /// Drops a table if it exists.
    async fn drop_table(&self, name: &str) -> DatabaseResult<()>;

    async fn table_exists(&self, name: &str) -> DatabaseResult<bool>;

    /// Applies column and index changes.
    ///
    /// Document backends return [`DatabaseError::Unsupported`](crate::error::DatabaseError::Unsupported).
    async fn alter_table(&self, name: &str, operations: &[AlterOperation]) -> DatabaseResult<()>;

    async fn list_tables(&self) -> DatabaseResult<Vec<String>>;

    /// Drops every table of the connection.
    async fn drop_all_tables(&self) -> DatabaseResult<()> {
        for table in self.list_tables().await? {
            self.drop_table(&table).await?;
        }

        Ok(())
    }

    async fn create_collection(&self, name: &str) -> DatabaseResult<()> {
        self.create_table(&TableBlueprint::new(name)).await
    }

    async fn drop_collection(&self, name: &str) -> DatabaseResult<()> {
        self.drop_table(name).await
    }

    async fn collection_exists(&self, name: &str) -> DatabaseResult<bool> {
        self.table_exists(name).await
    }

    async fn drop_all_collections(&self) -> DatabaseResult<()> {
        self.drop_all_tables().await
    }
}
