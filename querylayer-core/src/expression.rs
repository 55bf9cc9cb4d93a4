//! The backend-neutral query expression.
//!
//! A [`QueryExpression`] describes a select or a mutation before any backend
//! has seen it: the bound table, selected columns, where-clauses, joins,
//! grouping, ordering, pagination and the write payload. Both compilers read
//! the same expression; neither mutates it.
//!
//! Expressions are mutable until compiled. Cloning deep-copies every clause
//! list, so a clone can be refined (for example "count all" versus "fetch a
//! page") without affecting the original.
//!
//! # Example
//!
//! ```ignore
//! use querylayer::expression::{QueryExpression, Predicate, Connective, Operator};
//!
//! let mut expr = QueryExpression::new("people");
//! expr.push_where(Connective::And, Predicate::compare("age", Operator::Gt, 26));
//! ```

use bson::Bson;
use std::{fmt, str::FromStr};

use crate::{
    document::Document,
    error::{DatabaseError, DatabaseResult},
    relationship::Relationship,
};

/// Comparison operators for where-clauses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
}

impl Operator {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Operator::Eq => "=",
            Operator::Ne => "<>",
            Operator::Gt => ">",
            Operator::Gte => ">=",
            Operator::Lt => "<",
            Operator::Lte => "<=",
        }
    }

    /// The document-store query operator for this comparison.
    pub fn as_native(&self) -> &'static str {
        match self {
            Operator::Eq => "$eq",
            Operator::Ne => "$ne",
            Operator::Gt => "$gt",
            Operator::Gte => "$gte",
            Operator::Lt => "$lt",
            Operator::Lte => "$lte",
        }
    }
}

impl FromStr for Operator {
    type Err = DatabaseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "=" | "==" => Ok(Operator::Eq),
            "!=" | "<>" => Ok(Operator::Ne),
            ">" => Ok(Operator::Gt),
            ">=" => Ok(Operator::Gte),
            "<" => Ok(Operator::Lt),
            "<=" => Ok(Operator::Lte),
            other => Err(DatabaseError::Unsupported(format!("operator '{other}'"))),
        }
    }
}

impl TryFrom<&str> for Operator {
    type Error = DatabaseError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// How a where-clause joins the clauses before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Connective {
    And,
    Or,
}

impl Connective {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Connective::And => "AND",
            Connective::Or => "OR",
        }
    }
}

/// A single condition inside a where-clause.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// `column <op> value`
    Compare {
        column: String,
        op: Operator,
        value: Bson,
    },
    /// `column [NOT] IN (values...)`
    In {
        column: String,
        values: Vec<Bson>,
        negated: bool,
    },
    /// `column [NOT] BETWEEN low AND high`
    Between {
        column: String,
        low: Bson,
        high: Bson,
        negated: bool,
    },
    /// `column IS [NOT] NULL`
    Null { column: String, negated: bool },
    /// Case-insensitive pattern match using `%` and `_` wildcards.
    Like { column: String, pattern: String },
    /// A parenthesized group of clauses.
    Group(Vec<WhereClause>),
    /// A raw SQL fragment with `?` placeholders and their bindings.
    Raw { sql: String, bindings: Vec<Binding> },
}

impl Predicate {
    pub fn compare(column: impl Into<String>, op: Operator, value: impl Into<Bson>) -> Self {
        Predicate::Compare { column: column.into(), op, value: value.into() }
    }

    pub fn eq(column: impl Into<String>, value: impl Into<Bson>) -> Self {
        Self::compare(column, Operator::Eq, value)
    }

    pub fn is_in<V: Into<Bson>>(column: impl Into<String>, values: impl IntoIterator<Item = V>) -> Self {
        Predicate::In {
            column: column.into(),
            values: values.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    pub fn like(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Predicate::Like { column: column.into(), pattern: pattern.into() }
    }

    /// Returns a like-pattern matching values that contain `needle`.
    pub fn contains_pattern(needle: &str) -> String {
        format!("%{needle}%")
    }

    /// Returns a like-pattern matching values that contain the characters of
    /// `needle` in order, with anything in between (`"cd"` matches `"Cid"`).
    pub fn subsequence_pattern(needle: &str) -> String {
        needle.chars().fold(String::from("%"), |mut pattern, ch| {
            pattern.push(ch);
            pattern.push('%');
            pattern
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WhereClause {
    pub connective: Connective,
    pub predicate: Predicate,
}

/// Join kinds supported by both backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
    Cross,
}

impl JoinKind {
    pub fn as_sql(&self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Full => "FULL OUTER JOIN",
            JoinKind::Cross => "CROSS JOIN",
        }
    }

    /// Whether rows from the base table survive without a match.
    pub fn keeps_unmatched_base(&self) -> bool {
        matches!(self, JoinKind::Left | JoinKind::Full)
    }

    /// Whether rows from the joined table survive without a match.
    pub fn keeps_unmatched_joined(&self) -> bool {
        matches!(self, JoinKind::Right | JoinKind::Full)
    }
}

/// A join against another table/collection.
///
/// Matched rows are exposed under `target` as a nested document; unmatched
/// outer rows carry `null` there.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub kind: JoinKind,
    pub table: String,
    pub local_key: String,
    pub foreign_key: String,
    pub target: String,
}

impl JoinClause {
    pub fn new(
        kind: JoinKind,
        table: impl Into<String>,
        local_key: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        let table = table.into();

        Self {
            kind,
            target: table.clone(),
            table,
            local_key: local_key.into(),
            foreign_key: foreign_key.into(),
        }
    }

    pub fn cross(table: impl Into<String>) -> Self {
        Self::new(JoinKind::Cross, table, "", "")
    }

    /// Exposes matched rows under a property other than the table name.
    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target = target.into();
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }

    /// `1` or `-1`, as used by document-store sort maps.
    pub fn as_native(&self) -> i32 {
        match self {
            Direction::Asc => 1,
            Direction::Desc => -1,
        }
    }
}

impl FromStr for Direction {
    type Err = DatabaseError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(Direction::Asc),
            "desc" | "descending" => Ok(Direction::Desc),
            other => Err(DatabaseError::Unsupported(format!("sort direction '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub column: String,
    pub direction: Direction,
}

/// A selected column with an optional output alias.
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub alias: Option<String>,
}

impl Column {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), alias: None }
    }

    pub fn aliased(name: impl Into<String>, alias: impl Into<String>) -> Self {
        Self { name: name.into(), alias: Some(alias.into()) }
    }

    /// The key this column appears under in result documents.
    pub fn output_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }
}

impl From<&str> for Column {
    fn from(name: &str) -> Self {
        Column::new(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableRef {
    pub name: String,
    pub alias: Option<String>,
}

/// A named relationship resolved after the main query runs.
#[derive(Debug, Clone, PartialEq)]
pub struct EagerLoad {
    pub name: String,
    pub relationship: Relationship,
}

/// The statement kind. Payload and delete flag are mutually exclusive by construction.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Mutation {
    #[default]
    Select,
    Insert(Vec<Document>),
    Update(Document),
    Delete,
}

/// Inferred type of a bound parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    Null,
    Boolean,
    Integer,
    Real,
    Text,
    Blob,
    DateTime,
    Json,
}

impl BindingKind {
    pub fn infer(value: &Bson) -> Self {
        match value {
            Bson::Null | Bson::Undefined => BindingKind::Null,
            Bson::Boolean(_) => BindingKind::Boolean,
            Bson::Int32(_) | Bson::Int64(_) => BindingKind::Integer,
            Bson::Double(_) | Bson::Decimal128(_) => BindingKind::Real,
            Bson::String(_) | Bson::ObjectId(_) | Bson::Symbol(_) => BindingKind::Text,
            Bson::Binary(_) => BindingKind::Blob,
            Bson::DateTime(_) | Bson::Timestamp(_) => BindingKind::DateTime,
            _ => BindingKind::Json,
        }
    }
}

/// A positional parameter value and its inferred kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub value: Bson,
    pub kind: BindingKind,
}

impl Binding {
    pub fn new(value: impl Into<Bson>) -> Self {
        let value = value.into();

        Self { kind: BindingKind::infer(&value), value }
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self.kind, self.value)
    }
}

/// Canonical, backend-neutral query description.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryExpression {
    pub table: Option<TableRef>,
    pub columns: Vec<Column>,
    pub distinct: Vec<String>,
    pub wheres: Vec<WhereClause>,
    pub joins: Vec<JoinClause>,
    pub groups: Vec<String>,
    pub orders: Vec<OrderBy>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
    pub with: Vec<EagerLoad>,
    pub mutation: Mutation,
}

impl QueryExpression {
    /// An expression bound to `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: Some(TableRef { name: table.into(), alias: None }),
            ..Self::default()
        }
    }

    /// An expression with no table; compiling it fails with [`DatabaseError::MissingTable`].
    pub fn unbound() -> Self {
        Self::default()
    }

    pub fn set_table(&mut self, table: impl Into<String>) {
        let alias = self.table.take().and_then(|table| table.alias);
        self.table = Some(TableRef { name: table.into(), alias });
    }

    /// Returns the bound table name.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::MissingTable`] if no table is bound.
    pub fn require_table(&self) -> DatabaseResult<&str> {
        self.table
            .as_ref()
            .map(|table| table.name.as_str())
            .filter(|name| !name.is_empty())
            .ok_or(DatabaseError::MissingTable)
    }

    pub fn push_where(&mut self, connective: Connective, predicate: Predicate) {
        self.wheres.push(WhereClause { connective, predicate });
    }

    pub fn has_joins(&self) -> bool {
        !self.joins.is_empty()
    }

    /// A copy reduced to what a row count needs: no ordering, paging, or eager loads.
    pub fn for_count(&self) -> Self {
        Self {
            orders: Vec::new(),
            offset: None,
            limit: None,
            with: Vec::new(),
            columns: Vec::new(),
            mutation: Mutation::Select,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operators_parse_from_symbols() {
        assert_eq!(">".parse::<Operator>().unwrap(), Operator::Gt);
        assert_eq!(Operator::try_from("<>").unwrap(), Operator::Ne);
        assert_eq!("!=".parse::<Operator>().unwrap(), Operator::Ne);
        assert!("~".parse::<Operator>().is_err());
    }

    #[test]
    fn unbound_expression_requires_a_table() {
        assert!(matches!(
            QueryExpression::unbound().require_table(),
            Err(DatabaseError::MissingTable)
        ));
        assert_eq!(QueryExpression::new("people").require_table().unwrap(), "people");
    }

    #[test]
    fn clone_does_not_share_clause_lists() {
        let mut original = QueryExpression::new("people");
        original.push_where(Connective::And, Predicate::eq("name", "Alice"));

        let mut branch = original.clone();
        branch.push_where(Connective::Or, Predicate::eq("name", "Bob"));
        branch.orders.push(OrderBy { column: "age".into(), direction: Direction::Desc });

        assert_eq!(original.wheres.len(), 1);
        assert!(original.orders.is_empty());
        assert_eq!(branch.wheres.len(), 2);
    }

    #[test]
    fn count_copy_drops_paging() {
        let mut expr = QueryExpression::new("people");
        expr.limit = Some(5);
        expr.offset = Some(10);
        expr.push_where(Connective::And, Predicate::eq("age", 3));

        let count = expr.for_count();
        assert_eq!(count.limit, None);
        assert_eq!(count.offset, None);
        assert_eq!(count.wheres, expr.wheres);
    }

    #[test]
    fn binding_kinds_are_inferred() {
        assert_eq!(Binding::new(1_i64).kind, BindingKind::Integer);
        assert_eq!(Binding::new("a").kind, BindingKind::Text);
        assert_eq!(Binding::new(Bson::Null).kind, BindingKind::Null);
        assert_eq!(Binding::new(1.5).kind, BindingKind::Real);
    }
}
