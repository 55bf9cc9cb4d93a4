//! Compiles query expressions into parameterized SQL.
//!
//! Select clauses are always emitted in the same order regardless of the order
//! the builder methods were called in: columns, `FROM`, joins, `WHERE`,
//! `GROUP BY`, `ORDER BY`, `LIMIT`/`OFFSET`. Where-clauses and joins keep the
//! order they were added in.
//!
//! Values never appear in the SQL text: every value becomes a placeholder and
//! a [`Binding`]. Raw fragments are the only exception, and they carry their
//! own bindings.

use bson::Bson;
use std::collections::HashMap;

use crate::{
    document::{Document, ID_FIELD},
    driver::CompiledStatement,
    error::{DatabaseError, DatabaseResult},
    expression::{Binding, JoinClause, JoinKind, Operator, Predicate, QueryExpression, WhereClause},
    schema::{AlterOperation, ColumnDefinition, IndexDefinition, TableBlueprint},
    sql::SqlDialect,
};

/// Columns of each joined table, keyed by join target.
///
/// Joined columns are selected as `"<target>.<column>"` so the executor can
/// fold them into a nested document. A join without an entry selects
/// `<target>.*` unaliased.
pub type JoinColumns = HashMap<String, Vec<String>>;

struct StatementBuilder {
    dialect: SqlDialect,
    sql: String,
    bindings: Vec<Binding>,
}

impl StatementBuilder {
    fn new(dialect: SqlDialect) -> Self {
        Self { dialect, sql: String::new(), bindings: Vec::new() }
    }

    fn push(&mut self, fragment: &str) {
        self.sql.push_str(fragment);
    }

    fn bind(&mut self, value: Bson) {
        self.bind_binding(Binding::new(value));
    }

    fn bind_binding(&mut self, binding: Binding) {
        self.bindings.push(binding);
        let placeholder = self.dialect.placeholder(self.bindings.len());
        self.sql.push_str(&placeholder);
    }

    fn finish(self) -> CompiledStatement {
        CompiledStatement::new(self.sql, self.bindings)
    }
}

/// Turns [`QueryExpression`]s and schema descriptions into [`CompiledStatement`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlCompiler {
    dialect: SqlDialect,
}

impl SqlCompiler {
    pub fn new(dialect: SqlDialect) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    /// Compiles a select.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::MissingTable`] if no table is bound, or
    /// [`DatabaseError::InvalidDocument`] if a raw fragment's placeholder count
    /// does not match its bindings.
    pub fn compile_select(
        &self,
        expression: &QueryExpression,
        join_columns: &JoinColumns,
    ) -> DatabaseResult<CompiledStatement> {
        let mut out = StatementBuilder::new(self.dialect);
        self.write_select(&mut out, expression, join_columns)?;
        Ok(out.finish())
    }

    /// Compiles `SELECT COUNT(*) AS "aggregate"` over the expression without paging.
    pub fn compile_count(
        &self,
        expression: &QueryExpression,
        join_columns: &JoinColumns,
    ) -> DatabaseResult<CompiledStatement> {
        let mut out = StatementBuilder::new(self.dialect);
        out.push(&format!(
            "SELECT COUNT(*) AS {} FROM (",
            self.dialect.quote("aggregate")
        ));
        self.write_select(&mut out, &expression.for_count(), join_columns)?;
        out.push(&format!(") AS {}", self.dialect.quote("count_source")));
        Ok(out.finish())
    }

    /// Compiles one `INSERT` for one document. `undefined` values are skipped.
    pub fn compile_insert(&self, table: &str, document: &Document) -> DatabaseResult<CompiledStatement> {
        let fields = document
            .iter()
            .filter(|(_, value)| !matches!(value, Bson::Undefined))
            .collect::<Vec<_>>();

        if fields.is_empty() {
            return Err(DatabaseError::InvalidDocument("cannot insert an empty document".into()));
        }

        let mut out = StatementBuilder::new(self.dialect);
        out.push(&format!(
            "INSERT INTO {} ({}) VALUES (",
            self.dialect.quote(table),
            fields
                .iter()
                .map(|(key, _)| self.dialect.quote(key))
                .collect::<Vec<_>>()
                .join(", ")
        ));

        for (index, (_, value)) in fields.into_iter().enumerate() {
            if index > 0 {
                out.push(", ");
            }
            out.bind((*value).clone());
        }

        out.push(")");
        Ok(out.finish())
    }

    /// Compiles `UPDATE ... SET ... WHERE ...`. The `id` field is never part of the set list.
    pub fn compile_update(
        &self,
        expression: &QueryExpression,
        values: &Document,
    ) -> DatabaseResult<CompiledStatement> {
        let table = expression.require_table()?;
        self.reject_joins(expression, "update")?;

        let assignments = values
            .iter()
            .filter(|(key, value)| key.as_str() != ID_FIELD && !matches!(value, Bson::Undefined))
            .collect::<Vec<_>>();

        if assignments.is_empty() {
            return Err(DatabaseError::InvalidDocument("nothing to update".into()));
        }

        let mut out = StatementBuilder::new(self.dialect);
        out.push(&format!("UPDATE {} SET ", self.dialect.quote(table)));

        for (index, (key, value)) in assignments.into_iter().enumerate() {
            if index > 0 {
                out.push(", ");
            }
            out.push(&format!("{} = ", self.dialect.quote(key)));
            out.bind((*value).clone());
        }

        self.write_wheres(&mut out, expression)?;
        Ok(out.finish())
    }

    /// Compiles `DELETE FROM ... WHERE ...`.
    pub fn compile_delete(&self, expression: &QueryExpression) -> DatabaseResult<CompiledStatement> {
        let table = expression.require_table()?;
        self.reject_joins(expression, "delete")?;

        let mut out = StatementBuilder::new(self.dialect);
        out.push(&format!("DELETE FROM {}", self.dialect.quote(table)));
        self.write_wheres(&mut out, expression)?;
        Ok(out.finish())
    }

    /// Compiles a statement removing all rows while keeping the table.
    pub fn compile_truncate(&self, table: &str) -> CompiledStatement {
        CompiledStatement::plain(format!(
            "{} {}",
            self.dialect.truncate_keyword(),
            self.dialect.quote(table)
        ))
    }

    /// Compiles `CREATE TABLE` plus one `CREATE INDEX` per declared index.
    ///
    /// A `VARCHAR(36)` `id` primary key is prepended when the blueprint does not
    /// declare a primary key.
    pub fn compile_create_table(&self, blueprint: &TableBlueprint) -> Vec<CompiledStatement> {
        let mut columns = Vec::with_capacity(blueprint.columns.len() + 1);

        if !blueprint.declares_primary_key() {
            columns.push(self.column_definition(&ColumnDefinition::uuid_primary_key()));
        }
        columns.extend(blueprint.columns.iter().map(|column| self.column_definition(column)));

        let mut statements = vec![CompiledStatement::plain(format!(
            "CREATE TABLE {} ({})",
            self.dialect.quote(&blueprint.name),
            columns.join(", ")
        ))];

        statements.extend(
            blueprint
                .indexes
                .iter()
                .map(|index| self.create_index(&blueprint.name, index)),
        );

        statements
    }

    pub fn compile_drop_table(&self, table: &str) -> CompiledStatement {
        CompiledStatement::plain(format!("DROP TABLE IF EXISTS {}", self.dialect.quote(table)))
    }

    /// Compiles one alter operation.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Unsupported`] for column changes on dialects
    /// that cannot alter a column in place.
    pub fn compile_alter(&self, table: &str, operation: &AlterOperation) -> DatabaseResult<Vec<CompiledStatement>> {
        let quoted = self.dialect.quote(table);

        let statements = match operation {
            AlterOperation::AddColumn(column) => vec![CompiledStatement::plain(format!(
                "ALTER TABLE {quoted} ADD COLUMN {}",
                self.column_definition(column)
            ))],
            AlterOperation::DropColumn(column) => vec![CompiledStatement::plain(format!(
                "ALTER TABLE {quoted} DROP COLUMN {}",
                self.dialect.quote(column)
            ))],
            AlterOperation::RenameColumn { from, to } => vec![CompiledStatement::plain(format!(
                "ALTER TABLE {quoted} RENAME COLUMN {} TO {}",
                self.dialect.quote(from),
                self.dialect.quote(to)
            ))],
            AlterOperation::ChangeColumn(column) => match self.dialect {
                SqlDialect::Sqlite => {
                    return Err(DatabaseError::Unsupported(format!(
                        "changing column '{}' is not supported by SQLite",
                        column.name
                    )));
                }
                SqlDialect::MySql => vec![CompiledStatement::plain(format!(
                    "ALTER TABLE {quoted} MODIFY COLUMN {}",
                    self.column_definition(column)
                ))],
                SqlDialect::Postgres => {
                    let name = self.dialect.quote(&column.name);
                    vec![
                        CompiledStatement::plain(format!(
                            "ALTER TABLE {quoted} ALTER COLUMN {name} TYPE {}",
                            self.dialect.column_type(column.kind)
                        )),
                        CompiledStatement::plain(format!(
                            "ALTER TABLE {quoted} ALTER COLUMN {name} {} NOT NULL",
                            if column.nullable { "DROP" } else { "SET" }
                        )),
                    ]
                }
            },
            AlterOperation::AddIndex(index) => vec![self.create_index(table, index)],
            AlterOperation::DropIndex(name) => vec![CompiledStatement::plain(match self.dialect {
                SqlDialect::MySql => format!("DROP INDEX {} ON {quoted}", self.dialect.quote(name)),
                _ => format!("DROP INDEX IF EXISTS {}", self.dialect.quote(name)),
            })],
        };

        Ok(statements)
    }

    fn create_index(&self, table: &str, index: &IndexDefinition) -> CompiledStatement {
        CompiledStatement::plain(format!(
            "CREATE {}INDEX {} ON {} ({})",
            if index.unique { "UNIQUE " } else { "" },
            self.dialect.quote(&index.index_name(table)),
            self.dialect.quote(table),
            index
                .columns
                .iter()
                .map(|column| self.dialect.quote(column))
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn column_definition(&self, column: &ColumnDefinition) -> String {
        let mut definition = format!(
            "{} {}",
            self.dialect.quote(&column.name),
            self.dialect.column_type(column.kind)
        );

        if column.primary {
            definition.push_str(" PRIMARY KEY");
        } else if !column.nullable {
            definition.push_str(" NOT NULL");
        }
        if column.unique && !column.primary {
            definition.push_str(" UNIQUE");
        }
        if let Some(default) = &column.default {
            definition.push_str(&format!(" DEFAULT {}", self.dialect.literal(default)));
        }

        definition
    }

    fn reject_joins(&self, expression: &QueryExpression, statement: &str) -> DatabaseResult<()> {
        if expression.has_joins() {
            return Err(DatabaseError::Unsupported(format!("joins in a {statement} statement")));
        }

        Ok(())
    }

    /// Name the base table is referenced by: its alias, else its name.
    fn base_ref<'a>(&self, expression: &'a QueryExpression) -> DatabaseResult<&'a str> {
        let table = expression.table.as_ref().ok_or(DatabaseError::MissingTable)?;
        Ok(table.alias.as_deref().unwrap_or(&table.name))
    }

    /// Qualifies bare column names with the base table when joins make them ambiguous.
    fn column_ref(&self, expression: &QueryExpression, column: &str) -> DatabaseResult<String> {
        if expression.has_joins() && !column.contains('.') {
            Ok(self.dialect.quote(&format!("{}.{}", self.base_ref(expression)?, column)))
        } else {
            Ok(self.dialect.quote(column))
        }
    }

    fn write_select(
        &self,
        out: &mut StatementBuilder,
        expression: &QueryExpression,
        join_columns: &JoinColumns,
    ) -> DatabaseResult<()> {
        let table = expression.require_table()?;
        let base_ref = self.base_ref(expression)?;
        let mut selections = Vec::new();

        if !expression.distinct.is_empty() {
            for column in &expression.distinct {
                selections.push(self.column_ref(expression, column)?);
            }
        } else if expression.columns.is_empty() {
            selections.push(if expression.has_joins() {
                self.dialect.quote(&format!("{base_ref}.*"))
            } else {
                "*".to_string()
            });
        } else {
            for column in &expression.columns {
                let mut selection = self.column_ref(expression, &column.name)?;
                if let Some(alias) = &column.alias {
                    selection.push_str(&format!(" AS {}", self.dialect.quote_alias(alias)));
                }
                selections.push(selection);
            }
        }

        for join in &expression.joins {
            match join_columns.get(&join.target) {
                Some(columns) => selections.extend(columns.iter().map(|column| {
                    format!(
                        "{} AS {}",
                        self.dialect.quote(&format!("{}.{}", join.target, column)),
                        self.dialect.quote_alias(&format!("{}.{}", join.target, column))
                    )
                })),
                None => selections.push(self.dialect.quote(&format!("{}.*", join.target))),
            }
        }

        out.push(&format!(
            "SELECT {}{} FROM {}",
            if expression.distinct.is_empty() { "" } else { "DISTINCT " },
            selections.join(", "),
            self.dialect.quote(table)
        ));

        if base_ref != table {
            out.push(&format!(" AS {}", self.dialect.quote(base_ref)));
        }

        for join in &expression.joins {
            self.write_join(out, base_ref, join);
        }

        self.write_wheres(out, expression)?;

        if !expression.groups.is_empty() {
            let groups = expression
                .groups
                .iter()
                .map(|column| self.column_ref(expression, column))
                .collect::<DatabaseResult<Vec<_>>>()?;
            out.push(&format!(" GROUP BY {}", groups.join(", ")));
        }

        if !expression.orders.is_empty() {
            let orders = expression
                .orders
                .iter()
                .map(|order| {
                    Ok(format!(
                        "{} {}",
                        self.column_ref(expression, &order.column)?,
                        order.direction.as_sql()
                    ))
                })
                .collect::<DatabaseResult<Vec<_>>>()?;
            out.push(&format!(" ORDER BY {}", orders.join(", ")));
        }

        match (expression.limit, expression.offset) {
            (Some(limit), Some(offset)) => out.push(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => out.push(&format!(" LIMIT {limit}")),
            (None, Some(offset)) => match self.dialect.unbounded_limit() {
                Some(limit) => out.push(&format!(" LIMIT {limit} OFFSET {offset}")),
                None => out.push(&format!(" OFFSET {offset}")),
            },
            (None, None) => {}
        }

        Ok(())
    }

    fn write_join(&self, out: &mut StatementBuilder, base_ref: &str, join: &JoinClause) {
        out.push(&format!(" {} {}", join.kind.as_sql(), self.dialect.quote(&join.table)));

        if join.target != join.table {
            out.push(&format!(" AS {}", self.dialect.quote(&join.target)));
        }

        if join.kind != JoinKind::Cross {
            let local = if join.local_key.contains('.') {
                join.local_key.clone()
            } else {
                format!("{base_ref}.{}", join.local_key)
            };

            out.push(&format!(
                " ON {} = {}",
                self.dialect.quote(&local),
                self.dialect.quote(&format!("{}.{}", join.target, join.foreign_key))
            ));
        }
    }

    fn write_wheres(&self, out: &mut StatementBuilder, expression: &QueryExpression) -> DatabaseResult<()> {
        if expression.wheres.is_empty() {
            return Ok(());
        }

        out.push(" WHERE ");
        self.write_clauses(out, expression, &expression.wheres)
    }

    fn write_clauses(
        &self,
        out: &mut StatementBuilder,
        expression: &QueryExpression,
        clauses: &[WhereClause],
    ) -> DatabaseResult<()> {
        for (index, clause) in clauses.iter().enumerate() {
            if index > 0 {
                out.push(&format!(" {} ", clause.connective.as_sql()));
            }
            self.write_predicate(out, expression, &clause.predicate)?;
        }

        Ok(())
    }

    fn write_predicate(
        &self,
        out: &mut StatementBuilder,
        expression: &QueryExpression,
        predicate: &Predicate,
    ) -> DatabaseResult<()> {
        match predicate {
            Predicate::Compare { column, op, value } => {
                let column = self.column_ref(expression, column)?;
                match (op, value) {
                    (Operator::Eq, Bson::Null) => out.push(&format!("{column} IS NULL")),
                    (Operator::Ne, Bson::Null) => out.push(&format!("{column} IS NOT NULL")),
                    _ => {
                        out.push(&format!("{column} {} ", op.as_sql()));
                        out.bind(value.clone());
                    }
                }
            }
            Predicate::In { column, values, negated } => {
                if values.is_empty() {
                    out.push(if *negated { "1 = 1" } else { "1 = 0" });
                    return Ok(());
                }

                out.push(&format!(
                    "{} {}IN (",
                    self.column_ref(expression, column)?,
                    if *negated { "NOT " } else { "" }
                ));
                for (index, value) in values.iter().enumerate() {
                    if index > 0 {
                        out.push(", ");
                    }
                    out.bind(value.clone());
                }
                out.push(")");
            }
            Predicate::Between { column, low, high, negated } => {
                out.push(&format!(
                    "{} {}BETWEEN ",
                    self.column_ref(expression, column)?,
                    if *negated { "NOT " } else { "" }
                ));
                out.bind(low.clone());
                out.push(" AND ");
                out.bind(high.clone());
            }
            Predicate::Null { column, negated } => out.push(&format!(
                "{} IS {}NULL",
                self.column_ref(expression, column)?,
                if *negated { "NOT " } else { "" }
            )),
            Predicate::Like { column, pattern } => {
                let column = self.column_ref(expression, column)?;
                out.push(&format!("LOWER({column}) LIKE LOWER("));
                out.bind(Bson::String(pattern.clone()));
                out.push(")");
            }
            Predicate::Group(clauses) => {
                if clauses.is_empty() {
                    out.push("1 = 1");
                } else {
                    out.push("(");
                    self.write_clauses(out, expression, clauses)?;
                    out.push(")");
                }
            }
            Predicate::Raw { sql, bindings } => {
                let pieces = sql.split('?').collect::<Vec<_>>();
                if pieces.len() - 1 != bindings.len() {
                    return Err(DatabaseError::InvalidDocument(format!(
                        "raw fragment has {} placeholders but {} bindings",
                        pieces.len() - 1,
                        bindings.len()
                    )));
                }

                out.push("(");
                for (index, piece) in pieces.iter().enumerate() {
                    out.push(piece);
                    if let Some(binding) = bindings.get(index) {
                        out.bind_binding(binding.clone());
                    }
                }
                out.push(")");
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        expression::{Column, Connective, Direction, OrderBy, TableRef},
        schema::ColumnType,
    };
    use bson::doc;

    fn compiler() -> SqlCompiler {
        SqlCompiler::new(SqlDialect::Sqlite)
    }

    fn people() -> QueryExpression {
        QueryExpression::new("people")
    }

    #[test]
    fn select_all() {
        let statement = compiler().compile_select(&people(), &JoinColumns::new()).unwrap();

        assert_eq!(statement.sql, "SELECT * FROM \"people\"");
        assert!(statement.bindings.is_empty());
    }

    #[test]
    fn clauses_are_emitted_in_fixed_order() {
        let mut expr = people();
        expr.limit = Some(10);
        expr.orders.push(OrderBy { column: "name".into(), direction: Direction::Asc });
        expr.offset = Some(20);
        expr.groups.push("age".into());
        expr.push_where(Connective::And, Predicate::compare("age", Operator::Gt, 26));
        expr.columns = vec![Column::new("name"), Column::aliased("age", "years")];

        let statement = compiler().compile_select(&expr, &JoinColumns::new()).unwrap();

        assert_eq!(
            statement.sql,
            "SELECT \"name\", \"age\" AS \"years\" FROM \"people\" WHERE \"age\" > ? GROUP BY \"age\" ORDER BY \"name\" ASC LIMIT 10 OFFSET 20"
        );
        assert_eq!(statement.bindings, vec![Binding::new(26)]);
    }

    #[test]
    fn where_clauses_keep_call_order_and_connectives() {
        let mut expr = people();
        expr.push_where(Connective::And, Predicate::eq("name", "Alice"));
        expr.push_where(Connective::Or, Predicate::is_in("age", [30, 31]));
        expr.push_where(
            Connective::And,
            Predicate::Between { column: "age".into(), low: 1.into(), high: 99.into(), negated: true },
        );
        expr.push_where(Connective::Or, Predicate::Null { column: "email".into(), negated: false });

        let statement = compiler().compile_select(&expr, &JoinColumns::new()).unwrap();

        assert_eq!(
            statement.sql,
            "SELECT * FROM \"people\" WHERE \"name\" = ? OR \"age\" IN (?, ?) AND \"age\" NOT BETWEEN ? AND ? OR \"email\" IS NULL"
        );
        assert_eq!(statement.bindings.len(), 5);
    }

    #[test]
    fn values_are_never_interpolated() {
        let mut expr = people();
        expr.push_where(Connective::And, Predicate::eq("name", "Robert'); DROP TABLE people;--"));

        let statement = compiler().compile_select(&expr, &JoinColumns::new()).unwrap();

        assert!(!statement.sql.contains("DROP"));
        assert_eq!(statement.bindings[0].value, Bson::String("Robert'); DROP TABLE people;--".into()));
    }

    #[test]
    fn like_and_groups_and_raw_fragments() {
        let mut expr = people();
        expr.push_where(Connective::And, Predicate::like("name", "%Li%"));
        expr.push_where(
            Connective::And,
            Predicate::Group(vec![
                WhereClause { connective: Connective::And, predicate: Predicate::eq("age", 1) },
                WhereClause { connective: Connective::Or, predicate: Predicate::eq("age", 2) },
            ]),
        );
        expr.push_where(
            Connective::Or,
            Predicate::Raw { sql: "length(name) > ?".into(), bindings: vec![Binding::new(3)] },
        );

        let statement = SqlCompiler::new(SqlDialect::Postgres)
            .compile_select(&expr, &JoinColumns::new())
            .unwrap();

        assert_eq!(
            statement.sql,
            "SELECT * FROM \"people\" WHERE LOWER(\"name\") LIKE LOWER($1) AND (\"age\" = $2 OR \"age\" = $3) OR (length(name) > $4)"
        );
    }

    #[test]
    fn raw_fragment_binding_count_must_match() {
        let mut expr = people();
        expr.push_where(Connective::And, Predicate::Raw { sql: "a = ? AND b = ?".into(), bindings: vec![] });

        assert!(compiler().compile_select(&expr, &JoinColumns::new()).is_err());
    }

    #[test]
    fn joins_alias_joined_columns_for_flattening() {
        let mut expr = QueryExpression::new("posts");
        expr.joins.push(JoinClause::new(JoinKind::Left, "people", "author_id", "id").with_target("author"));
        expr.push_where(Connective::And, Predicate::eq("id", "p1"));

        let mut columns = JoinColumns::new();
        columns.insert("author".into(), vec!["id".into(), "name".into()]);

        let statement = compiler().compile_select(&expr, &columns).unwrap();

        assert_eq!(
            statement.sql,
            "SELECT \"posts\".*, \"author\".\"id\" AS \"author.id\", \"author\".\"name\" AS \"author.name\" FROM \"posts\" LEFT JOIN \"people\" AS \"author\" ON \"posts\".\"author_id\" = \"author\".\"id\" WHERE \"posts\".\"id\" = ?"
        );
    }

    #[test]
    fn cross_join_has_no_condition() {
        let mut expr = QueryExpression::new("colors");
        expr.table = Some(TableRef { name: "colors".into(), alias: Some("c".into()) });
        expr.joins.push(JoinClause::cross("sizes"));

        let statement = compiler().compile_select(&expr, &JoinColumns::new()).unwrap();

        assert_eq!(
            statement.sql,
            "SELECT \"c\".*, \"sizes\".* FROM \"colors\" AS \"c\" CROSS JOIN \"sizes\""
        );
    }

    #[test]
    fn offset_without_limit_uses_dialect_sentinel() {
        let mut expr = people();
        expr.offset = Some(5);

        assert!(compiler().compile_select(&expr, &JoinColumns::new()).unwrap().sql.ends_with("LIMIT -1 OFFSET 5"));
        assert!(
            SqlCompiler::new(SqlDialect::Postgres)
                .compile_select(&expr, &JoinColumns::new())
                .unwrap()
                .sql
                .ends_with("\"people\" OFFSET 5")
        );
    }

    #[test]
    fn count_wraps_the_unpaged_select() {
        let mut expr = people();
        expr.limit = Some(2);
        expr.push_where(Connective::And, Predicate::compare("age", Operator::Gte, 18));

        let statement = compiler().compile_count(&expr, &JoinColumns::new()).unwrap();

        assert_eq!(
            statement.sql,
            "SELECT COUNT(*) AS \"aggregate\" FROM (SELECT * FROM \"people\" WHERE \"age\" >= ?) AS \"count_source\""
        );
    }

    #[test]
    fn insert_skips_undefined_values() {
        let statement = compiler()
            .compile_insert("people", &doc! { "id": "x", "name": "Alice", "nick": Bson::Undefined })
            .unwrap();

        assert_eq!(statement.sql, "INSERT INTO \"people\" (\"id\", \"name\") VALUES (?, ?)");
        assert_eq!(statement.bindings.len(), 2);
    }

    #[test]
    fn update_never_sets_the_id() {
        let mut expr = people();
        expr.push_where(Connective::And, Predicate::eq("id", "x"));

        let statement = compiler()
            .compile_update(&expr, &doc! { "id": "x", "age": 31 })
            .unwrap();

        assert_eq!(statement.sql, "UPDATE \"people\" SET \"age\" = ? WHERE \"id\" = ?");
        assert_eq!(statement.bindings, vec![Binding::new(31), Binding::new("x")]);
    }

    #[test]
    fn missing_table_fails_compilation() {
        let err = compiler()
            .compile_select(&QueryExpression::unbound(), &JoinColumns::new())
            .unwrap_err();

        assert!(matches!(err, DatabaseError::MissingTable));
        assert!(matches!(compiler().compile_delete(&QueryExpression::unbound()), Err(DatabaseError::MissingTable)));
    }

    #[test]
    fn create_table_injects_uuid_primary_key() {
        let blueprint = TableBlueprint::new("people")
            .column(ColumnDefinition::new("name", ColumnType::String(100)).not_null())
            .column(ColumnDefinition::new("age", ColumnType::Integer).default_value(0))
            .index(["name"], true);

        let statements = compiler().compile_create_table(&blueprint);

        assert_eq!(
            statements[0].sql,
            "CREATE TABLE \"people\" (\"id\" VARCHAR(36) PRIMARY KEY, \"name\" VARCHAR(100) NOT NULL, \"age\" INTEGER DEFAULT 0)"
        );
        assert_eq!(
            statements[1].sql,
            "CREATE UNIQUE INDEX \"people_name_index\" ON \"people\" (\"name\")"
        );
    }

    #[test]
    fn alter_operations() {
        let c = compiler();

        assert_eq!(
            c.compile_alter("people", &AlterOperation::RenameColumn { from: "name".into(), to: "full_name".into() })
                .unwrap()[0]
                .sql,
            "ALTER TABLE \"people\" RENAME COLUMN \"name\" TO \"full_name\""
        );
        assert!(matches!(
            c.compile_alter("people", &AlterOperation::ChangeColumn(ColumnDefinition::new("age", ColumnType::Text))),
            Err(DatabaseError::Unsupported(_))
        ));
        assert_eq!(
            SqlCompiler::new(SqlDialect::MySql)
                .compile_alter("people", &AlterOperation::DropIndex("idx".into()))
                .unwrap()[0]
                .sql,
            "DROP INDEX `idx` ON `people`"
        );
        assert_eq!(
            SqlCompiler::new(SqlDialect::Postgres)
                .compile_alter("people", &AlterOperation::ChangeColumn(ColumnDefinition::new("age", ColumnType::BigInteger)))
                .unwrap()
                .len(),
            2
        );
    }
}
