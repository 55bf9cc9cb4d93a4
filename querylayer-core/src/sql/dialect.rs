//! SQL flavor differences: quoting, placeholders, type names and catalog queries.

use bson::Bson;

use crate::{
    driver::CompiledStatement,
    expression::Binding,
    schema::ColumnType,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SqlDialect {
    #[default]
    Sqlite,
    Postgres,
    MySql,
}

impl SqlDialect {
    /// Quotes an identifier. Dotted names are quoted per segment and `*` is left bare.
    pub fn quote(&self, identifier: &str) -> String {
        identifier
            .split('.')
            .map(|segment| match segment {
                "*" => "*".to_string(),
                segment => {
                    let quote = self.quote_char();
                    let escaped = segment.replace(quote, &format!("{quote}{quote}"));
                    format!("{quote}{escaped}{quote}")
                }
            })
            .collect::<Vec<_>>()
            .join(".")
    }

    /// Quotes an identifier as a single segment, even if it contains dots.
    pub fn quote_alias(&self, alias: &str) -> String {
        let quote = self.quote_char();
        format!("{quote}{}{quote}", alias.replace(quote, &format!("{quote}{quote}")))
    }

    fn quote_char(&self) -> char {
        match self {
            SqlDialect::MySql => '`',
            SqlDialect::Sqlite | SqlDialect::Postgres => '"',
        }
    }

    /// The placeholder for the `index`-th (1-based) binding.
    pub fn placeholder(&self, index: usize) -> String {
        match self {
            SqlDialect::Postgres => format!("${index}"),
            SqlDialect::Sqlite | SqlDialect::MySql => "?".to_string(),
        }
    }

    pub fn column_type(&self, kind: ColumnType) -> String {
        match (self, kind) {
            (_, ColumnType::Uuid) => "VARCHAR(36)".to_string(),
            (_, ColumnType::String(length)) => format!("VARCHAR({length})"),
            (_, ColumnType::Text) => "TEXT".to_string(),
            (SqlDialect::MySql, ColumnType::Integer) => "INT".to_string(),
            (_, ColumnType::Integer) => "INTEGER".to_string(),
            (_, ColumnType::BigInteger) => "BIGINT".to_string(),
            (SqlDialect::Sqlite, ColumnType::Float) => "REAL".to_string(),
            (SqlDialect::Postgres, ColumnType::Float) => "DOUBLE PRECISION".to_string(),
            (SqlDialect::MySql, ColumnType::Float) => "DOUBLE".to_string(),
            (SqlDialect::MySql, ColumnType::Boolean) => "TINYINT(1)".to_string(),
            (_, ColumnType::Boolean) => "BOOLEAN".to_string(),
            (SqlDialect::Sqlite, ColumnType::Json) => "TEXT".to_string(),
            (SqlDialect::Postgres, ColumnType::Json) => "JSONB".to_string(),
            (SqlDialect::MySql, ColumnType::Json) => "JSON".to_string(),
            (_, ColumnType::Timestamp) => "TIMESTAMP".to_string(),
            (SqlDialect::Postgres, ColumnType::Binary) => "BYTEA".to_string(),
            (_, ColumnType::Binary) => "BLOB".to_string(),
        }
    }

    /// Whether `ALTER TABLE` can change a column's definition in place.
    pub fn supports_change_column(&self) -> bool {
        !matches!(self, SqlDialect::Sqlite)
    }

    /// `OFFSET` without `LIMIT` needs a sentinel limit on some engines.
    pub(crate) fn unbounded_limit(&self) -> Option<&'static str> {
        match self {
            SqlDialect::Sqlite => Some("-1"),
            SqlDialect::MySql => Some("18446744073709551615"),
            SqlDialect::Postgres => None,
        }
    }

    pub(crate) fn truncate_keyword(&self) -> &'static str {
        match self {
            SqlDialect::Sqlite => "DELETE FROM",
            SqlDialect::Postgres | SqlDialect::MySql => "TRUNCATE TABLE",
        }
    }

    fn schema_predicate(&self) -> &'static str {
        match self {
            SqlDialect::MySql => "table_schema = DATABASE()",
            _ => "table_schema = current_schema()",
        }
    }

    /// Lists user tables; rows carry a `name` column.
    pub fn list_tables(&self) -> CompiledStatement {
        match self {
            SqlDialect::Sqlite => CompiledStatement::plain(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            ),
            _ => CompiledStatement::plain(format!(
                "SELECT table_name AS name FROM information_schema.tables WHERE {} ORDER BY table_name",
                self.schema_predicate()
            )),
        }
    }

    /// Returns one row when `table` exists.
    pub fn table_exists(&self, table: &str) -> CompiledStatement {
        let sql = match self {
            SqlDialect::Sqlite => format!(
                "SELECT name FROM sqlite_master WHERE type = 'table' AND name = {}",
                self.placeholder(1)
            ),
            _ => format!(
                "SELECT table_name AS name FROM information_schema.tables WHERE {} AND table_name = {}",
                self.schema_predicate(),
                self.placeholder(1)
            ),
        };

        CompiledStatement::new(sql, vec![Binding::new(table)])
    }

    /// Lists the columns of `table` in declaration order; rows carry a `name` column.
    pub fn table_columns(&self, table: &str) -> CompiledStatement {
        let sql = match self {
            SqlDialect::Sqlite => format!(
                "SELECT name FROM pragma_table_info({}) ORDER BY cid",
                self.placeholder(1)
            ),
            _ => format!(
                "SELECT column_name AS name FROM information_schema.columns WHERE {} AND table_name = {} ORDER BY ordinal_position",
                self.schema_predicate(),
                self.placeholder(1)
            ),
        };

        CompiledStatement::new(sql, vec![Binding::new(table)])
    }

    /// Renders a DDL default value. DDL cannot carry bound parameters.
    pub(crate) fn literal(&self, value: &Bson) -> String {
        match value {
            Bson::Null | Bson::Undefined => "NULL".to_string(),
            Bson::Boolean(flag) => match self {
                SqlDialect::Postgres => flag.to_string().to_uppercase(),
                _ => u8::from(*flag).to_string(),
            },
            Bson::Int32(number) => number.to_string(),
            Bson::Int64(number) => number.to_string(),
            Bson::Double(number) => number.to_string(),
            Bson::String(text) => format!("'{}'", text.replace('\'', "''")),
            other => format!("'{}'", other.to_string().replace('\'', "''")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quoting_handles_qualified_names_and_escapes() {
        assert_eq!(SqlDialect::Sqlite.quote("people.name"), "\"people\".\"name\"");
        assert_eq!(SqlDialect::Sqlite.quote("people.*"), "\"people\".*");
        assert_eq!(SqlDialect::MySql.quote("we`ird"), "`we``ird`");
        assert_eq!(SqlDialect::Sqlite.quote_alias("author.name"), "\"author.name\"");
    }

    #[test]
    fn placeholders_follow_the_dialect() {
        assert_eq!(SqlDialect::Sqlite.placeholder(3), "?");
        assert_eq!(SqlDialect::Postgres.placeholder(3), "$3");
    }

    #[test]
    fn literals_escape_quotes() {
        assert_eq!(SqlDialect::Sqlite.literal(&Bson::String("it's".into())), "'it''s'");
        assert_eq!(SqlDialect::Sqlite.literal(&Bson::Boolean(true)), "1");
        assert_eq!(SqlDialect::Postgres.literal(&Bson::Boolean(false)), "FALSE");
    }
}
