//! Translation of query expressions into document-store filter documents.
//!
//! The output uses the MongoDB query vocabulary. Where-clauses are split on
//! `OR` connectives into groups of `AND`ed conditions, so
//! `a AND b OR c` compiles to `{ "$or": [{ "$and": [a, b] }, c] }`.

use bson::{Bson, doc};

use crate::{
    document::{Document, ID_FIELD},
    driver::NativeQuery,
    error::{DatabaseError, DatabaseResult},
    expression::{Connective, Predicate, QueryExpression, WhereClause},
    identifier::ObjectIdConcern,
};

/// Compiles [`QueryExpression`]s into [`NativeQuery`]s and filter documents.
#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentCompiler {
    identifiers: ObjectIdConcern,
}

impl DocumentCompiler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn identifiers(&self) -> &ObjectIdConcern {
        &self.identifiers
    }

    /// Compiles the read part of an expression.
    ///
    /// Skip and limit are only pushed down when rows need no post-processing
    /// (joins, grouping or distinct); otherwise the executor pages in memory.
    pub fn compile_find(&self, expression: &QueryExpression) -> DatabaseResult<NativeQuery> {
        expression.require_table()?;

        let pushdown = !requires_post_processing(expression);

        Ok(NativeQuery {
            filter: self.compile_filter(&expression.wheres)?,
            sort: self.compile_sort(expression),
            projection: if pushdown { self.compile_projection(expression) } else { None },
            skip: if pushdown { expression.offset } else { None },
            limit: if pushdown { expression.limit } else { None },
        })
    }

    /// Compiles where-clauses into one filter document. No clauses match everything.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::InvalidIdentifier`] for malformed `id` values and
    /// [`DatabaseError::Unsupported`] for raw SQL fragments.
    pub fn compile_filter(&self, clauses: &[WhereClause]) -> DatabaseResult<Document> {
        let mut groups: Vec<Vec<Document>> = Vec::new();

        for (index, clause) in clauses.iter().enumerate() {
            let condition = self.compile_predicate(&clause.predicate)?;

            match groups.last_mut() {
                Some(group) if index > 0 && clause.connective == Connective::And => group.push(condition),
                _ => groups.push(vec![condition]),
            }
        }

        let mut groups = groups
            .into_iter()
            .map(|mut group| match group.len() {
                1 => group.remove(0),
                _ => doc! { "$and": group },
            })
            .collect::<Vec<_>>();

        Ok(match groups.len() {
            0 => Document::new(),
            1 => groups.remove(0),
            _ => doc! { "$or": groups },
        })
    }

    /// Maps order-by entries onto a `{ field: 1 | -1 }` sort document.
    pub fn compile_sort(&self, expression: &QueryExpression) -> Option<Document> {
        if expression.orders.is_empty() {
            return None;
        }

        Some(
            expression
                .orders
                .iter()
                .map(|order| (self.field(&order.column).to_string(), Bson::Int32(order.direction.as_native())))
                .collect(),
        )
    }

    /// Builds an inclusion projection for the selected columns.
    ///
    /// The native id is excluded unless `id` was selected. Aliases are applied
    /// by the executor after the fetch.
    pub fn compile_projection(&self, expression: &QueryExpression) -> Option<Document> {
        if expression.columns.is_empty() {
            return None;
        }

        let mut projection = Document::new();
        for column in &expression.columns {
            projection.insert(self.field(&column.name), 1);
        }
        if !projection.contains_key(ObjectIdConcern::NATIVE_FIELD) {
            projection.insert(ObjectIdConcern::NATIVE_FIELD, 0);
        }

        Some(projection)
    }

    fn field<'a>(&self, column: &'a str) -> &'a str {
        if column == ID_FIELD { ObjectIdConcern::NATIVE_FIELD } else { column }
    }

    fn value(&self, column: &str, value: &Bson) -> DatabaseResult<Bson> {
        if column == ID_FIELD && !matches!(value, Bson::Null) {
            self.identifiers.native_value(value)
        } else {
            Ok(value.clone())
        }
    }

    fn compile_predicate(&self, predicate: &Predicate) -> DatabaseResult<Document> {
        let (column, condition) = match predicate {
            Predicate::Compare { column, op, value } => {
                let mut condition = Document::new();
                condition.insert(op.as_native(), self.value(column, value)?);
                (column, Bson::Document(condition))
            }
            Predicate::In { column, values, negated } => {
                let values = values
                    .iter()
                    .map(|value| self.value(column, value))
                    .collect::<DatabaseResult<Vec<_>>>()?;
                let op = if *negated { "$nin" } else { "$in" };
                let mut condition = Document::new();
                condition.insert(op, values);
                (column, Bson::Document(condition))
            }
            Predicate::Between { column, low, high, negated: false } => {
                let low = self.value(column, low)?;
                let high = self.value(column, high)?;
                (column, Bson::Document(doc! { "$gte": low, "$lte": high }))
            }
            Predicate::Between { column, low, high, negated: true } => {
                let field = self.field(column);
                let low = self.value(column, low)?;
                let high = self.value(column, high)?;
                return Ok(doc! {
                    "$or": [
                        { field: { "$lt": low } },
                        { field: { "$gt": high } },
                    ],
                });
            }
            Predicate::Null { column, negated } => {
                let op = if *negated { "$ne" } else { "$eq" };
                let mut condition = Document::new();
                condition.insert(op, Bson::Null);
                (column, Bson::Document(condition))
            }
            Predicate::Like { column, pattern } => {
                (column, Bson::Document(doc! { "$regex": like_to_regex(pattern), "$options": "i" }))
            }
            Predicate::Group(clauses) => return self.compile_filter(clauses),
            Predicate::Raw { sql, .. } => {
                return Err(DatabaseError::Unsupported(format!(
                    "raw SQL fragment '{sql}' on a document connection"
                )));
            }
        };

        let mut filter = Document::new();
        filter.insert(self.field(column), condition);
        Ok(filter)
    }
}

/// Whether rows must be joined, grouped or deduplicated after the fetch.
pub(crate) fn requires_post_processing(expression: &QueryExpression) -> bool {
    expression.has_joins() || !expression.groups.is_empty() || !expression.distinct.is_empty()
}

/// Translates a SQL `LIKE` pattern into an anchored regular expression.
pub fn like_to_regex(pattern: &str) -> String {
    let mut expression = String::from("^");
    let mut literal = String::new();

    for ch in pattern.chars() {
        match ch {
            '%' | '_' => {
                expression.push_str(&regex::escape(&literal));
                literal.clear();
                expression.push_str(if ch == '%' { ".*" } else { "." });
            }
            other => literal.push(other),
        }
    }

    expression.push_str(&regex::escape(&literal));
    expression.push('$');
    expression
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::{Column, Direction, JoinClause, JoinKind, OrderBy};
    use bson::oid::ObjectId;

    fn compiler() -> DocumentCompiler {
        DocumentCompiler::new()
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let mut expr = QueryExpression::new("people");
        expr.push_where(Connective::And, Predicate::eq("a", 1));
        expr.push_where(Connective::And, Predicate::eq("b", 2));
        expr.push_where(Connective::Or, Predicate::eq("c", 3));

        let filter = compiler().compile_filter(&expr.wheres).unwrap();

        assert_eq!(
            filter,
            doc! { "$or": [
                { "$and": [{ "a": { "$eq": 1 } }, { "b": { "$eq": 2 } }] },
                { "c": { "$eq": 3 } },
            ] }
        );
    }

    #[test]
    fn empty_where_matches_everything() {
        assert_eq!(compiler().compile_filter(&[]).unwrap(), Document::new());
    }

    #[test]
    fn id_is_translated_to_native_object_id() {
        let oid = ObjectId::new();
        let filter = compiler()
            .compile_filter(&[WhereClause { connective: Connective::And, predicate: Predicate::eq("id", oid.to_hex()) }])
            .unwrap();

        assert_eq!(filter, doc! { "_id": { "$eq": oid } });
    }

    #[test]
    fn malformed_id_is_an_invalid_identifier() {
        let err = compiler()
            .compile_filter(&[WhereClause {
                connective: Connective::And,
                predicate: Predicate::is_in("id", ["nope"]),
            }])
            .unwrap_err();

        assert!(err.is_invalid_identifier());
    }

    #[test]
    fn like_patterns_become_anchored_regexes() {
        assert_eq!(like_to_regex("%li%"), "^.*li.*$");
        assert_eq!(like_to_regex("a_c"), "^a.c$");
        assert_eq!(like_to_regex("1.5%"), "^1\\.5.*$");
    }

    #[test]
    fn like_always_ignores_case() {
        let filter = compiler()
            .compile_filter(&[WhereClause { connective: Connective::And, predicate: Predicate::like("name", "a%") }])
            .unwrap();

        assert_eq!(filter, doc! { "name": { "$regex": "^a.*$", "$options": "i" } });
    }

    #[test]
    fn between_and_null_checks() {
        let clauses = vec![
            WhereClause {
                connective: Connective::And,
                predicate: Predicate::Between { column: "age".into(), low: 18.into(), high: 30.into(), negated: false },
            },
            WhereClause {
                connective: Connective::And,
                predicate: Predicate::Null { column: "email".into(), negated: true },
            },
        ];

        assert_eq!(
            compiler().compile_filter(&clauses).unwrap(),
            doc! { "$and": [
                { "age": { "$gte": 18, "$lte": 30 } },
                { "email": { "$ne": Bson::Null } },
            ] }
        );
    }

    #[test]
    fn raw_fragments_are_unsupported() {
        let clauses = vec![WhereClause {
            connective: Connective::And,
            predicate: Predicate::Raw { sql: "1 = 1".into(), bindings: vec![] },
        }];

        assert!(matches!(compiler().compile_filter(&clauses), Err(DatabaseError::Unsupported(_))));
    }

    #[test]
    fn paging_is_pushed_down_only_without_joins() {
        let mut expr = QueryExpression::new("posts");
        expr.orders.push(OrderBy { column: "id".into(), direction: Direction::Desc });
        expr.columns.push(Column::new("title"));
        expr.limit = Some(3);
        expr.offset = Some(1);

        let native = compiler().compile_find(&expr).unwrap();
        assert_eq!(native.sort, Some(doc! { "_id": -1 }));
        assert_eq!(native.projection, Some(doc! { "title": 1, "_id": 0 }));
        assert_eq!((native.skip, native.limit), (Some(1), Some(3)));

        expr.joins.push(JoinClause::new(JoinKind::Left, "people", "author_id", "id"));
        let native = compiler().compile_find(&expr).unwrap();
        assert_eq!((native.skip, native.limit, native.projection), (None, None, None));
    }
}
