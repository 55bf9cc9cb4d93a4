//! Application-level joins for stores without a join operator.
//!
//! The emulator works on rows that were already fetched, filtered and sorted.
//! Each join issues one lookup against the joined collection, built by
//! [`key_lookup`] like a relationship lookup, and merges the result under the
//! join's target property:
//!
//! | kind  | unmatched base row      | unmatched joined row      |
//! |-------|-------------------------|---------------------------|
//! | inner | dropped                 | dropped                   |
//! | left  | kept, `target: null`    | dropped                   |
//! | right | dropped                 | appended as `{ target }`  |
//! | full  | kept, `target: null`    | appended as `{ target }`  |
//! | cross | every pairing, no key   |                           |
//!
//! Joins run in the order they were added, so a later join's local key may
//! point into an earlier join's target (`"author.team_id"`).

use bson::Bson;
use tracing::debug;

use crate::{
    document::{Document, DocumentCompiler, ID_FIELD, is_nullish},
    driver::DocumentDriver,
    error::DatabaseResult,
    expression::{JoinClause, JoinKind, QueryExpression},
    identifier::IdentifierConcern,
    relationship::key_lookup,
};

/// Emulates relational joins over a [`DocumentDriver`].
#[derive(Debug, Clone, Copy)]
pub struct JoinEmulator<'a> {
    driver: &'a dyn DocumentDriver,
    compiler: DocumentCompiler,
}

impl<'a> JoinEmulator<'a> {
    pub fn new(driver: &'a dyn DocumentDriver) -> Self {
        Self { driver, compiler: DocumentCompiler::new() }
    }

    /// Applies every join in order.
    pub async fn apply(&self, mut rows: Vec<Document>, joins: &[JoinClause]) -> DatabaseResult<Vec<Document>> {
        for join in joins {
            let joined = self.lookup(&rows, join).await?;
            rows = Self::merge(rows, joined, join);
        }

        Ok(rows)
    }

    /// Fetches the joined rows that can take part in `join`, in canonical form.
    ///
    /// Inner and left joins only fetch rows whose foreign key appears among
    /// the base rows' local keys. The other kinds need the whole collection.
    pub async fn lookup(&self, rows: &[Document], join: &JoinClause) -> DatabaseResult<Vec<Document>> {
        let expression = match join.kind {
            JoinKind::Inner | JoinKind::Left => {
                let keys = self.lookup_keys(rows, join);
                if keys.is_empty() {
                    return Ok(Vec::new());
                }

                key_lookup(&join.table, &join.foreign_key, keys)
            }
            JoinKind::Right | JoinKind::Full | JoinKind::Cross => QueryExpression::new(join.table.as_str()),
        };

        let query = self.compiler.compile_find(&expression)?;
        debug!(collection = %join.table, kind = ?join.kind, filter = %query.filter, "join lookup");

        let identifiers = self.compiler.identifiers();
        Ok(self
            .driver
            .find(&join.table, &query)
            .await?
            .into_iter()
            .map(|document| identifiers.to_canonical_document(document))
            .collect())
    }

    /// Distinct local-key values of `rows`. Keys that cannot name a native id
    /// are skipped when joining on `id`, since they match nothing.
    fn lookup_keys(&self, rows: &[Document], join: &JoinClause) -> Vec<Bson> {
        let mut keys: Vec<Bson> = Vec::new();

        for row in rows {
            let Some(value) = lookup_path(row, &join.local_key).filter(|value| !is_nullish(value)) else {
                continue;
            };

            if join.foreign_key == ID_FIELD && self.compiler.identifiers().native_value(value).is_err() {
                continue;
            }

            if !keys.contains(value) {
                keys.push(value.clone());
            }
        }

        keys
    }

    /// Merges already-fetched joined rows into `rows` according to `join.kind`.
    pub fn merge(rows: Vec<Document>, joined: Vec<Document>, join: &JoinClause) -> Vec<Document> {
        if join.kind == JoinKind::Cross {
            return rows
                .into_iter()
                .flat_map(|row| {
                    joined
                        .iter()
                        .map(|other| with_target(row.clone(), &join.target, Bson::Document(other.clone())))
                        .collect::<Vec<_>>()
                })
                .collect();
        }

        let mut used = vec![false; joined.len()];
        let mut merged = Vec::with_capacity(rows.len());

        for row in rows {
            let local = lookup_path(&row, &join.local_key)
                .filter(|value| !is_nullish(value))
                .cloned();

            let matches = joined
                .iter()
                .enumerate()
                .filter(|(_, other)| match (&local, other.get(&join.foreign_key)) {
                    (Some(local), Some(foreign)) => same_key(local, foreign),
                    _ => false,
                })
                .map(|(index, _)| index)
                .collect::<Vec<_>>();

            if matches.is_empty() {
                if join.kind.keeps_unmatched_base() {
                    merged.push(with_target(row, &join.target, Bson::Null));
                }
                continue;
            }

            for index in matches {
                used[index] = true;
                merged.push(with_target(row.clone(), &join.target, Bson::Document(joined[index].clone())));
            }
        }

        if join.kind.keeps_unmatched_joined() {
            merged.extend(
                joined
                    .into_iter()
                    .zip(used)
                    .filter(|(_, used)| !used)
                    .map(|(other, _)| with_target(Document::new(), &join.target, Bson::Document(other))),
            );
        }

        merged
    }
}

fn with_target(mut row: Document, target: &str, value: Bson) -> Document {
    row.insert(target, value);
    row
}

/// Reads a dotted path through nested documents.
pub(crate) fn lookup_path<'d>(document: &'d Document, path: &str) -> Option<&'d Bson> {
    if let Some(value) = document.get(path) {
        return Some(value);
    }

    let (head, rest) = path.split_once('.')?;
    match document.get(head)? {
        Bson::Document(inner) => lookup_path(inner, rest),
        _ => None,
    }
}

/// Key equality with numeric widening, so `Int32(1)` matches `Int64(1)`.
fn same_key(left: &Bson, right: &Bson) -> bool {
    match (as_number(left), as_number(right)) {
        (Some(left), Some(right)) => left == right,
        _ => left == right,
    }
}

fn as_number(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(number) => Some(f64::from(*number)),
        Bson::Int64(number) => Some(*number as f64),
        Bson::Double(number) => Some(*number),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn posts() -> Vec<Document> {
        vec![
            doc! { "id": "p1", "title": "Hello", "author_id": "a1" },
            doc! { "id": "p2", "title": "Orphan", "author_id": "zz" },
        ]
    }

    fn authors() -> Vec<Document> {
        vec![
            doc! { "id": "a1", "name": "Alice" },
            doc! { "id": "a2", "name": "Bob" },
        ]
    }

    fn join(kind: JoinKind) -> JoinClause {
        JoinClause::new(kind, "authors", "author_id", "id").with_target("author")
    }

    #[test]
    fn inner_drops_unmatched_rows() {
        let rows = JoinEmulator::merge(posts(), authors(), &join(JoinKind::Inner));

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get_document("author").unwrap().get_str("name").unwrap(), "Alice");
    }

    #[test]
    fn left_keeps_unmatched_rows_with_null_target() {
        let rows = JoinEmulator::merge(posts(), authors(), &join(JoinKind::Left));

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].get("author"), Some(&Bson::Null));
        assert_eq!(rows[1].get_str("title").unwrap(), "Orphan");
    }

    #[test]
    fn right_appends_unmatched_joined_rows() {
        let rows = JoinEmulator::merge(posts(), authors(), &join(JoinKind::Right));

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get_str("id").unwrap(), "p1");
        assert_eq!(rows[1], doc! { "author": { "id": "a2", "name": "Bob" } });
    }

    #[test]
    fn full_keeps_both_sides() {
        let rows = JoinEmulator::merge(posts(), authors(), &join(JoinKind::Full));

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].get("author"), Some(&Bson::Null));
        assert_eq!(rows[2].get_document("author").unwrap().get_str("id").unwrap(), "a2");
    }

    #[test]
    fn cross_pairs_every_row() {
        let rows = JoinEmulator::merge(posts(), authors(), &JoinClause::cross("authors"));

        assert_eq!(rows.len(), 4);
        assert!(JoinEmulator::merge(posts(), Vec::new(), &JoinClause::cross("authors")).is_empty());
    }

    #[test]
    fn numeric_keys_match_across_widths() {
        let rows = vec![doc! { "id": "p1", "score_id": 7_i32 }];
        let scores = vec![doc! { "code": 7_i64, "label": "seven" }];

        let merged = JoinEmulator::merge(rows, scores, &JoinClause::new(JoinKind::Inner, "scores", "score_id", "code"));

        assert_eq!(merged.len(), 1);
    }

    #[test]
    fn dotted_paths_reach_earlier_join_targets() {
        let row = doc! { "author": { "team_id": "t1" } };

        assert_eq!(lookup_path(&row, "author.team_id"), Some(&Bson::String("t1".into())));
        assert_eq!(lookup_path(&row, "author.missing"), None);
    }
}
