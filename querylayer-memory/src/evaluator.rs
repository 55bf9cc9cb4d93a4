//! Filter evaluation for in-memory collections.
//!
//! Filters use the same operator vocabulary the document compiler emits:
//! `$and`, `$or` and `$nor` at the top level, and `$eq`, `$ne`, `$gt`,
//! `$gte`, `$lt`, `$lte`, `$in`, `$nin`, `$exists`, `$regex` (with
//! `$options`) and `$not` on fields. A bare value is an equality test. A
//! missing field compares equal to `null`, and an array field matches when
//! any of its elements does.

use bson::{Bson, datetime::DateTime, oid::ObjectId};
use regex::RegexBuilder;
use std::{cmp::Ordering, collections::HashMap};

use querylayer_core::{
    document::Document,
    error::{DatabaseError, DatabaseResult},
};

/// Type-erased, comparable view of a BSON value. Integers and doubles are
/// widened to `f64`.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    ObjectId(ObjectId),
    String(&'a str),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
    Opaque(&'a Bson),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Null | Bson::Undefined => Comparable::Null,
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(f64::from(*value)),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::String(value) | Bson::Symbol(value) => Comparable::String(value),
            Bson::Array(items) => Comparable::Array(items.iter().map(Comparable::from).collect()),
            Bson::Document(document) => Comparable::Map(
                document
                    .iter()
                    .map(|(key, value)| (key.as_str(), Comparable::from(value)))
                    .collect(),
            ),
            other => Comparable::Opaque(other),
        }
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            (Comparable::Opaque(a), Comparable::Opaque(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.bytes().partial_cmp(&b.bytes()),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            _ => None,
        }
    }
}

/// Reads a possibly dotted field path.
pub(crate) fn resolve<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = current.as_document()?.get(segment)?;
    }

    Some(current)
}

/// Ordering used by sorts: missing and `null` values sort first, values of
/// incomparable types keep their relative order.
pub(crate) fn sort_order(left: Option<&Bson>, right: Option<&Bson>) -> Ordering {
    let left = left.map(Comparable::from).unwrap_or(Comparable::Null);
    let right = right.map(Comparable::from).unwrap_or(Comparable::Null);

    match (&left, &right) {
        (Comparable::Null, Comparable::Null) => Ordering::Equal,
        (Comparable::Null, _) => Ordering::Less,
        (_, Comparable::Null) => Ordering::Greater,
        _ => left.partial_cmp(&right).unwrap_or(Ordering::Equal),
    }
}

/// Evaluates `filter` against one document.
pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    pub fn evaluate(&self, filter: &Document) -> DatabaseResult<bool> {
        for (key, condition) in filter {
            let matched = match key.as_str() {
                "$and" => {
                    let mut all = true;
                    for branch in branches(key, condition)? {
                        if !self.evaluate(branch)? {
                            all = false;
                            break;
                        }
                    }
                    all
                }
                "$or" => {
                    let mut any = false;
                    for branch in branches(key, condition)? {
                        if self.evaluate(branch)? {
                            any = true;
                            break;
                        }
                    }
                    any
                }
                "$nor" => {
                    let mut none = true;
                    for branch in branches(key, condition)? {
                        if self.evaluate(branch)? {
                            none = false;
                            break;
                        }
                    }
                    none
                }
                operator if operator.starts_with('$') => {
                    return Err(DatabaseError::Unsupported(format!("top-level operator '{operator}'")));
                }
                field => self.field_matches(resolve(self.document, field), condition)?,
            };

            if !matched {
                return Ok(false);
            }
        }

        Ok(true)
    }

    pub fn filter_documents<'d>(
        documents: impl IntoIterator<Item = &'d Document>,
        filter: &Document,
    ) -> DatabaseResult<Vec<&'d Document>> {
        let mut matched = Vec::new();

        for document in documents {
            if DocumentEvaluator::new(document).evaluate(filter)? {
                matched.push(document);
            }
        }

        Ok(matched)
    }

    fn field_matches(&self, value: Option<&Bson>, condition: &Bson) -> DatabaseResult<bool> {
        match condition {
            Bson::Document(operators) if is_operator_document(operators) => {
                operators_match(value, operators)
            }
            operand => Ok(equals(value, operand)),
        }
    }
}

fn branches<'f>(key: &str, condition: &'f Bson) -> DatabaseResult<Vec<&'f Document>> {
    let Bson::Array(items) = condition else {
        return Err(DatabaseError::Unsupported(format!("'{key}' expects an array of filters")));
    };

    items
        .iter()
        .map(|item| {
            item.as_document()
                .ok_or_else(|| DatabaseError::Unsupported(format!("'{key}' expects an array of filters")))
        })
        .collect()
}

fn is_operator_document(document: &Document) -> bool {
    document.keys().next().is_some_and(|key| key.starts_with('$'))
}

fn operators_match(value: Option<&Bson>, operators: &Document) -> DatabaseResult<bool> {
    for (operator, operand) in operators {
        let matched = match operator.as_str() {
            "$eq" => equals(value, operand),
            "$ne" => !equals(value, operand),
            "$gt" => compares(value, operand, |ordering| ordering == Ordering::Greater),
            "$gte" => compares(value, operand, |ordering| ordering != Ordering::Less),
            "$lt" => compares(value, operand, |ordering| ordering == Ordering::Less),
            "$lte" => compares(value, operand, |ordering| ordering != Ordering::Greater),
            "$in" => candidates(operator, operand)?.iter().any(|candidate| equals(value, candidate)),
            "$nin" => !candidates(operator, operand)?.iter().any(|candidate| equals(value, candidate)),
            "$exists" => value.is_some() == operand.as_bool().unwrap_or(true),
            "$regex" => {
                let options = operators.get_str("$options").unwrap_or_default();
                match operand {
                    Bson::String(pattern) => regex_matches(value, pattern, options)?,
                    _ => return Err(DatabaseError::Unsupported("'$regex' expects a string pattern".to_string())),
                }
            }
            "$options" => true,
            "$not" => match operand {
                Bson::Document(inner) => !operators_match(value, inner)?,
                _ => return Err(DatabaseError::Unsupported("'$not' expects an operator document".to_string())),
            },
            other => return Err(DatabaseError::Unsupported(format!("query operator '{other}'"))),
        };

        if !matched {
            return Ok(false);
        }
    }

    Ok(true)
}

fn candidates<'o>(operator: &str, operand: &'o Bson) -> DatabaseResult<&'o Vec<Bson>> {
    operand
        .as_array()
        .ok_or_else(|| DatabaseError::Unsupported(format!("'{operator}' expects an array")))
}

fn equals(value: Option<&Bson>, operand: &Bson) -> bool {
    let expected = Comparable::from(operand);

    match value {
        None => expected == Comparable::Null,
        Some(Bson::Array(items)) if !matches!(operand, Bson::Array(_)) => {
            items.iter().any(|item| Comparable::from(item) == expected)
        }
        Some(value) => Comparable::from(value) == expected,
    }
}

fn compares(value: Option<&Bson>, operand: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    let Some(value) = value else {
        return false;
    };

    let expected = Comparable::from(operand);
    let test = |item: &Bson| Comparable::from(item).partial_cmp(&expected).is_some_and(&accept);

    match value {
        Bson::Array(items) => items.iter().any(test),
        value => test(value),
    }
}

fn regex_matches(value: Option<&Bson>, pattern: &str, options: &str) -> DatabaseResult<bool> {
    let Some(Bson::String(text)) = value else {
        return Ok(false);
    };

    let regex = RegexBuilder::new(pattern)
        .case_insensitive(options.contains('i'))
        .multi_line(options.contains('m'))
        .dot_matches_new_line(options.contains('s'))
        .build()
        .map_err(|e| DatabaseError::Backend(format!("invalid $regex '{pattern}': {e}")))?;

    Ok(regex.is_match(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    fn matches(document: &Document, filter: Document) -> bool {
        DocumentEvaluator::new(document).evaluate(&filter).unwrap()
    }

    #[test]
    fn bare_values_and_comparisons() {
        let person = doc! { "name": "Bob", "age": 29_i64, "tags": ["a", "b"] };

        assert!(matches(&person, doc! { "name": "Bob" }));
        assert!(matches(&person, doc! { "age": { "$gt": 26_i32, "$lte": 29.0 } }));
        assert!(!matches(&person, doc! { "age": { "$lt": 20_i64 } }));
        assert!(matches(&person, doc! { "tags": "b" }));
        assert!(matches(&person, doc! { "age": { "$in": [1_i64, 29_i64] } }));
        assert!(matches(&person, doc! { "age": { "$nin": [1_i64] } }));
    }

    #[test]
    fn missing_fields_behave_as_null() {
        let person = doc! { "name": "Bob", "nickname": Bson::Null };

        assert!(matches(&person, doc! { "email": { "$eq": Bson::Null } }));
        assert!(matches(&person, doc! { "nickname": { "$eq": Bson::Null } }));
        assert!(!matches(&person, doc! { "name": { "$eq": Bson::Null } }));
        assert!(matches(&person, doc! { "name": { "$ne": Bson::Null } }));
        assert!(!matches(&person, doc! { "email": { "$gt": 1_i32 } }));
        assert!(matches(&person, doc! { "email": { "$exists": false } }));
    }

    #[test]
    fn connectives_nest() {
        let person = doc! { "name": "Bob", "age": 29_i64 };

        assert!(matches(
            &person,
            doc! { "$or": [ { "$and": [ { "name": "Ann" } ] }, { "$and": [ { "age": { "$gte": 29_i64 } } ] } ] }
        ));
        assert!(!matches(&person, doc! { "$nor": [ { "name": "Bob" } ] }));
        assert!(matches(&person, doc! { "age": { "$not": { "$lt": 10_i64 } } }));
    }

    #[test]
    fn regex_honours_options() {
        let person = doc! { "name": "Robert" };

        assert!(matches(&person, doc! { "name": { "$regex": "^rob", "$options": "i" } }));
        assert!(!matches(&person, doc! { "name": { "$regex": "^rob", "$options": "" } }));
        assert!(!matches(&person, doc! { "age": { "$regex": "1" } }));
    }

    #[test]
    fn dotted_paths_reach_nested_documents() {
        let post = doc! { "author": { "name": "Ann" } };
        assert!(matches(&post, doc! { "author.name": "Ann" }));
    }

    #[test]
    fn unknown_operators_are_rejected() {
        let err = DocumentEvaluator::new(&doc! { "a": 1 })
            .evaluate(&doc! { "a": { "$where": "true" } })
            .unwrap_err();

        assert!(matches!(err, DatabaseError::Unsupported(_)));
    }

    #[test]
    fn nulls_sort_first() {
        let one = Bson::Int64(1);
        assert_eq!(sort_order(None, Some(&one)), Ordering::Less);
        assert_eq!(sort_order(Some(&one), Some(&Bson::Double(0.5))), Ordering::Greater);
    }
}
