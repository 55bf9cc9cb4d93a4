//! Structural document checks performed before writes.
//!
//! Inserts must not carry an `id`; updates and deletes must. Each check either
//! raises [`DatabaseError::InvalidDocument`] (the default) or, when the
//! validator is built with [`DocumentValidator::suppressed`], degrades to
//! returning `Ok(false)` so that the caller decides what to do.

use bson::Bson;

use crate::{
    document::{Document, DocumentExt},
    error::{DatabaseError, DatabaseResult},
};

#[derive(Debug, Default, Clone, Copy)]
pub struct DocumentValidator {
    suppress_exceptions: bool,
}

impl DocumentValidator {
    /// A validator that raises on the first failed check.
    pub fn new() -> Self {
        Self { suppress_exceptions: false }
    }

    /// A validator whose checks return `false` instead of raising.
    pub fn suppressed() -> Self {
        Self { suppress_exceptions: true }
    }

    pub fn suppresses_exceptions(&self) -> bool {
        self.suppress_exceptions
    }

    /// Checks that `value` is exactly one document.
    pub fn validate_single_document(&self, value: &Bson) -> DatabaseResult<bool> {
        match value {
            Bson::Document(_) => Ok(true),
            other => self.fail(format!(
                "expected a single document, got {:?}",
                other.element_type()
            )),
        }
    }

    /// Checks that `value` is an array whose every element is a document.
    pub fn validate_multiple_documents(&self, value: &Bson) -> DatabaseResult<bool> {
        let Bson::Array(items) = value else {
            return self.fail(format!(
                "expected an array of documents, got {:?}",
                value.element_type()
            ));
        };

        for (index, item) in items.iter().enumerate() {
            if !matches!(item, Bson::Document(_)) {
                return self.fail(format!("Document at index {index} is not a document"));
            }
        }

        Ok(true)
    }

    /// Checks that the document, or every document in the array, carries an `id`.
    pub fn validate_contains_id(&self, value: &Bson) -> DatabaseResult<bool> {
        self.check_ids(value, true)
    }

    /// Checks that the document, or every document in the array, has no `id`.
    pub fn validate_without_id(&self, value: &Bson) -> DatabaseResult<bool> {
        self.check_ids(value, false)
    }

    /// Slice form of [`validate_contains_id`](Self::validate_contains_id).
    pub fn require_contains_id(&self, documents: &[Document]) -> DatabaseResult<bool> {
        self.check_slice(documents, true)
    }

    /// Slice form of [`validate_without_id`](Self::validate_without_id).
    pub fn require_without_id(&self, documents: &[Document]) -> DatabaseResult<bool> {
        self.check_slice(documents, false)
    }

    fn check_ids(&self, value: &Bson, want_id: bool) -> DatabaseResult<bool> {
        match value {
            Bson::Document(document) => {
                if document.has_id() == want_id {
                    Ok(true)
                } else {
                    self.fail(id_message(None, want_id))
                }
            }
            Bson::Array(items) => {
                for (index, item) in items.iter().enumerate() {
                    match item {
                        Bson::Document(document) if document.has_id() == want_id => {}
                        Bson::Document(_) => return self.fail(id_message(Some(index), want_id)),
                        _ => {
                            return self.fail(format!("Document at index {index} is not a document"));
                        }
                    }
                }
                Ok(true)
            }
            other => self.fail(format!(
                "expected a document or an array of documents, got {:?}",
                other.element_type()
            )),
        }
    }

    fn check_slice(&self, documents: &[Document], want_id: bool) -> DatabaseResult<bool> {
        for (index, document) in documents.iter().enumerate() {
            if document.has_id() != want_id {
                let index = (documents.len() > 1).then_some(index);
                return self.fail(id_message(index, want_id));
            }
        }

        Ok(true)
    }

    fn fail(&self, message: String) -> DatabaseResult<bool> {
        if self.suppress_exceptions {
            Ok(false)
        } else {
            Err(DatabaseError::InvalidDocument(message))
        }
    }
}

fn id_message(index: Option<usize>, want_id: bool) -> String {
    let subject = match index {
        Some(index) => format!("Document at index {index}"),
        None => "Document".to_string(),
    };

    if want_id {
        format!("{subject} must contain an id")
    } else {
        format!("{subject} must not contain an id")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::{bson, doc};

    #[test]
    fn single_versus_multiple_shape() {
        let validator = DocumentValidator::new();

        assert!(validator.validate_single_document(&bson!({ "a": 1 })).unwrap());
        assert!(validator.validate_single_document(&bson!([{ "a": 1 }])).is_err());
        assert!(validator.validate_multiple_documents(&bson!([{ "a": 1 }, { "b": 2 }])).unwrap());
        assert!(validator.validate_multiple_documents(&bson!({ "a": 1 })).is_err());
    }

    #[test]
    fn multi_document_failures_name_the_index() {
        let err = DocumentValidator::new()
            .validate_contains_id(&bson!([{ "id": "a" }, { "name": "b" }]))
            .unwrap_err();

        assert!(err.to_string().contains("index 1"), "{err}");

        let err = DocumentValidator::new()
            .validate_multiple_documents(&bson!([{ "a": 1 }, 3]))
            .unwrap_err();
        assert!(err.to_string().contains("index 1"), "{err}");
    }

    #[test]
    fn without_id_rejects_documents_carrying_one() {
        let validator = DocumentValidator::new();

        assert!(validator.validate_without_id(&bson!({ "name": "a" })).unwrap());
        assert!(matches!(
            validator.validate_without_id(&bson!({ "id": "x" })),
            Err(DatabaseError::InvalidDocument(_))
        ));
    }

    #[test]
    fn suppressed_mode_returns_false() {
        let validator = DocumentValidator::suppressed();

        assert!(!validator.validate_contains_id(&bson!({ "name": "a" })).unwrap());
        assert!(!validator.validate_single_document(&bson!(1)).unwrap());
        assert!(!validator.require_without_id(&[doc! { "id": "x" }]).unwrap());
    }

    #[test]
    fn slice_checks() {
        let validator = DocumentValidator::new();
        let docs = vec![doc! { "id": "a" }, doc! { "id": "b" }];

        assert!(validator.require_contains_id(&docs).unwrap());
        assert!(validator.require_without_id(&docs).is_err());
    }
}
