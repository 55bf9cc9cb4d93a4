//! Canonical documents and the document-store backend.
//!
//! A [`Document`] is a loosely-typed key/value record representing one row or
//! one stored document. Above the compiler/executor boundary every document is
//! *canonical*: its primary key is exposed as a string field named
//! [`ID_FIELD`], regardless of the backend's native identifier representation.
//!
//! The submodules implement the document-store side of the query layer:
//! [`DocumentCompiler`] emits native filter documents, [`DocumentExecutor`]
//! runs them through a [`DocumentDriver`](crate::driver::DocumentDriver),
//! [`JoinEmulator`] supplies the joins the store lacks and [`DocumentSchema`]
//! maps schema calls onto collections.

mod compiler;
mod executor;
mod join;
mod schema;

pub use compiler::{DocumentCompiler, like_to_regex};
pub use executor::DocumentExecutor;
pub use join::JoinEmulator;
pub use schema::DocumentSchema;

use bson::{Bson, de::deserialize_from_bson, ser::serialize_to_bson};
use serde::{Serialize, de::DeserializeOwned};

use crate::error::{DatabaseError, DatabaseResult};

/// A loosely-typed record. Shared by both backends.
pub type Document = bson::Document;

/// Name of the canonical identifier field.
pub const ID_FIELD: &str = "id";

/// Extension trait providing canonical-id access and typed conversions for documents.
///
/// # Example
///
/// ```ignore
/// use querylayer::document::{Document, DocumentExt};
/// use serde::{Serialize, Deserialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Person {
///     name: String,
///     age: i64,
/// }
///
/// let doc = Document::from_model(&Person { name: "Alice".into(), age: 25 })?;
/// assert!(!doc.has_id());
/// ```
pub trait DocumentExt: Sized {
    /// Returns `true` when the document carries a non-null `id`.
    fn has_id(&self) -> bool;

    /// Returns the canonical string id, if present.
    fn canonical_id(&self) -> Option<&str>;

    /// Removes properties whose value is `undefined`.
    fn strip_undefined(self) -> Self;

    /// Returns a copy of the document without its `id` field.
    fn without_id(&self) -> Self;

    /// Serializes any serde model into a document.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::InvalidDocument`] if the model does not serialize
    /// to a map, or a serialization error.
    fn from_model<T: Serialize>(model: &T) -> DatabaseResult<Self>;

    /// Deserializes the document into a serde model.
    fn into_model<T: DeserializeOwned>(self) -> DatabaseResult<T>;
}

impl DocumentExt for Document {
    fn has_id(&self) -> bool {
        matches!(self.get(ID_FIELD), Some(value) if !is_nullish(value))
    }

    fn canonical_id(&self) -> Option<&str> {
        self.get(ID_FIELD).and_then(Bson::as_str)
    }

    fn strip_undefined(self) -> Self {
        self.into_iter()
            .filter(|(_, value)| !matches!(value, Bson::Undefined))
            .collect()
    }

    fn without_id(&self) -> Self {
        let mut copy = self.clone();
        copy.remove(ID_FIELD);
        copy
    }

    fn from_model<T: Serialize>(model: &T) -> DatabaseResult<Self> {
        match serialize_to_bson(model)? {
            Bson::Document(doc) => Ok(doc),
            other => Err(DatabaseError::InvalidDocument(format!(
                "expected a map-like model, got {:?}",
                other.element_type()
            ))),
        }
    }

    fn into_model<T: DeserializeOwned>(self) -> DatabaseResult<T> {
        Ok(deserialize_from_bson(Bson::Document(self))?)
    }
}

/// `null` and `undefined` both count as "absent" for keys and ids.
pub(crate) fn is_nullish(value: &Bson) -> bool {
    matches!(value, Bson::Null | Bson::Undefined)
}

/// Reads a (possibly absent) field, treating `null`/`undefined` as absent.
pub(crate) fn present<'a>(document: &'a Document, field: &str) -> Option<&'a Bson> {
    document.get(field).filter(|value| !is_nullish(value))
}
