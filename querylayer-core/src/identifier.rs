//! Identifier normalization between backend-native keys and the canonical `id`.
//!
//! Each backend stores its primary key in its own shape: the document store
//! keeps a 12-byte [`ObjectId`] under `_id`, the relational store keeps a text
//! UUID in an `id` column. An [`IdentifierConcern`] converts in both directions
//! so that nothing above the executor boundary ever sees a native id.

use bson::{Bson, oid::ObjectId};
use std::fmt::Debug;
use uuid::Uuid;

use crate::{
    document::{Document, ID_FIELD, is_nullish},
    error::{DatabaseError, DatabaseResult},
};

/// Converts identifiers and documents between canonical and native form.
pub trait IdentifierConcern: Send + Sync + Debug {
    /// The backend's native identifier type.
    type NativeId;

    /// Name of the field holding the native identifier.
    fn native_field(&self) -> &'static str;

    /// Parses a canonical string id into the native representation.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::InvalidIdentifier`] when the string cannot be parsed.
    fn to_native_id(&self, id: &str) -> DatabaseResult<Self::NativeId>;

    /// Produces a fresh native identifier for an insert.
    fn generate_id(&self) -> Self::NativeId;

    /// Replaces the native key field with a string `id`.
    ///
    /// Calling this on an already-canonical document returns it unchanged.
    fn to_canonical_document(&self, document: Document) -> Document;

    /// Replaces a canonical `id` with the native key field.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::InvalidIdentifier`] when the `id` is malformed.
    fn to_native_document(&self, document: Document) -> DatabaseResult<Document>;
}

/// Identifier concern for document stores keyed by `_id: ObjectId`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ObjectIdConcern;

impl ObjectIdConcern {
    pub const NATIVE_FIELD: &'static str = "_id";

    /// Converts a native id value into its canonical string form.
    pub fn canonical_value(value: &Bson) -> Bson {
        match value {
            Bson::ObjectId(oid) => Bson::String(oid.to_hex()),
            Bson::String(_) | Bson::Null => value.clone(),
            other => Bson::String(other.to_string()),
        }
    }

    /// Converts a canonical id value (usually a hex string) into a native one.
    pub fn native_value(&self, value: &Bson) -> DatabaseResult<Bson> {
        match value {
            Bson::String(id) => Ok(Bson::ObjectId(self.to_native_id(id)?)),
            Bson::ObjectId(_) => Ok(value.clone()),
            other => Err(DatabaseError::InvalidIdentifier(format!(
                "expected a string id, got {other}"
            ))),
        }
    }
}

impl IdentifierConcern for ObjectIdConcern {
    type NativeId = ObjectId;

    fn native_field(&self) -> &'static str {
        Self::NATIVE_FIELD
    }

    fn to_native_id(&self, id: &str) -> DatabaseResult<ObjectId> {
        ObjectId::parse_str(id)
            .map_err(|_| DatabaseError::InvalidIdentifier(format!("'{id}' is not a valid object id")))
    }

    fn generate_id(&self) -> ObjectId {
        ObjectId::new()
    }

    fn to_canonical_document(&self, mut document: Document) -> Document {
        let Some(native) = document.remove(Self::NATIVE_FIELD) else {
            return document;
        };

        let mut canonical = Document::new();
        canonical.insert(ID_FIELD, Self::canonical_value(&native));
        canonical.extend(document.into_iter().filter(|(key, _)| key != ID_FIELD));
        canonical
    }

    fn to_native_document(&self, mut document: Document) -> DatabaseResult<Document> {
        match document.remove(ID_FIELD) {
            Some(value) if !is_nullish(&value) => {
                let mut native = Document::new();
                native.insert(Self::NATIVE_FIELD, self.native_value(&value)?);
                native.extend(document);
                Ok(native)
            }
            _ => Ok(document),
        }
    }
}

/// Identifier concern for relational tables keyed by a text `id` column.
///
/// Generated ids are v4 UUIDs. Any non-empty string is accepted as an
/// existing id so that tables created outside this layer remain usable.
#[derive(Debug, Default, Clone, Copy)]
pub struct TextIdConcern;

impl IdentifierConcern for TextIdConcern {
    type NativeId = String;

    fn native_field(&self) -> &'static str {
        ID_FIELD
    }

    fn to_native_id(&self, id: &str) -> DatabaseResult<String> {
        if id.trim().is_empty() {
            return Err(DatabaseError::InvalidIdentifier("empty id".to_string()));
        }

        Ok(id.to_string())
    }

    fn generate_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    fn to_canonical_document(&self, mut document: Document) -> Document {
        let canonical = match document.get(ID_FIELD) {
            Some(Bson::Int32(id)) => Some(id.to_string()),
            Some(Bson::Int64(id)) => Some(id.to_string()),
            _ => None,
        };

        if let Some(id) = canonical {
            document.insert(ID_FIELD, id);
        }

        document
    }

    fn to_native_document(&self, document: Document) -> DatabaseResult<Document> {
        match document.get(ID_FIELD) {
            Some(Bson::String(id)) => {
                self.to_native_id(id)?;
                Ok(document)
            }
            Some(value) if !is_nullish(value) => Err(DatabaseError::InvalidIdentifier(format!(
                "expected a string id, got {value}"
            ))),
            _ => Ok(document),
        }
    }
}
