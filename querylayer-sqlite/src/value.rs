//! Conversion between BSON values and SQLite storage classes.
//!
//! SQLite has five storage classes, so several BSON types collapse on the way
//! in: booleans become integers, date-times become RFC 3339 text, object ids
//! become their hex form, and embedded documents or arrays are stored as
//! relaxed extended JSON text. Reads map each storage class back to the
//! closest BSON type without trying to recover the original one.

use bson::{Binary, Bson, spec::BinarySubtype};
use chrono::SecondsFormat;
use rusqlite::types::{Value, ValueRef};

use querylayer_core::{
    error::{DatabaseError, DatabaseResult},
    expression::Binding,
};

/// Converts a bound parameter into an owned SQLite value.
pub fn to_sql_value(binding: &Binding) -> DatabaseResult<Value> {
    Ok(match &binding.value {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(flag) => Value::Integer(i64::from(*flag)),
        Bson::Int32(number) => Value::Integer(i64::from(*number)),
        Bson::Int64(number) => Value::Integer(*number),
        Bson::Double(number) => Value::Real(*number),
        Bson::String(text) | Bson::Symbol(text) => Value::Text(text.clone()),
        Bson::ObjectId(id) => Value::Text(id.to_hex()),
        Bson::DateTime(moment) => {
            Value::Text(moment.to_chrono().to_rfc3339_opts(SecondsFormat::Millis, true))
        }
        Bson::Binary(binary) => Value::Blob(binary.bytes.clone()),
        nested @ (Bson::Document(_) | Bson::Array(_)) => {
            Value::Text(serde_json::to_string(&nested.clone().into_relaxed_extjson())?)
        }
        other => Value::Text(other.to_string()),
    })
}

/// Reads one column of a result row.
pub fn from_value_ref(value: ValueRef<'_>) -> DatabaseResult<Bson> {
    Ok(match value {
        ValueRef::Null => Bson::Null,
        ValueRef::Integer(number) => Bson::Int64(number),
        ValueRef::Real(number) => Bson::Double(number),
        ValueRef::Text(bytes) => Bson::String(
            std::str::from_utf8(bytes)
                .map_err(|e| DatabaseError::Serialization(e.to_string()))?
                .to_string(),
        ),
        ValueRef::Blob(bytes) => Bson::Binary(Binary {
            subtype: BinarySubtype::Generic,
            bytes: bytes.to_vec(),
        }),
    })
}
