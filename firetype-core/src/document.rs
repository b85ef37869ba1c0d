//! Conversion between typed values and stored document fields.
//!
//! Stored documents are `bson::Document` maps. Any `Serialize` type can be written and any
//! `DeserializeOwned` type can be read back; no schema is checked beyond what serde enforces
//! during the conversion.

use bson::{Bson, Document, de::deserialize_from_bson, ser::serialize_to_bson};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::{Value, from_value, to_value};

use crate::error::{DatabaseError, DatabaseResult};

/// Extension trait providing conversion of typed data to and from document fields.
///
/// This trait is automatically implemented for all types that are serializable in both
/// directions.
pub trait DocumentExt: Serialize + DeserializeOwned {
    /// Converts this value to document fields.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::InvalidArgument`] if the value does not serialize to a map,
    /// or [`DatabaseError::Serialization`] if serialization fails.
    fn to_fields(&self) -> DatabaseResult<Document> {
        to_fields(self)
    }

    /// Creates a value from document fields.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Serialization`] if the fields do not match the type.
    fn from_fields(fields: Document) -> DatabaseResult<Self> {
        from_fields(fields)
    }

    /// Converts this value to a JSON value.
    fn to_json(&self) -> DatabaseResult<Value> {
        Ok(to_value(self)?)
    }

    /// Creates a value from a JSON value.
    fn from_json(value: Value) -> DatabaseResult<Self> {
        Ok(from_value(value)?)
    }
}

impl<T: Serialize + DeserializeOwned> DocumentExt for T {}

/// Serializes typed data into document fields.
///
/// Map entries that serialize to null, such as `None` options, are left out, so a struct
/// with optional fields used as a partial update only touches the keys it sets. Nulls inside
/// arrays are kept. Use [`to_fields_exact`] to write null values.
pub fn to_fields<T: Serialize + ?Sized>(value: &T) -> DatabaseResult<Document> {
    to_fields_exact(value).map(without_nulls)
}

/// Serializes any value into document fields, keeping null entries.
pub fn to_fields_exact<T: Serialize + ?Sized>(value: &T) -> DatabaseResult<Document> {
    match serialize_to_bson(value)? {
        Bson::Document(fields) => Ok(fields),
        other => Err(DatabaseError::InvalidArgument(format!(
            "document data must serialize to a map, got {:?}",
            other.element_type()
        ))),
    }
}

fn without_nulls(fields: Document) -> Document {
    fields
        .into_iter()
        .filter(|(_, value)| !matches!(value, Bson::Null))
        .map(|(key, value)| (key, nested_without_nulls(value)))
        .collect()
}

fn nested_without_nulls(value: Bson) -> Bson {
    match value {
        Bson::Document(fields) => Bson::Document(without_nulls(fields)),
        Bson::Array(items) => Bson::Array(items.into_iter().map(nested_without_nulls).collect()),
        other => other,
    }
}

/// Deserializes document fields into a typed value.
pub fn from_fields<T: DeserializeOwned>(fields: Document) -> DatabaseResult<T> {
    Ok(deserialize_from_bson(Bson::Document(fields))?)
}

/// Renders document fields as a JSON value.
pub fn fields_to_json(fields: &Document) -> DatabaseResult<Value> {
    Ok(to_value(fields)?)
}

/// Converts a JSON object into document fields.
pub fn fields_from_json(value: &Value) -> DatabaseResult<Document> {
    to_fields_exact(value)
}
