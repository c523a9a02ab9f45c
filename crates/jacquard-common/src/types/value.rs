//! Untyped atproto data-model value, used wherever a lexicon schema allows
//! an arbitrary value (e.g. `record`, `unknown`, blob refs nested in records).
//!
//! [`Data`] is the validated, type-inferred representation: string fields are
//! parsed into their most specific [`crate::types::string::AtprotoStr`]
//! variant where the surrounding key or a `$type` hint makes that possible.
//! [`RawData`] is the unvalidated intermediate produced directly off the
//! wire by serde before type inference is applied; see [`convert`].

use std::collections::BTreeMap;

use bytes::Bytes;
use smol_str::SmolStr;

use crate::types::{
    DataModelType,
    blob::Blob,
    cid::Cid,
    string::AtprotoStr,
};

pub mod convert;
pub mod parsing;
mod serde_impl;
#[cfg(test)]
mod tests;

pub use convert::ConversionError;
pub use serde_impl::{DataDeserializerError, RawDataSerializerError};

/// Validated atproto data-model value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Data<'s> {
    Null,
    Boolean(bool),
    Integer(i64),
    String(AtprotoStr<'s>),
    Bytes(Bytes),
    CidLink(Cid<'s>),
    Array(Array<'s>),
    Object(Object<'s>),
    Blob(Blob<'s>),
}

impl<'s> Data<'s> {
    /// The coarse shape of this value, used for conversion error messages.
    pub fn data_type(&self) -> DataModelType {
        match self {
            Data::Null => DataModelType::Null,
            Data::Boolean(_) => DataModelType::Boolean,
            Data::Integer(_) => DataModelType::Integer,
            Data::String(s) => DataModelType::String(s.string_type()),
            Data::Bytes(_) => DataModelType::Bytes,
            Data::CidLink(_) => DataModelType::CidLink,
            Data::Array(_) => DataModelType::Array,
            Data::Object(_) => DataModelType::Object,
            Data::Blob(_) => DataModelType::Blob,
        }
    }
}

impl crate::IntoStatic for Data<'_> {
    type Output = Data<'static>;
    fn into_static(self) -> Self::Output {
        match self {
            Data::Null => Data::Null,
            Data::Boolean(b) => Data::Boolean(b),
            Data::Integer(i) => Data::Integer(i),
            Data::String(s) => Data::String(s.into_static()),
            Data::Bytes(b) => Data::Bytes(b),
            Data::CidLink(cid) => Data::CidLink(cid.into_static()),
            Data::Array(arr) => Data::Array(arr.into_static()),
            Data::Object(obj) => Data::Object(obj.into_static()),
            Data::Blob(blob) => Data::Blob(blob.into_static()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Array<'s>(pub Vec<Data<'s>>);

impl crate::IntoStatic for Array<'_> {
    type Output = Array<'static>;
    fn into_static(self) -> Self::Output {
        Array(self.0.into_iter().map(|d| d.into_static()).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Object<'s>(pub BTreeMap<SmolStr, Data<'s>>);

impl crate::IntoStatic for Object<'_> {
    type Output = Object<'static>;
    fn into_static(self) -> Self::Output {
        Object(
            self.0
                .into_iter()
                .map(|(k, v)| (k, v.into_static()))
                .collect(),
        )
    }
}

/// Error produced while applying key/`$type`-based inference to a freshly
/// deserialized [`RawData`] tree.
#[derive(Debug, Clone, thiserror::Error, miette::Diagnostic)]
#[non_exhaustive]
pub enum AtDataError {
    /// A structural pattern (e.g. a blob ref) was recognized but one of its
    /// required fields was missing or of the wrong shape.
    #[error("malformed {what}: {message}")]
    Malformed {
        /// What we were trying to parse (e.g. "blob ref").
        what: &'static str,
        /// Description of what was wrong.
        message: String,
    },
}

/// Unvalidated data-model value, as produced directly by serde before key- and
/// `$type`-based inference refines it into a [`Data`]. See [`convert`].
#[derive(Debug, Clone, PartialEq)]
pub enum RawData<'s> {
    Null,
    Boolean(bool),
    SignedInt(i64),
    UnsignedInt(u64),
    String(crate::CowStr<'s>),
    Bytes(Bytes),
    CidLink(Cid<'s>),
    Array(Vec<RawData<'s>>),
    Object(BTreeMap<SmolStr, RawData<'s>>),
    Blob(Blob<'s>),
    /// A map that looked like a blob ref ($type: "blob") but didn't have the
    /// required fields; preserved so it still round-trips.
    InvalidBlob(Box<RawData<'s>>),
    /// A float, which has no lossless atproto data-model representation;
    /// preserved as its big-endian bytes so it still round-trips.
    InvalidNumber(Bytes),
    /// Any other value that doesn't fit the data model (unit, unsupported
    /// serde calls); preserved as opaque bytes.
    InvalidData(Bytes),
}

impl crate::IntoStatic for RawData<'_> {
    type Output = RawData<'static>;
    fn into_static(self) -> Self::Output {
        match self {
            RawData::Null => RawData::Null,
            RawData::Boolean(b) => RawData::Boolean(b),
            RawData::SignedInt(i) => RawData::SignedInt(i),
            RawData::UnsignedInt(u) => RawData::UnsignedInt(u),
            RawData::String(s) => RawData::String(s.into_static()),
            RawData::Bytes(b) => RawData::Bytes(b),
            RawData::CidLink(cid) => RawData::CidLink(cid.into_static()),
            RawData::Array(arr) => {
                RawData::Array(arr.into_iter().map(|d| d.into_static()).collect())
            }
            RawData::Object(map) => RawData::Object(
                map.into_iter()
                    .map(|(k, v)| (k, v.into_static()))
                    .collect(),
            ),
            RawData::Blob(blob) => RawData::Blob(blob.into_static()),
            RawData::InvalidBlob(inner) => RawData::InvalidBlob(Box::new(inner.into_static())),
            RawData::InvalidNumber(b) => RawData::InvalidNumber(b),
            RawData::InvalidData(b) => RawData::InvalidData(b),
        }
    }
}
