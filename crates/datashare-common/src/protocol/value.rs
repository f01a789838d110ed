//! Typed value codec.
//!
//! Two closed sum types travel on the wire:
//!
//! - [`ValueObject`]: the scalar values stored in rows and used as scalar
//!   predicate parameters.
//! - [`PredicateObject`]: every `ValueObject` variant plus the vector variants
//!   that only appear inside predicate operations (`IN`, `NOT IN`, ...).
//!
//! Each encoded value starts with a one-byte discriminator tag. The scalar
//! tags are shared by both types, so a `PredicateObject` holding a scalar
//! encodes to exactly the same bytes as the matching `ValueObject`.
//!
//! ```text
//! tag  variant        payload
//! 0    Null           (none)
//! 1    Int64          i64
//! 2    Double         f64
//! 3    String         i32 len + utf-8 bytes
//! 4    Bool           u8 (0 | 1)
//! 5    Blob           i32 len + bytes
//! 6    IntVector      i32 count + i32 * count
//! 7    Int64Vector    i32 count + i64 * count
//! 8    DoubleVector   i32 count + f64 * count
//! 9    StringVector   i32 count + strings
//! ```

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::error::{DataShareError, Result};
use super::marshal::{Marshal, Unmarshal};
use super::parcel::{Parcel, ParcelReader};

const TAG_NULL: u8 = 0;
const TAG_INT64: u8 = 1;
const TAG_DOUBLE: u8 = 2;
const TAG_STRING: u8 = 3;
const TAG_BOOL: u8 = 4;
const TAG_BLOB: u8 = 5;
const TAG_INT_VECTOR: u8 = 6;
const TAG_INT64_VECTOR: u8 = 7;
const TAG_DOUBLE_VECTOR: u8 = 8;
const TAG_STRING_VECTOR: u8 = 9;

/// A scalar row or parameter value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ValueObject {
    #[default]
    Null,
    Int64(i64),
    Double(f64),
    String(String),
    Bool(bool),
    Blob(Vec<u8>),
}

impl ValueObject {
    pub fn is_null(&self) -> bool {
        matches!(self, ValueObject::Null)
    }

    /// Encodes a standalone value.
    pub fn encode(&self) -> Result<Bytes> {
        let mut parcel = Parcel::new();
        self.marshal(&mut parcel)?;
        Ok(parcel.freeze())
    }

    /// Decodes one value from the front of `data`, returning it together with
    /// the number of bytes it occupied.
    pub fn decode(data: &[u8]) -> Result<(Self, usize)> {
        let mut reader = ParcelReader::new(data);
        let value = Self::unmarshal(&mut reader)?;
        Ok((value, data.len() - reader.remaining()))
    }

    fn marshal_payload(&self, parcel: &mut Parcel) -> Result<()> {
        match self {
            ValueObject::Null => Ok(()),
            ValueObject::Int64(v) => v.marshal(parcel),
            ValueObject::Double(v) => v.marshal(parcel),
            ValueObject::String(v) => v.marshal(parcel),
            ValueObject::Bool(v) => v.marshal(parcel),
            ValueObject::Blob(v) => parcel.write_blob(v),
        }
    }

    fn tag(&self) -> u8 {
        match self {
            ValueObject::Null => TAG_NULL,
            ValueObject::Int64(_) => TAG_INT64,
            ValueObject::Double(_) => TAG_DOUBLE,
            ValueObject::String(_) => TAG_STRING,
            ValueObject::Bool(_) => TAG_BOOL,
            ValueObject::Blob(_) => TAG_BLOB,
        }
    }

    /// Reads the payload for a scalar tag. Returns `Ok(None)` when the tag is
    /// not a scalar tag so the caller can try its own variants.
    fn unmarshal_payload(tag: u8, reader: &mut ParcelReader<'_>) -> Result<Option<Self>> {
        let value = match tag {
            TAG_NULL => ValueObject::Null,
            TAG_INT64 => ValueObject::Int64(reader.read_i64()?),
            TAG_DOUBLE => ValueObject::Double(reader.read_f64()?),
            TAG_STRING => ValueObject::String(reader.read_string()?),
            TAG_BOOL => ValueObject::Bool(reader.read_bool()?),
            TAG_BLOB => ValueObject::Blob(reader.read_blob()?),
            _ => return Ok(None),
        };
        Ok(Some(value))
    }
}

impl Marshal for ValueObject {
    fn marshal(&self, parcel: &mut Parcel) -> Result<()> {
        parcel.write_u8(self.tag());
        self.marshal_payload(parcel)
    }
}

impl Unmarshal for ValueObject {
    fn unmarshal(reader: &mut ParcelReader<'_>) -> Result<Self> {
        let tag = reader.read_u8()?;
        ValueObject::unmarshal_payload(tag, reader)?
            .ok_or_else(|| DataShareError::corrupt(format!("unknown value tag {}", tag)))
    }
}

impl From<i64> for ValueObject {
    fn from(v: i64) -> Self {
        ValueObject::Int64(v)
    }
}

impl From<i32> for ValueObject {
    fn from(v: i32) -> Self {
        ValueObject::Int64(i64::from(v))
    }
}

impl From<f64> for ValueObject {
    fn from(v: f64) -> Self {
        ValueObject::Double(v)
    }
}

impl From<bool> for ValueObject {
    fn from(v: bool) -> Self {
        ValueObject::Bool(v)
    }
}

impl From<&str> for ValueObject {
    fn from(v: &str) -> Self {
        ValueObject::String(v.to_string())
    }
}

impl From<String> for ValueObject {
    fn from(v: String) -> Self {
        ValueObject::String(v)
    }
}

impl From<Vec<u8>> for ValueObject {
    fn from(v: Vec<u8>) -> Self {
        ValueObject::Blob(v)
    }
}

/// A predicate parameter: any scalar, or one of the vector forms.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PredicateObject {
    #[default]
    Null,
    Int64(i64),
    Double(f64),
    String(String),
    Bool(bool),
    Blob(Vec<u8>),
    IntVector(Vec<i32>),
    Int64Vector(Vec<i64>),
    DoubleVector(Vec<f64>),
    StringVector(Vec<String>),
}

impl PredicateObject {
    pub fn is_null(&self) -> bool {
        matches!(self, PredicateObject::Null)
    }

    pub fn encode(&self) -> Result<Bytes> {
        let mut parcel = Parcel::new();
        self.marshal(&mut parcel)?;
        Ok(parcel.freeze())
    }

    pub fn decode(data: &[u8]) -> Result<(Self, usize)> {
        let mut reader = ParcelReader::new(data);
        let value = Self::unmarshal(&mut reader)?;
        Ok((value, data.len() - reader.remaining()))
    }

    /// Returns the scalar view of this parameter, if it is a scalar.
    pub fn as_value(&self) -> Option<ValueObject> {
        let value = match self {
            PredicateObject::Null => ValueObject::Null,
            PredicateObject::Int64(v) => ValueObject::Int64(*v),
            PredicateObject::Double(v) => ValueObject::Double(*v),
            PredicateObject::String(v) => ValueObject::String(v.clone()),
            PredicateObject::Bool(v) => ValueObject::Bool(*v),
            PredicateObject::Blob(v) => ValueObject::Blob(v.clone()),
            PredicateObject::IntVector(_)
            | PredicateObject::Int64Vector(_)
            | PredicateObject::DoubleVector(_)
            | PredicateObject::StringVector(_) => return None,
        };
        Some(value)
    }
}

impl From<ValueObject> for PredicateObject {
    fn from(value: ValueObject) -> Self {
        match value {
            ValueObject::Null => PredicateObject::Null,
            ValueObject::Int64(v) => PredicateObject::Int64(v),
            ValueObject::Double(v) => PredicateObject::Double(v),
            ValueObject::String(v) => PredicateObject::String(v),
            ValueObject::Bool(v) => PredicateObject::Bool(v),
            ValueObject::Blob(v) => PredicateObject::Blob(v),
        }
    }
}

impl From<&str> for PredicateObject {
    fn from(v: &str) -> Self {
        PredicateObject::String(v.to_string())
    }
}

impl From<String> for PredicateObject {
    fn from(v: String) -> Self {
        PredicateObject::String(v)
    }
}

impl From<i64> for PredicateObject {
    fn from(v: i64) -> Self {
        PredicateObject::Int64(v)
    }
}

impl From<f64> for PredicateObject {
    fn from(v: f64) -> Self {
        PredicateObject::Double(v)
    }
}

impl From<bool> for PredicateObject {
    fn from(v: bool) -> Self {
        PredicateObject::Bool(v)
    }
}

impl From<Vec<i32>> for PredicateObject {
    fn from(v: Vec<i32>) -> Self {
        PredicateObject::IntVector(v)
    }
}

impl From<Vec<i64>> for PredicateObject {
    fn from(v: Vec<i64>) -> Self {
        PredicateObject::Int64Vector(v)
    }
}

impl From<Vec<f64>> for PredicateObject {
    fn from(v: Vec<f64>) -> Self {
        PredicateObject::DoubleVector(v)
    }
}

impl From<Vec<String>> for PredicateObject {
    fn from(v: Vec<String>) -> Self {
        PredicateObject::StringVector(v)
    }
}

impl Marshal for PredicateObject {
    fn marshal(&self, parcel: &mut Parcel) -> Result<()> {
        match self {
            PredicateObject::Null => {
                parcel.write_u8(TAG_NULL);
                Ok(())
            }
            PredicateObject::Int64(v) => {
                parcel.write_u8(TAG_INT64);
                v.marshal(parcel)
            }
            PredicateObject::Double(v) => {
                parcel.write_u8(TAG_DOUBLE);
                v.marshal(parcel)
            }
            PredicateObject::String(v) => {
                parcel.write_u8(TAG_STRING);
                v.marshal(parcel)
            }
            PredicateObject::Bool(v) => {
                parcel.write_u8(TAG_BOOL);
                v.marshal(parcel)
            }
            PredicateObject::Blob(v) => {
                parcel.write_u8(TAG_BLOB);
                parcel.write_blob(v)
            }
            PredicateObject::IntVector(v) => {
                parcel.write_u8(TAG_INT_VECTOR);
                v.marshal(parcel)
            }
            PredicateObject::Int64Vector(v) => {
                parcel.write_u8(TAG_INT64_VECTOR);
                v.marshal(parcel)
            }
            PredicateObject::DoubleVector(v) => {
                parcel.write_u8(TAG_DOUBLE_VECTOR);
                v.marshal(parcel)
            }
            PredicateObject::StringVector(v) => {
                parcel.write_u8(TAG_STRING_VECTOR);
                v.marshal(parcel)
            }
        }
    }
}

impl Unmarshal for PredicateObject {
    fn unmarshal(reader: &mut ParcelReader<'_>) -> Result<Self> {
        let tag = reader.read_u8()?;
        if let Some(value) = ValueObject::unmarshal_payload(tag, reader)? {
            return Ok(value.into());
        }
        let object = match tag {
            TAG_INT_VECTOR => PredicateObject::IntVector(reader.read()?),
            TAG_INT64_VECTOR => PredicateObject::Int64Vector(reader.read()?),
            TAG_DOUBLE_VECTOR => PredicateObject::DoubleVector(reader.read()?),
            TAG_STRING_VECTOR => PredicateObject::StringVector(reader.read()?),
            _ => return Err(DataShareError::corrupt(format!("unknown predicate object tag {}", tag))),
        };
        Ok(object)
    }
}
