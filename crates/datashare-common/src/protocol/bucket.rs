//! Column-name to value maps used by insert and update.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::error::{DataShareError, Result};
use super::marshal::{Marshal, Unmarshal};
use super::parcel::{Parcel, ParcelReader};
use super::value::ValueObject;

/// One row's worth of column values.
///
/// Encoded as an `i32` entry count followed by `(string key, ValueObject)`
/// pairs in key order. A key that repeats within one encoded bucket is
/// rejected on decode.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValuesBucket {
    values: BTreeMap<String, ValueObject>,
}

impl ValuesBucket {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a column, replacing any previous value.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<ValueObject>) -> &mut Self {
        self.values.insert(key.into(), value.into());
        self
    }

    /// Builder form of [`ValuesBucket::put`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<ValueObject>) -> Self {
        self.put(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&ValueObject> {
        self.values.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<ValueObject> {
        self.values.remove(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &ValueObject)> {
        self.values.iter()
    }

    pub fn into_map(self) -> BTreeMap<String, ValueObject> {
        self.values
    }
}

impl From<BTreeMap<String, ValueObject>> for ValuesBucket {
    fn from(values: BTreeMap<String, ValueObject>) -> Self {
        Self { values }
    }
}

impl<K: Into<String>, V: Into<ValueObject>> FromIterator<(K, V)> for ValuesBucket {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self { values: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }
}

impl Marshal for ValuesBucket {
    fn marshal(&self, parcel: &mut Parcel) -> Result<()> {
        parcel.write_len(self.values.len())?;
        for (key, value) in &self.values {
            parcel.write_string(key)?;
            value.marshal(parcel)?;
        }
        Ok(())
    }
}

impl Unmarshal for ValuesBucket {
    const MIN_WIRE_SIZE: usize = 4;

    fn unmarshal(reader: &mut ParcelReader<'_>) -> Result<Self> {
        // each entry is at least a key length prefix and a value tag
        let len = reader.read_len(5)?;
        let mut values = BTreeMap::new();
        for _ in 0..len {
            let key = reader.read_string()?;
            let value: ValueObject = reader.read()?;
            if values.insert(key.clone(), value).is_some() {
                return Err(DataShareError::corrupt(format!("duplicate bucket key '{}'", key)));
            }
        }
        Ok(Self { values })
    }
}
