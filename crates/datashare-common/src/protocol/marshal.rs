//! Marshalling traits shared by every type that crosses the wire.
//!
//! Each protocol type implements [`Marshal`] and [`Unmarshal`] so the proxy
//! and stub can write arguments in a fixed order with `parcel.write(&x)?`
//! and read them back with `reader.read::<T>()?`.

use super::error::Result;
use super::parcel::{Parcel, ParcelReader};

/// Writes a value into a parcel.
pub trait Marshal {
    fn marshal(&self, parcel: &mut Parcel) -> Result<()>;
}

/// Reads a value back from a parcel.
pub trait Unmarshal: Sized {
    /// Smallest number of bytes one encoded value can occupy. Collection
    /// decoding multiplies this by the declared count to reject counts that
    /// cannot possibly fit in the remaining input.
    const MIN_WIRE_SIZE: usize = 1;

    fn unmarshal(reader: &mut ParcelReader<'_>) -> Result<Self>;
}

impl<T: Marshal + ?Sized> Marshal for &T {
    fn marshal(&self, parcel: &mut Parcel) -> Result<()> {
        (**self).marshal(parcel)
    }
}

/// Writes several values into a parcel in order, stopping at the first error.
///
/// ```
/// use datashare_common::marshal;
/// use datashare_common::protocol::Parcel;
///
/// # fn main() -> datashare_common::protocol::Result<()> {
/// let mut parcel = Parcel::new();
/// marshal!(parcel, "datashare:///contacts", 7i64, true)?;
/// # Ok(())
/// # }
/// ```
#[macro_export]
macro_rules! marshal {
    ($parcel:expr, $($value:expr),+ $(,)?) => {
        (|| -> $crate::protocol::Result<()> {
            $( $parcel.write(&$value)?; )+
            Ok(())
        })()
    };
}

macro_rules! impl_fixed_width {
    ($ty:ty, $size:expr, $write:ident, $read:ident) => {
        impl Marshal for $ty {
            fn marshal(&self, parcel: &mut Parcel) -> Result<()> {
                parcel.$write(*self);
                Ok(())
            }
        }

        impl Unmarshal for $ty {
            const MIN_WIRE_SIZE: usize = $size;

            fn unmarshal(reader: &mut ParcelReader<'_>) -> Result<Self> {
                reader.$read()
            }
        }
    };
}

impl_fixed_width!(u8, 1, write_u8, read_u8);
impl_fixed_width!(i16, 2, write_i16, read_i16);
impl_fixed_width!(i32, 4, write_i32, read_i32);
impl_fixed_width!(u32, 4, write_u32, read_u32);
impl_fixed_width!(i64, 8, write_i64, read_i64);
impl_fixed_width!(u64, 8, write_u64, read_u64);
impl_fixed_width!(f64, 8, write_f64, read_f64);
impl_fixed_width!(bool, 1, write_bool, read_bool);

impl Marshal for str {
    fn marshal(&self, parcel: &mut Parcel) -> Result<()> {
        parcel.write_string(self)
    }
}

impl Marshal for String {
    fn marshal(&self, parcel: &mut Parcel) -> Result<()> {
        parcel.write_string(self)
    }
}

impl Unmarshal for String {
    const MIN_WIRE_SIZE: usize = 4;

    fn unmarshal(reader: &mut ParcelReader<'_>) -> Result<Self> {
        reader.read_string()
    }
}

impl<T: Marshal> Marshal for [T] {
    fn marshal(&self, parcel: &mut Parcel) -> Result<()> {
        parcel.write_len(self.len())?;
        for item in self {
            item.marshal(parcel)?;
        }
        Ok(())
    }
}

impl<T: Marshal> Marshal for Vec<T> {
    fn marshal(&self, parcel: &mut Parcel) -> Result<()> {
        self.as_slice().marshal(parcel)
    }
}

impl<T: Unmarshal> Unmarshal for Vec<T> {
    const MIN_WIRE_SIZE: usize = 4;

    fn unmarshal(reader: &mut ParcelReader<'_>) -> Result<Self> {
        let len = reader.read_len(T::MIN_WIRE_SIZE)?;
        let mut items = Vec::with_capacity(len);
        for _ in 0..len {
            items.push(T::unmarshal(reader)?);
        }
        Ok(items)
    }
}

/// `Option<T>` is written as a presence flag followed by the value.
impl<T: Marshal> Marshal for Option<T> {
    fn marshal(&self, parcel: &mut Parcel) -> Result<()> {
        match self {
            Some(value) => {
                parcel.write_bool(true);
                value.marshal(parcel)
            }
            None => {
                parcel.write_bool(false);
                Ok(())
            }
        }
    }
}

impl<T: Unmarshal> Unmarshal for Option<T> {
    fn unmarshal(reader: &mut ParcelReader<'_>) -> Result<Self> {
        if reader.read_bool()? {
            Ok(Some(T::unmarshal(reader)?))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::DataShareError;

    #[test]
    fn test_vec_of_strings() {
        let uris = vec!["datashare:///a".to_string(), "datashare:///b".to_string()];
        let mut parcel = Parcel::new();
        parcel.write(&uris).unwrap();

        let decoded: Vec<String> = parcel.reader().read().unwrap();
        assert_eq!(decoded, uris);
    }

    #[test]
    fn test_option_presence_flag() {
        let mut parcel = Parcel::new();
        parcel.write(&Some(42i64)).unwrap();
        parcel.write(&None::<i64>).unwrap();

        let mut reader = parcel.reader();
        assert_eq!(reader.read::<Option<i64>>().unwrap(), Some(42));
        assert_eq!(reader.read::<Option<i64>>().unwrap(), None);
    }

    #[test]
    fn test_vec_count_checked_against_element_width() {
        // Claims 1000 i64s with 8 bytes of payload.
        let mut parcel = Parcel::new();
        parcel.write_i32(1000);
        parcel.write_i64(1);

        let err = parcel.reader().read::<Vec<i64>>().unwrap_err();
        assert!(matches!(err, DataShareError::CorruptEncoding(_)));
    }

    #[test]
    fn test_nested_vec_count_checked() {
        let mut parcel = Parcel::new();
        parcel.write_i32(i32::MAX);

        let err = parcel.reader().read::<Vec<Vec<String>>>().unwrap_err();
        assert!(matches!(err, DataShareError::CorruptEncoding(_)));
    }
}
