// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use bytes::Bytes;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::Error;

/// The unit persisted in a backend: a thin wrapper around a computed value.
///
/// Wrapping lets a backend tell a cached absence apart from a missing entry. A
/// `CachedValue` whose `data` is `None` is still a stored value, while a backend
/// returning `Ok(None)` means nothing is stored at all.
///
/// Values are encoded as JSON, `{"data": ...}`. A value is considered *nil* when it
/// serializes to JSON `null`, which covers `Option::None`, `()` and unit structs.
///
/// # Examples
///
/// ```
/// use hoard_tier::CachedValue;
///
/// let encoded = CachedValue::encode(&Some("left-pad".to_string()))?;
/// assert!(!encoded.is_nil());
///
/// let decoded = CachedValue::<Option<String>>::decode(encoded.bytes())?;
/// assert_eq!(decoded.data.as_deref(), Some("left-pad"));
///
/// let absent = CachedValue::encode(&None::<String>)?;
/// assert!(absent.is_nil());
/// # Ok::<(), hoard_tier::Error>(())
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedValue<A> {
    /// The wrapped value.
    pub data: A,
}

impl<A> CachedValue<A> {
    /// Wraps a value.
    pub fn new(data: A) -> Self {
        Self { data }
    }

    /// Consumes the wrapper and returns the value.
    pub fn into_inner(self) -> A {
        self.data
    }
}

impl CachedValue<()> {
    /// Encodes `data` wrapped in a `CachedValue`.
    ///
    /// The returned [`Encoded`] also reports whether `data` is nil, so the caller can
    /// decide not to persist it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Codec`] if `data` cannot be serialized.
    pub fn encode<A>(data: &A) -> Result<Encoded, Error>
    where
        A: Serialize + ?Sized,
    {
        let data = serde_json::to_value(data).map_err(Error::codec)?;
        let nil = data.is_null();
        let bytes = serde_json::to_vec(&CachedValue { data }).map_err(Error::codec)?;
        Ok(Encoded {
            bytes: Bytes::from(bytes),
            nil,
        })
    }
}

impl<A> CachedValue<A>
where
    A: DeserializeOwned,
{
    /// Decodes bytes produced by [`CachedValue::encode`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Codec`] if the bytes are not a `CachedValue` holding an `A`.
    pub fn decode(bytes: &[u8]) -> Result<Self, Error> {
        serde_json::from_slice(bytes).map_err(Error::codec)
    }
}

/// An encoded [`CachedValue`], ready to be handed to a backend.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Encoded {
    bytes: Bytes,
    nil: bool,
}

impl Encoded {
    /// Returns `true` if the wrapped value serialized to `null`.
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.nil
    }

    /// Returns the encoded bytes.
    #[must_use]
    pub fn bytes(&self) -> &Bytes {
        &self.bytes
    }

    /// Consumes the encoding and returns the bytes.
    #[must_use]
    pub fn into_bytes(self) -> Bytes {
        self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Serialize)]
    struct Marker;

    #[test]
    fn absent_values_are_nil() {
        assert!(CachedValue::encode(&None::<u32>).unwrap().is_nil());
        assert!(CachedValue::encode(&()).unwrap().is_nil());
        assert!(CachedValue::encode(&Marker).unwrap().is_nil());
    }

    #[test]
    fn empty_values_are_not_nil() {
        assert!(!CachedValue::encode(&Some(0_u32)).unwrap().is_nil());
        assert!(!CachedValue::encode("").unwrap().is_nil());
        assert!(!CachedValue::encode(&Vec::<u8>::new()).unwrap().is_nil());
        assert!(!CachedValue::encode(&false).unwrap().is_nil());
    }

    #[test]
    fn encoding_wraps_value_in_data_field() {
        let encoded = CachedValue::encode(&42_u32).unwrap();
        assert_eq!(encoded.bytes().as_ref(), br#"{"data":42}"#);

        let nil = CachedValue::encode(&None::<u32>).unwrap();
        assert_eq!(nil.into_bytes().as_ref(), br#"{"data":null}"#);
    }

    #[test]
    fn cached_absence_decodes_as_none() {
        let encoded = CachedValue::encode(&None::<String>).unwrap();
        let decoded = CachedValue::<Option<String>>::decode(encoded.bytes()).unwrap();
        assert_eq!(decoded.into_inner(), None);
    }

    #[test]
    fn decoding_into_wrong_type_fails() {
        let encoded = CachedValue::encode("text").unwrap();
        let error = CachedValue::<u64>::decode(encoded.bytes()).unwrap_err();
        assert!(matches!(error, Error::Codec(_)));
    }
}
