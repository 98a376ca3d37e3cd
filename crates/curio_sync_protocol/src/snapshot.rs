//! JSON snapshot codec for mirrored documents.

use crate::error::ProtocolResult;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encodes a domain value as a snapshot document.
///
/// # Errors
///
/// Returns an error if the value cannot be serialized.
pub fn encode_snapshot<T: Serialize + ?Sized>(value: &T) -> ProtocolResult<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

/// Decodes a snapshot document.
///
/// # Errors
///
/// Returns an error if the bytes are not a valid document of type `T`.
pub fn decode_snapshot<T: DeserializeOwned>(bytes: &[u8]) -> ProtocolResult<T> {
    Ok(serde_json::from_slice(bytes)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PhotoRefs;
    use crate::error::ProtocolError;

    #[test]
    fn malformed_snapshot_is_an_error() {
        let result = decode_snapshot::<PhotoRefs>(b"[1,2");
        assert!(matches!(result, Err(ProtocolError::Json(_))));
    }

    #[test]
    fn photo_refs_snapshot_is_a_json_object() {
        let mut photos = PhotoRefs::new();
        photos.set("x".into(), "x.jpg");
        let bytes = encode_snapshot(&photos).unwrap();
        assert_eq!(bytes, br#"{"x":"x.jpg"}"#.to_vec());
    }
}
