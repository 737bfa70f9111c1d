//! CBOR helpers for persisted metadata.

use crate::error::{CodecError, CodecResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Serializes `value` to CBOR bytes.
pub fn to_cbor<T: Serialize>(value: &T) -> CodecResult<Vec<u8>> {
    let mut out = Vec::new();
    ciborium::into_writer(value, &mut out).map_err(|e| CodecError::Cbor {
        message: e.to_string(),
    })?;
    Ok(out)
}

/// Deserializes a value from CBOR bytes.
pub fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    ciborium::from_reader(bytes).map_err(|e| CodecError::Cbor {
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ColumnDef, DataType, Schema, Value};

    #[test]
    fn schema_round_trips_and_keeps_layout() {
        let schema = Schema::new(vec![
            ColumnDef::new("card", DataType::Varchar).not_null(),
            ColumnDef::new("amount", DataType::Double),
        ])
        .unwrap();
        let bytes = to_cbor(&schema).unwrap();
        let back: Schema = from_cbor(&bytes).unwrap();
        assert_eq!(back, schema);
        assert_eq!(back.fixed_len(), schema.fixed_len());
    }

    #[test]
    fn invalid_schema_fails_to_load() {
        let columns = vec![
            ColumnDef::new("a", DataType::Int),
            ColumnDef::new("a", DataType::Int),
        ];
        let bytes = to_cbor(&columns).unwrap();
        assert!(from_cbor::<Schema>(&bytes).is_err());
    }

    #[test]
    fn values_round_trip() {
        let values = vec![Value::Null, Value::Timestamp(5), Value::from("x")];
        let back: Vec<Value> = from_cbor(&to_cbor(&values).unwrap()).unwrap();
        assert_eq!(back, values);
    }

    #[test]
    fn garbage_is_an_error() {
        assert!(matches!(
            from_cbor::<Schema>(&[0xff, 0x00]),
            Err(CodecError::Cbor { .. })
        ));
    }
}
