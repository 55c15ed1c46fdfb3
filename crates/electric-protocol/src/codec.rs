//! Thin `bincode` wrapper so the rest of the workspace encodes/decodes
//! message bodies without each call site picking its own serializer.

use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode message: {0}")]
    Encode(#[from] Box<bincode::ErrorKind>),
}

pub fn encode<T: Serialize>(value: &T) -> Vec<u8> {
    bincode::serialize(value).expect("message types are always bincode-serializable")
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, CodecError> {
    bincode::deserialize(bytes).map_err(CodecError::Encode)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{AuthReq};

    #[test]
    fn round_trips_a_message() {
        let req = AuthReq {
            id: "c1".into(),
            token: "t".into(),
            headers: vec![],
        };
        let bytes = encode(&req);
        let back: AuthReq = decode(&bytes).unwrap();
        assert_eq!(back, req);
    }

    #[test]
    fn decode_of_garbage_fails() {
        let res: Result<AuthReq, _> = decode(&[0xff, 0xff, 0xff]);
        assert!(res.is_err());
    }
}
