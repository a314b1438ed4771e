//! Payload codec contract for queue entries.

use crate::error::CodecError;

/// A value that can travel through the queue.
///
/// The queue never inspects entry contents; it only moves the encoded bytes
/// to disk and back. Implementations decide the wire shape. Encoding happens
/// once on [`crate::Queue::add`], decoding once when the forwarder hands the
/// entry to the sink.
pub trait Entry: Sized + Send {
    /// Encodes the entry into its on-disk byte representation.
    fn encode(&self) -> Result<Vec<u8>, CodecError>;

    /// Decodes an entry from bytes previously produced by [`Entry::encode`].
    fn decode(bytes: &[u8]) -> Result<Self, CodecError>;
}

/// Raw byte payloads pass through unchanged.
impl Entry for Vec<u8> {
    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        Ok(self.clone())
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes_identity() {
        let payload = b"remote-write body".to_vec();
        let encoded = payload.encode().unwrap();
        assert_eq!(Vec::<u8>::decode(&encoded).unwrap(), payload);
    }
}
