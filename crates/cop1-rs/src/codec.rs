use crate::hal::Cop1Error;

/// Trait for control words with a fixed wire representation.
pub trait Codec: Sized {
    /// Serializes the word into `buffer`, returning the number of bytes written.
    fn serialize(&self, buffer: &mut [u8]) -> Result<usize, Cop1Error>;

    /// Deserializes the word from `buffer`.
    fn deserialize(buffer: &[u8]) -> Result<Self, Cop1Error>;
}
