//! Type registry for the binary encoding.
//!
//! Maps message names to numeric wire ids and each id to the codec that turns
//! a JSON payload into bytes and back. The client only ever reads it.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{CodecError, ProtocolError, RegistryError};

/// Boxed error returned by codec implementations.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Encode/decode capability for one message type.
pub trait MessageCodec: Send + Sync {
    /// Serialize a payload for the wire.
    ///
    /// # Errors
    ///
    /// Returns an error when `value` does not fit the message schema.
    fn encode(&self, value: &Value) -> Result<Vec<u8>, BoxError>;

    /// Parse a wire payload.
    ///
    /// # Errors
    ///
    /// Returns an error for bytes that are not a valid message.
    fn decode(&self, bytes: &[u8]) -> Result<Value, BoxError>;
}

/// Schemaless codec: any JSON value, carried as `google.protobuf.Value`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StructCodec;

impl MessageCodec for StructCodec {
    fn encode(&self, value: &Value) -> Result<Vec<u8>, BoxError> {
        Ok(frames::encode_struct_payload(value))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, BoxError> {
        Ok(frames::decode_struct_payload(bytes)?)
    }
}

/// Codec for a generated `prost` message that also derives serde.
///
/// The JSON payload is deserialized into `M` before encoding, so field names
/// follow the message's serde representation.
pub struct ProstCodec<M> {
    _message: PhantomData<fn() -> M>,
}

impl<M> ProstCodec<M> {
    #[must_use]
    pub fn new() -> Self {
        Self { _message: PhantomData }
    }
}

impl<M> Default for ProstCodec<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> MessageCodec for ProstCodec<M>
where
    M: prost::Message + Default + Serialize + DeserializeOwned,
{
    fn encode(&self, value: &Value) -> Result<Vec<u8>, BoxError> {
        let message: M = serde_json::from_value(value.clone())?;
        Ok(message.encode_to_vec())
    }

    fn decode(&self, bytes: &[u8]) -> Result<Value, BoxError> {
        let message = M::decode(bytes)?;
        Ok(serde_json::to_value(&message)?)
    }
}

struct Entry {
    name: String,
    codec: Arc<dyn MessageCodec>,
}

/// Bidirectional name/id catalogue with per-id codecs.
#[derive(Clone, Default)]
pub struct TypeRegistry {
    by_id: HashMap<u32, Arc<Entry>>,
    ids: HashMap<String, u32>,
}

impl TypeRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a message type.
    ///
    /// # Errors
    ///
    /// Rejects id 0 and any id or name that is already taken.
    pub fn register(
        &mut self,
        id: u32,
        name: impl Into<String>,
        codec: impl MessageCodec + 'static,
    ) -> Result<(), RegistryError> {
        let name = name.into();
        if id == 0 {
            return Err(RegistryError::ReservedId { name });
        }
        if let Some(existing) = self.by_id.get(&id) {
            return Err(RegistryError::DuplicateId { id, existing: existing.name.clone() });
        }
        if self.ids.contains_key(&name) {
            return Err(RegistryError::DuplicateName(name));
        }

        self.ids.insert(name.clone(), id);
        self.by_id.insert(id, Arc::new(Entry { name, codec: Arc::new(codec) }));
        Ok(())
    }

    /// Builder form of [`TypeRegistry::register`].
    ///
    /// # Errors
    ///
    /// Same as [`TypeRegistry::register`].
    pub fn with(mut self, id: u32, name: impl Into<String>, codec: impl MessageCodec + 'static) -> Result<Self, RegistryError> {
        self.register(id, name, codec)?;
        Ok(self)
    }

    #[must_use]
    pub fn id_of(&self, name: &str) -> Option<u32> {
        self.ids.get(name).copied()
    }

    #[must_use]
    pub fn name_of(&self, id: u32) -> Option<&str> {
        self.by_id.get(&id).map(|entry| entry.name.as_str())
    }

    #[must_use]
    pub fn codec(&self, id: u32) -> Option<&Arc<dyn MessageCodec>> {
        self.by_id.get(&id).map(|entry| &entry.codec)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Resolve `name` and encode `value` with its codec.
    pub(crate) fn encode(&self, name: &str, value: &Value) -> Result<(u32, Vec<u8>), EncodeFailure> {
        let id = self
            .id_of(name)
            .ok_or_else(|| ProtocolError::UnregisteredType(name.to_owned()))?;
        let entry = &self.by_id[&id];
        let bytes = entry.codec.encode(value).map_err(|e| CodecError::Encode {
            name: name.to_owned(),
            message: e.to_string(),
        })?;
        Ok((id, bytes))
    }

    /// Decode a payload for `id`, returning the message name with the value.
    pub(crate) fn decode(&self, id: u32, bytes: &[u8]) -> Result<(String, Value), EncodeFailure> {
        let entry = self.by_id.get(&id).ok_or(ProtocolError::UnknownTypeId(id))?;
        let value = entry.codec.decode(bytes).map_err(|e| CodecError::Decode {
            name: entry.name.clone(),
            message: e.to_string(),
        })?;
        Ok((entry.name.clone(), value))
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<(u32, &str)> = self.by_id.iter().map(|(id, e)| (*id, e.name.as_str())).collect();
        names.sort_unstable();
        f.debug_struct("TypeRegistry").field("types", &names).finish()
    }
}

/// Registry lookup or codec failure.
#[derive(Debug, thiserror::Error)]
pub(crate) enum EncodeFailure {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl From<EncodeFailure> for crate::error::ClientError {
    fn from(failure: EncodeFailure) -> Self {
        match failure {
            EncodeFailure::Protocol(e) => Self::Protocol(e),
            EncodeFailure::Codec(e) => Self::Codec(e),
        }
    }
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
