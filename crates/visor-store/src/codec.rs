//! Typed encodings for file bodies.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::Serialize;

pub type CodecResult<T> = Result<T, String>;

pub trait Codec: Clone {
    type Value: Clone;

    fn encode(&self, value: &Self::Value) -> CodecResult<Vec<u8>>;
    fn decode(&self, body: &[u8]) -> CodecResult<Self::Value>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ByteCodec;

impl Codec for ByteCodec {
    type Value = Vec<u8>;

    fn encode(&self, value: &Vec<u8>) -> CodecResult<Vec<u8>> {
        Ok(value.clone())
    }

    fn decode(&self, body: &[u8]) -> CodecResult<Vec<u8>> {
        Ok(body.to_vec())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StringCodec;

impl Codec for StringCodec {
    type Value = String;

    fn encode(&self, value: &String) -> CodecResult<Vec<u8>> {
        Ok(value.as_bytes().to_vec())
    }

    fn decode(&self, body: &[u8]) -> CodecResult<String> {
        String::from_utf8(body.to_vec()).map_err(|e| e.to_string())
    }
}

/// Decimal integers.
#[derive(Debug, Clone, Copy, Default)]
pub struct IntCodec;

impl Codec for IntCodec {
    type Value = i64;

    fn encode(&self, value: &i64) -> CodecResult<Vec<u8>> {
        Ok(value.to_string().into_bytes())
    }

    fn decode(&self, body: &[u8]) -> CodecResult<i64> {
        let text = std::str::from_utf8(body).map_err(|e| e.to_string())?;
        text.trim()
            .parse()
            .map_err(|e| format!("\"{text}\" is not an integer: {e}"))
    }
}

/// Whitespace separated fields.
#[derive(Debug, Clone, Copy, Default)]
pub struct ListCodec;

impl Codec for ListCodec {
    type Value = Vec<String>;

    fn encode(&self, value: &Vec<String>) -> CodecResult<Vec<u8>> {
        Ok(value.join(" ").into_bytes())
    }

    fn decode(&self, body: &[u8]) -> CodecResult<Vec<String>> {
        let text = std::str::from_utf8(body).map_err(|e| e.to_string())?;
        Ok(text.split_whitespace().map(str::to_string).collect())
    }
}

#[derive(Debug)]
pub struct JsonCodec<T>(PhantomData<fn() -> T>);

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonCodec<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T: Serialize + DeserializeOwned + Clone> Codec for JsonCodec<T> {
    type Value = T;

    fn encode(&self, value: &T) -> CodecResult<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| e.to_string())
    }

    fn decode(&self, body: &[u8]) -> CodecResult<T> {
        serde_json::from_slice(body).map_err(|e| e.to_string())
    }
}
