//! Body converters.
//!
//! A converter turns a successful response body into the caller's type.
//! Converters come in two capabilities, fixed when a call is built:
//! `Converter` sees only the body, `RequestAwareConverter` also sees the
//! request that produced it.

use std::fmt;
use std::io::{self, Read};
use std::marker::PhantomData;
use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::error::ConversionError;
use crate::request::Request;

/// Streaming view of a response body handed to converters.
pub struct BodyStream<'a> {
    content_type: Option<&'a str>,
    content_length: Option<u64>,
    reader: &'a mut dyn Read,
}

impl<'a> BodyStream<'a> {
    pub(crate) fn new(content_type: Option<&'a str>, content_length: Option<u64>, reader: &'a mut dyn Read) -> Self {
        Self { content_type, content_length, reader }
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type
    }

    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Read the remaining body into memory.
    pub fn read_all(&mut self) -> Result<Vec<u8>, ConversionError> {
        let mut buf = Vec::with_capacity(self.content_length.unwrap_or(0).min(1 << 20) as usize);
        self.reader
            .read_to_end(&mut buf)
            .map_err(|e| ConversionError::new(format!("failed to read body: {e}")))?;
        Ok(buf)
    }
}

impl Read for BodyStream<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

/// Converts a body without looking at the request.
pub trait Converter<T>: Send + Sync {
    fn from_body(&self, body: &mut BodyStream<'_>) -> Result<T, ConversionError>;
}

/// Converts a body with the originating request available for context.
pub trait RequestAwareConverter<T>: Send + Sync {
    fn from_body(&self, body: &mut BodyStream<'_>, request: &Request) -> Result<T, ConversionError>;
}

/// A converter with its capability resolved up front.
pub enum ResponseConverter<T> {
    Basic(Arc<dyn Converter<T>>),
    RequestAware(Arc<dyn RequestAwareConverter<T>>),
}

impl<T> ResponseConverter<T> {
    pub fn basic(converter: impl Converter<T> + 'static) -> Self {
        ResponseConverter::Basic(Arc::new(converter))
    }

    pub fn request_aware(converter: impl RequestAwareConverter<T> + 'static) -> Self {
        ResponseConverter::RequestAware(Arc::new(converter))
    }

    pub(crate) fn convert(&self, body: &mut BodyStream<'_>, request: &Request) -> Result<T, ConversionError> {
        match self {
            ResponseConverter::Basic(c) => c.from_body(body),
            ResponseConverter::RequestAware(c) => c.from_body(body, request),
        }
    }
}

impl<T> Clone for ResponseConverter<T> {
    fn clone(&self) -> Self {
        match self {
            ResponseConverter::Basic(c) => ResponseConverter::Basic(Arc::clone(c)),
            ResponseConverter::RequestAware(c) => ResponseConverter::RequestAware(Arc::clone(c)),
        }
    }
}

impl<T> fmt::Debug for ResponseConverter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResponseConverter::Basic(_) => f.write_str("ResponseConverter::Basic"),
            ResponseConverter::RequestAware(_) => f.write_str("ResponseConverter::RequestAware"),
        }
    }
}

/// Deserializes JSON bodies with serde_json, streaming from the body.
pub struct JsonConverter<T> {
    _target: PhantomData<fn() -> T>,
}

impl<T> JsonConverter<T> {
    pub fn new() -> Self {
        Self { _target: PhantomData }
    }
}

impl<T> Default for JsonConverter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned> Converter<T> for JsonConverter<T> {
    fn from_body(&self, body: &mut BodyStream<'_>) -> Result<T, ConversionError> {
        Ok(serde_json::from_reader(body)?)
    }
}

impl<T: DeserializeOwned + 'static> From<JsonConverter<T>> for ResponseConverter<T> {
    fn from(converter: JsonConverter<T>) -> Self {
        ResponseConverter::basic(converter)
    }
}

/// UTF-8 text bodies.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextConverter;

impl Converter<String> for TextConverter {
    fn from_body(&self, body: &mut BodyStream<'_>) -> Result<String, ConversionError> {
        Ok(String::from_utf8(body.read_all()?)?)
    }
}

impl From<TextConverter> for ResponseConverter<String> {
    fn from(converter: TextConverter) -> Self {
        ResponseConverter::basic(converter)
    }
}

/// Raw bytes, unconverted.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesConverter;

impl Converter<Bytes> for BytesConverter {
    fn from_body(&self, body: &mut BodyStream<'_>) -> Result<Bytes, ConversionError> {
        Ok(Bytes::from(body.read_all()?))
    }
}

impl From<BytesConverter> for ResponseConverter<Bytes> {
    fn from(converter: BytesConverter) -> Self {
        ResponseConverter::basic(converter)
    }
}
