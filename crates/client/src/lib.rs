//! Cache-aware HTTP calls for stashline.
//!
//! This crate provides the per-request executor that decides between the
//! response cache and the network, the response parser shared by both
//! sources, the dispatcher for non-blocking calls, and a reqwest transport.

pub mod cache_mode;
pub mod call;
pub mod client;
pub mod convert;
pub mod dispatch;
pub mod error;
pub mod parse;
pub mod request;
pub mod resolver;
pub mod response;
pub mod transport;

pub use cache_mode::{CACHE_MODE_HEADER, CacheMode, UnknownCacheMode};
pub use call::{Call, CallPhase, CallResult};
pub use client::{Client, ClientBuilder};
pub use convert::{
    BodyStream, BytesConverter, Converter, JsonConverter, RequestAwareConverter, ResponseConverter, TextConverter,
};
pub use dispatch::{DispatchConfig, Dispatcher, HomeQueue};
pub use error::{BuildError, CallError, ConversionError, TransportError};
pub use request::{Request, RequestBuilder, RequestError};
pub use resolver::CacheFallbackResolver;
pub use response::{RawResponse, Response, ResponseBody, ResponseMeta, ResponseOrigin};
pub use transport::{HttpConfig, ReqwestTransport, Transport, TransportCall};

pub use reqwest::{Method, StatusCode};
