//! Explicitly constructed client: transport, cache store, dispatcher.

use std::sync::Arc;

use bytes::Bytes;
use serde::de::DeserializeOwned;
use stashline_core::{AppConfig, CacheStore};
use tokio::runtime::Handle;

use crate::call::{Call, CallContext};
use crate::convert::{BytesConverter, JsonConverter, ResponseConverter, TextConverter};
use crate::dispatch::{DispatchConfig, Dispatcher, HomeQueue};
use crate::error::BuildError;
use crate::request::Request;
use crate::resolver::CacheFallbackResolver;
use crate::transport::{HttpConfig, ReqwestTransport, Transport};

/// Factory for calls sharing one transport, cache store and dispatcher.
///
/// Cheap to clone.
#[derive(Clone)]
pub struct Client {
    context: CallContext,
}

impl Client {
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Bind `request` and `converter` into a new call.
    pub fn new_call<T: Send + 'static>(&self, request: Request, converter: impl Into<ResponseConverter<T>>) -> Call<T> {
        Call::new(request, converter.into(), self.context.clone())
    }

    /// A call whose body is deserialized from JSON.
    pub fn json<T: DeserializeOwned + Send + 'static>(&self, request: Request) -> Call<T> {
        self.new_call(request, JsonConverter::new())
    }

    pub fn text(&self, request: Request) -> Call<String> {
        self.new_call(request, TextConverter)
    }

    pub fn bytes(&self, request: Request) -> Call<Bytes> {
        self.new_call(request, BytesConverter)
    }

    pub fn has_cache(&self) -> bool {
        self.context.resolver.has_cache()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.context.dispatcher
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("resolver", &self.context.resolver)
            .field("dispatcher", &self.context.dispatcher)
            .finish_non_exhaustive()
    }
}

/// Builder for `Client`.
///
/// `build` assembles the parts in a fixed order: transport (the configured
/// one, or a `ReqwestTransport` from `HttpConfig`), then the cache resolver,
/// then the dispatcher on the given or current runtime.
#[derive(Default)]
pub struct ClientBuilder {
    transport: Option<Arc<dyn Transport>>,
    cache: Option<Arc<dyn CacheStore>>,
    http: HttpConfig,
    dispatch: DispatchConfig,
    runtime: Option<Handle>,
}

impl ClientBuilder {
    /// Start from application config: HTTP settings and dispatcher sizing.
    pub fn from_config(config: &AppConfig) -> Self {
        Self { http: HttpConfig::from(config), dispatch: DispatchConfig::from(config), ..Self::default() }
    }

    /// Use `transport` instead of the default reqwest transport.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Consult `cache` for `cache-else-network` and `network-else-cache` calls.
    pub fn cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn http_config(mut self, http: HttpConfig) -> Self {
        self.http = http;
        self
    }

    pub fn dispatch_config(mut self, dispatch: DispatchConfig) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Run dispatched calls on `handle` rather than the current runtime.
    pub fn runtime(mut self, handle: Handle) -> Self {
        self.runtime = Some(handle);
        self
    }

    /// Build the client and the home queue its dispatched calls deliver to.
    ///
    /// # Errors
    ///
    /// - `BuildError::Transport` if the default HTTP client cannot be built
    /// - `BuildError::NoRuntime` if no runtime handle is given or current
    pub fn build(self) -> Result<(Client, HomeQueue), BuildError> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new(self.http)?),
        };
        let resolver = CacheFallbackResolver::new(self.cache);
        let handle = match self.runtime {
            Some(handle) => handle,
            None => Handle::try_current().map_err(|_| BuildError::NoRuntime)?,
        };
        let (dispatcher, home) = Dispatcher::new(handle, self.dispatch);

        tracing::debug!(
            has_cache = resolver.has_cache(),
            max_in_flight = self.dispatch.max_in_flight,
            "client built"
        );

        Ok((Client { context: CallContext { transport, resolver, dispatcher } }, home))
    }
}
