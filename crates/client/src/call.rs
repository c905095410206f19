//! Single-use call handles and the per-call request executor.
//!
//! A `Call` binds a request, a converter and the request's cache mode. It
//! runs at most once, either in the caller's task (`execute`) or on the
//! dispatcher (`enqueue`), and both paths share the same mode policy:
//!
//! - `network-only`, `load-default`: transport only
//! - `cache-else-network`: a fresh cache entry wins; any miss goes to the network
//! - `network-else-cache`: transport first; on failure a fresh cache entry
//!   replaces the error, otherwise the original error stands
//!
//! Non-2xx statuses are responses, not failures, so they never fall back.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::FutureExt;

use crate::cache_mode::CacheMode;
use crate::convert::ResponseConverter;
use crate::dispatch::{Dispatcher, panic_message};
use crate::error::{CallError, TransportError};
use crate::parse::parse_response;
use crate::request::Request;
use crate::resolver::CacheFallbackResolver;
use crate::response::{Response, ResponseOrigin};
use crate::transport::{Transport, TransportCall};

/// Outcome of a call.
pub type CallResult<T> = Result<Response<T>, CallError>;

/// Lifecycle of a call handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallPhase {
    #[default]
    Created,
    Executing,
    Completed,
    Failed,
    Canceled,
}

impl CallPhase {
    pub fn is_terminal(self) -> bool {
        matches!(self, CallPhase::Completed | CallPhase::Failed | CallPhase::Canceled)
    }
}

/// Collaborators shared by every call a client creates.
#[derive(Clone)]
pub(crate) struct CallContext {
    pub(crate) transport: Arc<dyn Transport>,
    pub(crate) resolver: CacheFallbackResolver,
    pub(crate) dispatcher: Dispatcher,
}

#[derive(Default)]
struct CallState {
    executed: bool,
    canceled: bool,
    phase: CallPhase,
    in_flight: Option<Arc<dyn TransportCall>>,
}

struct CallShared<T> {
    request: Request,
    mode: CacheMode,
    converter: ResponseConverter<T>,
    context: CallContext,
    state: Mutex<CallState>,
}

/// A single-use, cancellable HTTP call producing `Response<T>`.
///
/// `clone` yields a fresh, unexecuted handle for the same request.
pub struct Call<T> {
    shared: Arc<CallShared<T>>,
}

impl<T: Send + 'static> Call<T> {
    pub(crate) fn new(request: Request, converter: ResponseConverter<T>, context: CallContext) -> Self {
        let mode = request.cache_mode();
        let state = Mutex::new(CallState::default());
        Self { shared: Arc::new(CallShared { request, mode, converter, context, state }) }
    }

    pub fn request(&self) -> &Request {
        &self.shared.request
    }

    /// Cache mode read from the request when the call was built.
    pub fn cache_mode(&self) -> CacheMode {
        self.shared.mode
    }

    /// Run the call in the current task.
    ///
    /// # Errors
    ///
    /// - `CallError::AlreadyExecuted` if this handle already ran
    /// - `CallError::Canceled` if the call was canceled before it produced a result
    /// - `CallError::Transport` / `CallError::Conversion` per the cache mode policy
    ///
    /// Dropping the returned future before it resolves cancels the call.
    pub async fn execute(&self) -> CallResult<T> {
        self.shared.begin()?;
        let mut guard = AbandonGuard { shared: &self.shared, armed: true };
        let result = self.shared.run().await;
        guard.armed = false;
        self.shared.finish(&result);
        result
    }

    /// Run the call on the dispatcher and deliver its outcome to `callback`
    /// through the home queue.
    ///
    /// Reuse of the handle is reported to `callback` as
    /// `CallError::AlreadyExecuted`, never returned. A panic while the call
    /// runs is reported as `CallError::Panicked`.
    pub fn enqueue<F>(&self, callback: F)
    where
        F: FnOnce(CallResult<T>) + Send + 'static,
    {
        let dispatcher = self.shared.context.dispatcher.clone();
        if let Err(err) = self.shared.begin() {
            dispatcher.post_result(callback, Err(err));
            return;
        }

        let shared = Arc::clone(&self.shared);
        dispatcher.submit(async move {
            let result = match AssertUnwindSafe(shared.run()).catch_unwind().await {
                Ok(result) => result,
                Err(panic) => {
                    let message = panic_message(panic.as_ref()).to_string();
                    tracing::error!(url = shared.request.url(), panic = %message, "dispatched call panicked");
                    Err(CallError::Panicked(message))
                }
            };
            shared.finish(&result);
            shared.context.dispatcher.post_result(callback, result);
        });
    }

    /// Request cancellation. Idempotent; no effect once the call is terminal.
    ///
    /// Before dispatch this guarantees the transport is never asked for a
    /// call. After dispatch the transport call's own `cancel` runs once, and
    /// whatever that call then returns is the outcome.
    pub fn cancel(&self) {
        let in_flight = {
            let mut state = self.shared.lock();
            if state.canceled || state.phase.is_terminal() {
                return;
            }
            state.canceled = true;
            if state.phase == CallPhase::Created {
                state.phase = CallPhase::Canceled;
            }
            state.in_flight.take()
        };

        if let Some(call) = in_flight {
            tracing::debug!(url = self.shared.request.url(), "forwarding cancel to transport");
            call.cancel();
        }
    }

    pub fn is_executed(&self) -> bool {
        self.shared.lock().executed
    }

    pub fn is_canceled(&self) -> bool {
        self.shared.lock().canceled
    }

    pub fn state(&self) -> CallPhase {
        self.shared.lock().phase
    }
}

impl<T: Send + 'static> Clone for Call<T> {
    fn clone(&self) -> Self {
        let shared = &self.shared;
        Self::new(shared.request.clone(), shared.converter.clone(), shared.context.clone())
    }
}

impl<T> fmt::Debug for Call<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Call")
            .field("method", self.shared.request.method())
            .field("url", &self.shared.request.url())
            .field("mode", &self.shared.mode)
            .finish_non_exhaustive()
    }
}

impl<T> CallShared<T> {
    fn lock(&self) -> MutexGuard<'_, CallState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the handle.
    fn begin(&self) -> Result<(), CallError> {
        let mut state = self.lock();
        if state.executed {
            return Err(CallError::AlreadyExecuted);
        }
        state.executed = true;
        if state.canceled {
            state.phase = CallPhase::Canceled;
            return Err(CallError::Canceled);
        }
        state.phase = CallPhase::Executing;
        Ok(())
    }

    fn finish(&self, result: &CallResult<T>) {
        let mut state = self.lock();
        state.in_flight = None;
        state.phase = match result {
            Ok(_) => CallPhase::Completed,
            Err(CallError::Canceled) => CallPhase::Canceled,
            Err(_) => CallPhase::Failed,
        };
    }

    /// Settle a call whose run stopped without a result: its future was
    /// dropped, or it is unwinding from a panic.
    fn abandon(&self) {
        let panicking = std::thread::panicking();
        let in_flight = {
            let mut state = self.lock();
            if state.phase.is_terminal() {
                return;
            }
            if panicking {
                state.phase = CallPhase::Failed;
            } else {
                state.canceled = true;
                state.phase = CallPhase::Canceled;
            }
            state.in_flight.take()
        };

        tracing::debug!(url = self.request.url(), panicking, "call abandoned before completion");
        if let Some(call) = in_flight {
            call.cancel();
        }
    }

    async fn run(&self) -> CallResult<T> {
        let url = self.request.url();
        match self.mode {
            CacheMode::CacheElseNetwork => {
                if let Some(hit) = self.context.resolver.resolve(&self.request, &self.converter).await {
                    tracing::debug!(url, "served from cache");
                    return Ok(hit);
                }
                self.network().await
            }
            CacheMode::NetworkElseCache => match self.network().await {
                Err(err) if !err.is_canceled() => {
                    tracing::warn!(url, error = %err, "network failed; trying cache");
                    match self.context.resolver.resolve(&self.request, &self.converter).await {
                        Some(hit) => {
                            tracing::info!(url, "served from cache after network failure");
                            Ok(hit)
                        }
                        None => Err(err),
                    }
                }
                outcome => outcome,
            },
            CacheMode::NetworkOnly | CacheMode::LoadDefault => self.network().await,
        }
    }

    /// Obtain a transport call, unless the call was canceled first.
    fn dispatch(&self) -> Result<Arc<dyn TransportCall>, CallError> {
        let mut state = self.lock();
        if state.canceled {
            return Err(CallError::Canceled);
        }
        let call = self.context.transport.new_call(&self.request)?;
        state.in_flight = Some(Arc::clone(&call));
        Ok(call)
    }

    async fn network(&self) -> CallResult<T> {
        let call = self.dispatch()?;
        tracing::debug!(method = %self.request.method(), url = self.request.url(), "dispatching to transport");

        let raw = match call.execute().await {
            Ok(raw) => raw,
            Err(TransportError::Canceled) => return Err(CallError::Canceled),
            Err(err) => return Err(err.into()),
        };
        parse_response(raw, &self.request, &self.converter, ResponseOrigin::Network)
    }
}

/// Runs `CallShared::abandon` unless disarmed.
struct AbandonGuard<'a, T> {
    shared: &'a CallShared<T>,
    armed: bool,
}

impl<T> Drop for AbandonGuard<'_, T> {
    fn drop(&mut self) {
        if self.armed {
            self.shared.abandon();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{BodyStream, Converter, JsonConverter, TextConverter};
    use crate::dispatch::{DispatchConfig, HomeQueue};
    use crate::error::ConversionError;
    use crate::response::{RawResponse, ResponseBody};
    use async_trait::async_trait;
    use reqwest::StatusCode;
    use reqwest::header::HeaderMap;
    use serde::Deserialize;
    use stashline_core::{CacheEntry, MemoryCache};
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::runtime::Handle;
    use tokio::sync::{Notify, oneshot};

    const URL: &str = "https://example.com/items";

    #[derive(Debug, Clone, Deserialize, PartialEq)]
    struct Flag {
        ok: bool,
    }

    #[derive(Clone)]
    enum Script {
        Respond(u16, &'static str),
        Fail(TransportError),
        Hang,
        /// Ignores cancel and responds once the transport's gate opens.
        Gated(u16, &'static str),
    }

    /// Transport that replays scripted outcomes and records what it was asked to do.
    #[derive(Default)]
    struct MockTransport {
        script: Mutex<VecDeque<Script>>,
        new_calls: AtomicUsize,
        cancels: Arc<AtomicUsize>,
        dispatched: Arc<Notify>,
        gate: Arc<Notify>,
    }

    impl MockTransport {
        fn scripted(steps: impl IntoIterator<Item = Script>) -> Arc<Self> {
            Arc::new(Self { script: Mutex::new(steps.into_iter().collect()), ..Self::default() })
        }

        fn new_calls(&self) -> usize {
            self.new_calls.load(Ordering::SeqCst)
        }

        fn cancels(&self) -> usize {
            self.cancels.load(Ordering::SeqCst)
        }
    }

    impl Transport for MockTransport {
        fn new_call(&self, _request: &Request) -> Result<Arc<dyn TransportCall>, TransportError> {
            self.new_calls.fetch_add(1, Ordering::SeqCst);
            let step = self.script.lock().unwrap().pop_front().unwrap_or(Script::Respond(200, "{}"));
            Ok(Arc::new(MockCall {
                step,
                cancels: Arc::clone(&self.cancels),
                dispatched: Arc::clone(&self.dispatched),
                gate: Arc::clone(&self.gate),
                canceled: Notify::new(),
            }))
        }
    }

    struct MockCall {
        step: Script,
        cancels: Arc<AtomicUsize>,
        dispatched: Arc<Notify>,
        gate: Arc<Notify>,
        canceled: Notify,
    }

    #[async_trait]
    impl TransportCall for MockCall {
        async fn execute(&self) -> Result<RawResponse, TransportError> {
            self.dispatched.notify_one();
            match &self.step {
                Script::Respond(status, body) => Ok(respond(*status, body)),
                Script::Fail(err) => Err(err.clone()),
                Script::Hang => {
                    self.canceled.notified().await;
                    Err(TransportError::Canceled)
                }
                Script::Gated(status, body) => {
                    self.gate.notified().await;
                    Ok(respond(*status, body))
                }
            }
        }

        fn cancel(&self) {
            self.cancels.fetch_add(1, Ordering::SeqCst);
            self.canceled.notify_one();
        }
    }

    fn respond(status: u16, body: &'static str) -> RawResponse {
        RawResponse::new(
            StatusCode::from_u16(status).unwrap(),
            HeaderMap::new(),
            ResponseBody::from_bytes(Some("application/json".into()), body),
        )
    }

    /// Converter with a bug: it panics on every body.
    struct Panicking;

    impl Converter<String> for Panicking {
        fn from_body(&self, _body: &mut BodyStream<'_>) -> Result<String, ConversionError> {
            panic!("converter bug")
        }
    }

    struct Harness {
        transport: Arc<MockTransport>,
        cache: MemoryCache,
        context: CallContext,
        home: HomeQueue,
    }

    impl Harness {
        fn new(steps: impl IntoIterator<Item = Script>) -> Self {
            let transport = MockTransport::scripted(steps);
            let cache = MemoryCache::new();
            let (dispatcher, home) = Dispatcher::new(Handle::current(), DispatchConfig::default());
            let context = CallContext {
                transport: transport.clone(),
                resolver: CacheFallbackResolver::new(Some(Arc::new(cache.clone()))),
                dispatcher,
            };
            Self { transport, cache, context, home }
        }

        async fn cache_ok(&self) {
            self.cache.insert(entry(br#"{"ok":true}"#, chrono::Duration::hours(1))).await;
        }

        fn call(&self, mode: CacheMode) -> Call<Flag> {
            let request = Request::get(URL).cache_mode(mode).build().unwrap();
            Call::new(request, JsonConverter::new().into(), self.context.clone())
        }

        /// Enqueue `call` and wait for its callback on the home queue.
        async fn dispatch(&mut self, call: &Call<Flag>) -> CallResult<Flag> {
            let (tx, mut rx) = oneshot::channel();
            call.enqueue(move |result| {
                let _ = tx.send(result);
            });
            loop {
                assert!(self.home.next_delivery().await);
                if let Ok(result) = rx.try_recv() {
                    return result;
                }
            }
        }
    }

    fn entry(body: &[u8], ttl: chrono::Duration) -> CacheEntry {
        CacheEntry::new(URL, body.to_vec(), "application/json", ttl)
    }

    fn network_down() -> Script {
        let refused = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        Script::Fail(TransportError::Io(Arc::new(refused)))
    }

    #[tokio::test]
    async fn test_network_only_success() {
        let h = Harness::new([Script::Respond(200, r#"{"ok":true}"#)]);
        let call = h.call(CacheMode::NetworkOnly);
        let response = call.execute().await.unwrap();
        assert_eq!(response.body(), Some(&Flag { ok: true }));
        assert_eq!(response.origin(), ResponseOrigin::Network);
        assert_eq!(call.state(), CallPhase::Completed);
        assert_eq!(h.transport.new_calls(), 1);
    }

    #[tokio::test]
    async fn test_second_execute_is_rejected() {
        let h = Harness::new([]);
        let call = h.call(CacheMode::NetworkOnly);
        call.execute().await.unwrap();
        assert!(matches!(call.execute().await, Err(CallError::AlreadyExecuted)));
        assert_eq!(h.transport.new_calls(), 1);
    }

    #[tokio::test]
    async fn test_execute_then_enqueue_is_rejected() {
        let mut h = Harness::new([]);
        let call = h.call(CacheMode::NetworkOnly);
        call.execute().await.unwrap();
        assert!(matches!(h.dispatch(&call).await, Err(CallError::AlreadyExecuted)));
        assert_eq!(h.transport.new_calls(), 1);
    }

    #[tokio::test]
    async fn test_enqueue_then_execute_is_rejected() {
        let mut h = Harness::new([Script::Respond(200, r#"{"ok":false}"#)]);
        let call = h.call(CacheMode::NetworkOnly);
        let first = h.dispatch(&call).await.unwrap();
        assert_eq!(first.body(), Some(&Flag { ok: false }));
        assert!(matches!(call.execute().await, Err(CallError::AlreadyExecuted)));
        assert!(matches!(h.dispatch(&call).await, Err(CallError::AlreadyExecuted)));
        assert_eq!(h.transport.new_calls(), 1);
    }

    #[tokio::test]
    async fn test_cache_else_network_hit_skips_transport() {
        let mut h = Harness::new([]);
        h.cache_ok().await;

        let response = h.call(CacheMode::CacheElseNetwork).execute().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body(), Some(&Flag { ok: true }));
        assert_eq!(response.origin(), ResponseOrigin::Cache);

        let queued = h.call(CacheMode::CacheElseNetwork);
        let response = h.dispatch(&queued).await.unwrap();
        assert_eq!(response.body(), Some(&Flag { ok: true }));
        assert_eq!(h.transport.new_calls(), 0);
    }

    #[tokio::test]
    async fn test_cache_else_network_miss_matches_network_only() {
        let h = Harness::new([Script::Respond(200, r#"{"ok":false}"#), Script::Respond(200, r#"{"ok":false}"#)]);
        h.cache.insert(entry(br#"{"ok":true}"#, chrono::Duration::seconds(-5))).await;

        let via_cache_mode = h.call(CacheMode::CacheElseNetwork).execute().await.unwrap();
        let via_network = h.call(CacheMode::NetworkOnly).execute().await.unwrap();
        assert_eq!(via_cache_mode.body(), via_network.body());
        assert_eq!(via_cache_mode.status(), via_network.status());
        assert_eq!(via_cache_mode.origin(), ResponseOrigin::Network);
        assert_eq!(h.transport.new_calls(), 2);
    }

    #[tokio::test]
    async fn test_cache_else_network_empty_entry_goes_to_network() {
        let h = Harness::new([Script::Respond(200, r#"{"ok":false}"#)]);
        h.cache.insert(entry(b"", chrono::Duration::hours(1))).await;

        let response = h.call(CacheMode::CacheElseNetwork).execute().await.unwrap();
        assert_eq!(response.body(), Some(&Flag { ok: false }));
        assert_eq!(h.transport.new_calls(), 1);
    }

    #[tokio::test]
    async fn test_network_only_ignores_fresh_entry() {
        let h = Harness::new([Script::Respond(200, r#"{"ok":false}"#)]);
        h.cache_ok().await;

        let response = h.call(CacheMode::NetworkOnly).execute().await.unwrap();
        assert_eq!(response.body(), Some(&Flag { ok: false }));
        assert_eq!(h.transport.new_calls(), 1);
    }

    #[tokio::test]
    async fn test_load_default_and_unknown_mode_behave_as_network_only() {
        let h = Harness::new([Script::Respond(200, r#"{"ok":false}"#), Script::Respond(200, r#"{"ok":false}"#)]);
        h.cache_ok().await;

        let response = h.call(CacheMode::LoadDefault).execute().await.unwrap();
        assert_eq!(response.origin(), ResponseOrigin::Network);

        let request = Request::get(URL).header("Cache-Mode", "sometimes").build().unwrap();
        let call: Call<Flag> = Call::new(request, JsonConverter::new().into(), h.context.clone());
        assert_eq!(call.cache_mode(), CacheMode::NetworkOnly);
        assert_eq!(call.execute().await.unwrap().origin(), ResponseOrigin::Network);
        assert_eq!(h.transport.new_calls(), 2);
    }

    #[tokio::test]
    async fn test_network_else_cache_falls_back_on_failure() {
        let mut h = Harness::new([network_down(), network_down()]);
        h.cache_ok().await;

        let call = h.call(CacheMode::NetworkElseCache);
        let response = call.execute().await.unwrap();
        assert_eq!(response.body(), Some(&Flag { ok: true }));
        assert_eq!(response.origin(), ResponseOrigin::Cache);
        assert_eq!(call.state(), CallPhase::Completed);

        let queued = h.call(CacheMode::NetworkElseCache);
        let response = h.dispatch(&queued).await.unwrap();
        assert_eq!(response.origin(), ResponseOrigin::Cache);
        assert_eq!(h.transport.new_calls(), 2);
    }

    #[tokio::test]
    async fn test_network_else_cache_miss_surfaces_original_error() {
        let h = Harness::new([network_down()]);
        let call = h.call(CacheMode::NetworkElseCache);

        let err = call.execute().await.unwrap_err();
        assert!(matches!(
            err,
            CallError::Transport(TransportError::Io(io)) if io.kind() == std::io::ErrorKind::ConnectionRefused
        ));
        assert_eq!(call.state(), CallPhase::Failed);
        assert_eq!(h.transport.new_calls(), 1);
    }

    #[tokio::test]
    async fn test_network_else_cache_prefers_network_success() {
        let h = Harness::new([Script::Respond(200, r#"{"ok":false}"#)]);
        h.cache_ok().await;

        let response = h.call(CacheMode::NetworkElseCache).execute().await.unwrap();
        assert_eq!(response.body(), Some(&Flag { ok: false }));
        assert_eq!(response.origin(), ResponseOrigin::Network);
    }

    #[tokio::test]
    async fn test_network_else_cache_falls_back_on_conversion_error() {
        let h = Harness::new([Script::Respond(200, "not json")]);
        h.cache_ok().await;

        let response = h.call(CacheMode::NetworkElseCache).execute().await.unwrap();
        assert_eq!(response.origin(), ResponseOrigin::Cache);
    }

    #[tokio::test]
    async fn test_error_status_never_falls_back() {
        let h = Harness::new([Script::Respond(404, "not found")]);
        h.cache_ok().await;

        let call = h.call(CacheMode::NetworkElseCache);
        let response = call.execute().await.unwrap();
        assert!(!response.is_success());
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.error_body().unwrap().as_ref(), b"not found");
        assert_eq!(call.state(), CallPhase::Completed);
    }

    #[tokio::test]
    async fn test_no_content_skips_converter() {
        struct Exploding;

        impl Converter<String> for Exploding {
            fn from_body(&self, _body: &mut BodyStream<'_>) -> Result<String, ConversionError> {
                Err(ConversionError::new("converter must not run"))
            }
        }

        let h = Harness::new([Script::Respond(204, ""), Script::Respond(205, "")]);
        for _ in 0..2 {
            let request = Request::get(URL).build().unwrap();
            let call = Call::new(request, ResponseConverter::basic(Exploding), h.context.clone());
            let response = call.execute().await.unwrap();
            assert!(response.is_success());
            assert!(response.body().is_none());
        }
    }

    #[tokio::test]
    async fn test_conversion_error_surfaces_on_network_only() {
        let h = Harness::new([Script::Respond(200, "{")]);
        let call = h.call(CacheMode::NetworkOnly);
        assert!(matches!(call.execute().await, Err(CallError::Conversion(_))));
        assert_eq!(call.state(), CallPhase::Failed);
    }

    #[tokio::test]
    async fn test_cancel_before_execute_never_dispatches() {
        let mut h = Harness::new([]);
        let call = h.call(CacheMode::NetworkOnly);
        call.cancel();
        call.cancel();
        assert_eq!(call.state(), CallPhase::Canceled);
        assert!(matches!(call.execute().await, Err(CallError::Canceled)));
        assert!(matches!(call.execute().await, Err(CallError::AlreadyExecuted)));

        let queued = h.call(CacheMode::NetworkOnly);
        queued.cancel();
        assert!(matches!(h.dispatch(&queued).await, Err(CallError::Canceled)));

        assert_eq!(h.transport.new_calls(), 0);
        assert_eq!(h.transport.cancels(), 0);
    }

    #[tokio::test]
    async fn test_cancel_in_flight_forwards_once() {
        let h = Harness::new([Script::Hang]);
        let call = Arc::new(h.call(CacheMode::NetworkOnly));

        let running = {
            let call = Arc::clone(&call);
            tokio::spawn(async move { call.execute().await })
        };
        h.transport.dispatched.notified().await;
        assert_eq!(call.state(), CallPhase::Executing);

        call.cancel();
        call.cancel();
        assert!(matches!(running.await.unwrap(), Err(CallError::Canceled)));
        assert_eq!(call.state(), CallPhase::Canceled);
        assert_eq!(h.transport.cancels(), 1);
        assert!(call.is_canceled());
    }

    #[tokio::test]
    async fn test_cancel_in_flight_skips_fallback() {
        let h = Harness::new([Script::Hang]);
        h.cache_ok().await;
        let call = Arc::new(h.call(CacheMode::NetworkElseCache));

        let running = {
            let call = Arc::clone(&call);
            tokio::spawn(async move { call.execute().await })
        };
        h.transport.dispatched.notified().await;
        call.cancel();
        assert!(matches!(running.await.unwrap(), Err(CallError::Canceled)));
    }

    #[tokio::test]
    async fn test_cancel_dispatched_call_delivers_canceled() {
        let mut h = Harness::new([Script::Hang]);
        let call = h.call(CacheMode::NetworkOnly);
        let (tx, rx) = oneshot::channel();
        call.enqueue(move |result| {
            let _ = tx.send(result);
        });

        h.transport.dispatched.notified().await;
        call.cancel();
        assert!(h.home.next_delivery().await);
        assert!(matches!(rx.await.unwrap(), Err(CallError::Canceled)));
        assert_eq!(h.transport.cancels(), 1);
    }

    #[tokio::test]
    async fn test_cancel_after_completion_is_noop() {
        let h = Harness::new([]);
        let call = h.call(CacheMode::NetworkOnly);
        call.execute().await.unwrap();
        call.cancel();
        assert_eq!(call.state(), CallPhase::Completed);
        assert!(!call.is_canceled());
    }

    #[tokio::test]
    async fn test_clone_is_fresh_handle() {
        let h = Harness::new([Script::Respond(200, r#"{"ok":true}"#), Script::Respond(200, r#"{"ok":false}"#)]);
        let call = h.call(CacheMode::NetworkOnly);
        call.execute().await.unwrap();
        call.cancel();

        let again = call.clone();
        assert!(!again.is_executed());
        assert_eq!(again.state(), CallPhase::Created);
        assert_eq!(again.request().url(), URL);
        assert_eq!(again.cache_mode(), CacheMode::NetworkOnly);
        assert_eq!(again.execute().await.unwrap().body(), Some(&Flag { ok: false }));
        assert_eq!(h.transport.new_calls(), 2);
    }

    #[tokio::test]
    async fn test_callback_waits_for_home_queue() {
        let mut h = Harness::new([Script::Respond(200, r#"{"ok":true}"#)]);
        let call = h.call(CacheMode::NetworkOnly);
        let delivered = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&delivered);
        call.enqueue(move |result| {
            assert!(result.is_ok());
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(call.state(), CallPhase::Completed);
        assert_eq!(delivered.load(Ordering::SeqCst), 0);

        assert_eq!(h.home.run_pending(), 1);
        assert_eq!(delivered.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_panicking_callback_does_not_poison_dispatch() {
        let mut h = Harness::new([Script::Respond(200, "{}"), Script::Respond(200, r#"{"ok":true}"#)]);
        h.call(CacheMode::NetworkOnly).enqueue(|_| panic!("caller bug"));
        assert!(h.home.next_delivery().await);

        let text = {
            let request = Request::get(URL).build().unwrap();
            let converter: ResponseConverter<String> = TextConverter.into();
            Call::new(request, converter, h.context.clone())
        };
        let (tx, rx) = oneshot::channel();
        text.enqueue(move |result| {
            let _ = tx.send(result);
        });
        assert!(h.home.next_delivery().await);
        assert_eq!(rx.await.unwrap().unwrap().into_body().as_deref(), Some(r#"{"ok":true}"#));
    }

    #[tokio::test]
    async fn test_panicking_converter_is_reported_to_callback() {
        let mut h = Harness::new([Script::Respond(200, "{}"), Script::Respond(200, r#"{"ok":true}"#)]);
        let request = Request::get(URL).build().unwrap();
        let call = Call::new(request, ResponseConverter::basic(Panicking), h.context.clone());

        let (tx, rx) = oneshot::channel();
        call.enqueue(move |result| {
            let _ = tx.send(result);
        });
        let delivered = tokio::time::timeout(Duration::from_secs(2), h.home.next_delivery()).await;
        assert_eq!(delivered.ok(), Some(true));

        let err = rx.await.unwrap().unwrap_err();
        assert!(matches!(&err, CallError::Panicked(msg) if msg == "converter bug"));
        assert_eq!(call.state(), CallPhase::Failed);

        let after = h.call(CacheMode::NetworkOnly);
        assert_eq!(h.dispatch(&after).await.unwrap().body(), Some(&Flag { ok: true }));
    }

    #[tokio::test]
    async fn test_panicking_converter_in_execute_fails_call() {
        let h = Harness::new([Script::Respond(200, "{}")]);
        let request = Request::get(URL).build().unwrap();
        let call = Arc::new(Call::new(request, ResponseConverter::basic(Panicking), h.context.clone()));

        let running = {
            let call = Arc::clone(&call);
            tokio::spawn(async move { call.execute().await })
        };
        assert!(running.await.unwrap_err().is_panic());
        assert_eq!(call.state(), CallPhase::Failed);
        assert!(!call.is_canceled());
    }

    #[tokio::test]
    async fn test_cancel_after_transport_answered_keeps_response() {
        let h = Harness::new([Script::Gated(200, r#"{"ok":true}"#)]);
        let call = Arc::new(h.call(CacheMode::NetworkOnly));

        let running = {
            let call = Arc::clone(&call);
            tokio::spawn(async move { call.execute().await })
        };
        h.transport.dispatched.notified().await;
        call.cancel();
        h.transport.gate.notify_one();

        let response = running.await.unwrap().unwrap();
        assert_eq!(response.body(), Some(&Flag { ok: true }));
        assert_eq!(call.state(), CallPhase::Completed);
        assert_eq!(h.transport.cancels(), 1);
    }

    #[tokio::test]
    async fn test_dropped_execute_cancels_call() {
        let h = Harness::new([Script::Hang]);
        let call = h.call(CacheMode::NetworkOnly);

        let timed_out = tokio::time::timeout(Duration::from_millis(20), call.execute()).await;
        assert!(timed_out.is_err());
        assert_eq!(call.state(), CallPhase::Canceled);
        assert!(call.is_canceled());
        assert_eq!(h.transport.cancels(), 1);

        call.cancel();
        assert_eq!(h.transport.cancels(), 1);
        assert!(matches!(call.execute().await, Err(CallError::AlreadyExecuted)));
    }
}
