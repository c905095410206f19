//! `fetch` command.
//!
//! Sends one request through the cache-aware client. With `--dispatch` the
//! call goes through the dispatcher and its result is picked up from the
//! home queue; with `--store` a successful network body is written back to
//! the cache under the request URL.

use bytes::Bytes;
use clap::Args;
use serde::Serialize;
use stashline_client::{CacheMode, CallResult, Method, Request, Response, ResponseOrigin};
use stashline_core::CacheEntry;
use tokio::sync::oneshot;

use super::{Session, ttl_from_secs};
use crate::error::CliError;

const DEFAULT_MIME: &str = "application/octet-stream";

/// Parameters for the fetch command.
#[derive(Debug, Clone, Args)]
pub struct FetchParams {
    /// URL to request. Also the cache key, used verbatim.
    pub url: String,

    /// Cache mode: network-only, cache-else-network, network-else-cache or load-default.
    #[arg(long, default_value = "network-only")]
    pub mode: CacheMode,

    /// HTTP method.
    #[arg(short = 'X', long, default_value = "GET")]
    pub method: String,

    /// Extra request header, as `name: value`. Repeatable.
    #[arg(short = 'H', long = "header", value_name = "NAME:VALUE")]
    pub headers: Vec<String>,

    /// Request body.
    #[arg(long)]
    pub data: Option<String>,

    /// Run the call on the dispatcher instead of the current task.
    #[arg(long)]
    pub dispatch: bool,

    /// Write a successful network response back to the cache.
    #[arg(long)]
    pub store: bool,

    /// Lifetime of a stored entry in seconds (default: configured TTL).
    #[arg(long)]
    pub ttl_secs: Option<u64>,
}

/// Output from the fetch command.
#[derive(Debug, Clone, Serialize)]
pub struct FetchOutput {
    pub url: String,
    pub mode: String,
    pub status: u16,
    pub success: bool,
    pub origin: ResponseOrigin,
    pub content_type: Option<String>,
    /// Body as text, lossily decoded.
    pub body: Option<String>,
    /// Whether the body was written to the cache.
    pub stored: bool,
}

/// Implementation of the fetch command.
pub async fn fetch_impl(session: &mut Session, params: FetchParams) -> Result<FetchOutput, CliError> {
    let request = build_request(&params)?;
    let ttl = params.ttl_secs.map(ttl_from_secs).transpose()?;
    let call = session.client.bytes(request);

    let response = if params.dispatch {
        let (tx, mut rx) = oneshot::channel();
        call.enqueue(move |result| {
            let _ = tx.send(result);
        });
        wait_for(session, &mut rx).await?
    } else {
        call.execute().await?
    };

    let stored = if params.store { store(session, &params, ttl, &response).await? } else { false };

    let meta = response.meta();
    let body = match &response {
        Response::Success { body, .. } => body.as_ref().map(|b| String::from_utf8_lossy(b).into_owned()),
        Response::Error { body, .. } => Some(String::from_utf8_lossy(body).into_owned()),
    };

    Ok(FetchOutput {
        url: params.url,
        mode: params.mode.to_string(),
        status: meta.status.as_u16(),
        success: response.is_success(),
        origin: meta.origin,
        content_type: meta.content_type.clone(),
        body,
        stored,
    })
}

fn build_request(params: &FetchParams) -> Result<Request, CliError> {
    let method = Method::from_bytes(params.method.to_ascii_uppercase().as_bytes())
        .map_err(|e| CliError::InvalidInput(format!("bad method {:?}: {e}", params.method)))?;

    let mut builder = Request::builder(method, params.url.as_str());
    for raw in &params.headers {
        let (name, value) = parse_header(raw)?;
        builder = builder.header(name, value);
    }
    if let Some(data) = &params.data {
        builder = builder.body(data.clone());
    }
    Ok(builder.cache_mode(params.mode).build()?)
}

/// Split `name: value`.
fn parse_header(raw: &str) -> Result<(&str, &str), CliError> {
    match raw.split_once(':') {
        Some((name, value)) if !name.trim().is_empty() => Ok((name.trim(), value.trim())),
        _ => Err(CliError::InvalidInput(format!("header must look like `name: value`, got {raw:?}"))),
    }
}

/// Drain the home queue until the dispatched call reports back.
async fn wait_for(
    session: &mut Session, rx: &mut oneshot::Receiver<CallResult<Bytes>>,
) -> Result<Response<Bytes>, CliError> {
    loop {
        if !session.home.next_delivery().await {
            return Err(CliError::InvalidInput("dispatcher shut down before the call completed".into()));
        }
        if let Ok(result) = rx.try_recv() {
            return Ok(result?);
        }
    }
}

async fn store(
    session: &Session, params: &FetchParams, ttl: Option<chrono::Duration>, response: &Response<Bytes>,
) -> Result<bool, CliError> {
    if response.origin() != ResponseOrigin::Network {
        return Ok(false);
    }
    let Some(body) = response.body().filter(|b| !b.is_empty()) else {
        tracing::debug!(url = %params.url, "nothing to store");
        return Ok(false);
    };

    let meta = response.meta();
    let ttl = ttl.unwrap_or_else(|| session.config.default_ttl());
    let mime = meta.content_type.as_deref().unwrap_or(DEFAULT_MIME);

    let mut entry = CacheEntry::new(params.url.as_str(), body.to_vec(), mime, ttl);
    entry.etag = meta.headers.get("etag").and_then(|v| v.to_str().ok()).map(str::to_string);
    session.db.upsert_entry(&entry).await?;

    tracing::info!(url = %params.url, bytes = body.len(), "stored response in cache");
    Ok(true)
}
