//! Classification of raw responses into typed results.
//!
//! The same rules apply to responses from the network and responses
//! synthesized from cache entries:
//!
//! - status outside 200..300: `Response::Error`, body buffered in full
//! - 204 and 205: `Response::Success` with no body, converter not invoked
//! - any other 2xx: converter output, with stream faults reported as
//!   transport failures rather than conversion failures

use std::io::{self, Read};

use bytes::Bytes;
use reqwest::StatusCode;

use crate::convert::{BodyStream, ResponseConverter};
use crate::error::{CallError, TransportError};
use crate::request::Request;
use crate::response::{RawResponse, Response, ResponseMeta, ResponseOrigin};

/// Records the first I/O error raised by the wrapped stream.
///
/// The converter gets a copy of the error with the same kind and message;
/// the original stays here so the parser can report it as the stream's fault.
struct FaultCatchingReader<R> {
    inner: R,
    fault: Option<io::Error>,
}

impl<R: Read> FaultCatchingReader<R> {
    fn new(inner: R) -> Self {
        Self { inner, fault: None }
    }

    fn take_fault(&mut self) -> Option<io::Error> {
        self.fault.take()
    }
}

impl<R: Read> Read for FaultCatchingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => Err(e),
            Err(e) => {
                let echo = io::Error::new(e.kind(), e.to_string());
                if self.fault.is_none() {
                    self.fault = Some(e);
                }
                Err(echo)
            }
        }
    }
}

/// Turn `raw` into a typed `Response`.
///
/// # Errors
///
/// - `CallError::Conversion` when the converter rejects a 2xx body
/// - `CallError::Transport` when the body stream itself fails
pub fn parse_response<T>(
    raw: RawResponse, request: &Request, converter: &ResponseConverter<T>, origin: ResponseOrigin,
) -> Result<Response<T>, CallError> {
    let RawResponse { status, headers, body } = raw;
    let (content_type, content_length, mut source) = body.into_parts();
    let meta = ResponseMeta { status, headers, content_type, content_length, origin };

    if !status.is_success() {
        let mut buffered = Vec::new();
        source.read_to_end(&mut buffered).map_err(TransportError::from)?;
        drop(source);
        tracing::debug!(status = status.as_u16(), bytes = buffered.len(), "buffered error response body");
        return Ok(Response::Error { body: Bytes::from(buffered), meta });
    }

    if status == StatusCode::NO_CONTENT || status == StatusCode::RESET_CONTENT {
        return Ok(Response::Success { body: None, meta });
    }

    let mut catching = FaultCatchingReader::new(source);
    let converted = {
        let mut stream = BodyStream::new(meta.content_type.as_deref(), meta.content_length, &mut catching);
        converter.convert(&mut stream, request)
    };

    match converted {
        Ok(body) => Ok(Response::Success { body: Some(body), meta }),
        Err(err) => match catching.take_fault() {
            Some(fault) => Err(TransportError::from(fault).into()),
            None => Err(err.into()),
        },
    }
}
