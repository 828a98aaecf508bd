use crate::request::{parse_cookies, RawRequest, RequestId};
use http::Method;
use may_minihttp::Request;
use std::io::Read;
use std::sync::Arc;
use tracing::debug;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Translate a `may_minihttp` request into the transport-neutral [`RawRequest`].
///
/// Header names are lower-cased, cookies come from the `Cookie` header, and a non-empty
/// body is decoded as JSON. A body that is not JSON is recorded in
/// [`RawRequest::body_error`] and reported later as a validation failure at `body`.
pub fn parse_request(req: Request) -> RawRequest {
    let method = Method::from_bytes(req.method().as_bytes()).unwrap_or_default();
    let mut raw = RawRequest::new(method, req.path());

    for header in req.headers() {
        let name = header.name.to_ascii_lowercase();
        let value = String::from_utf8_lossy(header.value).into_owned();
        if name == "cookie" {
            raw.cookies.extend(parse_cookies(&value));
        }
        raw.headers.push((Arc::from(name), value));
    }
    raw.request_id = RequestId::from_header_or_new(raw.header(REQUEST_ID_HEADER));

    let mut bytes = Vec::new();
    match req.body().read_to_end(&mut bytes) {
        Ok(0) => {}
        Ok(_) => match String::from_utf8(bytes) {
            Ok(text) => raw = raw.with_raw_body(&text),
            Err(_) => raw.body_error = Some("body is not valid UTF-8".to_string()),
        },
        Err(e) => raw.body_error = Some(format!("body could not be read: {e}")),
    }

    debug!(
        request_id = %raw.request_id,
        method = %raw.method,
        path = %raw.path,
        headers = raw.headers.len(),
        query_params = raw.query.len(),
        has_body = raw.body.is_some(),
        "HTTP request parsed"
    );
    raw
}
