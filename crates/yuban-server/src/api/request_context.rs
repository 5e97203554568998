use axum::extract::Request;
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

const REQUEST_ID_HEADER: &str = "x-request-id";

/// Correlation context carried through the request extensions so handler
/// logs and the response echo share one id per request.
#[derive(Clone, Debug)]
pub struct RequestContext {
    pub correlation_id: String,
}

impl RequestContext {
    /// A caller-supplied `x-request-id` wins; otherwise a fresh id is
    /// minted. Blank headers count as absent.
    fn resolve(headers: &HeaderMap) -> Self {
        let correlation_id = headers
            .get(REQUEST_ID_HEADER)
            .and_then(|h| h.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Self { correlation_id }
    }
}

pub async fn attach_request_context(mut req: Request, next: Next) -> Response {
    let context = RequestContext::resolve(req.headers());
    let correlation_id = context.correlation_id.clone();
    req.extensions_mut().insert(context);

    let mut response = next.run(req).await;
    if let Ok(value) = correlation_id.parse() {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn caller_supplied_id_is_kept() {
        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("req-42"));
        assert_eq!(RequestContext::resolve(&headers).correlation_id, "req-42");
    }

    #[test]
    fn absent_or_blank_header_mints_a_fresh_id() {
        let minted = RequestContext::resolve(&HeaderMap::new()).correlation_id;
        assert!(!minted.is_empty());

        let mut headers = HeaderMap::new();
        headers.insert(REQUEST_ID_HEADER, HeaderValue::from_static("   "));
        let from_blank = RequestContext::resolve(&headers).correlation_id;
        assert!(!from_blank.trim().is_empty());
        assert_ne!(from_blank, "   ");
    }
}
