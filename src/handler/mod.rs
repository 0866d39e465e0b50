use axum::http::HeaderMap;

pub mod auth;
pub mod bids;
pub mod events;
pub mod jobs;
pub mod mpesa;
pub mod payment_requests;
pub mod payments;
pub mod stats;
pub mod users;

const IDEMPOTENCY_HEADER: &str = "idempotency-key";

/// Client-supplied key that makes a create request safe to retry.
pub fn idempotency_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get(IDEMPOTENCY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.trim())
        .filter(|value| !value.is_empty() && value.len() <= 128)
        .map(|value| value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn blank_or_oversized_keys_are_ignored() {
        let mut headers = HeaderMap::new();
        assert_eq!(idempotency_key(&headers), None);

        headers.insert(IDEMPOTENCY_HEADER, HeaderValue::from_static("  "));
        assert_eq!(idempotency_key(&headers), None);

        headers.insert(IDEMPOTENCY_HEADER, HeaderValue::from_str(&"k".repeat(129)).unwrap());
        assert_eq!(idempotency_key(&headers), None);

        headers.insert(IDEMPOTENCY_HEADER, HeaderValue::from_static(" order-42 "));
        assert_eq!(idempotency_key(&headers).as_deref(), Some("order-42"));
    }
}
