// Access-token inspection helpers
//
// Tokens are decoded without signature verification: the provider is the
// authority on validity, this client only needs the embedded expiry.

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Duration, Utc};

/// Decode a JWT payload without verification
///
/// # Errors
///
/// Returns an error if:
/// - The JWT format is invalid (not 3 parts separated by dots)
/// - Base64 decoding fails
/// - UTF-8 decoding fails
/// - JSON parsing fails
pub fn decode_jwt_payload(token: &str) -> Result<serde_json::Value, String> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err("Invalid JWT format".to_string());
    }

    let payload_b64 = parts[1];
    let payload_bytes = general_purpose::URL_SAFE_NO_PAD
        .decode(payload_b64)
        .or_else(|_| general_purpose::STANDARD.decode(payload_b64))
        .map_err(|_| "Base64 decode failed")?;

    let payload_str = String::from_utf8(payload_bytes).map_err(|_| "UTF-8 decode failed")?;

    serde_json::from_str(&payload_str).map_err(|_| "JSON parse failed".to_string())
}

/// Expiry embedded in the token's `exp` claim
#[must_use]
pub fn token_expiry(token: &str) -> Option<DateTime<Utc>> {
    let claims = decode_jwt_payload(token).ok()?;
    let exp = claims.get("exp").and_then(|v| {
        v.as_i64()
            .or_else(|| v.as_f64().map(|f| f as i64))
    })?;
    DateTime::<Utc>::from_timestamp(exp, 0)
}

/// Time left before the token expires, negative once expired
#[must_use]
pub fn time_until_expiry(token: &str, now: DateTime<Utc>) -> Option<Duration> {
    token_expiry(token).map(|exp| exp - now)
}

/// Whether the token should be refreshed given a safety buffer
///
/// Tokens without a readable expiry are never considered due.
#[must_use]
pub fn needs_refresh(token: &str, now: DateTime<Utc>, buffer: Duration) -> bool {
    time_until_expiry(token, now).is_some_and(|remaining| remaining < buffer)
}

/// Short, log-safe rendering of a token
#[must_use]
pub fn redact(token: &str) -> String {
    let prefix: String = token.chars().take(8).collect();
    format!("{prefix}… ({} chars)", token.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn make_token(payload: &serde_json::Value) -> String {
        let header = general_purpose::URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let body = general_purpose::URL_SAFE_NO_PAD.encode(payload.to_string().as_bytes());
        format!("{header}.{body}.signature")
    }

    #[test]
    fn test_decode_jwt_payload_rejects_malformed_tokens() {
        assert!(decode_jwt_payload("invalid").is_err());
        assert!(decode_jwt_payload("only.two").is_err());
        assert!(decode_jwt_payload("a.!!!.c").is_err());
    }

    #[test]
    fn test_token_expiry_reads_exp_claim() {
        let token = make_token(&json!({ "sub": "user-1", "exp": 1_700_000_000 }));
        assert_eq!(token_expiry(&token).map(|d| d.timestamp()), Some(1_700_000_000));

        let no_exp = make_token(&json!({ "sub": "user-1" }));
        assert!(token_expiry(&no_exp).is_none());
    }

    #[test]
    fn test_needs_refresh_inside_buffer() {
        let now = Utc::now();
        let token = make_token(&json!({ "exp": (now + Duration::minutes(4)).timestamp() }));

        assert!(needs_refresh(&token, now, Duration::minutes(5)));
        assert!(!needs_refresh(&token, now, Duration::minutes(3)));
    }

    #[test]
    fn test_needs_refresh_ignores_unreadable_tokens() {
        assert!(!needs_refresh("opaque-token", Utc::now(), Duration::minutes(5)));
    }

    #[test]
    fn test_redact_never_returns_full_token() {
        let token = make_token(&json!({ "exp": 1 }));
        let redacted = redact(&token);
        assert!(!redacted.contains(&token));
        assert!(redacted.ends_with(&format!("({} chars)", token.len())));
    }
}
