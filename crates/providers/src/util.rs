//! Shared helpers for provider adapters.

use tm_domain::error::{Error, Result};

/// Convert a [`reqwest::Error`] into the domain [`Error`] type.
///
/// Timeout errors map to [`Error::Timeout`]; everything else maps to
/// [`Error::Http`].  The request URL is stripped since it may carry the
/// API key as a query parameter.
pub(crate) fn from_reqwest(e: reqwest::Error) -> Error {
    let e = e.without_url();
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

/// Read the API key from the named environment variable.
pub fn resolve_api_key(env_var: &str) -> Result<String> {
    match std::env::var(env_var) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(Error::Config(format!(
            "environment variable '{env_var}' not set or empty"
        ))),
    }
}

/// Redact the API key from a URL for safe logging.
pub(crate) fn redact_url_key(url: &str) -> String {
    if let Some(idx) = url.find("key=") {
        let prefix = &url[..idx + 4];
        let rest = &url[idx + 4..];
        let end = rest.find('&').unwrap_or(rest.len());
        format!("{prefix}[REDACTED]{}", &rest[end..])
    } else {
        url.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacts_key_parameter() {
        assert_eq!(
            redact_url_key("https://h/v1beta/models/m:generateContent?key=abc123"),
            "https://h/v1beta/models/m:generateContent?key=[REDACTED]"
        );
        assert_eq!(redact_url_key("https://h/x?key=k&alt=sse"), "https://h/x?key=[REDACTED]&alt=sse");
        assert_eq!(redact_url_key("https://h/x"), "https://h/x");
    }

    #[tokio::test]
    async fn transport_errors_do_not_carry_the_url() {
        let e = reqwest::Client::new()
            .get("http://127.0.0.1:1/v1beta/models/m:generateContent?key=secret-key")
            .send()
            .await
            .unwrap_err();
        assert!(e.to_string().contains("secret-key"));

        let err = from_reqwest(e);
        assert!(matches!(err, Error::Http(_) | Error::Timeout(_)), "got {err:?}");
        assert!(!err.to_string().contains("secret-key"), "leaked: {err}");
    }

    #[test]
    fn missing_key_is_a_config_error() {
        let err = resolve_api_key("TM_TEST_SURELY_UNSET_KEY_VAR").unwrap_err();
        assert!(matches!(err, Error::Config(m) if m.contains("TM_TEST_SURELY_UNSET_KEY_VAR")));
    }
}
