use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING};
use reqwest::{Client, Proxy, Url};

use crate::core::error::ConfigurationError;

const APP_USER_AGENT: &str = concat!("rapidwright-bootstrap/", env!("CARGO_PKG_VERSION"));

/// Client used for artifact downloads.
///
/// `identity` encoding keeps the bytes written to disk equal to the bytes served.
pub fn build_http_client(https_proxy: Option<&str>) -> Result<Client, ConfigurationError> {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));

    let mut builder = Client::builder()
        .user_agent(APP_USER_AGENT)
        .default_headers(default_headers);

    if let Some(raw) = https_proxy.map(str::trim).filter(|raw| !raw.is_empty()) {
        let url = normalize_proxy(raw)?;
        let proxy = Proxy::https(&url).map_err(|err| ConfigurationError::InvalidProxy {
            value: raw.to_string(),
            reason: err.to_string(),
        })?;
        builder = builder.proxy(proxy);
    }

    builder.build().map_err(|err| ConfigurationError::InvalidProxy {
        value: https_proxy.unwrap_or_default().to_string(),
        reason: err.to_string(),
    })
}

/// Accept the installer-style `host:port` form as well as full URLs.
fn normalize_proxy(raw: &str) -> Result<String, ConfigurationError> {
    let url = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("http://{raw}")
    };

    let invalid = |reason: String| ConfigurationError::InvalidProxy {
        value: raw.to_string(),
        reason,
    };
    let parsed = Url::parse(&url).map_err(|err| invalid(err.to_string()))?;
    if parsed.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}
