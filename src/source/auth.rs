//! Header helpers that wire access credentials and the target region into the
//! underlying `jsonrpsee` client builder.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use jsonrpsee::http_client::{HeaderMap, HeaderValue};

pub(crate) const REGION_HEADER: &str = "X-Streamtail-Region";

pub(crate) fn build_request_headers(
    access_key: &str,
    secret_key: &str,
    region: &str,
) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    let credentials = format!("{access_key}:{secret_key}");
    let encoded = BASE64_STANDARD.encode(credentials);
    let authorization = HeaderValue::from_str(&format!("Basic {encoded}"))
        .context("failed to build Authorization header")?;
    headers.insert("Authorization", authorization);

    let region = HeaderValue::from_str(region).context("region is not a valid header value")?;
    headers.insert(REGION_HEADER, region);
    Ok(headers)
}
