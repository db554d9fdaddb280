use anyhow::{Result, bail};
use reqwest::{Client, Response};
use std::time::Duration;

/// Upper bound for provider response bodies we read into memory.
pub const MAX_RESPONSE_BYTES: usize = 64 * 1024;

/// Build a `reqwest::Client` with a 10 s connect timeout and the given
/// overall timeout.
///
/// Falls back to the default client if the builder fails.
pub fn http_client(timeout: Duration) -> Client {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(timeout)
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Read a response body with a size limit.
///
/// Rejects up front when `Content-Length` exceeds the limit, otherwise
/// streams chunks and truncates at the limit. Returns `(bytes, truncated)`.
pub async fn limited_body(resp: Response, max_bytes: usize) -> Result<(Vec<u8>, bool)> {
    if let Some(cl) = resp.content_length()
        && cl as usize > max_bytes
    {
        bail!(
            "response body too large: Content-Length {} exceeds limit {}",
            cl,
            max_bytes
        );
    }

    let mut buf = Vec::new();
    let mut stream = resp;
    while let Some(chunk) = stream.chunk().await? {
        if buf.len() + chunk.len() > max_bytes {
            let remaining = max_bytes.saturating_sub(buf.len());
            buf.extend_from_slice(&chunk[..remaining]);
            return Ok((buf, true));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok((buf, false))
}
