//! Target Host Normalization
//!
//! Turns user input such as `https://www.Example.com/page?x=1` into the bare
//! host (`example.com`) that every analysis step is keyed by.

use url::Url;

use crate::error::{CoreError, CoreResult};

/// Shortest host accepted as a target (`a.io`).
pub const MIN_TARGET_LEN: usize = 4;

/// Normalize a user-supplied target into a lower-cased bare host.
///
/// Strips the scheme, credentials, port, path, query, fragment and a leading
/// `www.`. Fails when the result is empty or not shaped like a host name.
pub fn normalize_target(input: &str) -> CoreResult<String> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(CoreError::validation("target is empty"));
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    };

    let parsed = Url::parse(&with_scheme)
        .map_err(|e| CoreError::validation(format!("target is not a valid host: {}", e)))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| CoreError::validation("target has no host"))?
        .to_lowercase();

    let host = host.trim_end_matches('.');
    let host = host.strip_prefix("www.").unwrap_or(host);

    validate_host(host)?;
    Ok(host.to_string())
}

/// Minimal shape check for a normalized host.
fn validate_host(host: &str) -> CoreResult<()> {
    if host.len() < MIN_TARGET_LEN {
        return Err(CoreError::validation(format!(
            "target '{}' is shorter than {} characters",
            host, MIN_TARGET_LEN
        )));
    }
    if !host.contains('.') {
        return Err(CoreError::validation(format!(
            "target '{}' must contain a '.'",
            host
        )));
    }
    if host.split('.').any(|label| label.is_empty()) {
        return Err(CoreError::validation(format!(
            "target '{}' has an empty label",
            host
        )));
    }
    if !host
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.')
    {
        return Err(CoreError::validation(format!(
            "target '{}' contains invalid characters",
            host
        )));
    }
    Ok(())
}
