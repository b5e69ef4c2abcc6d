//! URL normalization and validation
//!
//! Everything here runs before any pool or rate-limit interaction.

use super::{CheckError, MAX_URL_LEN};

/// Normalize a caller-supplied URL for the check command.
///
/// Strips the scheme and any trailing slashes. Rejects empty, oversized,
/// whitespace- or angle-bracket-containing input, and anything left without
/// an alphanumeric character.
pub fn normalize_url(raw: &str) -> Result<String, CheckError> {
    if raw.is_empty() {
        return Err(CheckError::InvalidUrl("empty".to_string()));
    }
    if raw.len() > MAX_URL_LEN {
        return Err(CheckError::InvalidUrl(format!(
            "longer than {MAX_URL_LEN} characters"
        )));
    }
    if raw.chars().any(|c| c.is_whitespace() || c == '<' || c == '>') {
        return Err(CheckError::InvalidUrl(
            "contains whitespace or angle brackets".to_string(),
        ));
    }
    if !raw.chars().any(|c| c.is_ascii_alphanumeric()) {
        return Err(CheckError::InvalidUrl(
            "no alphanumeric characters".to_string(),
        ));
    }

    let mut url = raw;
    for scheme in ["http://", "https://"] {
        if url.len() >= scheme.len() && url[..scheme.len()].eq_ignore_ascii_case(scheme) {
            url = &url[scheme.len()..];
            break;
        }
    }
    let url = url.trim_end_matches('/');

    if url.is_empty() || !url.chars().any(|c| c.is_ascii_alphanumeric()) {
        return Err(CheckError::InvalidUrl(
            "nothing left after normalization".to_string(),
        ));
    }

    Ok(url.to_string())
}
