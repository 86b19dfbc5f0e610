use url::Url;

use crate::error::NormalizationError;

/// Turn user input into a canonical absolute URL string.
///
/// Input without a `scheme://` prefix is treated as `http://`. The result is
/// the serialization produced by the WHATWG parser: lowercase scheme and
/// host, default port dropped, dot segments resolved and unsafe characters
/// percent-encoded. Normalizing the output again yields the same string.
pub fn normalize(raw: &str) -> Result<String, NormalizationError> {
    let raw = raw.trim();

    let candidate = if has_scheme(raw) {
        raw.to_owned()
    } else {
        format!("http://{raw}")
    };

    let url = Url::parse(&candidate).map_err(|e| NormalizationError {
        input: raw.to_owned(),
        reason: e.to_string(),
    })?;

    match url.host_str() {
        Some(host) if !host.is_empty() => Ok(url.into()),
        _ => Err(NormalizationError {
            input: raw.to_owned(),
            reason: "missing host".into(),
        }),
    }
}

/// `true` when `input` starts with `[A-Za-z][A-Za-z0-9+.-]*://`.
fn has_scheme(input: &str) -> bool {
    let Some((scheme, _)) = input.split_once("://") else {
        return false;
    };

    let mut chars = scheme.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {
            chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '.' | '-'))
        }
        _ => false,
    }
}
