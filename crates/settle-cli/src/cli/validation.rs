use settle::IndexPolicy;

/// Parse a `NAME=VALUE` response header.
///
/// The name must be non-empty; the value may be empty. Whitespace around
/// either side is trimmed.
///
/// # Errors
///
/// Returns an error message if there is no `=` or the name is empty.
pub fn parse_header(s: &str) -> Result<(String, String), String> {
    let Some((name, value)) = s.split_once('=') else {
        return Err(format!("Header must be NAME=VALUE: '{}'", s));
    };

    let name = name.trim();
    if name.is_empty() {
        return Err(format!("Header name cannot be empty: '{}'", s));
    }

    Ok((name.to_string(), value.trim().to_string()))
}

/// Parse the `--index` option.
///
/// `true` and `false` toggle the default `index.html`; anything else names
/// the index file.
///
/// # Errors
///
/// Returns an error message for an empty value.
pub fn parse_index(s: &str) -> Result<IndexPolicy, String> {
    match s {
        "" => Err("Index cannot be empty; use `false` to disable it".to_string()),
        "true" => Ok(IndexPolicy::Enabled(true)),
        "false" => Ok(IndexPolicy::Enabled(false)),
        name => Ok(IndexPolicy::File(name.to_string())),
    }
}
