//! Request URL to artifact path resolution.
//!
//! A request belongs to the build when its hostname does not contradict the
//! public path's hostname and its pathname starts with the public path's
//! pathname. The remainder after that prefix is joined onto the output path.

use crate::engine::{BuildOutputs, non_empty_or_root};
use percent_encoding::percent_decode_str;
use url::Url;

/// Hostname and pathname of a URL-like string.
#[derive(Debug, Clone, PartialEq, Eq)]
struct UrlParts {
    hostname: Option<String>,
    pathname: String,
}

/// Map `url` onto an artifact path.
///
/// `public_path` is the middleware-level public path; targets of a
/// multi-target build carry their own. Returns `None` when the request is not
/// addressed to the build output, or when the decoded path is not UTF-8.
pub fn resolve(public_path: &str, outputs: &BuildOutputs, url: &str) -> Option<String> {
    let (public_path, output_path) = select_target(public_path, outputs, url);

    let config = parse_url(public_path, true);
    let request = parse_url(url, false);

    let hostname_matches = match (&config.hostname, &request.hostname) {
        (Some(configured), Some(requested)) => configured == requested,
        _ => true,
    };
    if !hostname_matches || !request.pathname.starts_with(&config.pathname) {
        return None;
    }

    let stripped = &request.pathname[config.pathname.len()..];
    let joined = if stripped.is_empty() {
        output_path.to_string()
    } else {
        join_path(output_path, stripped)
    };

    percent_decode_str(&joined)
        .decode_utf8()
        .ok()
        .map(|decoded| decoded.into_owned())
}

/// Join two path pieces with exactly one `/` between them.
///
/// An empty `tail` yields `base` unchanged.
pub fn join_path(base: &str, tail: &str) -> String {
    if tail.is_empty() {
        return base.to_string();
    }
    let base = base.strip_suffix('/').unwrap_or(base);
    let tail = tail.strip_prefix('/').unwrap_or(tail);
    format!("{base}/{tail}")
}

/// Pick the `(public path, output path)` pair a request is resolved against.
///
/// The first target whose public path is a literal prefix of the raw URL wins;
/// otherwise the middleware public path and the primary output path are used.
fn select_target<'a>(
    public_path: &'a str,
    outputs: &'a BuildOutputs,
    url: &str,
) -> (&'a str, &'a str) {
    if let BuildOutputs::Multi { targets, .. } = outputs {
        let matched = targets.iter().find(|target| {
            target
                .public_path
                .as_deref()
                .is_some_and(|prefix| url.starts_with(prefix))
        });
        if let Some(target) = matched {
            return (target.public_path(), target.output_path());
        }
    }

    (
        non_empty_or_root(Some(public_path)),
        outputs.primary_output_path(),
    )
}

/// Split a URL-like string into hostname and pathname.
///
/// Full URLs are parsed as such. `//host/path` names a host only when
/// `slashes_denote_host` is set (public paths); a request line `//x` is a path.
/// Anything else is a bare path whose query and fragment are discarded.
fn parse_url(input: &str, slashes_denote_host: bool) -> UrlParts {
    if has_scheme(input) {
        if let Ok(url) = Url::parse(input) {
            return UrlParts::from(&url);
        }
    }

    if slashes_denote_host && input.starts_with("//") {
        if let Ok(url) = Url::parse(&format!("http:{input}")) {
            return UrlParts::from(&url);
        }
    }

    let end = input.find(['?', '#']).unwrap_or(input.len());
    UrlParts {
        hostname: None,
        pathname: input[..end].to_string(),
    }
}

impl From<&Url> for UrlParts {
    fn from(url: &Url) -> Self {
        Self {
            hostname: url.host_str().map(str::to_string),
            pathname: url.path().to_string(),
        }
    }
}

fn has_scheme(input: &str) -> bool {
    let Some((scheme, _)) = input.split_once("://") else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}
