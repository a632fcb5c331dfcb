//! Extension-based content type lookup.

use std::collections::{BTreeMap, HashMap};

/// Fallback for unknown extensions.
pub const DEFAULT_MIME: &str = "application/octet-stream";

const BUILTIN: &[(&str, &str)] = &[
    ("html", "text/html"),
    ("htm", "text/html"),
    ("js", "application/javascript"),
    ("mjs", "application/javascript"),
    ("cjs", "application/javascript"),
    ("css", "text/css"),
    ("json", "application/json"),
    ("map", "application/json"),
    ("txt", "text/plain"),
    ("xml", "application/xml"),
    ("csv", "text/csv"),
    ("md", "text/markdown"),
    ("svg", "image/svg+xml"),
    ("png", "image/png"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("gif", "image/gif"),
    ("webp", "image/webp"),
    ("avif", "image/avif"),
    ("ico", "image/x-icon"),
    ("bmp", "image/bmp"),
    ("wasm", "application/wasm"),
    ("woff", "font/woff"),
    ("woff2", "font/woff2"),
    ("ttf", "font/ttf"),
    ("otf", "font/otf"),
    ("eot", "application/vnd.ms-fontobject"),
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("ogg", "audio/ogg"),
    ("mp4", "video/mp4"),
    ("webm", "video/webm"),
    ("pdf", "application/pdf"),
    ("zip", "application/zip"),
    ("gz", "application/gzip"),
    ("webmanifest", "application/manifest+json"),
];

/// Maps file extensions to MIME types.
#[derive(Debug, Clone)]
pub struct MimeRegistry {
    custom: HashMap<String, String>,
}

impl Default for MimeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MimeRegistry {
    /// Registry with only the built-in table.
    pub fn new() -> Self {
        Self {
            custom: HashMap::new(),
        }
    }

    /// Registry extended with `{ mime type: [extensions] }` registrations.
    ///
    /// Custom registrations take precedence over the built-in table.
    pub fn with_custom(types: &BTreeMap<String, Vec<String>>) -> Self {
        let mut registry = Self::new();
        for (mime, extensions) in types {
            for extension in extensions {
                registry.define(extension, mime);
            }
        }
        registry
    }

    /// Register a single extension (without the leading dot).
    pub fn define(&mut self, extension: &str, mime: &str) {
        self.custom.insert(
            extension.trim_start_matches('.').to_ascii_lowercase(),
            mime.to_string(),
        );
    }

    /// MIME type for a path, [`DEFAULT_MIME`] when unknown.
    pub fn lookup(&self, path: &str) -> &str {
        let Some(extension) = extension_of(path) else {
            return DEFAULT_MIME;
        };

        if let Some(mime) = self.custom.get(&extension) {
            return mime;
        }

        BUILTIN
            .iter()
            .find(|(known, _)| *known == extension)
            .map(|(_, mime)| *mime)
            .unwrap_or(DEFAULT_MIME)
    }
}

fn extension_of(path: &str) -> Option<String> {
    let name = path.rsplit(['/', '\\']).next().unwrap_or(path);
    let (_, extension) = name.rsplit_once('.')?;
    if extension.is_empty() {
        return None;
    }
    Some(extension.to_ascii_lowercase())
}
