//! Artifact responses with byte-range support.

use crate::mime::MimeRegistry;
use crate::range::{RangeOutcome, parse_range};
use crate::vfs::VirtualFs;
use http::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE};
use http::{HeaderName, HeaderValue, Response, StatusCode};

/// Builds artifact responses.
#[derive(Debug, Clone, Default)]
pub struct Responder {
    mime: MimeRegistry,
    headers: Vec<(HeaderName, HeaderValue)>,
}

impl Responder {
    /// `headers` are applied to every response, in order.
    pub fn new(mime: MimeRegistry, headers: Vec<(HeaderName, HeaderValue)>) -> Self {
        Self { mime, headers }
    }

    /// Build the response for `path`, honoring an optional `Range` header.
    ///
    /// - A single satisfiable range yields `206` with the sliced body.
    /// - An unsatisfiable range yields `416` with an empty body.
    /// - Malformed headers and multi-range requests get the full `200` body.
    ///
    /// Returns `None` when the file cannot be read.
    pub fn respond(
        &self,
        path: &str,
        fs: &dyn VirtualFs,
        range: Option<&str>,
    ) -> Option<Response<Vec<u8>>> {
        let content = fs.read_file(path).ok()?;
        let total = content.len() as u64;

        let mut status = StatusCode::OK;
        let mut content_range = None;
        let mut body = content;

        if let Some(header) = range {
            match parse_range(total, header) {
                RangeOutcome::Unsatisfiable => {
                    status = StatusCode::RANGE_NOT_SATISFIABLE;
                    content_range = Some(format!("bytes */{total}"));
                    body = Vec::new();
                }
                RangeOutcome::Ranges(ranges) if ranges.len() == 1 => {
                    let range = ranges[0];
                    status = StatusCode::PARTIAL_CONTENT;
                    content_range = Some(format!("bytes {}-{}/{total}", range.start, range.end));
                    body = body[range.start as usize..=range.end as usize].to_vec();
                }
                RangeOutcome::Ranges(_) | RangeOutcome::Malformed => {}
            }
        }

        let content_type = format!("{}; charset=UTF-8", self.mime.lookup(path));
        let length = body.len();

        let mut response = Response::new(body);
        *response.status_mut() = status;

        let headers = response.headers_mut();
        headers.insert(ACCEPT_RANGES, HeaderValue::from_static("bytes"));
        if let Some(value) = content_range.and_then(|v| HeaderValue::try_from(v).ok()) {
            headers.insert(CONTENT_RANGE, value);
        }
        let content_type = HeaderValue::try_from(content_type)
            .unwrap_or_else(|_| HeaderValue::from_static("application/octet-stream"));
        headers.insert(CONTENT_TYPE, content_type);
        headers.insert(CONTENT_LENGTH, HeaderValue::from(length));

        for (name, value) in &self.headers {
            if *name == ACCEPT_RANGES || *name == CONTENT_RANGE {
                continue;
            }
            headers.insert(name.clone(), value.clone());
        }

        Some(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::MemoryFs;

    fn fixture() -> MemoryFs {
        let fs = MemoryFs::new();
        fs.write_file("/bundle.js", b"0123456789").unwrap();
        fs.write_file("/image.svg", &vec![b'x'; 4778]).unwrap();
        fs
    }

    fn header<'a>(response: &'a Response<Vec<u8>>, name: &str) -> Option<&'a str> {
        response.headers().get(name).and_then(|v| v.to_str().ok())
    }

    #[test]
    fn test_full_response() {
        let fs = fixture();
        let response = Responder::default().respond("/bundle.js", &fs, None).unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body(), b"0123456789");
        assert_eq!(header(&response, "accept-ranges"), Some("bytes"));
        assert_eq!(
            header(&response, "content-type"),
            Some("application/javascript; charset=UTF-8")
        );
        assert_eq!(header(&response, "content-length"), Some("10"));
        assert_eq!(header(&response, "content-range"), None);
    }

    #[test]
    fn test_single_range() {
        let fs = fixture();
        let response = Responder::default()
            .respond("/image.svg", &fs, Some("bytes=3000-3500"))
            .unwrap();

        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(header(&response, "content-length"), Some("501"));
        assert_eq!(header(&response, "content-range"), Some("bytes 3000-3500/4778"));
        assert_eq!(response.body().len(), 501);
    }

    #[test]
    fn test_unsatisfiable_range_has_empty_body() {
        let fs = fixture();
        let response = Responder::default()
            .respond("/image.svg", &fs, Some("bytes=6000-"))
            .unwrap();

        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(header(&response, "content-range"), Some("bytes */4778"));
        assert_eq!(header(&response, "content-length"), Some("0"));
        assert!(response.body().is_empty());
    }

    #[test]
    fn test_multiple_and_malformed_ranges_serve_everything() {
        let fs = fixture();
        let responder = Responder::default();

        let multi = responder
            .respond("/bundle.js", &fs, Some("bytes=0-1,4-5"))
            .unwrap();
        assert_eq!(multi.status(), StatusCode::OK);
        assert_eq!(multi.body().len(), 10);

        let malformed = responder.respond("/bundle.js", &fs, Some("garbage")).unwrap();
        assert_eq!(malformed.status(), StatusCode::OK);
        assert_eq!(malformed.body().len(), 10);
    }

    #[test]
    fn test_custom_headers_do_not_override_range_headers() {
        let fs = fixture();
        let responder = Responder::new(
            MimeRegistry::new(),
            vec![
                (
                    HeaderName::from_static("x-settle"),
                    HeaderValue::from_static("yes"),
                ),
                (ACCEPT_RANGES, HeaderValue::from_static("none")),
                (CONTENT_TYPE, HeaderValue::from_static("text/plain")),
            ],
        );
        let response = responder
            .respond("/bundle.js", &fs, Some("bytes=0-3"))
            .unwrap();

        assert_eq!(header(&response, "x-settle"), Some("yes"));
        assert_eq!(header(&response, "accept-ranges"), Some("bytes"));
        assert_eq!(header(&response, "content-type"), Some("text/plain"));
        assert_eq!(response.body(), b"0123");
    }

    #[test]
    fn test_unreadable_path() {
        let fs = fixture();
        assert!(Responder::default().respond("/missing.js", &fs, None).is_none());
        assert!(Responder::default().respond("/", &fs, None).is_none());
    }
}
