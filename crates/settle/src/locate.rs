//! Artifact lookup with directory index fallback.

use crate::options::IndexPolicy;
use crate::resolve::join_path;
use crate::vfs::VirtualFs;

/// Find the file to serve for a resolved artifact path.
///
/// Files are returned unchanged. Directories resolve to their index file when
/// the policy names one and it exists as a file. Every other case, stat errors
/// included, is `None`.
pub fn locate(path: &str, fs: &dyn VirtualFs, index: &IndexPolicy) -> Option<String> {
    let stat = fs.stat(path).ok()?;
    if stat.is_file() {
        return Some(path.to_string());
    }
    if !stat.is_directory() {
        return None;
    }

    let candidate = join_path(path, index.index_file()?);
    fs.stat(&candidate)
        .ok()
        .filter(|stat| stat.is_file())
        .map(|_| candidate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vfs::MemoryFs;

    fn fixture() -> MemoryFs {
        let fs = MemoryFs::new();
        fs.write_file("/dist/bundle.js", b"bundle").unwrap();
        fs.write_file("/dist/index.html", b"<html></html>").unwrap();
        fs.write_file("/dist/docs/default.htm", b"docs").unwrap();
        fs.mkdir_p("/dist/empty").unwrap();
        fs.mkdir_p("/dist/nested/index.html").unwrap();
        fs
    }

    #[test]
    fn test_file_is_returned_unchanged() {
        let fs = fixture();
        assert_eq!(
            locate("/dist/bundle.js", &fs, &IndexPolicy::default()),
            Some("/dist/bundle.js".to_string())
        );
    }

    #[test]
    fn test_directory_uses_index_html() {
        let fs = fixture();
        assert_eq!(
            locate("/dist", &fs, &IndexPolicy::Enabled(true)),
            Some("/dist/index.html".to_string())
        );
        assert_eq!(
            locate("/dist/", &fs, &IndexPolicy::Enabled(true)),
            Some("/dist/index.html".to_string())
        );
    }

    #[test]
    fn test_directory_with_custom_index() {
        let fs = fixture();
        assert_eq!(
            locate("/dist/docs", &fs, &IndexPolicy::File("default.htm".into())),
            Some("/dist/docs/default.htm".to_string())
        );
    }

    #[test]
    fn test_disabled_index_never_resolves_directories() {
        let fs = fixture();
        assert_eq!(locate("/dist", &fs, &IndexPolicy::Enabled(false)), None);
        assert_eq!(locate("/dist", &fs, &IndexPolicy::File(String::new())), None);
    }

    #[test]
    fn test_missing_index_and_missing_path() {
        let fs = fixture();
        assert_eq!(locate("/dist/empty", &fs, &IndexPolicy::default()), None);
        assert_eq!(locate("/dist/missing.js", &fs, &IndexPolicy::default()), None);
        assert_eq!(locate("relative.js", &fs, &IndexPolicy::default()), None);
    }

    #[test]
    fn test_index_that_is_a_directory_does_not_resolve() {
        let fs = fixture();
        assert_eq!(locate("/dist/nested", &fs, &IndexPolicy::default()), None);
    }
}
