//! Copy a build command's output directory into the in-memory filesystem.

use settle::{VfsError, VirtualFs, join_path};
use std::path::Path;
use thiserror::Error;
use walkdir::WalkDir;

/// Files larger than this stay on disk only.
pub const MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum MirrorError {
    #[error("cannot read output directory: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("cannot read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot store output in memory: {0}")]
    Vfs(#[from] VfsError),
}

/// What a mirror pass did.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Mirrored {
    pub files: usize,
    pub skipped: Vec<String>,
}

/// Replace everything under `output_path` in `fs` with the files in `out_dir`.
///
/// Files over [`MAX_FILE_SIZE`] are skipped and reported in
/// [`Mirrored::skipped`]. Nothing is replaced if `out_dir` cannot be read.
pub fn mirror(out_dir: &Path, fs: &dyn VirtualFs, output_path: &str) -> Result<Mirrored, MirrorError> {
    let mut files = Vec::new();
    let mut skipped = Vec::new();

    for entry in WalkDir::new(out_dir).follow_links(true) {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }

        let relative = entry
            .path()
            .strip_prefix(out_dir)
            .unwrap_or(entry.path())
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let size = entry.metadata()?.len();
        if size > MAX_FILE_SIZE {
            tracing::warn!(file = %relative, size, "skipping large file");
            skipped.push(format!("{relative} is larger than 10 MiB ({size} bytes), not served"));
            continue;
        }

        let contents = std::fs::read(entry.path()).map_err(|source| MirrorError::Read {
            path: entry.path().display().to_string(),
            source,
        })?;
        files.push((relative, contents));
    }

    match fs.remove(output_path) {
        Ok(()) | Err(VfsError::NotFound(_)) => {}
        Err(e) => return Err(e.into()),
    }
    fs.mkdir_p(output_path)?;

    let count = files.len();
    for (relative, contents) in files {
        fs.write_file(&join_path(output_path, &relative), &contents)?;
    }

    tracing::debug!(files = count, output_path, "mirrored build output");
    Ok(Mirrored {
        files: count,
        skipped,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use settle::MemoryFs;
    use tempfile::TempDir;

    fn out_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("bundle.js"), "console.log(1)").unwrap();
        std::fs::create_dir_all(dir.path().join("assets/img")).unwrap();
        std::fs::write(dir.path().join("assets/img/logo.svg"), "<svg/>").unwrap();
        dir
    }

    #[test]
    fn test_mirror_tree() {
        let dir = out_dir();
        let fs = MemoryFs::new();

        let mirrored = mirror(dir.path(), &fs, "/dist").unwrap();
        assert_eq!(mirrored.files, 2);
        assert!(mirrored.skipped.is_empty());
        assert_eq!(fs.read_file("/dist/bundle.js").unwrap(), b"console.log(1)");
        assert_eq!(fs.read_file("/dist/assets/img/logo.svg").unwrap(), b"<svg/>");
        assert!(fs.stat("/dist/assets").unwrap().is_directory());
    }

    #[test]
    fn test_mirror_replaces_stale_files() {
        let dir = out_dir();
        let fs = MemoryFs::new();
        fs.write_file("/dist/old.js", b"stale").unwrap();
        fs.write_file("/elsewhere.txt", b"kept").unwrap();

        mirror(dir.path(), &fs, "/dist").unwrap();
        assert!(fs.stat("/dist/old.js").is_err());
        assert_eq!(fs.read_file("/elsewhere.txt").unwrap(), b"kept");
    }

    #[test]
    fn test_mirror_at_root() {
        let dir = out_dir();
        let fs = MemoryFs::new();
        mirror(dir.path(), &fs, "/").unwrap();
        assert_eq!(fs.read_file("/bundle.js").unwrap(), b"console.log(1)");
    }

    #[test]
    fn test_missing_out_dir_keeps_previous_output() {
        let dir = TempDir::new().unwrap();
        let fs = MemoryFs::new();
        fs.write_file("/dist/bundle.js", b"previous").unwrap();

        let err = mirror(&dir.path().join("missing"), &fs, "/dist").unwrap_err();
        assert!(matches!(err, MirrorError::Walk(_)));
        assert_eq!(fs.read_file("/dist/bundle.js").unwrap(), b"previous");
    }

    #[test]
    fn test_large_files_skipped() {
        let dir = TempDir::new().unwrap();
        let big = std::fs::File::create(dir.path().join("huge.map")).unwrap();
        big.set_len(MAX_FILE_SIZE + 1).unwrap();
        std::fs::write(dir.path().join("small.js"), "x").unwrap();

        let fs = MemoryFs::new();
        let mirrored = mirror(dir.path(), &fs, "/").unwrap();
        assert_eq!(mirrored.files, 1);
        assert_eq!(mirrored.skipped.len(), 1);
        assert!(mirrored.skipped[0].starts_with("huge.map"));
        assert!(fs.stat("/huge.map").is_err());
    }
}
