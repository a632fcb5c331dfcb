//! Virtual filesystem abstraction for build output.
//!
//! Build engines write their artifacts into a [`VirtualFs`] and the middleware
//! reads them back from it. All paths are absolute and `/`-separated; a Windows
//! drive prefix (`C:\`) is accepted and folded into the first path segment.
//!
//! [`MemoryFs`] is the in-memory implementation used when an engine does not
//! bring its own.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Result type for virtual filesystem operations
pub type VfsResult<T> = Result<T, VfsError>;

/// Errors returned by [`VirtualFs`] operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VfsError {
    /// Nothing exists at the path
    #[error("no such file or directory: {0}")]
    NotFound(String),

    /// The path is relative
    #[error("path must be absolute: {0}")]
    NotAbsolute(String),

    /// A file operation was attempted on a directory
    #[error("is a directory: {0}")]
    IsDirectory(String),

    /// A path component that should be a directory is a file
    #[error("not a directory: {0}")]
    NotADirectory(String),
}

/// Kind of a filesystem entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    File,
    Directory,
}

/// Result of a [`VirtualFs::stat`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    /// Entry kind
    pub kind: FileKind,
    /// Size in bytes (always 0 for directories)
    pub size: u64,
}

impl FileStat {
    pub fn is_file(&self) -> bool {
        self.kind == FileKind::File
    }

    pub fn is_directory(&self) -> bool {
        self.kind == FileKind::Directory
    }
}

/// Synchronous key-value filesystem keyed by absolute path.
///
/// Implementations must be shareable between the build engine (writer) and
/// request handlers (readers).
pub trait VirtualFs: Send + Sync + fmt::Debug {
    /// Stat a path. Fails with [`VfsError::NotFound`] when nothing is there.
    fn stat(&self, path: &str) -> VfsResult<FileStat>;

    /// Read the full contents of a file.
    fn read_file(&self, path: &str) -> VfsResult<Vec<u8>>;

    /// Write a file, creating missing parent directories.
    fn write_file(&self, path: &str, contents: &[u8]) -> VfsResult<()>;

    /// Create a directory and all of its parents.
    fn mkdir_p(&self, path: &str) -> VfsResult<()>;

    /// Remove a file, or a directory with everything below it.
    fn remove(&self, path: &str) -> VfsResult<()>;

    /// List the names of the direct children of a directory, sorted.
    fn read_dir(&self, path: &str) -> VfsResult<Vec<String>>;

    /// Remove every entry.
    fn clear(&self);
}

/// Check whether a path is absolute in the virtual filesystem's sense.
///
/// Accepts `/`-rooted paths and Windows drive paths (`C:\`, `C:/`).
pub fn is_absolute(path: &str) -> bool {
    if path.starts_with('/') || path.starts_with('\\') {
        return true;
    }
    let bytes = path.as_bytes();
    bytes.len() >= 3
        && bytes[0].is_ascii_alphabetic()
        && bytes[1] == b':'
        && (bytes[2] == b'/' || bytes[2] == b'\\')
}

/// Normalize an absolute path into the canonical storage key.
///
/// Separators are unified to `/`, empty and `.` segments dropped and `..`
/// segments applied. The root is `/`.
pub fn normalize(path: &str) -> VfsResult<String> {
    if !is_absolute(path) {
        return Err(VfsError::NotAbsolute(path.to_string()));
    }

    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    Ok(format!("/{}", segments.join("/")))
}

fn parent_of(key: &str) -> Option<&str> {
    if key == "/" {
        return None;
    }
    match key.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&key[..idx]),
        None => None,
    }
}

fn child_prefix(key: &str) -> String {
    if key == "/" {
        "/".to_string()
    } else {
        format!("{key}/")
    }
}

#[derive(Clone)]
enum Node {
    File(Vec<u8>),
    Directory,
}

/// In-memory [`VirtualFs`].
///
/// Directories are tracked explicitly; writing a file records all of its
/// ancestors as directories.
#[derive(Default)]
pub struct MemoryFs {
    nodes: RwLock<BTreeMap<String, Node>>,
}

impl fmt::Debug for MemoryFs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nodes = self.nodes.read();
        f.debug_struct("MemoryFs")
            .field("entries", &nodes.len())
            .finish()
    }
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of files currently stored.
    pub fn file_count(&self) -> usize {
        self.nodes
            .read()
            .values()
            .filter(|node| matches!(node, Node::File(_)))
            .count()
    }

    fn ensure_dirs(nodes: &mut BTreeMap<String, Node>, key: &str) -> VfsResult<()> {
        let mut ancestors = Vec::new();
        let mut current = Some(key);
        while let Some(path) = current {
            if path == "/" {
                break;
            }
            ancestors.push(path);
            current = parent_of(path);
        }

        for dir in ancestors.into_iter().rev() {
            match nodes.get(dir) {
                Some(Node::Directory) => {}
                Some(Node::File(_)) => return Err(VfsError::NotADirectory(dir.to_string())),
                None => {
                    nodes.insert(dir.to_string(), Node::Directory);
                }
            }
        }
        Ok(())
    }
}

impl VirtualFs for MemoryFs {
    fn stat(&self, path: &str) -> VfsResult<FileStat> {
        let key = normalize(path)?;
        if key == "/" {
            return Ok(FileStat {
                kind: FileKind::Directory,
                size: 0,
            });
        }

        match self.nodes.read().get(&key) {
            Some(Node::File(bytes)) => Ok(FileStat {
                kind: FileKind::File,
                size: bytes.len() as u64,
            }),
            Some(Node::Directory) => Ok(FileStat {
                kind: FileKind::Directory,
                size: 0,
            }),
            None => Err(VfsError::NotFound(path.to_string())),
        }
    }

    fn read_file(&self, path: &str) -> VfsResult<Vec<u8>> {
        let key = normalize(path)?;
        if key == "/" {
            return Err(VfsError::IsDirectory(path.to_string()));
        }

        match self.nodes.read().get(&key) {
            Some(Node::File(bytes)) => Ok(bytes.clone()),
            Some(Node::Directory) => Err(VfsError::IsDirectory(path.to_string())),
            None => Err(VfsError::NotFound(path.to_string())),
        }
    }

    fn write_file(&self, path: &str, contents: &[u8]) -> VfsResult<()> {
        let key = normalize(path)?;
        if key == "/" {
            return Err(VfsError::IsDirectory(path.to_string()));
        }

        let mut nodes = self.nodes.write();
        if let Some(parent) = parent_of(&key) {
            Self::ensure_dirs(&mut nodes, parent)?;
        }
        if let Some(Node::Directory) = nodes.get(&key) {
            return Err(VfsError::IsDirectory(path.to_string()));
        }
        nodes.insert(key, Node::File(contents.to_vec()));
        Ok(())
    }

    fn mkdir_p(&self, path: &str) -> VfsResult<()> {
        let key = normalize(path)?;
        let mut nodes = self.nodes.write();
        Self::ensure_dirs(&mut nodes, &key)
    }

    fn remove(&self, path: &str) -> VfsResult<()> {
        let key = normalize(path)?;
        let mut nodes = self.nodes.write();

        if key == "/" {
            nodes.clear();
            return Ok(());
        }
        if nodes.remove(&key).is_none() {
            return Err(VfsError::NotFound(path.to_string()));
        }

        let prefix = child_prefix(&key);
        nodes.retain(|existing, _| !existing.starts_with(&prefix));
        Ok(())
    }

    fn read_dir(&self, path: &str) -> VfsResult<Vec<String>> {
        let key = normalize(path)?;
        let nodes = self.nodes.read();

        if key != "/" {
            match nodes.get(&key) {
                Some(Node::Directory) => {}
                Some(Node::File(_)) => return Err(VfsError::NotADirectory(path.to_string())),
                None => return Err(VfsError::NotFound(path.to_string())),
            }
        }

        let prefix = child_prefix(&key);
        let names = nodes
            .range(prefix.clone()..)
            .take_while(|(existing, _)| existing.starts_with(&prefix))
            .filter_map(|(existing, _)| {
                let rest = &existing[prefix.len()..];
                (!rest.is_empty() && !rest.contains('/')).then(|| rest.to_string())
            })
            .collect();
        Ok(names)
    }

    fn clear(&self) {
        self.nodes.write().clear();
    }
}
