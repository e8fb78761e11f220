//! Interface-only filesystem and directory traits consumed by
//! `PlayerScheduler::play_directory`. No FAT/SD implementation lives here.

use crate::device::ByteSource;
use crate::error::Result;

/// File kind as reported by a `Directory` iteration step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    /// A regular file.
    File,
    /// A subdirectory.
    Directory,
}

/// Minimal metadata a directory iterator hands back per entry — enough for
/// a scheduler to decide whether to descend or open a file as a `.ymm`
/// source.
#[derive(Debug, Clone)]
pub struct FileMeta {
    /// Entry name, relative to the directory it was listed from.
    pub name: String,
    /// Whether this entry is a file or a subdirectory.
    pub file_type: FileType,
    /// Size in bytes (meaningless for directories).
    pub size: u32,
}

/// A directory iterator. `next` advances and returns the next entry
/// matching `glob`, or `None` at the end; `rewind` restarts iteration.
pub trait Directory {
    /// Advances to the next entry matching `glob` (a simple `*`-wildcard
    /// pattern, or `None` to match everything), or returns `None` once
    /// iteration is exhausted.
    fn next(&mut self, glob: Option<&str>) -> Result<Option<FileMeta>>;

    /// Restarts iteration from the first entry.
    fn rewind(&mut self) -> Result<()>;
}

/// A filesystem: opens files as `ByteSource`s and directories as
/// `Directory` iterators by path.
pub trait FileSystem {
    /// Opens `path` for reading as a [`ByteSource`].
    fn open(&self, path: &str) -> Result<Box<dyn ByteSource>>;

    /// Returns metadata for `path` without opening it.
    fn stat(&self, path: &str) -> Result<FileMeta>;

    /// Opens `path` as a directory iterator.
    fn open_dir(&self, path: &str) -> Result<Box<dyn Directory>>;
}
