//! Filesystem helpers: recursive listing into [`FileInfo`] records, the
//! sorts over them, stat and path utilities, and whole-file reads.
//!
//! Listings skip dotfiles, never follow symlinked directories, and can be
//! filtered by a caller validity callback before anything is stat'ed into
//! the result.

use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use walkdir::WalkDir;
use xxhash_rust::xxh64::xxh64;

use crate::error::{Error, Result};

/// Stats for one regular file, as produced by [`list`]. The tag defaults to
/// 0 and belongs to the caller (file-list cursors stamp it onto records).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileInfo {
    pub filename: PathBuf,
    pub size: u64,
    /// Last-modified time in seconds since the Unix epoch.
    pub last_modified: i64,
    pub tag: i32,
}

impl FileInfo {
    /// Stats `path` into a `FileInfo`.
    pub fn stat(path: impl Into<PathBuf>) -> io::Result<FileInfo> {
        let filename = path.into();
        let md = fs::metadata(&filename)?;
        let last_modified = md
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0);
        Ok(FileInfo { filename, size: md.len(), last_modified, tag: 0 })
    }
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

/// Recursively lists the regular files under `path` (or `path` itself),
/// skipping dotfiles and anything `valid` rejects. Symlinked directories
/// are not descended into.
pub fn list(path: impl AsRef<Path>, valid: Option<&dyn Fn(&Path) -> bool>) -> Result<Vec<FileInfo>> {
    let mut out = Vec::new();
    let walker = WalkDir::new(path.as_ref())
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_hidden(e));
    for entry in walker {
        let entry = entry.map_err(|e| {
            Error::Io(
                e.io_error()
                    .map(|io| io::Error::new(io.kind(), io.to_string()))
                    .unwrap_or_else(|| io::Error::other(e.to_string())),
            )
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        if let Some(valid) = valid {
            if !valid(entry.path()) {
                continue;
            }
        }
        out.push(FileInfo::stat(entry.into_path()).map_err(Error::Io)?);
    }
    Ok(out)
}

/// Keeps only the entries that `partition` maps to `partition_id`;
/// returning `num_partitions` skips a file entirely.
pub fn partition_file_info(
    inputs: &[FileInfo],
    partition_id: usize,
    num_partitions: usize,
    partition: impl Fn(&FileInfo, usize) -> usize,
) -> Vec<FileInfo> {
    inputs
        .iter()
        .filter(|fi| partition(fi, num_partitions) == partition_id)
        .cloned()
        .collect()
}

// ---------------------------------------------------------------------------
// FileInfo sorts
// ---------------------------------------------------------------------------

pub fn sort_file_info_by_last_modified(files: &mut [FileInfo]) {
    files.sort_by_key(|f| f.last_modified);
}

pub fn sort_file_info_by_last_modified_descending(files: &mut [FileInfo]) {
    files.sort_by_key(|f| std::cmp::Reverse(f.last_modified));
}

pub fn sort_file_info_by_size(files: &mut [FileInfo]) {
    files.sort_by_key(|f| f.size);
}

pub fn sort_file_info_by_size_descending(files: &mut [FileInfo]) {
    files.sort_by_key(|f| std::cmp::Reverse(f.size));
}

pub fn sort_file_info_by_filename(files: &mut [FileInfo]) {
    files.sort_by(|a, b| a.filename.cmp(&b.filename));
}

pub fn sort_file_info_by_filename_descending(files: &mut [FileInfo]) {
    files.sort_by(|a, b| b.filename.cmp(&a.filename));
}

// ---------------------------------------------------------------------------
// Stat and path helpers
// ---------------------------------------------------------------------------

pub fn file_exists(path: impl AsRef<Path>) -> bool {
    path.as_ref().exists()
}

pub fn is_file(path: impl AsRef<Path>) -> bool {
    path.as_ref().is_file()
}

pub fn is_directory(path: impl AsRef<Path>) -> bool {
    path.as_ref().is_dir()
}

/// File size in bytes; 0 when the path cannot be stat'ed.
pub fn file_size(path: impl AsRef<Path>) -> u64 {
    fs::metadata(path.as_ref()).map(|m| m.len()).unwrap_or(0)
}

/// Last-modified time in epoch seconds; 0 when unavailable.
pub fn modified(path: impl AsRef<Path>) -> i64 {
    fs::metadata(path.as_ref())
        .ok()
        .and_then(|m| m.modified().ok())
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// True when `path` carries exactly the extension `ext` (no leading dot);
/// an empty `ext` asks for "no extension at all".
pub fn has_extension(path: impl AsRef<Path>, ext: &str) -> bool {
    match path.as_ref().extension().and_then(|e| e.to_str()) {
        Some(found) => found == ext,
        None => ext.is_empty(),
    }
}

/// Looks for `relative` in the current directory, then in each parent,
/// returning the first hit.
pub fn find_file_in_parents(relative: impl AsRef<Path>) -> Option<PathBuf> {
    let relative = relative.as_ref();
    let mut dir = std::env::current_dir().ok()?;
    loop {
        let candidate = dir.join(relative);
        if candidate.exists() {
            return Some(candidate);
        }
        if !dir.pop() {
            return None;
        }
    }
}

/// Creates `path` (and its ancestors) when missing.
pub fn make_directory(path: impl AsRef<Path>) -> bool {
    fs::create_dir_all(path.as_ref()).is_ok()
}

/// Ensures the directory part of `filename` exists so a create will
/// succeed. A bare filename (no directory part) is already valid.
pub fn make_path_valid(filename: impl AsRef<Path>) -> bool {
    match filename.as_ref().parent() {
        None => true,
        Some(p) if p.as_os_str().is_empty() => true,
        Some(p) => fs::create_dir_all(p).is_ok(),
    }
}

/// A stable hash of the filename bytes, for partitioning file sets.
pub fn hash_filename(path: impl AsRef<Path>) -> u64 {
    xxh64(path.as_ref().as_os_str().as_encoded_bytes(), 0)
}

// ---------------------------------------------------------------------------
// Whole-file and chunk reads
// ---------------------------------------------------------------------------

/// Reads the entire file.
pub fn read_file(path: impl AsRef<Path>) -> Result<Vec<u8>> {
    fs::read(path.as_ref()).map_err(Error::Io)
}

/// Reads `length` bytes starting at `offset` (short at end of file).
pub fn read_chunk(path: impl AsRef<Path>, offset: u64, length: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; length];
    let n = read_chunk_into(&mut buf, path, offset)?;
    buf.truncate(n);
    Ok(buf)
}

/// Fills `buffer` from `offset`, returning how many bytes were read.
pub fn read_chunk_into(
    buffer: &mut [u8],
    path: impl AsRef<Path>,
    offset: u64,
) -> Result<usize> {
    let mut f = File::open(path.as_ref()).map_err(Error::Io)?;
    f.seek(SeekFrom::Start(offset)).map_err(Error::Io)?;
    let mut filled = 0;
    while filled < buffer.len() {
        match f.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(ref e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(Error::Io(e)),
        }
    }
    Ok(filled)
}

// ---------------------------------------------------------------------------
// Temporary-file lifetime tied to a value
// ---------------------------------------------------------------------------

/// Deletes the held paths on drop. Attached to cursors that read from
/// temporary files (sort runs, transform outputs) so cleanup follows the
/// reader's lifetime.
pub(crate) struct RemoveOnDrop {
    paths: Vec<PathBuf>,
}

impl RemoveOnDrop {
    pub fn new(path: PathBuf) -> RemoveOnDrop {
        RemoveOnDrop { paths: vec![path] }
    }

    pub fn many(paths: Vec<PathBuf>) -> RemoveOnDrop {
        RemoveOnDrop { paths }
    }
}

impl Drop for RemoveOnDrop {
    fn drop(&mut self) {
        for p in &self.paths {
            let _ = fs::remove_file(p);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::FileTime;
    use tempfile::TempDir;

    fn make_tree() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir(root.join("sub")).unwrap();
        fs::write(root.join("a.txt"), b"aaaa").unwrap();
        fs::write(root.join("b.log"), b"bb").unwrap();
        fs::write(root.join("sub/c.txt"), b"c").unwrap();
        fs::write(root.join(".hidden"), b"x").unwrap();
        dir
    }

    #[test]
    fn list_skips_dotfiles_and_recurses() {
        let dir = make_tree();
        let mut files = list(dir.path(), None).unwrap();
        sort_file_info_by_filename(&mut files);
        let names: Vec<String> = files
            .iter()
            .map(|f| f.filename.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.log", "c.txt"]);
    }

    #[test]
    fn list_honors_validity_callback() {
        let dir = make_tree();
        let only_txt = |p: &Path| has_extension(p, "txt");
        let files = list(dir.path(), Some(&only_txt)).unwrap();
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| has_extension(&f.filename, "txt")));
    }

    #[test]
    fn list_of_single_file() {
        let dir = make_tree();
        let files = list(dir.path().join("a.txt"), None).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].size, 4);
    }

    #[test]
    fn sorts_by_size_and_mtime() {
        let dir = make_tree();
        let a = dir.path().join("a.txt");
        let b = dir.path().join("b.log");
        filetime::set_file_mtime(&a, FileTime::from_unix_time(1_000_000, 0)).unwrap();
        filetime::set_file_mtime(&b, FileTime::from_unix_time(2_000_000, 0)).unwrap();

        let mut files = list(dir.path(), None).unwrap();
        sort_file_info_by_size(&mut files);
        assert!(files.windows(2).all(|w| w[0].size <= w[1].size));

        sort_file_info_by_size_descending(&mut files);
        assert!(files.windows(2).all(|w| w[0].size >= w[1].size));

        sort_file_info_by_last_modified(&mut files);
        assert!(files.windows(2).all(|w| w[0].last_modified <= w[1].last_modified));

        sort_file_info_by_last_modified_descending(&mut files);
        assert!(files.windows(2).all(|w| w[0].last_modified >= w[1].last_modified));
    }

    #[test]
    fn partition_select_keeps_matching_files() {
        let dir = make_tree();
        let files = list(dir.path(), None).unwrap();
        let by_size = |fi: &FileInfo, n: usize| fi.size as usize % n;
        let all: usize = (0..3)
            .map(|k| partition_file_info(&files, k, 3, by_size).len())
            .sum();
        assert_eq!(all, files.len());
    }

    #[test]
    fn extension_checks() {
        assert!(has_extension("data.lz4", "lz4"));
        assert!(has_extension("a/b/data.txt", "txt"));
        assert!(!has_extension("data.lz4", "gz"));
        assert!(has_extension("no_extension", ""));
        assert!(!has_extension("data.txt", ""));
    }

    #[test]
    fn chunk_reads() {
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("f.bin");
        fs::write(&p, b"0123456789").unwrap();
        assert_eq!(read_chunk(&p, 2, 4).unwrap(), b"2345");
        assert_eq!(read_chunk(&p, 8, 10).unwrap(), b"89");
        assert_eq!(read_file(&p).unwrap(), b"0123456789");
    }

    #[test]
    fn make_path_valid_creates_parents() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("x/y/z.out");
        assert!(make_path_valid(&nested));
        assert!(dir.path().join("x/y").is_dir());
        assert!(make_path_valid("bare_name.out"));
    }

    #[test]
    fn hash_filename_is_stable() {
        assert_eq!(hash_filename("a/b.txt"), hash_filename("a/b.txt"));
        assert_ne!(hash_filename("a/b.txt"), hash_filename("a/c.txt"));
    }

    #[test]
    fn remove_on_drop_deletes() {
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("tmp.bin");
        fs::write(&p, b"x").unwrap();
        drop(RemoveOnDrop::new(p.clone()));
        assert!(!p.exists());
    }
}
