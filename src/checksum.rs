//! Content checksums backed by a per-directory sidecar cache
//!
//! Every directory holding profiled files gets a `.checksum` file with one
//! `<hex-digest>\t<absolute-path>` line per hashed file. The cache is
//! append-only: lines are never rewritten, and a later line for the same path
//! shadows an earlier one when the file is loaded.

use crate::error::{ProfilerError, Result};
use log::debug;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Component, Path, PathBuf};

/// Name of the sidecar cache file created in each directory.
pub const CACHE_FILE_NAME: &str = ".checksum";

const CHUNK_SIZE: usize = 64 * 1024;

/// In-process overlay of every cache file touched during this run.
#[derive(Debug, Default)]
pub struct ChecksumCache {
    entries: HashMap<PathBuf, String>,
    loaded_dirs: HashSet<PathBuf>,
    hashed: usize,
}

impl ChecksumCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the hex digest of `path`, hashing it only on a cache miss.
    pub fn checksum<P: AsRef<Path>>(&mut self, path: P) -> Result<String> {
        let abs = absolute_path(path)?;
        let dir = abs
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("/"));
        let cache_path = dir.join(CACHE_FILE_NAME);

        if self.loaded_dirs.insert(dir) {
            self.load(&cache_path)?;
        }

        if let Some(digest) = self.entries.get(&abs) {
            debug!("checksum cache hit for {}", abs.display());
            return Ok(digest.clone());
        }

        let digest = hash_file(&abs)?;
        self.hashed += 1;
        append_entry(&cache_path, &digest, &abs)?;
        self.entries.insert(abs, digest.clone());
        Ok(digest)
    }

    /// Number of files actually read and hashed by this cache.
    pub fn files_hashed(&self) -> usize {
        self.hashed
    }

    /// Merge a cache file into the in-memory map. A missing file is empty.
    fn load(&mut self, cache_path: &Path) -> Result<()> {
        let file = match File::open(cache_path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        let before = self.entries.len();
        for (i, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            match fields.as_slice() {
                [digest, path] if !digest.is_empty() && !path.is_empty() => {
                    self.entries.insert(PathBuf::from(path), digest.to_string());
                }
                _ => {
                    return Err(ProfilerError::CacheCorrupt {
                        cache: cache_path.to_path_buf(),
                        line: i + 1,
                        content: line,
                    })
                }
            }
        }
        debug!(
            "loaded {} checksum entries from {}",
            self.entries.len() - before,
            cache_path.display()
        );
        Ok(())
    }
}

/// Absolute form of `path` with `.` and `..` resolved lexically, so aliases
/// of one file share a cache key. Symlinks are left alone.
pub fn absolute_path<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
    let abs = std::path::absolute(path.as_ref())?;
    let mut normalized = PathBuf::new();
    for component in abs.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other),
        }
    }
    Ok(normalized)
}

/// Stream a file through SHA-256 and return the lowercase hex digest.
pub fn hash_file<P: AsRef<Path>>(path: P) -> Result<String> {
    let mut file = File::open(path.as_ref())?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}

fn append_entry(cache_path: &Path, digest: &str, path: &Path) -> Result<()> {
    // One write per line so concurrent appenders never interleave within a line.
    let line = format!("{}\t{}\n", digest, path.display());
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(cache_path)?;
    file.write_all(line.as_bytes())?;
    Ok(())
}
