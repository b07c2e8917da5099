//! Input file list resolution
//!
//! Arguments are explicit paths, `*`/`?` patterns in the file-name part, or
//! `-` to read one path per line from stdin. Every resolved path must exist
//! before any work starts.

use crate::error::{ProfilerError, Result};
use regex::Regex;
use std::fs;
use std::io::BufRead;
use std::path::{Path, PathBuf};

/// Argument that requests a newline separated list on stdin.
pub const STDIN_SENTINEL: &str = "-";

pub fn resolve_inputs<R: BufRead>(args: &[String], stdin: R) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    let mut stdin = Some(stdin);

    for arg in args {
        if arg == STDIN_SENTINEL {
            if let Some(reader) = stdin.take() {
                for line in reader.lines() {
                    let line = line?;
                    let line = line.trim();
                    if !line.is_empty() {
                        paths.push(PathBuf::from(line));
                    }
                }
            }
        } else if is_pattern(arg) {
            paths.extend(expand_pattern(arg)?);
        } else {
            paths.push(PathBuf::from(arg));
        }
    }

    let missing: Vec<PathBuf> = paths.iter().filter(|p| !p.is_file()).cloned().collect();
    if !missing.is_empty() {
        return Err(ProfilerError::MissingInputs(missing));
    }
    Ok(paths)
}

fn is_pattern(arg: &str) -> bool {
    arg.contains('*') || arg.contains('?')
}

/// Expand a file-name pattern against its parent directory, sorted.
/// A pattern matching nothing is kept as-is so it reports as missing.
fn expand_pattern(pattern: &str) -> Result<Vec<PathBuf>> {
    let path = Path::new(pattern);
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();

    let mut re = String::from("^");
    for c in name.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => re.push_str(&regex::escape(&c.to_string())),
        }
    }
    re.push('$');
    let re = Regex::new(&re).map_err(|e| {
        ProfilerError::Io(std::io::Error::new(std::io::ErrorKind::InvalidInput, e))
    })?;

    let mut matches: Vec<PathBuf> = fs::read_dir(&dir)?
        .filter_map(|entry| entry.ok())
        .filter(|entry| {
            entry
                .file_name()
                .to_str()
                .map(|n| re.is_match(n) && !n.starts_with('.'))
                .unwrap_or(false)
        })
        .map(|entry| {
            if path.parent().map(|p| p.as_os_str().is_empty()).unwrap_or(true) {
                PathBuf::from(entry.file_name())
            } else {
                dir.join(entry.file_name())
            }
        })
        .collect();
    matches.sort();

    if matches.is_empty() {
        matches.push(path.to_path_buf());
    }
    Ok(matches)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, "@r\nA\n+\nI\n").unwrap();
        path
    }

    fn no_stdin() -> Cursor<Vec<u8>> {
        Cursor::new(Vec::new())
    }

    #[test]
    fn test_explicit_paths() {
        let dir = tempfile::tempdir().unwrap();
        let a = touch(dir.path(), "a.fq");
        let args = vec![a.display().to_string()];
        assert_eq!(resolve_inputs(&args, no_stdin()).unwrap(), vec![a]);
    }

    #[test]
    fn test_pattern_expansion_skips_hidden_files() {
        let dir = tempfile::tempdir().unwrap();
        let b = touch(dir.path(), "b.fq.gz");
        let a = touch(dir.path(), "a.fq.gz");
        touch(dir.path(), "notes.txt");
        touch(dir.path(), ".checksum");

        let args = vec![format!("{}/*.fq.gz", dir.path().display())];
        assert_eq!(resolve_inputs(&args, no_stdin()).unwrap(), vec![a, b]);
    }

    #[test]
    fn test_stdin_list() {
        let dir = tempfile::tempdir().unwrap();
        let a = touch(dir.path(), "a.fq");
        let b = touch(dir.path(), "b.fq");
        let stdin = Cursor::new(format!("{}\n\n{}\n", a.display(), b.display()).into_bytes());
        let args = vec![STDIN_SENTINEL.to_string()];
        assert_eq!(resolve_inputs(&args, stdin).unwrap(), vec![a, b]);
    }

    #[test]
    fn test_all_missing_paths_are_reported() {
        let dir = tempfile::tempdir().unwrap();
        let a = touch(dir.path(), "a.fq");
        let args = vec![
            "missing1.fq".to_string(),
            a.display().to_string(),
            format!("{}/*.bam", dir.path().display()),
        ];
        match resolve_inputs(&args, no_stdin()) {
            Err(ProfilerError::MissingInputs(missing)) => assert_eq!(missing.len(), 2),
            other => panic!("expected missing inputs, got {:?}", other),
        }
    }
}
