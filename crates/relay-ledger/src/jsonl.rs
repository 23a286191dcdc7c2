//! Newline-delimited JSON file primitive.
//!
//! No locking happens here; `RelayStore` serializes every call.

use crate::{StoreError, StoreResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::warn;

/// One JSONL file holding a sequence of structured entries.
#[derive(Debug, Clone)]
pub struct JsonlFile {
    path: PathBuf,
}

impl JsonlFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every entry. A missing file is an empty store.
    ///
    /// Lines that fail to parse (e.g. a torn trailing line left by a crash)
    /// are skipped with a warning.
    pub fn read_all<T: DeserializeOwned>(&self) -> StoreResult<Vec<T>> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut entries = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str(trimmed) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!(
                        path = %self.path.display(),
                        line = index + 1,
                        error = %e,
                        "Skipping unreadable store line"
                    );
                }
            }
        }
        Ok(entries)
    }

    /// Count non-blank lines without parsing them.
    pub fn count(&self) -> StoreResult<usize> {
        let file = match File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };

        let mut count = 0;
        for line in BufReader::new(file).lines() {
            if !line?.trim().is_empty() {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Durably append entries, one line each.
    pub fn append<T: Serialize>(&self, entries: &[T]) -> StoreResult<()> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut buffer = encode_lines(entries)?;
        self.ensure_parent()?;

        let mut file = OpenOptions::new()
            .read(true)
            .create(true)
            .append(true)
            .open(&self.path)?;

        // Start on a fresh line if a torn write left the file unterminated.
        if !ends_with_newline(&mut file)? {
            buffer.insert(0, '\n');
        }

        // Single write so a crash leaves at most one torn trailing line.
        file.write_all(buffer.as_bytes())?;
        file.sync_data()?;
        Ok(())
    }

    /// Atomically replace the whole file with `entries`.
    pub fn replace_all<T: Serialize>(&self, entries: &[T]) -> StoreResult<()> {
        let buffer = encode_lines(entries)?;
        self.ensure_parent()?;
        self.atomic_write(&buffer)
    }

    /// Truncate the file to zero entries.
    pub fn clear(&self) -> StoreResult<()> {
        self.ensure_parent()?;
        self.atomic_write("")
    }

    fn ensure_parent(&self) -> StoreResult<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(())
    }

    /// Write to a sibling temp file, fsync, then rename over the target.
    fn atomic_write(&self, content: &str) -> StoreResult<()> {
        let file_name = self
            .path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| StoreError::InvalidPath(self.path.display().to_string()))?;

        let tmp_name = format!(
            ".{}.tmp.{}",
            file_name,
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_nanos()
        );
        let tmp_path = self.path.with_file_name(tmp_name);

        let write_result = (|| -> io::Result<()> {
            let mut file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&tmp_path)?;
            file.write_all(content.as_bytes())?;
            file.sync_all()?;
            fs::rename(&tmp_path, &self.path)?;

            if let Some(dir) = self.path.parent() {
                if let Ok(dir) = File::open(dir) {
                    let _ = dir.sync_all();
                }
            }
            Ok(())
        })();

        if let Err(e) = write_result {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        Ok(())
    }
}

/// True for an empty file or one whose last byte is `\n`.
fn ends_with_newline(file: &mut File) -> io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    let mut last = [0u8; 1];
    file.seek(SeekFrom::End(-1))?;
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

fn encode_lines<T: Serialize>(entries: &[T]) -> StoreResult<String> {
    let mut buffer = String::new();
    for entry in entries {
        buffer.push_str(&serde_json::to_string(entry)?);
        buffer.push('\n');
    }
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Value};
    use tempfile::tempdir;

    #[test]
    fn missing_file_reads_empty() {
        let temp = tempdir().expect("tempdir");
        let file = JsonlFile::new(temp.path().join("absent.jsonl"));

        let entries: Vec<Value> = file.read_all().expect("read");
        assert!(entries.is_empty());
        assert_eq!(file.count().expect("count"), 0);
    }

    #[test]
    fn append_then_read_preserves_order() {
        let temp = tempdir().expect("tempdir");
        let file = JsonlFile::new(temp.path().join("store.jsonl"));

        file.append(&[json!({"n": 1}), json!({"n": 2})]).expect("append");
        file.append(&[json!({"n": 3})]).expect("append");

        let entries: Vec<Value> = file.read_all().expect("read");
        assert_eq!(entries, vec![json!({"n": 1}), json!({"n": 2}), json!({"n": 3})]);
        assert_eq!(file.count().expect("count"), 3);
    }

    #[test]
    fn append_creates_parent_directory() {
        let temp = tempdir().expect("tempdir");
        let file = JsonlFile::new(temp.path().join("nested/dir/store.jsonl"));

        file.append(&[json!(1)]).expect("append");
        assert!(file.path().exists());
    }

    #[test]
    fn replace_all_overwrites_and_leaves_no_temp_files() {
        let temp = tempdir().expect("tempdir");
        let file = JsonlFile::new(temp.path().join("store.jsonl"));

        file.append(&[json!("a"), json!("b")]).expect("append");
        file.replace_all(&[json!("c")]).expect("replace");

        let entries: Vec<Value> = file.read_all().expect("read");
        assert_eq!(entries, vec![json!("c")]);

        let leftovers = fs::read_dir(temp.path())
            .expect("read dir")
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().contains(".tmp."))
            .count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn clear_empties_file() {
        let temp = tempdir().expect("tempdir");
        let file = JsonlFile::new(temp.path().join("store.jsonl"));

        file.append(&[json!(1), json!(2)]).expect("append");
        file.clear().expect("clear");

        assert_eq!(file.count().expect("count"), 0);
        assert!(file.path().exists());
    }

    #[test]
    fn torn_line_is_skipped() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("store.jsonl");
        fs::write(&path, "{\"n\":1}\n\n{\"n\":2\n").expect("write");

        let file = JsonlFile::new(&path);
        let entries: Vec<Value> = file.read_all().expect("read");
        assert_eq!(entries, vec![json!({"n": 1})]);
        assert_eq!(file.count().expect("count"), 2);
    }

    #[test]
    fn append_after_torn_line_starts_a_new_line() {
        let temp = tempdir().expect("tempdir");
        let path = temp.path().join("store.jsonl");
        fs::write(&path, "{\"n\":1}\n{\"n\":2").expect("write");

        let file = JsonlFile::new(&path);
        file.append(&[json!({"n": 3})]).expect("append");

        let entries: Vec<Value> = file.read_all().expect("read");
        assert_eq!(entries, vec![json!({"n": 1}), json!({"n": 3})]);

        // The torn line is dropped by the next rewrite, the healthy one survives.
        file.replace_all(&entries).expect("replace");
        let entries: Vec<Value> = file.read_all().expect("read");
        assert_eq!(entries, vec![json!({"n": 1}), json!({"n": 3})]);
    }

    #[test]
    fn empty_append_is_noop() {
        let temp = tempdir().expect("tempdir");
        let file = JsonlFile::new(temp.path().join("store.jsonl"));

        file.append::<Value>(&[]).expect("append");
        assert!(!file.path().exists());
    }
}
