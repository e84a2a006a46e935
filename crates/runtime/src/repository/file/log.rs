//! Append-only log file repository.
//!
//! `FileRepository<T>` stores any serializable type as length-prefixed JSON
//! records. The device-store journal is built on it.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::{Serialize, de::DeserializeOwned};

use crate::repository::{RepositoryError, Result};

const WRITE_BUFFER: usize = 64 * 1024;

/// Generic file-based repository for append-only logs.
///
/// Stores items of type `T` in a file using the format:
/// ```text
/// [u32 LE length][JSON serialized T]
/// [u32 LE length][JSON serialized T]
/// ...
/// ```
pub struct FileRepository<T> {
    /// Filename without the directory
    name: String,
    path: PathBuf,
    writer: BufWriter<File>,
    /// Byte offset of the next write
    current_offset: u64,
    _phantom: PhantomData<T>,
}

impl<T> FileRepository<T>
where
    T: Serialize + DeserializeOwned,
{
    /// Create a new file repository.
    ///
    /// # Errors
    ///
    /// Returns error if the file already exists (prevents accidental overwrites).
    pub fn create(base_dir: impl AsRef<Path>, filename: impl AsRef<str>) -> Result<Self> {
        let base_dir = base_dir.as_ref();
        let filename = filename.as_ref();

        std::fs::create_dir_all(base_dir)?;

        let path = base_dir.join(filename);
        if path.exists() {
            return Err(RepositoryError::LogAlreadyExists(
                path.display().to_string(),
            ));
        }

        let file = OpenOptions::new().create_new(true).append(true).open(&path)?;

        tracing::debug!("Created repository: {}", path.display());

        Ok(Self {
            name: filename.to_string(),
            path,
            writer: BufWriter::with_capacity(WRITE_BUFFER, file),
            current_offset: 0,
            _phantom: PhantomData,
        })
    }

    /// Open an existing file repository for appending.
    pub fn open(base_dir: impl AsRef<Path>, filename: impl AsRef<str>) -> Result<Self> {
        let filename = filename.as_ref();
        let path = base_dir.as_ref().join(filename);

        let file = OpenOptions::new().append(true).open(&path)?;
        Self::from_file(filename, path, file)
    }

    /// Open or create a file repository.
    ///
    /// Creates the directory and file if they don't exist.
    pub fn open_or_create(base_dir: impl AsRef<Path>, filename: impl AsRef<str>) -> Result<Self> {
        let base_dir = base_dir.as_ref();
        std::fs::create_dir_all(base_dir)?;

        let filename = filename.as_ref();
        let path = base_dir.join(filename);

        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        Self::from_file(filename, path, file)
    }

    fn from_file(filename: &str, path: PathBuf, file: File) -> Result<Self> {
        let current_offset = file.metadata()?.len();

        tracing::debug!(
            "Opened repository: {} at offset {}",
            path.display(),
            current_offset
        );

        Ok(Self {
            name: filename.to_string(),
            path,
            writer: BufWriter::with_capacity(WRITE_BUFFER, file),
            current_offset,
            _phantom: PhantomData,
        })
    }

    /// Append an item to the log.
    ///
    /// Returns the byte offset where the item was written.
    pub fn append(&mut self, item: &T) -> Result<u64> {
        let offset = self.current_offset;

        let bytes = serde_json::to_vec(item)?;
        let len = u32::try_from(bytes.len()).map_err(|_| {
            RepositoryError::CorruptedData(format!("record of {} bytes is too large", bytes.len()))
        })?;

        self.writer.write_all(&len.to_le_bytes())?;
        self.writer.write_all(&bytes)?;

        self.current_offset += 4 + bytes.len() as u64;

        Ok(offset)
    }

    /// Read an item at a specific byte offset.
    ///
    /// Returns `None` at or past the end of the file, otherwise the item and
    /// the offset of the record after it. A record cut short by a crash is
    /// reported as [`RepositoryError::PartialWrite`].
    pub fn read_at_offset(&self, byte_offset: u64) -> Result<Option<(T, u64)>> {
        let file = File::open(&self.path)?;
        let file_size = file.metadata()?.len();

        if byte_offset >= file_size {
            return Ok(None);
        }

        let remaining = usize::try_from(file_size - byte_offset).unwrap_or(usize::MAX);
        if remaining < 4 {
            return Err(RepositoryError::PartialWrite {
                offset: byte_offset,
                expected: 4,
                actual: remaining,
            });
        }

        let mut reader = BufReader::new(file);
        reader.seek(SeekFrom::Start(byte_offset))?;

        let mut len_bytes = [0u8; 4];
        reader.read_exact(&mut len_bytes)?;
        let len = u32::from_le_bytes(len_bytes) as usize;

        if remaining - 4 < len {
            return Err(RepositoryError::PartialWrite {
                offset: byte_offset,
                expected: len,
                actual: remaining - 4,
            });
        }

        let mut data = vec![0u8; len];
        reader.read_exact(&mut data)?;

        let item = serde_json::from_slice(&data).map_err(|e| {
            RepositoryError::CorruptedData(format!("record at offset {byte_offset}: {e}"))
        })?;

        Ok(Some((item, byte_offset + 4 + len as u64)))
    }

    /// Reads every complete record from the start of the file.
    ///
    /// Returns the records and the offset just past the last complete one. A
    /// torn record at the tail ends the scan without an error.
    pub fn read_all(&self) -> Result<(Vec<T>, u64)> {
        let mut items = Vec::new();
        let mut offset = 0;
        loop {
            match self.read_at_offset(offset) {
                Ok(Some((item, next))) => {
                    items.push(item);
                    offset = next;
                }
                Ok(None) => break,
                Err(RepositoryError::PartialWrite { offset: at, .. }) => {
                    tracing::warn!("Torn record in '{}' at offset {}", self.name, at);
                    break;
                }
                Err(e) => return Err(e),
            }
        }
        Ok((items, offset))
    }

    /// Discards everything from `len` onward.
    pub fn truncate(&mut self, len: u64) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().set_len(len)?;
        self.current_offset = len;
        Ok(())
    }

    /// Flush buffered writes and sync them to disk.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        Ok(())
    }

    /// Current size of the log in bytes, including buffered writes.
    pub fn size(&self) -> u64 {
        self.current_offset
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl<T> Drop for FileRepository<T> {
    fn drop(&mut self) {
        if let Err(e) = self.writer.flush() {
            tracing::warn!("Failed to flush repository '{}' on drop: {}", self.name, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct TestItem {
        id: u64,
        name: String,
    }

    fn item(id: u64, name: &str) -> TestItem {
        TestItem {
            id,
            name: name.to_string(),
        }
    }

    #[test]
    fn test_read_at_offset() {
        let temp_dir = TempDir::new().unwrap();
        let mut repo = FileRepository::<TestItem>::create(temp_dir.path(), "test.log").unwrap();

        let offset1 = repo.append(&item(1, "first")).unwrap();
        let offset2 = repo.append(&item(2, "second")).unwrap();
        repo.flush().unwrap();

        let (read1, next1) = repo.read_at_offset(offset1).unwrap().unwrap();
        let (read2, _) = repo.read_at_offset(offset2).unwrap().unwrap();

        assert_eq!(offset1, 0);
        assert_eq!(read1, item(1, "first"));
        assert_eq!(read2, item(2, "second"));
        assert_eq!(next1, offset2);
        assert!(repo.read_at_offset(999_999).unwrap().is_none());
    }

    #[test]
    fn test_create_refuses_existing_log() {
        let temp_dir = TempDir::new().unwrap();
        drop(FileRepository::<TestItem>::create(temp_dir.path(), "test.log").unwrap());

        let err = FileRepository::<TestItem>::create(temp_dir.path(), "test.log").err();
        assert!(matches!(err, Some(RepositoryError::LogAlreadyExists(_))));
    }

    #[test]
    fn test_open_existing_appends_at_end() {
        let temp_dir = TempDir::new().unwrap();
        {
            let mut repo = FileRepository::<TestItem>::create(temp_dir.path(), "test.log").unwrap();
            repo.append(&item(1, "test")).unwrap();
            repo.flush().unwrap();
        }

        let mut repo = FileRepository::<TestItem>::open(temp_dir.path(), "test.log").unwrap();
        let offset2 = repo.append(&item(2, "second")).unwrap();
        repo.flush().unwrap();
        assert!(offset2 > 0);

        let (items, end) = repo.read_all().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(end, repo.size());
    }

    #[test]
    fn test_torn_tail_is_skipped_and_truncated() {
        let temp_dir = TempDir::new().unwrap();
        let mut repo = FileRepository::<TestItem>::create(temp_dir.path(), "test.log").unwrap();
        repo.append(&item(1, "whole")).unwrap();
        repo.flush().unwrap();
        let good_end = repo.size();

        // length prefix promising more bytes than follow
        {
            let mut file = OpenOptions::new().append(true).open(repo.path()).unwrap();
            file.write_all(&100u32.to_le_bytes()).unwrap();
            file.write_all(b"{\"id\"").unwrap();
        }

        let (items, end) = repo.read_all().unwrap();
        assert_eq!(items, vec![item(1, "whole")]);
        assert_eq!(end, good_end);

        repo.truncate(end).unwrap();
        repo.append(&item(2, "after")).unwrap();
        repo.flush().unwrap();
        assert_eq!(repo.read_all().unwrap().0.len(), 2);
    }
}
