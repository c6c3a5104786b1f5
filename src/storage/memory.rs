//! In-memory storage implementation for testing and transient segments.

use std::collections::HashMap;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::RwLock;

use crate::error::Result;
use crate::storage::{Storage, StorageError, StorageInput, StorageOutput};

type FileMap = Arc<RwLock<HashMap<String, Arc<[u8]>>>>;

/// Configuration for [`MemoryStorage`].
#[derive(Debug, Clone)]
pub struct MemoryStorageConfig {
    /// Initial capacity of the file table.
    pub initial_capacity: usize,
}

impl Default for MemoryStorageConfig {
    fn default() -> Self {
        MemoryStorageConfig {
            initial_capacity: 16,
        }
    }
}

/// An in-memory storage implementation.
///
/// Sealed files are kept as shared `Arc<[u8]>`, so opening an input or cloning
/// it never copies file content.
#[derive(Debug)]
pub struct MemoryStorage {
    files: FileMap,
    closed: AtomicBool,
}

impl MemoryStorage {
    /// Create a new memory storage.
    pub fn new(config: MemoryStorageConfig) -> Self {
        MemoryStorage {
            files: Arc::new(RwLock::new(HashMap::with_capacity(
                config.initial_capacity,
            ))),
            closed: AtomicBool::new(false),
        }
    }

    /// Create a new memory storage with default configuration.
    pub fn new_default() -> Self {
        Self::new(MemoryStorageConfig::default())
    }

    fn check_closed(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            Err(StorageError::StorageClosed.into())
        } else {
            Ok(())
        }
    }

    /// Get the number of files stored.
    pub fn file_count(&self) -> usize {
        self.files.read().len()
    }

    /// Get the total size of all files.
    pub fn total_size(&self) -> u64 {
        self.files.read().values().map(|data| data.len() as u64).sum()
    }

    /// Overwrite the content of an existing file.
    ///
    /// Only meant for tests that simulate on-disk corruption.
    pub fn replace_file(&self, name: &str, data: Vec<u8>) -> Result<()> {
        self.check_closed()?;
        let mut files = self.files.write();
        if !files.contains_key(name) {
            return Err(StorageError::FileNotFound(name.to_string()).into());
        }
        files.insert(name.to_string(), Arc::from(data));
        Ok(())
    }

    /// Mark the storage as closed; later operations fail.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}

impl Storage for MemoryStorage {
    fn open_input(&self, name: &str) -> Result<Box<dyn StorageInput>> {
        self.check_closed()?;

        let files = self.files.read();
        let data = files
            .get(name)
            .ok_or_else(|| StorageError::FileNotFound(name.to_string()))?;

        Ok(Box::new(MemoryInput::new(Arc::clone(data))))
    }

    fn create_output(&self, name: &str) -> Result<Box<dyn StorageOutput>> {
        self.check_closed()?;

        Ok(Box::new(MemoryOutput::new(
            name.to_string(),
            Arc::clone(&self.files),
        )))
    }

    fn file_exists(&self, name: &str) -> bool {
        if self.closed.load(Ordering::Acquire) {
            return false;
        }

        self.files.read().contains_key(name)
    }

    fn delete_file(&self, name: &str) -> Result<()> {
        self.check_closed()?;

        self.files.write().remove(name);
        Ok(())
    }

    fn list_files(&self) -> Result<Vec<String>> {
        self.check_closed()?;

        let mut file_names: Vec<String> = self.files.read().keys().cloned().collect();
        file_names.sort();
        Ok(file_names)
    }

    fn file_size(&self, name: &str) -> Result<u64> {
        self.check_closed()?;

        let files = self.files.read();
        let data = files
            .get(name)
            .ok_or_else(|| StorageError::FileNotFound(name.to_string()))?;

        Ok(data.len() as u64)
    }

    fn rename_file(&self, old_name: &str, new_name: &str) -> Result<()> {
        self.check_closed()?;

        let mut files = self.files.write();
        let data = files
            .remove(old_name)
            .ok_or_else(|| StorageError::FileNotFound(old_name.to_string()))?;

        files.insert(new_name.to_string(), data);
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        self.check_closed()
    }
}

/// A memory-based input implementation.
#[derive(Debug)]
pub struct MemoryInput {
    cursor: Cursor<Arc<[u8]>>,
}

impl MemoryInput {
    fn new(data: Arc<[u8]>) -> Self {
        MemoryInput {
            cursor: Cursor::new(data),
        }
    }
}

impl Read for MemoryInput {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.cursor.read(buf)
    }
}

impl Seek for MemoryInput {
    fn seek(&mut self, pos: SeekFrom) -> std::io::Result<u64> {
        self.cursor.seek(pos)
    }
}

impl StorageInput for MemoryInput {
    fn size(&self) -> Result<u64> {
        Ok(self.cursor.get_ref().len() as u64)
    }

    fn clone_input(&self) -> Result<Box<dyn StorageInput>> {
        Ok(Box::new(MemoryInput::new(Arc::clone(self.cursor.get_ref()))))
    }
}

/// A memory-based output implementation.
///
/// Bytes are buffered privately and published into the storage on close, so a
/// half-written file is never visible to readers.
#[derive(Debug)]
pub struct MemoryOutput {
    name: String,
    buffer: Vec<u8>,
    files: FileMap,
    closed: bool,
}

impl MemoryOutput {
    fn new(name: String, files: FileMap) -> Self {
        MemoryOutput {
            name,
            buffer: Vec::new(),
            files,
            closed: false,
        }
    }
}

impl Write for MemoryOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.closed {
            return Err(std::io::Error::other("Output is closed"));
        }

        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl StorageOutput for MemoryOutput {
    fn flush_and_sync(&mut self) -> Result<()> {
        Ok(())
    }

    fn position(&self) -> u64 {
        self.buffer.len() as u64
    }

    fn close(&mut self) -> Result<()> {
        if !self.closed {
            let data: Arc<[u8]> = Arc::from(std::mem::take(&mut self.buffer));
            self.files.write().insert(self.name.clone(), data);
            self.closed = true;
        }
        Ok(())
    }
}

impl Drop for MemoryOutput {
    fn drop(&mut self) {
        // Publish whatever was written when the output is dropped
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_storage_creation() {
        let storage = MemoryStorage::new_default();
        assert_eq!(storage.file_count(), 0);
        assert_eq!(storage.total_size(), 0);
    }

    #[test]
    fn test_create_and_read_file() {
        let storage = MemoryStorage::new_default();

        let mut output = storage.create_output("_0.tim").unwrap();
        output.write_all(b"Hello, Memory!").unwrap();
        assert_eq!(output.position(), 14);
        output.close().unwrap();

        let mut input = storage.open_input("_0.tim").unwrap();
        let mut buffer = Vec::new();
        input.read_to_end(&mut buffer).unwrap();

        assert_eq!(buffer, b"Hello, Memory!");
        assert_eq!(input.size().unwrap(), 14);
        assert_eq!(storage.file_count(), 1);
        assert_eq!(storage.total_size(), 14);
    }

    #[test]
    fn test_unclosed_output_is_invisible() {
        let storage = MemoryStorage::new_default();

        let mut output = storage.create_output("_0.doc").unwrap();
        output.write_all(b"partial").unwrap();
        assert!(!storage.file_exists("_0.doc"));

        output.close().unwrap();
        assert!(storage.file_exists("_0.doc"));
    }

    #[test]
    fn test_file_operations() {
        let storage = MemoryStorage::new_default();

        assert!(!storage.file_exists("missing"));

        let mut output = storage.create_output("a.bin").unwrap();
        output.write_all(b"Test content").unwrap();
        output.close().unwrap();

        assert!(storage.file_exists("a.bin"));
        assert_eq!(storage.file_size("a.bin").unwrap(), 12);
        assert_eq!(storage.list_files().unwrap(), vec!["a.bin"]);

        storage.rename_file("a.bin", "b.bin").unwrap();
        assert!(!storage.file_exists("a.bin"));
        assert!(storage.file_exists("b.bin"));

        storage.delete_file("b.bin").unwrap();
        assert!(!storage.file_exists("b.bin"));
        assert_eq!(storage.file_count(), 0);
    }

    #[test]
    fn test_input_clone_has_independent_pointer() {
        let storage = MemoryStorage::new_default();

        let mut output = storage.create_output("c.bin").unwrap();
        output.write_all(b"0123456789").unwrap();
        output.close().unwrap();

        let mut input1 = storage.open_input("c.bin").unwrap();
        input1.seek(SeekFrom::Start(5)).unwrap();
        let mut input2 = input1.clone_input().unwrap();

        let mut buffer = [0u8; 3];
        input1.read_exact(&mut buffer).unwrap();
        assert_eq!(&buffer, b"567");

        input2.read_exact(&mut buffer).unwrap();
        assert_eq!(&buffer, b"012");
    }

    #[test]
    fn test_file_not_found() {
        let storage = MemoryStorage::new_default();

        let err = storage.open_input("missing").unwrap_err();
        assert!(err.is_not_found());
        assert!(storage.file_size("missing").is_err());
    }

    #[test]
    fn test_storage_close() {
        let storage = MemoryStorage::new_default();
        storage.close();

        assert!(storage.create_output("x").is_err());
        assert!(!storage.file_exists("x"));
    }
}
