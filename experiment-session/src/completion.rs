use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::CompletionError;

pub const COMPLETION_KEY: &str = "kogsys_completed_v1";
const MARKED: &str = "true";

/// Device-local "already took part" flag.
///
/// Only discourages a second participation, anyone can clear it.
pub trait CompletionMarker: Send + Sync {
    fn is_marked(&self) -> Result<bool, CompletionError>;
    fn mark(&self) -> Result<(), CompletionError>;
    fn clear(&self) -> Result<(), CompletionError>;
}

/// Stores the flag as a file named after the key.
#[derive(Debug, Clone)]
pub struct FileCompletionMarker {
    path: PathBuf,
}

impl FileCompletionMarker {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(COMPLETION_KEY),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CompletionMarker for FileCompletionMarker {
    fn is_marked(&self) -> Result<bool, CompletionError> {
        match fs::read_to_string(&self.path) {
            Ok(contents) => Ok(contents.trim() == MARKED),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn mark(&self) -> Result<(), CompletionError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, MARKED)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), CompletionError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryCompletionMarker {
    marked: AtomicBool,
}

impl MemoryCompletionMarker {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CompletionMarker for MemoryCompletionMarker {
    fn is_marked(&self) -> Result<bool, CompletionError> {
        Ok(self.marked.load(Ordering::SeqCst))
    }

    fn mark(&self) -> Result<(), CompletionError> {
        self.marked.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn clear(&self) -> Result<(), CompletionError> {
        self.marked.store(false, Ordering::SeqCst);
        Ok(())
    }
}
