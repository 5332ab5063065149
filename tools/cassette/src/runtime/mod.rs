use crate::errors::CassetteError;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

pub trait FileSystem: Send + Sync {
    fn read_to_string(&self, path: &Path) -> Result<String, CassetteError>;
    fn append_line(&self, path: &Path, line: &str) -> Result<(), CassetteError>;
    fn create_dir_all(&self, path: &Path) -> Result<(), CassetteError>;
    fn exists(&self, path: &Path) -> bool;
}

pub struct ProductionFileSystem;

impl FileSystem for ProductionFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, CassetteError> {
        std::fs::read_to_string(path).map_err(|e| CassetteError::Io(e.to_string()))
    }

    fn append_line(&self, path: &Path, line: &str) -> Result<(), CassetteError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| CassetteError::Io(e.to_string()))?;
        writeln!(file, "{line}").map_err(|e| CassetteError::Io(e.to_string()))
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), CassetteError> {
        std::fs::create_dir_all(path).map_err(|e| CassetteError::Io(e.to_string()))
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

#[derive(Default, Clone)]
pub struct FakeFileSystem {
    files: Arc<Mutex<HashMap<PathBuf, String>>>,
    dirs: Arc<Mutex<Vec<PathBuf>>>,
    fail_next: Arc<Mutex<Option<CassetteError>>>,
}

impl FakeFileSystem {
    pub fn with_file(path: impl Into<PathBuf>, contents: impl Into<String>) -> Self {
        let fs = Self::default();
        lock(&fs.files).insert(path.into(), contents.into());
        fs
    }

    pub fn set_fail_next(&self, error: CassetteError) {
        *lock(&self.fail_next) = Some(error);
    }

    pub fn contents(&self, path: &Path) -> Option<String> {
        lock(&self.files).get(path).cloned()
    }

    pub fn created_dirs(&self) -> Vec<PathBuf> {
        lock(&self.dirs).clone()
    }

    fn maybe_fail(&self) -> Result<(), CassetteError> {
        match lock(&self.fail_next).take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl FileSystem for FakeFileSystem {
    fn read_to_string(&self, path: &Path) -> Result<String, CassetteError> {
        self.maybe_fail()?;
        lock(&self.files)
            .get(path)
            .cloned()
            .ok_or_else(|| CassetteError::Io(format!("missing file {}", path.display())))
    }

    fn append_line(&self, path: &Path, line: &str) -> Result<(), CassetteError> {
        self.maybe_fail()?;
        let mut files = lock(&self.files);
        let contents = files.entry(path.to_path_buf()).or_default();
        contents.push_str(line);
        contents.push('\n');
        Ok(())
    }

    fn create_dir_all(&self, path: &Path) -> Result<(), CassetteError> {
        self.maybe_fail()?;
        lock(&self.dirs).push(path.to_path_buf());
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        lock(&self.files).contains_key(path)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
