use std::fs;
use std::path::{Path, PathBuf};

use annot_core::document::{RegionRecord, StatusRecord};
use annot_engine::collaborators::{CollaboratorError, RecordStore};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// 当前写出的文件格式版本。
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Error)]
pub enum IoError {
    #[error("unsupported feature: {0}")]
    UnsupportedFeature(String),
    #[error("failed to read file {path:?}: {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write file {path:?}: {source}")]
    WriteError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid annotation file: {0}")]
    InvalidDocument(String),
}

/// 标注文件的磁盘结构：状态记录与区域记录。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnnotationFile {
    pub version: u32,
    #[serde(default)]
    pub statuses: Vec<StatusRecord>,
    #[serde(default)]
    pub records: Vec<RegionRecord>,
}

impl Default for AnnotationFile {
    fn default() -> Self {
        Self {
            version: FORMAT_VERSION,
            statuses: Vec::new(),
            records: Vec::new(),
        }
    }
}

pub trait AnnotationLoader {
    fn load(&self, path: &Path) -> Result<AnnotationFile, IoError>;
}

pub trait AnnotationSaver {
    fn save(&self, file: &AnnotationFile, path: &Path) -> Result<(), IoError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonFacade;

impl JsonFacade {
    pub fn new() -> Self {
        Self
    }
}

impl AnnotationLoader for JsonFacade {
    fn load(&self, path: &Path) -> Result<AnnotationFile, IoError> {
        let data = fs::read_to_string(path).map_err(|source| IoError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        let file: AnnotationFile =
            serde_json::from_str(&data).map_err(|err| IoError::InvalidDocument(err.to_string()))?;
        if file.version > FORMAT_VERSION {
            return Err(IoError::UnsupportedFeature(format!(
                "file format version {}",
                file.version
            )));
        }
        Ok(file)
    }
}

impl AnnotationSaver for JsonFacade {
    fn save(&self, file: &AnnotationFile, path: &Path) -> Result<(), IoError> {
        let data = serde_json::to_string_pretty(file)
            .map_err(|err| IoError::InvalidDocument(err.to_string()))?;
        // 先写临时文件再替换
        let staging = path.with_extension("json.tmp");
        fs::write(&staging, data).map_err(|source| IoError::WriteError {
            path: staging.clone(),
            source,
        })?;
        fs::rename(&staging, path).map_err(|source| IoError::WriteError {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// 以单个 JSON 文件为后端的记录存储。每次修改后立即写回磁盘，
/// 写盘失败时内存副本恢复到修改前。
#[derive(Debug)]
pub struct JsonRecordStore {
    path: PathBuf,
    file: AnnotationFile,
    facade: JsonFacade,
}

impl JsonRecordStore {
    /// 打开记录文件；文件不存在时从空记录开始，首次修改时创建。
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, IoError> {
        let path = path.into();
        let facade = JsonFacade::new();
        let file = if path.exists() {
            facade.load(&path)?
        } else {
            AnnotationFile::default()
        };
        debug!(path = %path.display(), records = file.records.len(), "打开标注记录文件");
        Ok(Self { path, file, facade })
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[inline]
    pub fn file(&self) -> &AnnotationFile {
        &self.file
    }

    fn update<F>(&mut self, change: F) -> Result<(), CollaboratorError>
    where
        F: FnOnce(&mut AnnotationFile),
    {
        let previous = self.file.clone();
        change(&mut self.file);
        self.file.version = FORMAT_VERSION;
        if let Err(err) = self.facade.save(&self.file, &self.path) {
            self.file = previous;
            return Err(CollaboratorError::Persistence(err.to_string()));
        }
        Ok(())
    }
}

impl RecordStore for JsonRecordStore {
    fn append_record(&mut self, record: &RegionRecord) -> Result<(), CollaboratorError> {
        self.update(|file| file.records.push(record.clone()))
    }

    fn delete_record(&mut self, sheet: &str, name: &str) -> Result<(), CollaboratorError> {
        self.update(|file| {
            file.records
                .retain(|record| !(record.sheet_name == sheet && record.name == name))
        })
    }

    fn delete_sheet_records(&mut self, sheet: &str) -> Result<(), CollaboratorError> {
        self.update(|file| file.records.retain(|record| record.sheet_name != sheet))
    }

    fn delete_all_records(&mut self) -> Result<(), CollaboratorError> {
        self.update(|file| file.records.clear())
    }

    fn load_all_records(&self, sheet: &str) -> Result<Vec<RegionRecord>, CollaboratorError> {
        Ok(self
            .file
            .records
            .iter()
            .filter(|record| record.sheet_name == sheet)
            .cloned()
            .collect())
    }

    fn save_statuses(&mut self, statuses: &[StatusRecord]) -> Result<(), CollaboratorError> {
        self.update(|file| file.statuses = statuses.to_vec())
    }

    fn load_statuses(&self) -> Result<Vec<StatusRecord>, CollaboratorError> {
        Ok(self.file.statuses.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(sheet: &str, name: &str) -> RegionRecord {
        RegionRecord {
            sheet_name: sheet.to_string(),
            sheet_index: 0,
            class_label: "Notes".to_string(),
            name: name.to_string(),
            address: "A1".to_string(),
            parent: None,
        }
    }

    #[test]
    fn failed_write_restores_memory_copy() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let mut store = JsonRecordStore::open(dir.path().join("missing").join("records.json"))
            .expect("open store");
        let err = store.append_record(&record("Sheet1", "A")).unwrap_err();
        assert!(matches!(err, CollaboratorError::Persistence(_)));
        assert!(store.file().records.is_empty());
    }

    #[test]
    fn newer_format_versions_are_rejected() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let path = dir.path().join("records.json");
        fs::write(&path, r#"{ "version": 99 }"#).unwrap();
        let err = JsonFacade::new().load(&path).unwrap_err();
        assert!(matches!(err, IoError::UnsupportedFeature(_)));
    }
}
