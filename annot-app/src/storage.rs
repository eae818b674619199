use std::env;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::fs;
use std::path::{Path, PathBuf};

use annot_config::StorageConfig;
use tracing::info;

/// 确保记录文件所在目录存在。
pub fn ensure_records_dir(config: &StorageConfig, records: &Path) -> Result<(), StorageError> {
    let target = normalize_path(records)?;
    let Some(dir) = target.parent() else {
        return Ok(());
    };
    if dir.as_os_str().is_empty() || dir.exists() {
        return Ok(());
    }
    if !config.auto_create_dir {
        return Err(StorageError::AutoCreateDisabled {
            dir: dir.to_path_buf(),
        });
    }
    fs::create_dir_all(dir).map_err(|error| StorageError::CreateFailed {
        dir: dir.to_path_buf(),
        error,
    })?;
    info!(dir = %dir.display(), "已创建标注记录目录");
    Ok(())
}

fn normalize_path(path: &Path) -> Result<PathBuf, StorageError> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        let cwd = env::current_dir().map_err(|error| StorageError::Io { error })?;
        Ok(cwd.join(path))
    }
}

#[derive(Debug)]
pub enum StorageError {
    AutoCreateDisabled { dir: PathBuf },
    CreateFailed { dir: PathBuf, error: std::io::Error },
    Io { error: std::io::Error },
}

impl Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageError::AutoCreateDisabled { dir } => {
                write!(f, "目录 {} 不存在且 auto_create_dir 已关闭", dir.display())
            }
            StorageError::CreateFailed { dir, error } => {
                write!(f, "创建目录 {} 失败: {}", dir.display(), error)
            }
            StorageError::Io { error } => {
                write!(f, "I/O 错误: {error}")
            }
        }
    }
}

impl Error for StorageError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creates_missing_parent_directory() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let records = dir.path().join("nested").join("records.json");
        ensure_records_dir(&StorageConfig::default(), &records).expect("create dir");
        assert!(dir.path().join("nested").is_dir());
    }

    #[test]
    fn respects_disabled_auto_create() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let records = dir.path().join("nested").join("records.json");
        let config = StorageConfig {
            records_path: None,
            auto_create_dir: false,
        };
        let err = ensure_records_dir(&config, &records).unwrap_err();
        assert!(matches!(err, StorageError::AutoCreateDisabled { .. }));
    }
}
