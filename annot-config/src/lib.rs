use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use annot_core::classes::{AnnotationClass, ClassRegistry, RegistryError};
use serde::Deserialize;
use thiserror::Error;

/// 应用配置的根结构。
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub session: SessionConfig,
    /// 自定义类别目录；为空时使用内置目录。
    #[serde(default)]
    pub classes: Vec<AnnotationClass>,
}

impl AppConfig {
    /// 从显式路径加载配置。
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 自动发现配置文件：优先读取环境变量 `ANNOT_CONFIG`，否则寻找 `./config/default.toml`。
    /// 若文件缺失，则返回默认配置。
    pub fn discover() -> Result<Self, ConfigError> {
        if let Some(path) = env::var_os("ANNOT_CONFIG") {
            return Self::from_file(PathBuf::from(path));
        }

        let default_path = env::current_dir()
            .map(|dir| dir.join("config").join("default.toml"))
            .map_err(|source| ConfigError::Context {
                message: "获取当前工作目录失败".to_string(),
                source,
            })?;

        if default_path.exists() {
            Self::from_file(default_path)
        } else {
            Ok(Self::default())
        }
    }

    /// 构建类别目录，并校验依赖关系。
    pub fn registry(&self) -> Result<ClassRegistry, ConfigError> {
        if self.classes.is_empty() {
            return Ok(ClassRegistry::standard());
        }
        ClassRegistry::new(self.classes.clone()).map_err(ConfigError::Classes)
    }
}

/// 日志配置，支持设置默认等级。
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "LoggingConfig::default_level")]
    pub level: String,
}

impl LoggingConfig {
    fn default_level() -> String {
        "info".to_string()
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Self::default_level(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// 标注记录文件；未设置时记录只保存在内存中。
    #[serde(default)]
    pub records_path: Option<PathBuf>,
    #[serde(default = "StorageConfig::default_auto_create")]
    pub auto_create_dir: bool,
}

impl StorageConfig {
    fn default_auto_create() -> bool {
        true
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            records_path: None,
            auto_create_dir: Self::default_auto_create(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "SessionConfig::default_workbook")]
    pub workbook_name: String,
    #[serde(default = "SessionConfig::default_sheets")]
    pub sheets: Vec<String>,
    /// 打开后激活的工作表，缺省为第一个。
    #[serde(default)]
    pub default_sheet: Option<String>,
}

impl SessionConfig {
    fn default_workbook() -> String {
        "workbook.xlsx".to_string()
    }

    fn default_sheets() -> Vec<String> {
        vec!["Sheet1".to_string()]
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            workbook_name: Self::default_workbook(),
            sheets: Self::default_sheets(),
            default_sheet: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("读取配置文件 {path:?} 失败: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("解析配置文件 {path:?} 失败: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("{message}")]
    Context {
        message: String,
        #[source]
        source: std::io::Error,
    },
    #[error("类别目录无效: {0}")]
    Classes(#[source] RegistryError),
}
