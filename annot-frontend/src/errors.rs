use std::path::PathBuf;

use annot_config::ConfigError;
use annot_engine::errors::EngineError;
use annot_io::IoError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrontendError {
    #[error("配置无效: {0}")]
    Config(#[from] ConfigError),
    #[error("打开标注记录失败: {0}")]
    Records(#[from] IoError),
    #[error("打开工作簿失败: {0}")]
    Engine(#[from] EngineError),
    #[error("读取命令脚本 {path:?} 失败: {source}")]
    Script {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
