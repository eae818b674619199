pub mod cli;
pub mod errors;
pub mod loader;
pub mod renderer;

use std::fs;
use std::path::{Path, PathBuf};

use annot_config::AppConfig;
use cli::ScriptReport;
use errors::FrontendError;
use tracing::info;

/// 打开会话并执行内置演示脚本。
pub fn run_cli_demo(
    config: &AppConfig,
    records: Option<PathBuf>,
) -> Result<ScriptReport, FrontendError> {
    info!("启动 CLI 演示前端");
    let loaded = loader::open_session(config, records)?;
    Ok(cli::run(loaded, cli::DEMO_SCRIPT))
}

/// 打开会话并执行指定的命令脚本文件。
pub fn run_script_file(
    config: &AppConfig,
    records: Option<PathBuf>,
    script: &Path,
) -> Result<ScriptReport, FrontendError> {
    let content = fs::read_to_string(script).map_err(|source| FrontendError::Script {
        path: script.to_path_buf(),
        source,
    })?;
    info!(script = %script.display(), "执行命令脚本");
    let loaded = loader::open_session(config, records)?;
    Ok(cli::run(loaded, &content))
}
