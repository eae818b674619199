use std::env;
use std::path::PathBuf;

use annot_config::AppConfig;
use annot_engine::collaborators::RecordStore;
use annot_engine::collaborators::memory::MemoryRecordStore;
use annot_engine::session::AnnotationSession;
use annot_io::JsonRecordStore;
use tracing::{info, warn};

use crate::errors::FrontendError;
use crate::renderer::ConsoleRenderer;

/// 标注记录来源，便于前端呈现加载信息。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordSource {
    File(PathBuf),
    Memory,
}

/// 统一封装打开后的会话与元信息。
pub struct LoadedSession {
    pub session: AnnotationSession,
    pub source: RecordSource,
    pub renderer: ConsoleRenderer,
    pub restored: usize,
    /// 打开时图形创建失败的标注 `(sheet, name)`。
    pub unrendered: Vec<(String, String)>,
}

/// 记录文件路径的优先级：显式参数、环境变量 `ANNOT_RECORDS`、配置文件。
/// 都未提供时使用内存存储。
pub fn resolve_records_path(config: &AppConfig, explicit: Option<PathBuf>) -> Option<PathBuf> {
    explicit
        .or_else(|| env::var_os("ANNOT_RECORDS").map(PathBuf::from))
        .or_else(|| config.storage.records_path.clone())
}

/// 按配置构建会话并从记录来源重建标注。
pub fn open_session(
    config: &AppConfig,
    records: Option<PathBuf>,
) -> Result<LoadedSession, FrontendError> {
    let registry = config.registry()?;
    let renderer = ConsoleRenderer::new();
    let (store, source) = match resolve_records_path(config, records) {
        Some(path) => {
            let store: Box<dyn RecordStore> = Box::new(JsonRecordStore::open(&path)?);
            info!(path = %path.display(), "使用 JSON 标注记录文件");
            (store, RecordSource::File(path))
        }
        None => {
            info!("未配置记录文件，标注仅保存在内存中");
            let store: Box<dyn RecordStore> = Box::new(MemoryRecordStore::new());
            (store, RecordSource::Memory)
        }
    };

    let mut session = AnnotationSession::new(registry, Box::new(renderer.clone()), store);
    let sheets: Vec<&str> = config.session.sheets.iter().map(String::as_str).collect();
    let restored = session.open_workbook(&config.session.workbook_name, &sheets)?;
    let unrendered = session.unrendered().to_vec();
    if !unrendered.is_empty() {
        warn!(count = unrendered.len(), "部分标注未能显示");
    }

    if let Some(sheet) = config.session.default_sheet.as_deref() {
        if let Err(err) = session.activate_sheet(sheet) {
            warn!(sheet, error = %err, "无法激活默认工作表");
        }
    }

    Ok(LoadedSession {
        session,
        source,
        renderer,
        restored,
        unrendered,
    })
}
