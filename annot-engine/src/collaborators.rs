//! 引擎调用的外部协作方：渲染层与持久化层。
//!
//! 核心只保留标注名称作为连接键，从不持有渲染句柄。

use annot_core::classes::AnnotationClass;
use annot_core::document::{RegionRecord, StatusRecord};
use annot_core::geometry::Geometry;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollaboratorError {
    #[error("rendering `{name}` failed: {reason}")]
    Rendering { name: String, reason: String },
    #[error("persistence failed: {0}")]
    Persistence(String),
}

/// 渲染协作方：在宿主文档上绘制、删除、显示/隐藏标注图形。
pub trait Renderer: Send {
    fn realize(
        &mut self,
        name: &str,
        class: &AnnotationClass,
        geometry: &Geometry,
    ) -> Result<(), CollaboratorError>;

    /// 删除指定名称的图形，返回图形是否存在。
    fn remove(&mut self, name: &str) -> bool;

    /// 设置所有名称以 `name_prefix` 开头的图形的可见性。
    fn set_visible(&mut self, name_prefix: &str, visible: bool);
}

/// 持久化协作方：保存与加载标注记录和状态。
pub trait RecordStore: Send {
    fn append_record(&mut self, record: &RegionRecord) -> Result<(), CollaboratorError>;

    fn delete_record(&mut self, sheet: &str, name: &str) -> Result<(), CollaboratorError>;

    fn delete_sheet_records(&mut self, sheet: &str) -> Result<(), CollaboratorError>;

    fn delete_all_records(&mut self) -> Result<(), CollaboratorError>;

    fn load_all_records(&self, sheet: &str) -> Result<Vec<RegionRecord>, CollaboratorError>;

    fn save_statuses(&mut self, statuses: &[StatusRecord]) -> Result<(), CollaboratorError>;

    fn load_statuses(&self) -> Result<Vec<StatusRecord>, CollaboratorError>;
}

/// 内存实现，供测试与演示使用。句柄可克隆，克隆体共享同一份状态，
/// 便于在交给会话之后继续观察或注入故障。
pub mod memory {
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

    use annot_core::classes::{AnnotationClass, AnnotationTool};
    use annot_core::document::{RegionRecord, StatusRecord};
    use annot_core::geometry::Geometry;

    use super::{CollaboratorError, RecordStore, Renderer};

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct Visual {
        pub tool: AnnotationTool,
        pub address: String,
        pub visible: bool,
    }

    #[derive(Debug, Default)]
    struct RenderState {
        visuals: BTreeMap<String, Visual>,
        fail_next_realize: bool,
    }

    #[derive(Debug, Clone, Default)]
    pub struct MemoryRenderer {
        state: Arc<Mutex<RenderState>>,
    }

    impl MemoryRenderer {
        pub fn new() -> Self {
            Self::default()
        }

        /// 下一次 `realize` 调用返回失败。
        pub fn fail_next_realize(&self) {
            lock(&self.state).fail_next_realize = true;
        }

        pub fn visual(&self, name: &str) -> Option<Visual> {
            lock(&self.state).visuals.get(name).cloned()
        }

        pub fn names(&self) -> Vec<String> {
            lock(&self.state).visuals.keys().cloned().collect()
        }

        pub fn len(&self) -> usize {
            lock(&self.state).visuals.len()
        }

        pub fn is_empty(&self) -> bool {
            self.len() == 0
        }
    }

    impl Renderer for MemoryRenderer {
        fn realize(
            &mut self,
            name: &str,
            class: &AnnotationClass,
            geometry: &Geometry,
        ) -> Result<(), CollaboratorError> {
            let mut state = lock(&self.state);
            if std::mem::take(&mut state.fail_next_realize) {
                return Err(CollaboratorError::Rendering {
                    name: name.to_string(),
                    reason: "injected failure".to_string(),
                });
            }
            state.visuals.insert(
                name.to_string(),
                Visual {
                    tool: class.tool,
                    address: geometry.normalized(),
                    visible: true,
                },
            );
            Ok(())
        }

        fn remove(&mut self, name: &str) -> bool {
            lock(&self.state).visuals.remove(name).is_some()
        }

        fn set_visible(&mut self, name_prefix: &str, visible: bool) {
            let mut state = lock(&self.state);
            for (_, visual) in state
                .visuals
                .iter_mut()
                .filter(|(name, _)| name.starts_with(name_prefix))
            {
                visual.visible = visible;
            }
        }
    }

    #[derive(Debug, Default)]
    struct StoreState {
        records: Vec<RegionRecord>,
        statuses: Vec<StatusRecord>,
        fail_next_append: bool,
        fail_next_delete: bool,
    }

    #[derive(Debug, Clone, Default)]
    pub struct MemoryRecordStore {
        state: Arc<Mutex<StoreState>>,
    }

    impl MemoryRecordStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_records(records: Vec<RegionRecord>) -> Self {
            let store = Self::default();
            lock(&store.state).records = records;
            store
        }

        pub fn fail_next_append(&self) {
            lock(&self.state).fail_next_append = true;
        }

        pub fn fail_next_delete(&self) {
            lock(&self.state).fail_next_delete = true;
        }

        pub fn records(&self) -> Vec<RegionRecord> {
            lock(&self.state).records.clone()
        }

        pub fn statuses(&self) -> Vec<StatusRecord> {
            lock(&self.state).statuses.clone()
        }

        fn take_delete_failure(state: &mut StoreState) -> Result<(), CollaboratorError> {
            if std::mem::take(&mut state.fail_next_delete) {
                Err(CollaboratorError::Persistence("injected failure".to_string()))
            } else {
                Ok(())
            }
        }
    }

    impl RecordStore for MemoryRecordStore {
        fn append_record(&mut self, record: &RegionRecord) -> Result<(), CollaboratorError> {
            let mut state = lock(&self.state);
            if std::mem::take(&mut state.fail_next_append) {
                return Err(CollaboratorError::Persistence("injected failure".to_string()));
            }
            state.records.push(record.clone());
            Ok(())
        }

        fn delete_record(&mut self, sheet: &str, name: &str) -> Result<(), CollaboratorError> {
            let mut state = lock(&self.state);
            Self::take_delete_failure(&mut state)?;
            state
                .records
                .retain(|record| !(record.sheet_name == sheet && record.name == name));
            Ok(())
        }

        fn delete_sheet_records(&mut self, sheet: &str) -> Result<(), CollaboratorError> {
            let mut state = lock(&self.state);
            Self::take_delete_failure(&mut state)?;
            state.records.retain(|record| record.sheet_name != sheet);
            Ok(())
        }

        fn delete_all_records(&mut self) -> Result<(), CollaboratorError> {
            let mut state = lock(&self.state);
            Self::take_delete_failure(&mut state)?;
            state.records.clear();
            Ok(())
        }

        fn load_all_records(&self, sheet: &str) -> Result<Vec<RegionRecord>, CollaboratorError> {
            Ok(lock(&self.state)
                .records
                .iter()
                .filter(|record| record.sheet_name == sheet)
                .cloned()
                .collect())
        }

        fn save_statuses(&mut self, statuses: &[StatusRecord]) -> Result<(), CollaboratorError> {
            lock(&self.state).statuses = statuses.to_vec();
            Ok(())
        }

        fn load_statuses(&self) -> Result<Vec<StatusRecord>, CollaboratorError> {
            Ok(lock(&self.state).statuses.clone())
        }
    }
}
