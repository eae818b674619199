//! 标注会话：持有类别目录、工作簿模型、撤销历史与外部协作方。
//!
//! 所有修改都经由会话进行，并按 渲染 -> 持久化 -> 模型 的顺序提交；
//! 后一步失败时撤回已完成的前序步骤，三方状态保持一致。

use std::collections::HashMap;

use annot_core::classes::ClassRegistry;
use annot_core::document::{
    AnnotationStatus, RangeAnnotation, RegionId, RegionRecord, WorkbookAnnotation,
    annotation_name, annotation_name_prefix,
};
use annot_core::geometry::Geometry;
use tracing::{debug, info, warn};

use crate::collaborators::{RecordStore, Renderer};
use crate::errors::EngineError;
use crate::history::History;
use crate::validation::{self, Candidate};

/// 多区域创建请求的结果。
///
/// 各区域独立提交，遇到第一个失败即停止，之前已提交的区域保留。
#[derive(Debug, Default)]
pub struct BatchOutcome {
    pub committed: Vec<String>,
    pub error: Option<EngineError>,
}

impl BatchOutcome {
    fn failed(error: EngineError) -> Self {
        Self {
            committed: Vec::new(),
            error: Some(error),
        }
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    pub fn into_result(self) -> Result<Vec<String>, EngineError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.committed),
        }
    }
}

/// 重建过程中的单条记录：派生出的标注、记录中的原名称与父标注名称。
struct LoadedRecord {
    region: RangeAnnotation,
    recorded_name: String,
    parent: Option<String>,
}

pub struct AnnotationSession {
    registry: ClassRegistry,
    workbook: WorkbookAnnotation,
    history: History,
    active_sheet: Option<String>,
    unrendered: Vec<(String, String)>,
    renderer: Box<dyn Renderer>,
    store: Box<dyn RecordStore>,
}

impl AnnotationSession {
    pub fn new(
        registry: ClassRegistry,
        renderer: Box<dyn Renderer>,
        store: Box<dyn RecordStore>,
    ) -> Self {
        Self {
            registry,
            workbook: WorkbookAnnotation::new("untitled"),
            history: History::new(),
            active_sheet: None,
            unrendered: Vec::new(),
            renderer,
            store,
        }
    }

    #[inline]
    pub fn registry(&self) -> &ClassRegistry {
        &self.registry
    }

    #[inline]
    pub fn workbook(&self) -> &WorkbookAnnotation {
        &self.workbook
    }

    #[inline]
    pub fn history(&self) -> &History {
        &self.history
    }

    #[inline]
    pub fn active_sheet(&self) -> Option<&str> {
        self.active_sheet.as_deref()
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.workbook.is_dirty()
    }

    /// 打开工作簿：登记工作表并从持久化层重建全部标注。
    ///
    /// 类别未知或地址无法解析的记录会被跳过并记录警告。记录名称与派生名称不一致时
    /// 改写为派生名称，改写失败则跳过。图形创建失败的标注仍会载入，见 [`Self::unrendered`]。
    /// 返回重建的标注数量。
    pub fn open_workbook(&mut self, name: &str, sheets: &[&str]) -> Result<usize, EngineError> {
        self.workbook = WorkbookAnnotation::new(name);
        self.history.clear_all();
        self.unrendered.clear();
        self.active_sheet = sheets.first().map(|sheet| sheet.to_string());

        let mut restored = 0;
        for (index, sheet) in sheets.iter().enumerate() {
            self.workbook.ensure_sheet(sheet, Some(index as u32));
            let records = self.store.load_all_records(sheet)?;
            restored += self.rehydrate_sheet(sheet, index as u32, records);
        }

        for status in self.store.load_statuses()? {
            match status.sheet_name {
                Some(sheet) => {
                    if !self.workbook.set_sheet_status(&sheet, status.status) {
                        warn!(sheet = %sheet, "状态记录指向未知工作表，已忽略");
                    }
                }
                None => self.workbook.set_status(status.status),
            }
        }

        self.workbook.mark_saved();
        info!(workbook = name, sheets = sheets.len(), regions = restored, "工作簿已打开");
        Ok(restored)
    }

    fn rehydrate_sheet(&mut self, sheet: &str, index: u32, records: Vec<RegionRecord>) -> usize {
        let mut loaded: Vec<LoadedRecord> = Vec::new();
        for record in records {
            if !self.registry.contains(&record.class_label) {
                warn!(name = %record.name, class = %record.class_label, "记录的类别未知，已跳过");
                continue;
            }
            let geometry = match Geometry::parse(&record.address) {
                Ok(geometry) => geometry,
                Err(err) => {
                    warn!(name = %record.name, error = %err, "记录的地址无法解析，已跳过");
                    continue;
                }
            };
            let id = self.workbook.allocate_id();
            let region = RangeAnnotation::new(id, sheet, index, &record.class_label, geometry);
            loaded.push(LoadedRecord {
                region,
                recorded_name: record.name,
                parent: record.parent,
            });
        }

        // 父标注可能以记录名或派生名引用
        let mut by_name: HashMap<&str, RegionId> = HashMap::new();
        for entry in &loaded {
            by_name.insert(entry.recorded_name.as_str(), entry.region.id());
            by_name.insert(entry.region.name(), entry.region.id());
        }
        let parents: Vec<Option<RegionId>> = loaded
            .iter()
            .map(|entry| {
                entry
                    .parent
                    .as_deref()
                    .and_then(|name| by_name.get(name).copied())
                    .filter(|id| *id != entry.region.id())
                    .or_else(|| self.resolve_loaded_parent(&entry.region, &loaded))
            })
            .collect();
        let derived_names: HashMap<RegionId, String> = loaded
            .iter()
            .map(|entry| (entry.region.id(), entry.region.name().to_string()))
            .collect();

        let mut restored = 0;
        for (entry, parent) in loaded.into_iter().zip(parents) {
            let region = entry.region.with_parent(parent);
            if self.region(sheet, region.name()).is_some() {
                warn!(name = %region.name(), "重复的标注记录，已跳过");
                continue;
            }
            if region.name() != entry.recorded_name {
                let parent_name = parent.and_then(|id| derived_names.get(&id)).map(String::as_str);
                if let Err(err) = self.rename_record(&region, &entry.recorded_name, parent_name) {
                    warn!(recorded = %entry.recorded_name, derived = %region.name(), error = %err, "无法改写记录名称，已跳过");
                    continue;
                }
            }
            if let Some(class) = self.registry.get(region.class_label()) {
                if let Err(err) = self.renderer.realize(region.name(), class, region.geometry()) {
                    warn!(name = %region.name(), error = %err, "重建标注图形失败，标注保留但未显示");
                    self.unrendered
                        .push((sheet.to_string(), region.name().to_string()));
                }
            }
            match self.workbook.add_region(region) {
                Ok(()) => restored += 1,
                Err(err) => warn!(error = %err, "重复的标注记录，已跳过"),
            }
        }
        restored
    }

    /// 将持久化记录改写为派生名称，名称是模型、记录与图形之间唯一的关联键。
    /// 先写入新记录再删除旧记录，删除失败时撤回新记录。
    fn rename_record(
        &mut self,
        region: &RangeAnnotation,
        recorded_name: &str,
        parent_name: Option<&str>,
    ) -> Result<(), EngineError> {
        self.store.append_record(&region.to_record(parent_name))?;
        if let Err(err) = self.store.delete_record(region.sheet_name(), recorded_name) {
            if let Err(undo_err) = self.store.delete_record(region.sheet_name(), region.name()) {
                warn!(name = %region.name(), error = %undo_err, "撤回改写的记录失败");
            }
            return Err(err.into());
        }
        info!(recorded = recorded_name, derived = %region.name(), "记录名称已改写为派生名称");
        Ok(())
    }

    /// 记录未携带父标注名称时，按最小外层容器规则推断。
    fn resolve_loaded_parent(
        &self,
        region: &RangeAnnotation,
        loaded: &[LoadedRecord],
    ) -> Option<RegionId> {
        let class = self.registry.get(region.class_label())?;
        let others = loaded
            .iter()
            .map(|entry| &entry.region)
            .filter(|other| other.id() != region.id());
        let parent = match class.container_label() {
            Some(container) => validation::smallest_enclosing_parent(
                others.filter(|other| other.class_label() == container),
                region.geometry(),
                &self.registry,
            ),
            None if class.is_containable => {
                validation::smallest_enclosing_parent(others, region.geometry(), &self.registry)
            }
            None => None,
        };
        parent.map(RangeAnnotation::id)
    }

    /// 打开工作簿时未能显示的标注 `(sheet, name)`，它们仍保留在模型与持久化层中。
    pub fn unrendered(&self) -> &[(String, String)] {
        &self.unrendered
    }

    /// 切换活动工作表；切换到不同的工作表会清空撤销历史。
    pub fn activate_sheet(&mut self, sheet: &str) -> Result<(), EngineError> {
        if self.workbook.sheet(sheet).is_none() {
            return Err(EngineError::UnknownSheet(sheet.to_string()));
        }
        if self.active_sheet.as_deref() != Some(sheet) {
            self.history.clear_all();
            debug!(sheet, "切换活动工作表");
            self.active_sheet = Some(sheet.to_string());
        }
        Ok(())
    }

    /// 在 `sheet` 上按 `areas` 中的每个区域创建一个 `class_label` 标注。
    pub fn annotate(&mut self, sheet: &str, areas: &str, class_label: &str) -> BatchOutcome {
        if let Err(err) = self.activate_sheet(sheet) {
            return BatchOutcome::failed(err);
        }
        if !self.registry.contains(class_label) {
            return BatchOutcome::failed(EngineError::UnknownClass(class_label.to_string()));
        }
        let selection = match Geometry::parse(areas) {
            Ok(selection) => selection,
            Err(err) => return BatchOutcome::failed(err.into()),
        };

        let mut outcome = BatchOutcome::default();
        for area in selection.areas() {
            let Some(geometry) = Geometry::from_areas([*area]) else {
                continue;
            };
            match self.create_region(sheet, class_label, geometry) {
                Ok(name) => outcome.committed.push(name),
                Err(err) => {
                    warn!(sheet, class = class_label, area = %area, error = %err, "无法创建标注");
                    outcome.error = Some(err);
                    break;
                }
            }
        }
        outcome
    }

    fn create_region(
        &mut self,
        sheet: &str,
        class_label: &str,
        geometry: Geometry,
    ) -> Result<String, EngineError> {
        let parent = self.check_candidate(sheet, class_label, &geometry)?;
        let sheet_index = self
            .workbook
            .sheet(sheet)
            .map(|s| s.sheet_index())
            .ok_or_else(|| EngineError::UnknownSheet(sheet.to_string()))?;
        let id = self.workbook.allocate_id();
        let region = RangeAnnotation::new(id, sheet, sheet_index, class_label, geometry)
            .with_parent(parent);
        self.commit(&region)?;
        let name = region.name().to_string();
        info!(sheet, name = %name, parent = ?parent.map(RegionId::get), "标注已创建");
        self.history.push_create(region);
        Ok(name)
    }

    /// 校验候选标注并返回解析出的父标注。重名视为重叠。
    fn check_candidate(
        &self,
        sheet: &str,
        class_label: &str,
        geometry: &Geometry,
    ) -> Result<Option<RegionId>, EngineError> {
        let class = self
            .registry
            .get(class_label)
            .ok_or_else(|| EngineError::UnknownClass(class_label.to_string()))?;
        let worksheet = self.workbook.sheet(sheet);
        let name = annotation_name(sheet, class_label, geometry);
        if worksheet.and_then(|s| s.get(&name)).is_some() {
            return Err(EngineError::Overlapping {
                class: class_label.to_string(),
                area: geometry.normalized(),
                conflicting: name,
            });
        }
        let candidate = Candidate { class, geometry };
        validation::validate(&candidate, worksheet, &self.registry).into_result(&candidate)
    }

    fn commit(&mut self, region: &RangeAnnotation) -> Result<(), EngineError> {
        let class = self
            .registry
            .get(region.class_label())
            .ok_or_else(|| EngineError::UnknownClass(region.class_label().to_string()))?;
        self.renderer
            .realize(region.name(), class, region.geometry())?;

        let parent_name = region.parent().and_then(|id| {
            self.workbook
                .sheet(region.sheet_name())
                .and_then(|sheet| sheet.get_by_id(id))
                .map(|parent| parent.name().to_string())
        });
        let record = region.to_record(parent_name.as_deref());
        if let Err(err) = self.store.append_record(&record) {
            self.renderer.remove(region.name());
            return Err(err.into());
        }

        if let Err(err) = self.workbook.add_region(region.clone()) {
            if let Err(store_err) = self.store.delete_record(region.sheet_name(), region.name()) {
                warn!(name = %region.name(), error = %store_err, "回滚持久化记录失败");
            }
            self.renderer.remove(region.name());
            return Err(err.into());
        }
        Ok(())
    }

    /// 依次从持久化层、渲染层与模型中删除标注。持久化失败时不做任何修改。
    fn uncommit(&mut self, sheet: &str, name: &str) -> Result<RangeAnnotation, EngineError> {
        if self.region(sheet, name).is_none() {
            return Err(EngineError::RegionNotFound {
                sheet: sheet.to_string(),
                name: name.to_string(),
            });
        }
        self.store.delete_record(sheet, name)?;
        if !self.renderer.remove(name) {
            warn!(sheet, name, "标注图形不存在");
        }
        self.unrendered
            .retain(|(s, n)| !(s.as_str() == sheet && n.as_str() == name));
        self.workbook
            .remove_region(sheet, name)
            .ok_or_else(|| EngineError::RegionNotFound {
                sheet: sheet.to_string(),
                name: name.to_string(),
            })
    }

    /// 撤销最近一次创建，返回被撤销的标注名称；撤销栈为空时返回 `None`。
    pub fn undo(&mut self) -> Result<Option<String>, EngineError> {
        let Some(region) = self.history.pop_undo() else {
            return Ok(None);
        };
        match self.uncommit(region.sheet_name(), region.name()) {
            Ok(_) => {
                let name = region.name().to_string();
                debug!(name = %name, "撤销");
                self.history.push_redo(region);
                Ok(Some(name))
            }
            Err(err) => {
                self.history.push_undo(region);
                Err(err)
            }
        }
    }

    /// 重做最近一次撤销。重做前按当前状态重新校验，不再合法的标注被丢弃并报告。
    pub fn redo(&mut self) -> Result<Option<String>, EngineError> {
        let Some(region) = self.history.pop_redo() else {
            return Ok(None);
        };
        let parent = match self.check_candidate(
            region.sheet_name(),
            region.class_label(),
            region.geometry(),
        ) {
            Ok(parent) => parent,
            Err(err) => {
                warn!(name = %region.name(), error = %err, "重做的标注已不再合法，已丢弃");
                return Err(err);
            }
        };
        let region = region.with_parent(parent);
        if let Err(err) = self.commit(&region) {
            self.history.push_redo(region);
            return Err(err);
        }
        let name = region.name().to_string();
        debug!(name = %name, "重做");
        self.history.push_undo(region);
        Ok(Some(name))
    }

    /// 删除 `sheet` 上完全落在 `areas` 某一个区域内的全部标注，返回被删除的名称。
    ///
    /// 各区域分别判断包含关系，横跨两个相邻选区的标注不会被删除。
    pub fn delete_in_range(&mut self, sheet: &str, areas: &str) -> Result<Vec<String>, EngineError> {
        let selection = Geometry::parse(areas)?;
        let worksheet = self
            .workbook
            .sheet(sheet)
            .ok_or_else(|| EngineError::UnknownSheet(sheet.to_string()))?;
        let scopes: Vec<Geometry> = selection
            .areas()
            .iter()
            .filter_map(|area| Geometry::from_areas([*area]))
            .collect();
        let mut targets: Vec<String> = worksheet
            .regions()
            .filter(|region| scopes.iter().any(|scope| scope.contains(region.geometry())))
            .map(|region| region.name().to_string())
            .collect();
        // 后创建的先删，子标注先于其父标注
        targets.reverse();

        self.history.clear_all();
        let mut deleted = Vec::with_capacity(targets.len());
        for name in targets {
            self.uncommit(sheet, &name)?;
            deleted.push(name);
        }
        info!(sheet, area = %selection, count = deleted.len(), "已删除选区内的标注");
        Ok(deleted)
    }

    /// 删除单个标注及其全部后代。
    pub fn delete_region(&mut self, sheet: &str, name: &str) -> Result<Vec<String>, EngineError> {
        let root = self
            .region(sheet, name)
            .map(RangeAnnotation::id)
            .ok_or_else(|| EngineError::RegionNotFound {
                sheet: sheet.to_string(),
                name: name.to_string(),
            })?;
        let names: Vec<String> = match self.workbook.sheet(sheet) {
            Some(worksheet) => worksheet
                .subtree(root)
                .into_iter()
                .filter_map(|id| worksheet.get_by_id(id))
                .map(|region| region.name().to_string())
                .collect(),
            None => Vec::new(),
        };

        self.history.clear_all();
        for name in &names {
            self.uncommit(sheet, name)?;
        }
        info!(sheet, root = name, count = names.len(), "已删除标注");
        Ok(names)
    }

    /// 删除工作表上的全部标注，返回删除数量。
    pub fn delete_sheet_annotations(&mut self, sheet: &str) -> Result<usize, EngineError> {
        if self.workbook.sheet(sheet).is_none() {
            return Err(EngineError::UnknownSheet(sheet.to_string()));
        }
        self.store.delete_sheet_records(sheet)?;
        let removed = self.workbook.remove_sheet_regions(sheet);
        for region in &removed {
            self.renderer.remove(region.name());
        }
        self.unrendered.retain(|(s, _)| s.as_str() != sheet);
        self.history.clear_all();
        info!(sheet, count = removed.len(), "已清空工作表标注");
        Ok(removed.len())
    }

    pub fn delete_all(&mut self) -> Result<usize, EngineError> {
        self.store.delete_all_records()?;
        let removed = self.workbook.remove_all_regions();
        for region in &removed {
            self.renderer.remove(region.name());
        }
        self.unrendered.clear();
        self.history.clear_all();
        info!(count = removed.len(), "已清空工作簿标注");
        Ok(removed.len())
    }

    /// 显示或隐藏标注图形；`sheet` 为空时作用于全部工作表。
    pub fn set_visibility(&mut self, sheet: Option<&str>, visible: bool) -> Result<(), EngineError> {
        let sheets: Vec<String> = match sheet {
            Some(sheet) => {
                if self.workbook.sheet(sheet).is_none() {
                    return Err(EngineError::UnknownSheet(sheet.to_string()));
                }
                vec![sheet.to_string()]
            }
            None => self
                .workbook
                .sheets()
                .map(|s| s.sheet_name().to_string())
                .collect(),
        };
        for sheet in sheets {
            let prefix = format!("{}_", annotation_name_prefix(&sheet));
            self.renderer.set_visible(&prefix, visible);
        }
        Ok(())
    }

    /// 切换工作表的“已完成”状态。标记为完成要求表内至少存在一个标注。
    pub fn toggle_sheet_completed(&mut self, sheet: &str) -> Result<AnnotationStatus, EngineError> {
        let worksheet = self
            .workbook
            .sheet(sheet)
            .ok_or_else(|| EngineError::UnknownSheet(sheet.to_string()))?;
        let next = if worksheet.status() == AnnotationStatus::Completed {
            AnnotationStatus::InProgress
        } else if worksheet.is_empty() {
            return Err(EngineError::EmptySheet(sheet.to_string()));
        } else {
            AnnotationStatus::Completed
        };
        self.workbook.set_sheet_status(sheet, next);
        self.history.clear_all();
        info!(sheet, status = ?next, "工作表状态已更新");
        Ok(next)
    }

    /// 切换工作表的“不适用”状态。标记为不适用会删除表内全部标注。
    pub fn toggle_sheet_not_applicable(
        &mut self,
        sheet: &str,
    ) -> Result<AnnotationStatus, EngineError> {
        let current = self
            .workbook
            .sheet(sheet)
            .map(|s| s.status())
            .ok_or_else(|| EngineError::UnknownSheet(sheet.to_string()))?;
        let next = if current == AnnotationStatus::NotApplicable {
            AnnotationStatus::InProgress
        } else {
            self.delete_sheet_annotations(sheet)?;
            AnnotationStatus::NotApplicable
        };
        self.workbook.set_sheet_status(sheet, next);
        self.history.clear_all();
        info!(sheet, status = ?next, "工作表状态已更新");
        Ok(next)
    }

    pub fn toggle_workbook_completed(&mut self) -> Result<AnnotationStatus, EngineError> {
        let next = if self.workbook.status() == AnnotationStatus::Completed {
            AnnotationStatus::InProgress
        } else if self.workbook.region_count() == 0 {
            return Err(EngineError::EmptyWorkbook);
        } else {
            AnnotationStatus::Completed
        };
        self.workbook.set_status(next);
        self.history.clear_all();
        info!(status = ?next, "工作簿状态已更新");
        Ok(next)
    }

    pub fn toggle_workbook_not_applicable(&mut self) -> Result<AnnotationStatus, EngineError> {
        let next = if self.workbook.status() == AnnotationStatus::NotApplicable {
            AnnotationStatus::InProgress
        } else {
            self.delete_all()?;
            AnnotationStatus::NotApplicable
        };
        self.workbook.set_status(next);
        self.history.clear_all();
        info!(status = ?next, "工作簿状态已更新");
        Ok(next)
    }

    /// 持久化状态记录并建立保存点。
    pub fn save(&mut self) -> Result<(), EngineError> {
        self.store.save_statuses(&self.workbook.status_records())?;
        self.mark_saved();
        info!(workbook = self.workbook.name(), revision = self.workbook.revision(), "工作簿已保存");
        Ok(())
    }

    /// 外部保存成功后调用：清空历史并记录当前修订号。
    pub fn mark_saved(&mut self) {
        self.history.clear_all();
        self.workbook.mark_saved();
    }

    pub fn region(&self, sheet: &str, name: &str) -> Option<&RangeAnnotation> {
        self.workbook.sheet(sheet)?.get(name)
    }

    pub fn parent_of(&self, sheet: &str, name: &str) -> Option<&RangeAnnotation> {
        let worksheet = self.workbook.sheet(sheet)?;
        worksheet.get_by_id(worksheet.get(name)?.parent()?)
    }

    pub fn children_of(&self, sheet: &str, name: &str) -> Vec<&RangeAnnotation> {
        let Some(worksheet) = self.workbook.sheet(sheet) else {
            return Vec::new();
        };
        match worksheet.get(name) {
            Some(region) => worksheet.children_of(region.id()).collect(),
            None => Vec::new(),
        }
    }
}
