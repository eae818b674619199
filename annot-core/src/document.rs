use std::collections::BTreeMap;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geometry::Geometry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RegionId(u64);

impl RegionId {
    #[inline]
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// 提供原始数值，便于日志输出。
    #[inline]
    pub fn get(self) -> u64 {
        self.0
    }
}

/// 同一工作表内所有标注名称的公共前缀。
pub fn annotation_name_prefix(sheet_name: &str) -> String {
    format!("{}_ANNOTATION", sheet_name.replace(' ', "_")).to_uppercase()
}

/// 派生标注名称：它是内存模型、持久化记录与渲染对象之间唯一共享的连接键。
pub fn annotation_name(sheet_name: &str, class_label: &str, geometry: &Geometry) -> String {
    format!(
        "{}_{}_{}",
        annotation_name_prefix(sheet_name),
        class_label,
        geometry.name_fragment()
    )
    .to_uppercase()
}

/// 已放置的区域标注。父标注只以 `RegionId` 记录，需要时再查找。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeAnnotation {
    id: RegionId,
    sheet_name: String,
    sheet_index: u32,
    class_label: String,
    name: String,
    geometry: Geometry,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    parent: Option<RegionId>,
}

impl RangeAnnotation {
    /// 创建区域标注，名称按工作表、类别与几何自动派生。
    pub fn new(
        id: RegionId,
        sheet_name: impl Into<String>,
        sheet_index: u32,
        class_label: impl Into<String>,
        geometry: Geometry,
    ) -> Self {
        let sheet_name = sheet_name.into();
        let class_label = class_label.into();
        let name = annotation_name(&sheet_name, &class_label, &geometry);
        Self {
            id,
            sheet_name,
            sheet_index,
            class_label,
            name,
            geometry,
            parent: None,
        }
    }

    pub fn with_parent(mut self, parent: Option<RegionId>) -> Self {
        self.parent = parent;
        self
    }

    #[inline]
    pub fn id(&self) -> RegionId {
        self.id
    }

    #[inline]
    pub fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    #[inline]
    pub fn sheet_index(&self) -> u32 {
        self.sheet_index
    }

    #[inline]
    pub fn class_label(&self) -> &str {
        &self.class_label
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    #[inline]
    pub fn parent(&self) -> Option<RegionId> {
        self.parent
    }

    /// 转换为持久化记录；父标注以名称表示。
    pub fn to_record(&self, parent_name: Option<&str>) -> RegionRecord {
        RegionRecord {
            sheet_name: self.sheet_name.clone(),
            sheet_index: self.sheet_index,
            class_label: self.class_label.clone(),
            name: self.name.clone(),
            address: self.geometry.normalized(),
            parent: parent_name.map(str::to_string),
        }
    }
}

/// 工作表或工作簿的标注进度。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnnotationStatus {
    #[default]
    InProgress,
    Completed,
    NotApplicable,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    #[error("annotation `{name}` already exists on sheet `{sheet}`")]
    DuplicateName { sheet: String, name: String },
    #[error("annotation `{name}` belongs to sheet `{actual}`, not `{expected}`")]
    SheetMismatch {
        name: String,
        expected: String,
        actual: String,
    },
}

/// 单个工作表的标注集合，名称在表内唯一。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorksheetAnnotation {
    sheet_name: String,
    sheet_index: u32,
    regions: Vec<RangeAnnotation>,
    #[serde(default)]
    status: AnnotationStatus,
}

impl WorksheetAnnotation {
    pub fn new(sheet_name: impl Into<String>, sheet_index: u32) -> Self {
        Self {
            sheet_name: sheet_name.into(),
            sheet_index,
            regions: Vec::new(),
            status: AnnotationStatus::default(),
        }
    }

    #[inline]
    pub fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    #[inline]
    pub fn sheet_index(&self) -> u32 {
        self.sheet_index
    }

    #[inline]
    pub fn status(&self) -> AnnotationStatus {
        self.status
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.regions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// 按插入顺序遍历。
    #[inline]
    pub fn regions(&self) -> impl Iterator<Item = &RangeAnnotation> {
        self.regions.iter()
    }

    pub fn get(&self, name: &str) -> Option<&RangeAnnotation> {
        self.regions.iter().find(|region| region.name == name)
    }

    pub fn get_by_id(&self, id: RegionId) -> Option<&RangeAnnotation> {
        self.regions.iter().find(|region| region.id == id)
    }

    pub fn regions_of_class<'a>(
        &'a self,
        class_label: &'a str,
    ) -> impl Iterator<Item = &'a RangeAnnotation> + 'a {
        self.regions
            .iter()
            .filter(move |region| region.class_label == class_label)
    }

    /// 直接子标注（父标注为 `parent` 的标注）。
    pub fn children_of(&self, parent: RegionId) -> impl Iterator<Item = &RangeAnnotation> + '_ {
        self.regions
            .iter()
            .filter(move |region| region.parent == Some(parent))
    }

    /// 收集 `root` 及其所有后代，后代在前、根在后。
    pub fn subtree(&self, root: RegionId) -> Vec<RegionId> {
        let mut ordered = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            ordered.push(id);
            stack.extend(self.children_of(id).map(RangeAnnotation::id));
        }
        ordered.reverse();
        ordered
    }

    fn insert(&mut self, region: RangeAnnotation) -> Result<(), ModelError> {
        if region.sheet_name != self.sheet_name {
            return Err(ModelError::SheetMismatch {
                name: region.name,
                expected: self.sheet_name.clone(),
                actual: region.sheet_name,
            });
        }
        if self.get(&region.name).is_some() {
            return Err(ModelError::DuplicateName {
                sheet: self.sheet_name.clone(),
                name: region.name,
            });
        }
        self.regions.push(region);
        Ok(())
    }

    fn remove(&mut self, name: &str) -> Option<RangeAnnotation> {
        let pos = self.regions.iter().position(|region| region.name == name)?;
        Some(self.regions.remove(pos))
    }
}

/// 工作簿级聚合：以工作表名称为键的标注集合、工作簿状态与修订号。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkbookAnnotation {
    name: String,
    sheets: BTreeMap<String, WorksheetAnnotation>,
    #[serde(default)]
    status: AnnotationStatus,
    revision: u64,
    saved_revision: u64,
    next_region_id: u64,
}

impl WorkbookAnnotation {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn status(&self) -> AnnotationStatus {
        self.status
    }

    pub fn set_status(&mut self, status: AnnotationStatus) {
        if self.status != status {
            self.status = status;
            self.bump();
        }
    }

    #[inline]
    pub fn sheet(&self, name: &str) -> Option<&WorksheetAnnotation> {
        self.sheets.get(name)
    }

    #[inline]
    pub fn sheets(&self) -> impl Iterator<Item = &WorksheetAnnotation> {
        self.sheets.values()
    }

    /// 若工作表尚未登记则创建，索引取 `index`，缺省时取当前工作表数量。
    pub fn ensure_sheet(&mut self, name: &str, index: Option<u32>) -> &WorksheetAnnotation {
        let next_index = self.sheets.len() as u32;
        self.sheets
            .entry(name.to_string())
            .or_insert_with(|| WorksheetAnnotation::new(name, index.unwrap_or(next_index)))
    }

    pub fn set_sheet_status(&mut self, name: &str, status: AnnotationStatus) -> bool {
        let Some(sheet) = self.sheets.get_mut(name) else {
            return false;
        };
        if sheet.status != status {
            sheet.status = status;
            self.bump();
        }
        true
    }

    /// 分配新的区域 ID，ID 在同一工作簿内单调递增且不会复用。
    pub fn allocate_id(&mut self) -> RegionId {
        let id = self.next_region_id;
        self.next_region_id += 1;
        RegionId(id)
    }

    pub fn add_region(&mut self, region: RangeAnnotation) -> Result<(), ModelError> {
        let id = region.id.get();
        let sheet = self
            .sheets
            .entry(region.sheet_name.clone())
            .or_insert_with(|| WorksheetAnnotation::new(&region.sheet_name, region.sheet_index));
        sheet.insert(region)?;
        self.next_region_id = self.next_region_id.max(id + 1);
        self.bump();
        Ok(())
    }

    pub fn remove_region(&mut self, sheet: &str, name: &str) -> Option<RangeAnnotation> {
        let removed = self.sheets.get_mut(sheet)?.remove(name)?;
        self.bump();
        Some(removed)
    }

    pub fn remove_sheet_regions(&mut self, sheet: &str) -> Vec<RangeAnnotation> {
        let Some(sheet) = self.sheets.get_mut(sheet) else {
            return Vec::new();
        };
        let removed = std::mem::take(&mut sheet.regions);
        if !removed.is_empty() {
            self.bump();
        }
        removed
    }

    pub fn remove_all_regions(&mut self) -> Vec<RangeAnnotation> {
        let mut removed = Vec::new();
        for sheet in self.sheets.values_mut() {
            removed.append(&mut sheet.regions);
        }
        if !removed.is_empty() {
            self.bump();
        }
        removed
    }

    pub fn regions(&self) -> impl Iterator<Item = &RangeAnnotation> {
        self.sheets.values().flat_map(|sheet| sheet.regions.iter())
    }

    pub fn region_count(&self) -> usize {
        self.sheets.values().map(WorksheetAnnotation::len).sum()
    }

    #[inline]
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// 记录保存点，之后 `is_dirty` 只反映新的修改。
    pub fn mark_saved(&mut self) {
        self.saved_revision = self.revision;
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.revision != self.saved_revision
    }

    /// 结构指纹：对全部标注的名称、类别、几何与父子关系做非加密散列，仅用于诊断。
    pub fn fingerprint(&self) -> u64 {
        let mut entries: Vec<(&str, &str, &str, String, Option<&str>)> = self
            .sheets
            .values()
            .flat_map(|sheet| {
                sheet.regions.iter().map(move |region| {
                    let parent = region
                        .parent
                        .and_then(|id| sheet.get_by_id(id))
                        .map(|p| p.name.as_str());
                    (
                        sheet.sheet_name.as_str(),
                        region.name.as_str(),
                        region.class_label.as_str(),
                        region.geometry.normalized(),
                        parent,
                    )
                })
            })
            .collect();
        entries.sort();
        let mut hasher = DefaultHasher::new();
        entries.hash(&mut hasher);
        hasher.finish()
    }

    /// 汇总工作簿与各工作表的状态，供持久化使用。
    pub fn status_records(&self) -> Vec<StatusRecord> {
        let mut records = vec![StatusRecord {
            sheet_name: None,
            status: self.status,
        }];
        records.extend(self.sheets.values().map(|sheet| StatusRecord {
            sheet_name: Some(sheet.sheet_name.clone()),
            status: sheet.status,
        }));
        records
    }

    #[inline]
    fn bump(&mut self) {
        self.revision += 1;
    }
}

/// 持久化的标注记录，字段与名称约定和渲染层保持一致。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionRecord {
    pub sheet_name: String,
    pub sheet_index: u32,
    pub class_label: String,
    pub name: String,
    pub address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
}

/// 状态记录；`sheet_name` 为空表示工作簿级状态。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sheet_name: Option<String>,
    pub status: AnnotationStatus,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(book: &mut WorkbookAnnotation, sheet: &str, class: &str, area: &str) -> RangeAnnotation {
        let id = book.allocate_id();
        RangeAnnotation::new(id, sheet, 0, class, Geometry::parse(area).unwrap())
    }

    #[test]
    fn names_are_derived_deterministically() {
        let geometry = Geometry::parse("$A$1:$D$10").unwrap();
        assert_eq!(
            annotation_name("Sheet 1", "Table", &geometry),
            "SHEET_1_ANNOTATION_TABLE_A1_D10"
        );
        assert_eq!(annotation_name_prefix("my sheet"), "MY_SHEET_ANNOTATION");
    }

    #[test]
    fn lookup_by_name_round_trips() {
        let mut book = WorkbookAnnotation::new("book.xlsx");
        let table = region(&mut book, "Sheet1", "Table", "A1:D10");
        let name = table.name().to_string();
        book.add_region(table.clone()).unwrap();

        let found = book.sheet("Sheet1").and_then(|s| s.get(&name)).unwrap();
        assert_eq!(found.class_label(), "Table");
        assert_eq!(found.geometry(), table.geometry());
        assert_eq!(found.sheet_name(), "Sheet1");
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut book = WorkbookAnnotation::new("book.xlsx");
        let first = region(&mut book, "Sheet1", "Notes", "A1:B2");
        let second = region(&mut book, "Sheet1", "Notes", "A1:B2");
        book.add_region(first).unwrap();
        let err = book.add_region(second).unwrap_err();
        assert!(matches!(err, ModelError::DuplicateName { .. }));
        assert_eq!(book.region_count(), 1);
    }

    #[test]
    fn revision_tracks_every_mutation() {
        let mut book = WorkbookAnnotation::new("book.xlsx");
        assert!(!book.is_dirty());
        let table = region(&mut book, "Sheet1", "Table", "A1:D10");
        let name = table.name().to_string();
        book.add_region(table).unwrap();
        assert!(book.is_dirty());
        book.mark_saved();
        assert!(!book.is_dirty());

        book.set_sheet_status("Sheet1", AnnotationStatus::Completed);
        assert!(book.is_dirty());
        book.mark_saved();
        // 状态未变化时不增加修订号
        book.set_sheet_status("Sheet1", AnnotationStatus::Completed);
        assert!(!book.is_dirty());

        let before = book.revision();
        book.remove_region("Sheet1", &name).unwrap();
        assert!(book.revision() > before);
        assert!(book.remove_region("Sheet1", &name).is_none());
    }

    #[test]
    fn fingerprint_ignores_insertion_order() {
        let mut a = WorkbookAnnotation::new("book.xlsx");
        let mut b = WorkbookAnnotation::new("book.xlsx");
        let notes = region(&mut a, "Sheet1", "Notes", "A1:B2");
        let derived = region(&mut a, "Sheet1", "Derived", "D1:E2");
        a.add_region(notes.clone()).unwrap();
        a.add_region(derived.clone()).unwrap();
        b.add_region(derived).unwrap();
        b.add_region(notes).unwrap();
        assert_eq!(a.fingerprint(), b.fingerprint());

        let extra = region(&mut b, "Sheet2", "Notes", "A1");
        b.add_region(extra).unwrap();
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn subtree_lists_descendants_before_root() {
        let mut book = WorkbookAnnotation::new("book.xlsx");
        let outer = region(&mut book, "Sheet1", "Section", "A1:J20");
        let inner = region(&mut book, "Sheet1", "Table", "B2:E8").with_parent(Some(outer.id()));
        let leaf = region(&mut book, "Sheet1", "Header", "B2:E2").with_parent(Some(inner.id()));
        let (outer_id, inner_id, leaf_id) = (outer.id(), inner.id(), leaf.id());
        book.add_region(outer).unwrap();
        book.add_region(inner).unwrap();
        book.add_region(leaf).unwrap();

        let order = book.sheet("Sheet1").unwrap().subtree(outer_id);
        assert_eq!(order, vec![leaf_id, inner_id, outer_id]);
    }

    #[test]
    fn ids_are_never_reused_after_reinsert() {
        let mut book = WorkbookAnnotation::new("book.xlsx");
        let notes = region(&mut book, "Sheet1", "Notes", "A1");
        let removed_name = notes.name().to_string();
        book.add_region(notes.clone()).unwrap();
        book.remove_region("Sheet1", &removed_name);
        book.add_region(notes).unwrap();
        assert_eq!(book.allocate_id().get(), 1);
    }

    #[test]
    fn status_records_cover_workbook_and_sheets() {
        let mut book = WorkbookAnnotation::new("book.xlsx");
        book.ensure_sheet("Sheet1", None);
        book.ensure_sheet("Sheet2", None);
        book.set_sheet_status("Sheet2", AnnotationStatus::NotApplicable);
        let records = book.status_records();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].sheet_name, None);
        assert_eq!(records[2].status, AnnotationStatus::NotApplicable);
        assert_eq!(book.sheet("Sheet2").unwrap().sheet_index(), 1);
    }
}
