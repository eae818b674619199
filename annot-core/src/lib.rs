pub mod document;

pub mod geometry {
    use std::fmt;
    use std::str::FromStr;

    use serde::{Deserialize, Serialize};
    use thiserror::Error;

    /// 工作表允许的最大行数（与 xlsx 上限一致）。
    pub const MAX_ROWS: u32 = 1_048_576;
    /// 工作表允许的最大列数（`XFD`）。
    pub const MAX_COLS: u32 = 16_384;

    #[derive(Debug, Clone, PartialEq, Eq, Error)]
    pub enum GeometryError {
        #[error("malformed geometry `{input}`: {reason}")]
        Malformed { input: String, reason: &'static str },
    }

    impl GeometryError {
        fn malformed(input: &str, reason: &'static str) -> Self {
            Self::Malformed {
                input: input.to_string(),
                reason,
            }
        }
    }

    /// 单元格坐标，行列均从 0 开始：`row = 0` 对应第 1 行，`col = 0` 对应 `A` 列。
    ///
    /// 坐标总是落在网格内，越界的值被截断到最后一行或最后一列。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
    #[serde(from = "RawCellRef")]
    pub struct CellRef {
        row: u32,
        col: u32,
    }

    #[derive(Deserialize)]
    struct RawCellRef {
        row: u32,
        col: u32,
    }

    impl From<RawCellRef> for CellRef {
        fn from(raw: RawCellRef) -> Self {
            Self::new(raw.row, raw.col)
        }
    }

    impl CellRef {
        #[inline]
        pub const fn new(row: u32, col: u32) -> Self {
            Self {
                row: if row < MAX_ROWS { row } else { MAX_ROWS - 1 },
                col: if col < MAX_COLS { col } else { MAX_COLS - 1 },
            }
        }

        #[inline]
        pub const fn row(self) -> u32 {
            self.row
        }

        #[inline]
        pub const fn col(self) -> u32 {
            self.col
        }

        /// 解析 A1 形式的单元格地址，接受 `$` 绝对引用标记，字母不区分大小写。
        pub fn from_a1(text: &str) -> Result<Self, GeometryError> {
            let s = text.trim();
            if s.is_empty() {
                return Err(GeometryError::malformed(text, "empty cell reference"));
            }

            let bytes = s.as_bytes();
            let mut idx = 0usize;
            if bytes.get(idx) == Some(&b'$') {
                idx += 1;
            }
            let col_start = idx;
            while idx < bytes.len() && bytes[idx].is_ascii_alphabetic() {
                idx += 1;
            }
            if idx == col_start {
                return Err(GeometryError::malformed(text, "missing column"));
            }
            let col_end = idx;
            if bytes.get(idx) == Some(&b'$') {
                idx += 1;
            }
            let row_start = idx;
            while idx < bytes.len() && bytes[idx].is_ascii_digit() {
                idx += 1;
            }
            if idx == row_start {
                return Err(GeometryError::malformed(text, "missing row"));
            }
            if idx != bytes.len() {
                return Err(GeometryError::malformed(text, "trailing characters"));
            }

            let col = column_index(&s[col_start..col_end])
                .ok_or_else(|| GeometryError::malformed(text, "column out of range"))?;
            let row: u32 = s[row_start..idx]
                .parse()
                .map_err(|_| GeometryError::malformed(text, "row out of range"))?;
            if row == 0 || row > MAX_ROWS {
                return Err(GeometryError::malformed(text, "row out of range"));
            }
            Ok(Self::new(row - 1, col))
        }

        pub fn to_a1(self) -> String {
            format!("{}{}", column_name(self.col), self.row + 1)
        }
    }

    impl fmt::Display for CellRef {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(&self.to_a1())
        }
    }

    /// 闭区间矩形区域，构造时自动规范化为 `start <= end`。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct CellRange {
        start: CellRef,
        end: CellRef,
    }

    impl CellRange {
        pub fn new(a: CellRef, b: CellRef) -> Self {
            Self {
                start: CellRef::new(a.row.min(b.row), a.col.min(b.col)),
                end: CellRef::new(a.row.max(b.row), a.col.max(b.col)),
            }
        }

        #[inline]
        pub fn single(cell: CellRef) -> Self {
            Self {
                start: cell,
                end: cell,
            }
        }

        /// 解析 `A1:B2` 或单个单元格 `C3`。
        pub fn from_a1(text: &str) -> Result<Self, GeometryError> {
            let s = text.trim();
            if s.is_empty() {
                return Err(GeometryError::malformed(text, "empty area"));
            }
            match s.split_once(':') {
                None => Ok(Self::single(CellRef::from_a1(s)?)),
                Some((a, b)) => {
                    if b.contains(':') {
                        return Err(GeometryError::malformed(text, "too many `:` separators"));
                    }
                    Ok(Self::new(CellRef::from_a1(a)?, CellRef::from_a1(b)?))
                }
            }
        }

        #[inline]
        pub fn start(&self) -> CellRef {
            self.start
        }

        #[inline]
        pub fn end(&self) -> CellRef {
            self.end
        }

        #[inline]
        pub fn is_single_cell(&self) -> bool {
            self.start == self.end
        }

        #[inline]
        pub fn width(&self) -> u32 {
            self.end.col - self.start.col + 1
        }

        #[inline]
        pub fn height(&self) -> u32 {
            self.end.row - self.start.row + 1
        }

        #[inline]
        pub fn cell_count(&self) -> u64 {
            u64::from(self.width()) * u64::from(self.height())
        }

        #[inline]
        pub fn contains_cell(&self, cell: CellRef) -> bool {
            cell.row >= self.start.row
                && cell.row <= self.end.row
                && cell.col >= self.start.col
                && cell.col <= self.end.col
        }

        #[inline]
        pub fn contains_range(&self, other: &CellRange) -> bool {
            self.contains_cell(other.start) && self.contains_cell(other.end)
        }

        #[inline]
        pub fn intersects(&self, other: &CellRange) -> bool {
            self.start.row <= other.end.row
                && other.start.row <= self.end.row
                && self.start.col <= other.end.col
                && other.start.col <= self.end.col
        }

        pub fn intersection(&self, other: &CellRange) -> Option<CellRange> {
            if !self.intersects(other) {
                return None;
            }
            Some(CellRange {
                start: CellRef::new(
                    self.start.row.max(other.start.row),
                    self.start.col.max(other.start.col),
                ),
                end: CellRef::new(self.end.row.min(other.end.row), self.end.col.min(other.end.col)),
            })
        }

        /// 从当前矩形中挖去 `other`，剩余部分以至多 4 个互不相交的矩形返回。
        pub fn subtract(&self, other: &CellRange) -> Vec<CellRange> {
            let Some(cut) = self.intersection(other) else {
                return vec![*self];
            };
            let mut pieces = Vec::with_capacity(4);
            if cut.start.row > self.start.row {
                pieces.push(CellRange {
                    start: self.start,
                    end: CellRef::new(cut.start.row - 1, self.end.col),
                });
            }
            if cut.end.row < self.end.row {
                pieces.push(CellRange {
                    start: CellRef::new(cut.end.row + 1, self.start.col),
                    end: self.end,
                });
            }
            if cut.start.col > self.start.col {
                pieces.push(CellRange {
                    start: CellRef::new(cut.start.row, self.start.col),
                    end: CellRef::new(cut.end.row, cut.start.col - 1),
                });
            }
            if cut.end.col < self.end.col {
                pieces.push(CellRange {
                    start: CellRef::new(cut.start.row, cut.end.col + 1),
                    end: CellRef::new(cut.end.row, self.end.col),
                });
            }
            pieces
        }
    }

    impl fmt::Display for CellRange {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            if self.is_single_cell() {
                write!(f, "{}", self.start)
            } else {
                write!(f, "{}:{}", self.start, self.end)
            }
        }
    }

    /// 标注几何：一个或多个矩形（用户选区可能不连续）。
    ///
    /// 序列化时使用规范化后的地址文本，例如 `"A1:D10,F2"`。
    #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
    #[serde(try_from = "String", into = "String")]
    pub struct Geometry {
        areas: Vec<CellRange>,
    }

    impl Geometry {
        /// 解析逗号分隔的区域列表。
        pub fn parse(text: &str) -> Result<Self, GeometryError> {
            if text.trim().is_empty() {
                return Err(GeometryError::malformed(text, "empty geometry"));
            }
            let areas = text
                .split(',')
                .map(|item| {
                    if item.trim().is_empty() {
                        Err(GeometryError::malformed(text, "empty area in list"))
                    } else {
                        CellRange::from_a1(item)
                    }
                })
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Self { areas })
        }

        pub fn from_areas(areas: impl IntoIterator<Item = CellRange>) -> Option<Self> {
            let areas: Vec<CellRange> = areas.into_iter().collect();
            if areas.is_empty() { None } else { Some(Self { areas }) }
        }

        #[inline]
        pub fn areas(&self) -> &[CellRange] {
            &self.areas
        }

        /// 任意一对矩形共享至少一个单元格即视为相交（完全包含是相交的特例）。
        pub fn intersects(&self, other: &Geometry) -> bool {
            self.areas
                .iter()
                .any(|a| other.areas.iter().any(|b| a.intersects(b)))
        }

        /// `other` 的每个矩形都完全落在 `self` 各矩形的并集内。
        pub fn contains(&self, other: &Geometry) -> bool {
            other.areas.iter().all(|target| {
                let mut remaining = vec![*target];
                for area in &self.areas {
                    remaining = remaining
                        .iter()
                        .flat_map(|piece| piece.subtract(area))
                        .collect();
                    if remaining.is_empty() {
                        return true;
                    }
                }
                remaining.is_empty()
            })
        }

        pub fn cell_count(&self) -> u64 {
            self.areas.iter().map(CellRange::cell_count).sum()
        }

        /// 去掉 `$` 标记后的地址文本。
        pub fn normalized(&self) -> String {
            self.to_string()
        }

        /// 用于派生标注名称的片段：分隔符 `:` 与 `,` 替换为 `_`。
        pub fn name_fragment(&self) -> String {
            self.normalized().replace([':', ','], "_")
        }
    }

    impl fmt::Display for Geometry {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            for (idx, area) in self.areas.iter().enumerate() {
                if idx > 0 {
                    f.write_str(",")?;
                }
                write!(f, "{area}")?;
            }
            Ok(())
        }
    }

    impl FromStr for Geometry {
        type Err = GeometryError;

        fn from_str(s: &str) -> Result<Self, Self::Err> {
            Self::parse(s)
        }
    }

    impl TryFrom<String> for Geometry {
        type Error = GeometryError;

        fn try_from(value: String) -> Result<Self, Self::Error> {
            Self::parse(&value)
        }
    }

    impl From<Geometry> for String {
        fn from(value: Geometry) -> Self {
            value.normalized()
        }
    }

    fn column_name(col: u32) -> String {
        let mut n = col + 1;
        let mut out = Vec::new();
        while n > 0 {
            let rem = ((n - 1) % 26) as u8;
            out.push(char::from(b'A' + rem));
            n = (n - 1) / 26;
        }
        out.iter().rev().collect()
    }

    fn column_index(letters: &str) -> Option<u32> {
        let mut col: u32 = 0;
        for b in letters.bytes() {
            let v = u32::from(b.to_ascii_uppercase() - b'A') + 1;
            col = col.checked_mul(26)?.checked_add(v)?;
        }
        if col == 0 || col > MAX_COLS {
            None
        } else {
            Some(col - 1)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn geom(text: &str) -> Geometry {
            Geometry::parse(text).expect("valid geometry")
        }

        #[test]
        fn cell_references_parse_with_absolute_markers() {
            assert_eq!(CellRef::from_a1("A1").unwrap(), CellRef::new(0, 0));
            assert_eq!(CellRef::from_a1("$B$2").unwrap(), CellRef::new(1, 1));
            assert_eq!(CellRef::from_a1("bc32").unwrap(), CellRef::new(31, 54));
            assert_eq!(CellRef::new(31, 54).to_a1(), "BC32");
            assert!(CellRef::from_a1("XFD1048576").is_ok());
            assert!(CellRef::from_a1("XFE1").is_err());
            assert!(CellRef::from_a1("A0").is_err());
            assert!(CellRef::from_a1("12").is_err());
            assert!(CellRef::from_a1("A1B").is_err());
        }

        #[test]
        fn out_of_grid_coordinates_are_clamped() {
            let cell = CellRef::new(u32::MAX, u32::MAX);
            assert_eq!(cell.row(), MAX_ROWS - 1);
            assert_eq!(cell.col(), MAX_COLS - 1);
            assert_eq!(cell.to_a1(), "XFD1048576");

            let decoded: CellRef =
                serde_json::from_str(r#"{"row":4294967295,"col":0}"#).expect("decode cell");
            assert_eq!(decoded.to_a1(), "A1048576");
        }

        #[test]
        fn ranges_are_normalized() {
            let range = CellRange::from_a1("D10:A1").unwrap();
            assert_eq!(range.start(), CellRef::new(0, 0));
            assert_eq!(range.end(), CellRef::new(9, 3));
            assert_eq!(range.to_string(), "A1:D10");
            assert_eq!(range.cell_count(), 40);
            assert!(CellRange::from_a1("C3").unwrap().is_single_cell());
            assert!(CellRange::from_a1("A1:B2:C3").is_err());
        }

        #[test]
        fn geometry_parsing_rejects_garbage() {
            assert_eq!(geom(" $A$1:$B$2 , D4").to_string(), "A1:B2,D4");
            for bad in ["", "  ", "A1,,B2", "A1:", "hello", "A1;B2"] {
                let err = Geometry::parse(bad).unwrap_err();
                assert!(matches!(err, GeometryError::Malformed { .. }), "{bad}");
            }
        }

        #[test]
        fn intersection_includes_shared_edges_and_containment() {
            assert!(geom("B2:C3").intersects(&geom("C3:D4")));
            assert!(geom("A1:J20").intersects(&geom("B2:C3")));
            assert!(!geom("A1:B2").intersects(&geom("C3:D4")));
            assert!(geom("A1,Z9").intersects(&geom("Y8:Z9")));
        }

        #[test]
        fn containment_is_union_coverage() {
            assert!(geom("A1:D10").contains(&geom("A1:D1")));
            assert!(!geom("A1:D1").contains(&geom("A1:D10")));
            assert!(!geom("A1:C3").contains(&geom("C3:D4")));
            // 目标跨越两个相邻矩形时仍视为被包含
            assert!(geom("A1:B4,C1:D4").contains(&geom("B2:C3")));
            assert!(!geom("A1:B4,D1:E4").contains(&geom("B2:D3")));
            assert!(geom("A1:D10").contains(&geom("A1:A2,D9:D10")));
        }

        #[test]
        fn subtract_leaves_disjoint_pieces() {
            let outer = CellRange::from_a1("A1:E5").unwrap();
            let hole = CellRange::from_a1("B2:C3").unwrap();
            let pieces = outer.subtract(&hole);
            let total: u64 = pieces.iter().map(CellRange::cell_count).sum();
            assert_eq!(total, 25 - 4);
            for (i, a) in pieces.iter().enumerate() {
                assert!(!a.intersects(&hole));
                for b in pieces.iter().skip(i + 1) {
                    assert!(!a.intersects(b));
                }
            }
        }

        #[test]
        fn name_fragment_replaces_separators() {
            assert_eq!(geom("$A$1:$D$10").name_fragment(), "A1_D10");
            assert_eq!(geom("A1:B2,C5").name_fragment(), "A1_B2_C5");
        }

        #[test]
        fn geometry_serializes_as_address_text() {
            let json = serde_json::to_string(&geom("A1:B2,C5")).unwrap();
            assert_eq!(json, "\"A1:B2,C5\"");
            let back: Geometry = serde_json::from_str(&json).unwrap();
            assert_eq!(back, geom("A1:B2,C5"));
            assert!(serde_json::from_str::<Geometry>("\"A1:\"").is_err());
        }
    }
}

pub mod classes {
    use std::collections::HashMap;

    use serde::{Deserialize, Serialize};
    use thiserror::Error;

    /// 渲染工具类型，对核心逻辑不透明，仅传递给渲染协作方。
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub enum AnnotationTool {
        #[serde(rename = "shape")]
        Shape,
        #[serde(rename = "textbox")]
        TextBox,
        #[serde(rename = "border_around")]
        BorderAround,
    }

    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct Rgb(pub u8, pub u8, pub u8);

    impl Default for Rgb {
        fn default() -> Self {
            Rgb(255, 255, 255)
        }
    }

    #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
    pub struct ClassStyle {
        #[serde(default)]
        pub color: Rgb,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub text: Option<String>,
    }

    /// 标注类别。`container` 存在即表示该类别是依赖类别（必须嵌套在指定容器类别内）。
    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    pub struct AnnotationClass {
        pub label: String,
        pub tool: AnnotationTool,
        #[serde(default)]
        pub is_container: bool,
        #[serde(default)]
        pub is_containable: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        pub container: Option<String>,
        #[serde(default)]
        pub style: ClassStyle,
    }

    impl AnnotationClass {
        pub fn new(label: impl Into<String>, tool: AnnotationTool) -> Self {
            Self {
                label: label.into(),
                tool,
                is_container: false,
                is_containable: false,
                container: None,
                style: ClassStyle::default(),
            }
        }

        pub fn container(mut self) -> Self {
            self.is_container = true;
            self
        }

        pub fn containable(mut self) -> Self {
            self.is_containable = true;
            self
        }

        /// 声明依赖的容器类别；依赖类别同时可被包含。
        pub fn depends_on(mut self, container: impl Into<String>) -> Self {
            self.is_containable = true;
            self.container = Some(container.into());
            self
        }

        pub fn with_color(mut self, r: u8, g: u8, b: u8) -> Self {
            self.style.color = Rgb(r, g, b);
            self
        }

        pub fn with_text(mut self, text: impl Into<String>) -> Self {
            self.style.text = Some(text.into());
            self
        }

        #[inline]
        pub fn is_dependent(&self) -> bool {
            self.container.is_some()
        }

        #[inline]
        pub fn container_label(&self) -> Option<&str> {
            self.container.as_deref()
        }
    }

    #[derive(Debug, Clone, PartialEq, Eq, Error)]
    pub enum RegistryError {
        #[error("class catalog is empty")]
        Empty,
        #[error("duplicate class label `{0}`")]
        DuplicateLabel(String),
        #[error("class `{class}` depends on unknown container `{container}`")]
        UnknownContainer { class: String, container: String },
        #[error("class `{class}` depends on `{container}`, which is not a container class")]
        NotAContainer { class: String, container: String },
        #[error("class `{0}` cannot depend on itself")]
        SelfDependency(String),
    }

    /// 加载期确定、运行期只读的类别目录，保持定义顺序。
    #[derive(Debug, Clone)]
    pub struct ClassRegistry {
        classes: Vec<AnnotationClass>,
        index: HashMap<String, usize>,
    }

    impl ClassRegistry {
        pub fn new(classes: Vec<AnnotationClass>) -> Result<Self, RegistryError> {
            if classes.is_empty() {
                return Err(RegistryError::Empty);
            }
            let mut index = HashMap::with_capacity(classes.len());
            for (pos, class) in classes.iter().enumerate() {
                if index.insert(class.label.clone(), pos).is_some() {
                    return Err(RegistryError::DuplicateLabel(class.label.clone()));
                }
            }
            for class in &classes {
                let Some(container) = class.container_label() else {
                    continue;
                };
                if container == class.label {
                    return Err(RegistryError::SelfDependency(class.label.clone()));
                }
                let Some(&pos) = index.get(container) else {
                    return Err(RegistryError::UnknownContainer {
                        class: class.label.clone(),
                        container: container.to_string(),
                    });
                };
                if !classes[pos].is_container {
                    return Err(RegistryError::NotAContainer {
                        class: class.label.clone(),
                        container: container.to_string(),
                    });
                }
            }
            Ok(Self { classes, index })
        }

        /// 默认类别目录：`Table` 可容纳其余类别；`Header`/`Attributes`/`Data` 只能位于 `Table` 内。
        pub fn standard() -> Self {
            let classes = vec![
                AnnotationClass::new("Table", AnnotationTool::Shape)
                    .container()
                    .with_color(68, 114, 196),
                AnnotationClass::new("Metadata", AnnotationTool::TextBox)
                    .containable()
                    .with_color(237, 125, 49)
                    .with_text("METADATA"),
                AnnotationClass::new("Header", AnnotationTool::TextBox)
                    .depends_on("Table")
                    .with_color(91, 155, 213)
                    .with_text("HEADER"),
                AnnotationClass::new("Attributes", AnnotationTool::TextBox)
                    .depends_on("Table")
                    .with_color(112, 48, 160)
                    .with_text("ATTRIBUTES"),
                AnnotationClass::new("Data", AnnotationTool::TextBox)
                    .depends_on("Table")
                    .with_color(112, 173, 71)
                    .with_text("DATA"),
                AnnotationClass::new("Derived", AnnotationTool::TextBox)
                    .containable()
                    .with_color(192, 0, 0)
                    .with_text("DERIVED"),
                AnnotationClass::new("Notes", AnnotationTool::TextBox)
                    .containable()
                    .with_color(255, 255, 49)
                    .with_text("NOTES"),
            ];
            let index = classes
                .iter()
                .enumerate()
                .map(|(pos, class)| (class.label.clone(), pos))
                .collect();
            Self { classes, index }
        }

        #[inline]
        pub fn get(&self, label: &str) -> Option<&AnnotationClass> {
            self.index.get(label).map(|&pos| &self.classes[pos])
        }

        #[inline]
        pub fn contains(&self, label: &str) -> bool {
            self.index.contains_key(label)
        }

        /// 依赖类别所要求的容器类别。
        pub fn container_of(&self, class: &AnnotationClass) -> Option<&AnnotationClass> {
            class.container_label().and_then(|label| self.get(label))
        }

        /// 标签对应的类别是否为容器；未知标签视为非容器。
        #[inline]
        pub fn is_container(&self, label: &str) -> bool {
            self.get(label).is_some_and(|class| class.is_container)
        }

        #[inline]
        pub fn iter(&self) -> impl Iterator<Item = &AnnotationClass> {
            self.classes.iter()
        }

        #[inline]
        pub fn len(&self) -> usize {
            self.classes.len()
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.classes.is_empty()
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn standard_catalog_keeps_definition_order() {
            let registry = ClassRegistry::standard();
            let labels: Vec<_> = registry.iter().map(|c| c.label.as_str()).collect();
            assert_eq!(
                labels,
                ["Table", "Metadata", "Header", "Attributes", "Data", "Derived", "Notes"]
            );
            let header = registry.get("Header").unwrap();
            assert!(header.is_dependent());
            assert_eq!(registry.container_of(header).unwrap().label, "Table");
            assert!(registry.is_container("Table"));
            assert!(!registry.is_container("Notes"));
            assert!(!registry.is_container("Missing"));
        }

        #[test]
        fn registry_rejects_inconsistent_catalogs() {
            let dup = ClassRegistry::new(vec![
                AnnotationClass::new("A", AnnotationTool::Shape),
                AnnotationClass::new("A", AnnotationTool::TextBox),
            ]);
            assert_eq!(dup.unwrap_err(), RegistryError::DuplicateLabel("A".into()));

            let unknown = ClassRegistry::new(vec![
                AnnotationClass::new("Cell", AnnotationTool::TextBox).depends_on("Grid"),
            ]);
            assert!(matches!(
                unknown.unwrap_err(),
                RegistryError::UnknownContainer { .. }
            ));

            let not_container = ClassRegistry::new(vec![
                AnnotationClass::new("Grid", AnnotationTool::Shape),
                AnnotationClass::new("Cell", AnnotationTool::TextBox).depends_on("Grid"),
            ]);
            assert!(matches!(
                not_container.unwrap_err(),
                RegistryError::NotAContainer { .. }
            ));

            let selfish = ClassRegistry::new(vec![
                AnnotationClass::new("Loop", AnnotationTool::Shape)
                    .container()
                    .depends_on("Loop"),
            ]);
            assert_eq!(
                selfish.unwrap_err(),
                RegistryError::SelfDependency("Loop".into())
            );

            assert_eq!(ClassRegistry::new(Vec::new()).unwrap_err(), RegistryError::Empty);
        }

        #[test]
        fn classes_deserialize_with_defaults() {
            let json = r#"{"label":"Header","tool":"textbox","container":"Table"}"#;
            let class: AnnotationClass = serde_json::from_str(json).unwrap();
            assert!(class.is_dependent());
            assert!(!class.is_container);
            assert_eq!(class.tool, AnnotationTool::TextBox);
            assert_eq!(class.style.color, Rgb(255, 255, 255));
        }
    }
}
