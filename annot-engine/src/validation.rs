//! 区域标注校验：依赖/包含/互斥规则，以及最小外层容器的求解。

use annot_core::classes::{AnnotationClass, ClassRegistry};
use annot_core::document::{RangeAnnotation, RegionId, WorksheetAnnotation};
use annot_core::geometry::Geometry;

use crate::errors::EngineError;

/// 待校验的候选标注。
#[derive(Debug, Clone, Copy)]
pub struct Candidate<'a> {
    pub class: &'a AnnotationClass,
    pub geometry: &'a Geometry,
}

/// 校验结论。拒绝时携带冲突对象的名称或所需的容器类别。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accept { parent: Option<RegionId> },
    NotContained { container: String },
    Overlapping { conflicting: String },
}

impl Verdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, Verdict::Accept { .. })
    }

    pub fn into_result(self, candidate: &Candidate<'_>) -> Result<Option<RegionId>, EngineError> {
        match self {
            Verdict::Accept { parent } => Ok(parent),
            Verdict::NotContained { container } => Err(EngineError::NotContained {
                class: candidate.class.label.clone(),
                container,
                area: candidate.geometry.normalized(),
            }),
            Verdict::Overlapping { conflicting } => Err(EngineError::Overlapping {
                class: candidate.class.label.clone(),
                area: candidate.geometry.normalized(),
                conflicting,
            }),
        }
    }
}

/// 按候选类别分支校验，并在通过时给出解析出的父标注。
///
/// `sheet` 为空表示该工作表尚无任何标注。
pub fn validate(
    candidate: &Candidate<'_>,
    sheet: Option<&WorksheetAnnotation>,
    registry: &ClassRegistry,
) -> Verdict {
    let class = candidate.class;
    let geometry = candidate.geometry;

    if let Some(container_label) = class.container_label() {
        let Some(sheet) = sheet else {
            return Verdict::NotContained {
                container: container_label.to_string(),
            };
        };
        let containers = sheet.regions_of_class(container_label);
        let Some(parent) = smallest_enclosing_parent(containers, geometry, registry) else {
            return Verdict::NotContained {
                container: container_label.to_string(),
            };
        };
        // 依赖类别只与同一容器下的兄弟标注比较，不做任何豁免
        return match first_overlap(sheet.children_of(parent.id()), geometry, false, registry) {
            Some(conflict) => Verdict::Overlapping {
                conflicting: conflict.name().to_string(),
            },
            None => Verdict::Accept {
                parent: Some(parent.id()),
            },
        };
    }

    let Some(sheet) = sheet else {
        return Verdict::Accept { parent: None };
    };

    if class.is_containable {
        if let Some(conflict) = first_overlap(sheet.regions(), geometry, true, registry) {
            return Verdict::Overlapping {
                conflicting: conflict.name().to_string(),
            };
        }
        let parent = smallest_enclosing_parent(sheet.regions(), geometry, registry);
        return Verdict::Accept {
            parent: parent.map(RangeAnnotation::id),
        };
    }

    match first_overlap(sheet.regions(), geometry, false, registry) {
        Some(conflict) => Verdict::Overlapping {
            conflicting: conflict.name().to_string(),
        },
        None => Verdict::Accept { parent: None },
    }
}

/// 返回第一个与 `geometry` 相交的标注；`ignore_containers` 为真时跳过容器类别。
pub fn first_overlap<'a, I>(
    regions: I,
    geometry: &Geometry,
    ignore_containers: bool,
    registry: &ClassRegistry,
) -> Option<&'a RangeAnnotation>
where
    I: IntoIterator<Item = &'a RangeAnnotation>,
{
    regions.into_iter().find(|region| {
        region.geometry().intersects(geometry)
            && !(ignore_containers && registry.is_container(region.class_label()))
    })
}

/// 在完全包含 `geometry` 的容器标注中找出最内层的一个。
///
/// 标注之间互不部分重叠，因此所有包含同一点集的容器构成一条严格的包含链，
/// 线性归约即可收敛到唯一的最内层容器，与输入顺序无关。
pub fn smallest_enclosing_parent<'a, I>(
    regions: I,
    geometry: &Geometry,
    registry: &ClassRegistry,
) -> Option<&'a RangeAnnotation>
where
    I: IntoIterator<Item = &'a RangeAnnotation>,
{
    regions
        .into_iter()
        .filter(|region| {
            registry.is_container(region.class_label()) && region.geometry().contains(geometry)
        })
        .reduce(|smallest, next| {
            if smallest.geometry().contains(next.geometry()) {
                next
            } else {
                smallest
            }
        })
}

#[cfg(test)]
mod tests {
    use annot_core::classes::AnnotationTool;
    use annot_core::document::WorkbookAnnotation;

    use super::*;

    const SHEET: &str = "Sheet1";

    struct Fixture {
        registry: ClassRegistry,
        book: WorkbookAnnotation,
    }

    impl Fixture {
        fn standard() -> Self {
            Self::with_registry(ClassRegistry::standard())
        }

        fn with_registry(registry: ClassRegistry) -> Self {
            Self {
                registry,
                book: WorkbookAnnotation::new("book.xlsx"),
            }
        }

        fn verdict(&self, class: &str, area: &str) -> Verdict {
            let class = self.registry.get(class).expect("known class");
            let geometry = Geometry::parse(area).expect("valid area");
            validate(
                &Candidate {
                    class,
                    geometry: &geometry,
                },
                self.book.sheet(SHEET),
                &self.registry,
            )
        }

        /// 校验通过后提交，返回新标注 ID。
        fn place(&mut self, class: &str, area: &str) -> RegionId {
            let parent = match self.verdict(class, area) {
                Verdict::Accept { parent } => parent,
                other => panic!("{class} at {area} rejected: {other:?}"),
            };
            let id = self.book.allocate_id();
            let region =
                RangeAnnotation::new(id, SHEET, 0, class, Geometry::parse(area).unwrap())
                    .with_parent(parent);
            self.book.add_region(region).unwrap();
            id
        }

        fn parent_of(&self, id: RegionId) -> Option<RegionId> {
            self.book.sheet(SHEET).and_then(|s| s.get_by_id(id)).and_then(|r| r.parent())
        }
    }

    #[test]
    fn committed_regions_only_overlap_their_containers() {
        let mut fx = Fixture::standard();
        let attempts = [
            ("Table", "A1:D10", true),
            ("Header", "A1:D1", true),
            ("Data", "A2:D10", true),
            ("Notes", "C5", false),
            ("Table", "C3:F12", false),
            ("Table", "F1:H5", true),
            ("Metadata", "F1:G1", true),
            ("Header", "F1:H1", false),
            ("Attributes", "F2:H5", true),
            ("Notes", "J1:K2", true),
            ("Derived", "K2:L3", false),
            ("Derived", "E1:E12", true),
            ("Data", "J10", false),
            ("Table", "J5:L8", true),
            ("Data", "J5:L8", true),
            ("Metadata", "A12:D12", true),
            ("Notes", "A11:H11", false),
            ("Header", "J5:L5", false),
        ];
        for (class, area, accepted) in attempts {
            if accepted {
                fx.place(class, area);
            } else {
                assert!(!fx.verdict(class, area).is_accept(), "{class} at {area} accepted");
            }
        }

        let regions: Vec<&RangeAnnotation> = fx.book.sheet(SHEET).unwrap().regions().collect();
        assert_eq!(regions.len(), 11);
        for (i, a) in regions.iter().enumerate() {
            for b in &regions[i + 1..] {
                if !a.geometry().intersects(b.geometry()) {
                    continue;
                }
                let nested = |outer: &RangeAnnotation, inner: &RangeAnnotation| {
                    fx.registry.is_container(outer.class_label())
                        && outer.geometry().contains(inner.geometry())
                };
                assert!(
                    nested(*a, *b) || nested(*b, *a),
                    "{} overlaps {}",
                    a.name(),
                    b.name()
                );
            }
        }
    }

    fn nested_registry() -> ClassRegistry {
        ClassRegistry::new(vec![
            AnnotationClass::new("Section", AnnotationTool::BorderAround)
                .container()
                .containable(),
            AnnotationClass::new("Table", AnnotationTool::Shape)
                .container()
                .containable(),
            AnnotationClass::new("Data", AnnotationTool::TextBox).depends_on("Table"),
            AnnotationClass::new("Notes", AnnotationTool::TextBox).containable(),
            AnnotationClass::new("Label", AnnotationTool::TextBox),
        ])
        .unwrap()
    }

    #[test]
    fn dependent_inside_container_is_accepted() {
        let mut fx = Fixture::standard();
        let table = fx.place("Table", "A1:D10");
        let header = fx.place("Header", "A1:D1");
        assert_eq!(fx.parent_of(header), Some(table));
    }

    #[test]
    fn dependent_without_container_is_rejected() {
        let fx = Fixture::standard();
        assert_eq!(
            fx.verdict("Header", "A1:D1"),
            Verdict::NotContained {
                container: "Table".into()
            }
        );
    }

    #[test]
    fn dependent_partially_outside_container_is_rejected() {
        let mut fx = Fixture::standard();
        fx.place("Table", "A1:D10");
        assert!(matches!(
            fx.verdict("Data", "C9:E12"),
            Verdict::NotContained { .. }
        ));
    }

    #[test]
    fn identical_plain_regions_overlap() {
        let mut fx = Fixture::with_registry(nested_registry());
        fx.place("Label", "A1:B2");
        assert!(matches!(
            fx.verdict("Label", "A1:B2"),
            Verdict::Overlapping { .. }
        ));
    }

    #[test]
    fn siblings_inside_one_container_may_not_share_cells() {
        let mut fx = Fixture::standard();
        fx.place("Table", "A1:J20");
        let first = fx.place("Data", "B2:C3");
        let verdict = fx.verdict("Data", "C3:D4");
        let first_name = fx.book.sheet(SHEET).unwrap().get_by_id(first).unwrap().name().to_string();
        assert_eq!(
            verdict,
            Verdict::Overlapping {
                conflicting: first_name
            }
        );
        assert!(fx.verdict("Data", "E5:F6").is_accept());
    }

    #[test]
    fn containable_ignores_containers_but_not_peers() {
        let mut fx = Fixture::standard();
        let table = fx.place("Table", "A1:J20");
        let notes = fx.place("Notes", "B2:C3");
        assert_eq!(fx.parent_of(notes), Some(table));

        // 位于容器之外的可包含类别没有父标注
        let outside = fx.place("Metadata", "L1:M2");
        assert_eq!(fx.parent_of(outside), None);

        assert!(matches!(
            fx.verdict("Derived", "C3:D4"),
            Verdict::Overlapping { .. }
        ));
    }

    #[test]
    fn plain_class_cannot_overlap_a_container() {
        let mut fx = Fixture::standard();
        fx.place("Notes", "B2:C3");
        // Table 既非依赖也非可包含，不能覆盖已有标注
        assert!(matches!(
            fx.verdict("Table", "A1:J20"),
            Verdict::Overlapping { .. }
        ));
    }

    #[test]
    fn innermost_container_wins_regardless_of_insertion_order() {
        let mut fx = Fixture::with_registry(nested_registry());
        let outer = fx.place("Table", "A1:Z50");
        let inner = fx.place("Table", "B2:H10");
        let data = fx.place("Data", "C3:D4");
        assert_eq!(fx.parent_of(inner), Some(outer));
        assert_eq!(fx.parent_of(data), Some(inner));

        let sheet = fx.book.sheet(SHEET).unwrap();
        let geometry = Geometry::parse("C3:D4").unwrap();
        let mut regions: Vec<&RangeAnnotation> = sheet.regions().collect();
        let forward = smallest_enclosing_parent(regions.iter().copied(), &geometry, &fx.registry)
            .map(RangeAnnotation::id);
        regions.reverse();
        let backward = smallest_enclosing_parent(regions.iter().copied(), &geometry, &fx.registry)
            .map(RangeAnnotation::id);
        assert_eq!(forward, Some(inner));
        assert_eq!(backward, Some(inner));
    }

    #[test]
    fn permutations_of_a_containment_chain_agree() {
        let mut fx = Fixture::with_registry(nested_registry());
        fx.place("Section", "A1:Z100");
        fx.place("Section", "B2:Y90");
        fx.place("Table", "C3:X80");
        let innermost = fx.place("Table", "D4:W70");

        let sheet = fx.book.sheet(SHEET).unwrap();
        let geometry = Geometry::parse("E5:F6").unwrap();
        let base: Vec<&RangeAnnotation> = sheet.regions().collect();
        for rotation in 0..base.len() {
            let mut order = base.clone();
            order.rotate_left(rotation);
            if rotation % 2 == 1 {
                order.swap(0, 1);
            }
            let found = smallest_enclosing_parent(order, &geometry, &fx.registry).map(RangeAnnotation::id);
            assert_eq!(found, Some(innermost), "rotation {rotation}");
        }
    }

    #[test]
    fn dependent_resolves_among_its_container_class_only() {
        let mut fx = Fixture::with_registry(nested_registry());
        let table = fx.place("Table", "A1:J20");
        // Section 是容器但不是 Data 所需的容器类别
        let section = fx.place("Section", "B2:E8");
        assert_eq!(fx.parent_of(section), Some(table));
        let data = fx.place("Data", "G10:H12");
        assert_eq!(fx.parent_of(data), Some(table));

        // Section 是 Table 的子标注，兄弟检查不做豁免
        assert!(matches!(
            fx.verdict("Data", "C3:D4"),
            Verdict::Overlapping { .. }
        ));
    }

    #[test]
    fn overlap_check_skips_only_container_classes() {
        let fx = Fixture::with_registry(nested_registry());
        let registry = &fx.registry;
        let table = RangeAnnotation::new(
            RegionId::new(1),
            SHEET,
            0,
            "Table",
            Geometry::parse("A1:D4").unwrap(),
        );
        let notes = RangeAnnotation::new(
            RegionId::new(2),
            SHEET,
            0,
            "Notes",
            Geometry::parse("F1:G2").unwrap(),
        );
        let regions = [table, notes];
        let selection = Geometry::parse("B2:G2").unwrap();
        let hit = first_overlap(&regions, &selection, true, registry).unwrap();
        assert_eq!(hit.class_label(), "Notes");
        let hit = first_overlap(&regions, &selection, false, registry).unwrap();
        assert_eq!(hit.class_label(), "Table");
    }
}
