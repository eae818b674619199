//! 终端渲染协作方：把标注图形记录为文本描述，供 CLI 概览输出。

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use annot_core::classes::{AnnotationClass, AnnotationTool, Rgb};
use annot_core::geometry::Geometry;
use annot_engine::collaborators::{CollaboratorError, Renderer};
use tracing::debug;

/// 单个已绘制的标注图形。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsoleVisual {
    pub description: String,
    pub visible: bool,
}

/// 可克隆的句柄；克隆体共享同一份图形表，会话持有一份，概览输出持有另一份。
#[derive(Debug, Clone, Default)]
pub struct ConsoleRenderer {
    visuals: Arc<Mutex<BTreeMap<String, ConsoleVisual>>>,
}

impl ConsoleRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    fn visuals(&self) -> MutexGuard<'_, BTreeMap<String, ConsoleVisual>> {
        self.visuals.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn visual(&self, name: &str) -> Option<ConsoleVisual> {
        self.visuals().get(name).cloned()
    }

    pub fn len(&self) -> usize {
        self.visuals().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn hex(color: Rgb) -> String {
    format!("#{:02X}{:02X}{:02X}", color.0, color.1, color.2)
}

/// 按工具类型生成图形描述。
pub fn describe(class: &AnnotationClass, geometry: &Geometry) -> Result<String, CollaboratorError> {
    let address = geometry.normalized();
    let color = hex(class.style.color);
    let description = match class.tool {
        AnnotationTool::Shape => format!("矩形 {address} 填充 {color}"),
        AnnotationTool::TextBox => {
            let caption = class.style.text.as_deref().unwrap_or(&class.label);
            format!("文本框 {address} 「{caption}」 {color}")
        }
        AnnotationTool::BorderAround => {
            if geometry.areas().len() > 1 {
                return Err(CollaboratorError::Rendering {
                    name: class.label.clone(),
                    reason: format!("边框工具不支持不连续区域 {address}"),
                });
            }
            format!("边框 {address} {color}")
        }
    };
    Ok(description)
}

impl Renderer for ConsoleRenderer {
    fn realize(
        &mut self,
        name: &str,
        class: &AnnotationClass,
        geometry: &Geometry,
    ) -> Result<(), CollaboratorError> {
        let description = describe(class, geometry).map_err(|err| match err {
            CollaboratorError::Rendering { reason, .. } => CollaboratorError::Rendering {
                name: name.to_string(),
                reason,
            },
            other => other,
        })?;
        debug!(name, description = %description, "绘制标注");
        self.visuals().insert(
            name.to_string(),
            ConsoleVisual {
                description,
                visible: true,
            },
        );
        Ok(())
    }

    fn remove(&mut self, name: &str) -> bool {
        let removed = self.visuals().remove(name).is_some();
        if removed {
            debug!(name, "移除标注图形");
        }
        removed
    }

    fn set_visible(&mut self, name_prefix: &str, visible: bool) {
        let mut visuals = self.visuals();
        let mut touched = 0usize;
        for (_, visual) in visuals
            .iter_mut()
            .filter(|(name, _)| name.starts_with(name_prefix))
        {
            visual.visible = visible;
            touched += 1;
        }
        debug!(prefix = name_prefix, visible, touched, "更新标注可见性");
    }
}
