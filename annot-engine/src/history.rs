use annot_core::document::RangeAnnotation;
use tracing::debug;

/// 撤销/重做栈，作用于当前活动工作表。
///
/// 新建标注只压入撤销栈，不会隐式清空重做栈；切换工作表与批量破坏性操作通过
/// `clear_all` 显式清空两个栈，清空后的历史不可恢复。
#[derive(Debug, Default, Clone)]
pub struct History {
    undo: Vec<RangeAnnotation>,
    redo: Vec<RangeAnnotation>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn push_create(&mut self, region: RangeAnnotation) {
        self.undo.push(region);
    }

    /// 重做成功或撤销失败时把标注放回撤销栈。
    #[inline]
    pub fn push_undo(&mut self, region: RangeAnnotation) {
        self.undo.push(region);
    }

    #[inline]
    pub fn pop_undo(&mut self) -> Option<RangeAnnotation> {
        self.undo.pop()
    }

    #[inline]
    pub fn pop_redo(&mut self) -> Option<RangeAnnotation> {
        self.redo.pop()
    }

    #[inline]
    pub fn push_redo(&mut self, region: RangeAnnotation) {
        self.redo.push(region);
    }

    #[inline]
    pub fn peek_undo(&self) -> Option<&RangeAnnotation> {
        self.undo.last()
    }

    #[inline]
    pub fn peek_redo(&self) -> Option<&RangeAnnotation> {
        self.redo.last()
    }

    #[inline]
    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    #[inline]
    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    pub fn clear_all(&mut self) {
        if !self.undo.is_empty() || !self.redo.is_empty() {
            debug!(
                undo = self.undo.len(),
                redo = self.redo.len(),
                "清空撤销/重做历史"
            );
        }
        self.undo.clear();
        self.redo.clear();
    }
}
