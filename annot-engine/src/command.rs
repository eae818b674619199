use std::collections::HashMap;

use annot_core::document::AnnotationStatus;

use crate::errors::EngineError;
use crate::session::AnnotationSession;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandRequest {
    pub name: String,
    pub args: Vec<String>,
}

impl CommandRequest {
    pub fn new<I, S>(name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// 解析一行命令文本。空行与 `#` 注释返回 `None`；双引号包围的参数可包含空格。
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }
        let mut tokens = tokenize(line).into_iter();
        let name = tokens.next()?;
        Some(Self {
            name,
            args: tokens.collect(),
        })
    }

    fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }
}

fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut pending = false;
    for ch in line.chars() {
        match ch {
            '"' => {
                quoted = !quoted;
                pending = true;
            }
            c if c.is_whitespace() && !quoted => {
                if pending {
                    tokens.push(std::mem::take(&mut current));
                    pending = false;
                }
            }
            c => {
                current.push(c);
                pending = true;
            }
        }
    }
    if pending {
        tokens.push(current);
    }
    tokens
}

#[derive(Debug, Clone)]
pub struct CommandResponse {
    pub success: bool,
    pub message: Option<String>,
}

impl CommandResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

impl From<EngineError> for CommandResponse {
    fn from(err: EngineError) -> Self {
        CommandResponse::err(err.to_string())
    }
}

pub trait CommandHandler: Send + Sync {
    fn name(&self) -> &'static str;
    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse;
}

pub struct CommandContext<'a> {
    pub session: &'a mut AnnotationSession,
}

impl CommandContext<'_> {
    /// 取第 `index` 个参数作为工作表名，缺省时使用活动工作表。
    fn sheet_arg(&self, request: &CommandRequest, index: usize) -> Result<String, CommandResponse> {
        request
            .arg(index)
            .or(self.session.active_sheet())
            .map(str::to_string)
            .ok_or_else(|| CommandResponse::err("没有活动工作表"))
    }
}

pub struct CommandBus {
    handlers: HashMap<&'static str, Box<dyn CommandHandler>>,
}

impl Default for CommandBus {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandBus {
    pub fn new() -> Self {
        let mut bus = Self {
            handlers: HashMap::new(),
        };
        bus.register(AnnotateCommand);
        bus.register(UndoCommand);
        bus.register(RedoCommand);
        bus.register(ActivateCommand);
        bus.register(DeleteRegionCommand);
        bus.register(DeleteRangeCommand);
        bus.register(DeleteSheetCommand);
        bus.register(DeleteAllCommand);
        bus.register(VisibilityCommand { visible: false });
        bus.register(VisibilityCommand { visible: true });
        bus.register(SheetCompletedCommand);
        bus.register(SheetNotApplicableCommand);
        bus.register(WorkbookCompletedCommand);
        bus.register(WorkbookNotApplicableCommand);
        bus.register(SaveCommand);
        bus
    }

    pub fn register<H: CommandHandler + 'static>(&mut self, handler: H) {
        self.handlers.insert(handler.name(), Box::new(handler));
    }

    pub fn dispatch(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        if let Some(handler) = self.handlers.get(request.name.as_str()) {
            handler.execute(request, context)
        } else {
            CommandResponse::err(format!("未知命令: {}", request.name))
        }
    }

    pub fn available_commands(&self) -> impl Iterator<Item = &&'static str> {
        self.handlers.keys()
    }
}

pub fn status_label(status: AnnotationStatus) -> &'static str {
    match status {
        AnnotationStatus::InProgress => "进行中",
        AnnotationStatus::Completed => "已完成",
        AnnotationStatus::NotApplicable => "不适用",
    }
}

/// `annotate <类别> <区域> [工作表]`
struct AnnotateCommand;

impl CommandHandler for AnnotateCommand {
    fn name(&self) -> &'static str {
        "annotate"
    }

    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        let (Some(class), Some(areas)) = (request.arg(0), request.arg(1)) else {
            return CommandResponse::err("用法: annotate <类别> <区域> [工作表]");
        };
        let sheet = match context.sheet_arg(request, 2) {
            Ok(sheet) => sheet,
            Err(response) => return response,
        };
        let outcome = context.session.annotate(&sheet, areas, class);
        match outcome.error {
            None => CommandResponse::ok(format!("已创建: {}", outcome.committed.join(", "))),
            Some(err) if outcome.committed.is_empty() => err.into(),
            Some(err) => CommandResponse::err(format!(
                "部分创建: {}；失败原因: {err}",
                outcome.committed.join(", ")
            )),
        }
    }
}

struct UndoCommand;

impl CommandHandler for UndoCommand {
    fn name(&self) -> &'static str {
        "undo"
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        match context.session.undo() {
            Ok(Some(name)) => CommandResponse::ok(format!("已撤销: {name}")),
            Ok(None) => CommandResponse::ok("没有可撤销的操作"),
            Err(err) => err.into(),
        }
    }
}

struct RedoCommand;

impl CommandHandler for RedoCommand {
    fn name(&self) -> &'static str {
        "redo"
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        match context.session.redo() {
            Ok(Some(name)) => CommandResponse::ok(format!("已重做: {name}")),
            Ok(None) => CommandResponse::ok("没有可重做的操作"),
            Err(err) => err.into(),
        }
    }
}

struct ActivateCommand;

impl CommandHandler for ActivateCommand {
    fn name(&self) -> &'static str {
        "activate"
    }

    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        let Some(sheet) = request.arg(0) else {
            return CommandResponse::err("用法: activate <工作表>");
        };
        match context.session.activate_sheet(sheet) {
            Ok(()) => CommandResponse::ok(format!("活动工作表: {sheet}")),
            Err(err) => err.into(),
        }
    }
}

/// `delete <名称> [工作表]`，连同子标注一起删除。
struct DeleteRegionCommand;

impl CommandHandler for DeleteRegionCommand {
    fn name(&self) -> &'static str {
        "delete"
    }

    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        let Some(name) = request.arg(0) else {
            return CommandResponse::err("用法: delete <名称> [工作表]");
        };
        let sheet = match context.sheet_arg(request, 1) {
            Ok(sheet) => sheet,
            Err(response) => return response,
        };
        match context.session.delete_region(&sheet, name) {
            Ok(deleted) => CommandResponse::ok(format!("已删除 {} 个标注", deleted.len())),
            Err(err) => err.into(),
        }
    }
}

/// `delete_range <区域> [工作表]`
struct DeleteRangeCommand;

impl CommandHandler for DeleteRangeCommand {
    fn name(&self) -> &'static str {
        "delete_range"
    }

    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        let Some(areas) = request.arg(0) else {
            return CommandResponse::err("用法: delete_range <区域> [工作表]");
        };
        let sheet = match context.sheet_arg(request, 1) {
            Ok(sheet) => sheet,
            Err(response) => return response,
        };
        match context.session.delete_in_range(&sheet, areas) {
            Ok(deleted) => CommandResponse::ok(format!("已删除 {} 个标注", deleted.len())),
            Err(err) => err.into(),
        }
    }
}

struct DeleteSheetCommand;

impl CommandHandler for DeleteSheetCommand {
    fn name(&self) -> &'static str {
        "delete_sheet"
    }

    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        let sheet = match context.sheet_arg(request, 0) {
            Ok(sheet) => sheet,
            Err(response) => return response,
        };
        match context.session.delete_sheet_annotations(&sheet) {
            Ok(count) => CommandResponse::ok(format!("已删除工作表 {sheet} 的 {count} 个标注")),
            Err(err) => err.into(),
        }
    }
}

struct DeleteAllCommand;

impl CommandHandler for DeleteAllCommand {
    fn name(&self) -> &'static str {
        "delete_all"
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        match context.session.delete_all() {
            Ok(count) => CommandResponse::ok(format!("已删除全部 {count} 个标注")),
            Err(err) => err.into(),
        }
    }
}

/// `hide [工作表]` / `show [工作表]`，省略工作表时作用于整个工作簿。
struct VisibilityCommand {
    visible: bool,
}

impl CommandHandler for VisibilityCommand {
    fn name(&self) -> &'static str {
        if self.visible { "show" } else { "hide" }
    }

    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        let sheet = request.arg(0);
        match context.session.set_visibility(sheet, self.visible) {
            Ok(()) => {
                let scope = sheet.unwrap_or("全部工作表");
                let action = if self.visible { "显示" } else { "隐藏" };
                CommandResponse::ok(format!("已{action}标注: {scope}"))
            }
            Err(err) => err.into(),
        }
    }
}

struct SheetCompletedCommand;

impl CommandHandler for SheetCompletedCommand {
    fn name(&self) -> &'static str {
        "sheet_completed"
    }

    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        let sheet = match context.sheet_arg(request, 0) {
            Ok(sheet) => sheet,
            Err(response) => return response,
        };
        match context.session.toggle_sheet_completed(&sheet) {
            Ok(status) => CommandResponse::ok(format!("工作表 {sheet}: {}", status_label(status))),
            Err(err) => err.into(),
        }
    }
}

struct SheetNotApplicableCommand;

impl CommandHandler for SheetNotApplicableCommand {
    fn name(&self) -> &'static str {
        "sheet_not_applicable"
    }

    fn execute(
        &self,
        request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        let sheet = match context.sheet_arg(request, 0) {
            Ok(sheet) => sheet,
            Err(response) => return response,
        };
        match context.session.toggle_sheet_not_applicable(&sheet) {
            Ok(status) => CommandResponse::ok(format!("工作表 {sheet}: {}", status_label(status))),
            Err(err) => err.into(),
        }
    }
}

struct WorkbookCompletedCommand;

impl CommandHandler for WorkbookCompletedCommand {
    fn name(&self) -> &'static str {
        "workbook_completed"
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        match context.session.toggle_workbook_completed() {
            Ok(status) => CommandResponse::ok(format!("工作簿: {}", status_label(status))),
            Err(err) => err.into(),
        }
    }
}

struct WorkbookNotApplicableCommand;

impl CommandHandler for WorkbookNotApplicableCommand {
    fn name(&self) -> &'static str {
        "workbook_not_applicable"
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        match context.session.toggle_workbook_not_applicable() {
            Ok(status) => CommandResponse::ok(format!("工作簿: {}", status_label(status))),
            Err(err) => err.into(),
        }
    }
}

struct SaveCommand;

impl CommandHandler for SaveCommand {
    fn name(&self) -> &'static str {
        "save"
    }

    fn execute(
        &self,
        _request: &CommandRequest,
        context: &mut CommandContext<'_>,
    ) -> CommandResponse {
        if !context.session.is_dirty() {
            return CommandResponse::ok("没有需要保存的修改");
        }
        match context.session.save() {
            Ok(()) => CommandResponse::ok("已保存"),
            Err(err) => err.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use annot_core::classes::ClassRegistry;

    use super::*;
    use crate::collaborators::memory::{MemoryRecordStore, MemoryRenderer};

    fn session() -> AnnotationSession {
        let mut session = AnnotationSession::new(
            ClassRegistry::standard(),
            Box::new(MemoryRenderer::new()),
            Box::new(MemoryRecordStore::new()),
        );
        session.open_workbook("book.xlsx", &["Sheet1", "Sales 2024"]).unwrap();
        session
    }

    fn run(bus: &CommandBus, context: &mut CommandContext<'_>, line: &str) -> CommandResponse {
        let request = CommandRequest::parse(line).expect("command line");
        bus.dispatch(&request, context)
    }

    #[test]
    fn parse_handles_quotes_and_comments() {
        assert_eq!(CommandRequest::parse("   "), None);
        assert_eq!(CommandRequest::parse("# note"), None);
        let request = CommandRequest::parse(r#"annotate Table A1:D10 "Sales 2024""#).unwrap();
        assert_eq!(request, CommandRequest::new("annotate", ["Table", "A1:D10", "Sales 2024"]));
        let request = CommandRequest::parse(r#"activate """#).unwrap();
        assert_eq!(request.args, vec![String::new()]);
    }

    #[test]
    fn annotate_undo_redo_round_trip() {
        let mut session = session();
        let bus = CommandBus::new();
        let mut context = CommandContext {
            session: &mut session,
        };

        assert!(run(&bus, &mut context, "annotate Table A1:D10").success);
        assert!(run(&bus, &mut context, "annotate Header A1:D1").success);
        let response = run(&bus, &mut context, "undo");
        assert!(response.success);
        assert_eq!(
            response.message.as_deref(),
            Some("已撤销: SHEET1_ANNOTATION_HEADER_A1_D1")
        );
        assert!(run(&bus, &mut context, "redo").success);
        assert_eq!(context.session.workbook().region_count(), 2);
    }

    #[test]
    fn rejections_are_reported_as_failures() {
        let mut session = session();
        let bus = CommandBus::new();
        let mut context = CommandContext {
            session: &mut session,
        };

        let response = run(&bus, &mut context, "annotate Header A1:D1");
        assert!(!response.success);
        assert!(response.message.unwrap().contains("not inside the borders"));

        let response = run(&bus, &mut context, "annotate Notes A1:B2,A2:C3");
        assert!(!response.success);
        assert!(response.message.unwrap().starts_with("部分创建"));

        let response = run(&bus, &mut context, "frobnicate");
        assert_eq!(response.message.as_deref(), Some("未知命令: frobnicate"));
    }

    #[test]
    fn sheet_arguments_accept_quoted_names() {
        let mut session = session();
        let bus = CommandBus::new();
        let mut context = CommandContext {
            session: &mut session,
        };

        assert!(run(&bus, &mut context, r#"annotate Notes B2 "Sales 2024""#).success);
        assert_eq!(context.session.active_sheet(), Some("Sales 2024"));
        let response = run(&bus, &mut context, r#"sheet_completed "Sales 2024""#);
        assert_eq!(response.message.as_deref(), Some("工作表 Sales 2024: 已完成"));
        assert!(run(&bus, &mut context, "hide").success);
        assert!(run(&bus, &mut context, "save").success);
        assert!(!context.session.is_dirty());
    }

    #[test]
    fn bulk_commands_empty_the_workbook() {
        let mut session = session();
        let bus = CommandBus::new();
        let mut context = CommandContext {
            session: &mut session,
        };
        run(&bus, &mut context, "annotate Notes A1:B2,D1:E2");
        let response = run(&bus, &mut context, "delete_range A1:B2");
        assert_eq!(response.message.as_deref(), Some("已删除 1 个标注"));
        assert!(run(&bus, &mut context, "delete_all").success);
        assert_eq!(context.session.workbook().region_count(), 0);

        let mut names: Vec<_> = bus.available_commands().copied().collect();
        names.sort_unstable();
        assert_eq!(names.len(), 15);
        assert!(names.contains(&"workbook_not_applicable"));
    }
}
