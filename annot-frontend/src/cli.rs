use annot_core::document::{RangeAnnotation, WorksheetAnnotation};
use annot_engine::command::{CommandBus, CommandContext, CommandRequest, status_label};
use annot_engine::session::AnnotationSession;
use tracing::{info, warn};

use crate::loader::{LoadedSession, RecordSource};
use crate::renderer::ConsoleRenderer;

/// 内置演示脚本，覆盖创建、拒绝、撤销/重做、可见性与状态切换。
pub const DEMO_SCRIPT: &str = r#"
# 在活动工作表上搭建一个带表头与数据区的表格
annotate Table A1:F20
annotate Header A1:F1
annotate Data A2:F20
annotate Notes H1:J3
# 表格外的表头会被拒绝
annotate Header B25:C25
# 与备注区重叠
annotate Metadata I2:K4
undo
redo
annotate Derived L1:M2,L4:M5
hide
show
sheet_completed
save
"#;

/// 脚本执行统计。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScriptReport {
    pub executed: usize,
    pub failed: usize,
}

/// 逐行执行命令脚本，失败的命令只报告不中断。
pub fn run_script(bus: &CommandBus, context: &mut CommandContext<'_>, script: &str) -> ScriptReport {
    let mut report = ScriptReport::default();
    for (index, line) in script.lines().enumerate() {
        let Some(request) = CommandRequest::parse(line) else {
            continue;
        };
        report.executed += 1;
        let response = bus.dispatch(&request, context);
        let message = response.message.unwrap_or_default();
        if response.success {
            println!("[命令] {} -> {message}", line.trim());
        } else {
            report.failed += 1;
            warn!(line = index + 1, command = %request.name, "命令执行失败");
            println!("[失败] {} -> {message}", line.trim());
        }
    }
    info!(executed = report.executed, failed = report.failed, "脚本执行完毕");
    report
}

/// 执行脚本并打印会话概览。
pub fn run(loaded: LoadedSession, script: &str) -> ScriptReport {
    let LoadedSession {
        mut session,
        source,
        renderer,
        restored,
        unrendered,
    } = loaded;

    println!("区域标注 CLI");
    match &source {
        RecordSource::File(path) => {
            println!("标注记录文件：{}（已恢复 {restored} 个标注）", path.display());
        }
        RecordSource::Memory => println!("标注记录保存在内存中"),
    }
    for (sheet, name) in &unrendered {
        println!("警告：{sheet} 上的 {name} 未能显示");
    }

    let bus = CommandBus::new();
    let mut commands: Vec<&str> = bus.available_commands().copied().collect();
    commands.sort_unstable();
    println!("支持的命令: {}", commands.join(", "));

    let mut context = CommandContext {
        session: &mut session,
    };
    let report = run_script(&bus, &mut context, script);
    print_summary(&session, &renderer);
    println!("共执行 {} 条命令，失败 {} 条", report.executed, report.failed);
    report
}

pub fn print_summary(session: &AnnotationSession, renderer: &ConsoleRenderer) {
    let workbook = session.workbook();
    println!(
        "工作簿 {} [{}]：{} 个标注，修订号 {}，未保存修改：{}",
        workbook.name(),
        status_label(workbook.status()),
        workbook.region_count(),
        workbook.revision(),
        if workbook.is_dirty() { "是" } else { "否" }
    );
    println!("结构指纹：{:016x}", workbook.fingerprint());
    for sheet in workbook.sheets() {
        println!(
            "工作表 {} [{}]：{} 个标注",
            sheet.sheet_name(),
            status_label(sheet.status()),
            sheet.len()
        );
        let roots = sheet
            .regions()
            .filter(|region| region.parent().and_then(|id| sheet.get_by_id(id)).is_none());
        for root in roots {
            print_region(sheet, root, 1, renderer);
        }
    }
}

fn print_region(
    sheet: &WorksheetAnnotation,
    region: &RangeAnnotation,
    depth: usize,
    renderer: &ConsoleRenderer,
) {
    let visual = match renderer.visual(region.name()) {
        Some(visual) if visual.visible => visual.description,
        Some(visual) => format!("{}（隐藏）", visual.description),
        None => "未绘制".to_string(),
    };
    println!(
        "{}- {} ({}) {}",
        "  ".repeat(depth),
        region.name(),
        region.class_label(),
        visual
    );
    for child in sheet.children_of(region.id()) {
        print_region(sheet, child, depth + 1, renderer);
    }
}
