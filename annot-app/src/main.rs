use std::path::PathBuf;

use annot_config::{AppConfig, ConfigError};
use annot_frontend::loader::resolve_records_path;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, fmt};

mod storage;

/// 电子表格区域标注工具。
#[derive(Debug, Parser)]
#[command(name = "annot-app", version, about)]
struct Cli {
    /// 配置文件路径，缺省时按 `ANNOT_CONFIG` 或 ./config/default.toml 查找
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// 标注记录文件（JSON），覆盖配置与 `ANNOT_RECORDS`
    #[arg(long, value_name = "FILE")]
    records: Option<PathBuf>,
    /// 要执行的命令脚本；缺省时运行内置演示
    #[arg(long, value_name = "FILE")]
    script: Option<PathBuf>,
    /// 任一命令失败时以非零状态退出
    #[arg(long)]
    strict: bool,
}

fn main() {
    let cli = Cli::parse();

    let config = load_configuration(cli.config);
    init_logging(&config);
    info!("启动区域标注应用");

    let records = resolve_records_path(&config, cli.records);
    if let Some(path) = records.as_deref() {
        if let Err(err) = storage::ensure_records_dir(&config.storage, path) {
            error!(error = %err, "无法准备标注记录目录");
            std::process::exit(1);
        }
    }

    let result = match cli.script.as_deref() {
        Some(script) => annot_frontend::run_script_file(&config, records, script),
        None => annot_frontend::run_cli_demo(&config, records),
    };
    match result {
        Ok(report) if cli.strict && report.failed > 0 => {
            warn!(failed = report.failed, "存在执行失败的命令");
            std::process::exit(2);
        }
        Ok(_) => {}
        Err(err) => {
            error!(error = %err, "执行命令失败");
            std::process::exit(1);
        }
    }
}

fn load_configuration(override_path: Option<PathBuf>) -> AppConfig {
    match override_path {
        Some(path) => AppConfig::from_file(&path).unwrap_or_else(|err| {
            warn!(path = %path.display(), error = %err, "加载指定配置失败，使用默认配置");
            AppConfig::default()
        }),
        None => match AppConfig::discover() {
            Ok(cfg) => cfg,
            Err(err) => {
                match &err {
                    ConfigError::Io { path, .. } | ConfigError::Parse { path, .. } => {
                        warn!(path = %path.display(), error = %err, "加载默认配置失败，使用内建默认值");
                    }
                    ConfigError::Context { .. } | ConfigError::Classes(_) => {
                        warn!(error = %err, "加载默认配置失败，使用内建默认值");
                    }
                }
                AppConfig::default()
            }
        },
    }
}

fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_new(config.logging.level.clone()).unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if subscriber.try_init().is_err() {
        // 已初始化，忽略
    }
}
