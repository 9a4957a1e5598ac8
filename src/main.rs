// ==========================================
// 仓库补货预测系统 - 命令行入口
// ==========================================
// 用法:
//   warehouse-planner [--db PATH] <command>
//
// 命令:
//   init                      建表
//   forecast [WAREHOUSE...]   提交预测批次并等待完成
//   accuracy YYYY-MM          回填某月实际需求
//   learn                     生成学习调整建议
//   approve ADJUSTMENT_ID USER  审批学习调整建议
//   orders YYYY-MM            生成月度补货确认单
// ==========================================

use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use warehouse_planner::db::{init_schema, open_sqlite_connection};
use warehouse_planner::domain::forecast::ForecastRequest;
use warehouse_planner::services::{
    AccuracyService, ForecastJobQueue, LearningService, OrderService,
};
use warehouse_planner::{logging, perf, YearMonth};

const USAGE: &str = "用法: warehouse-planner [--db PATH] <init | forecast [WAREHOUSE...] | accuracy YYYY-MM | learn | approve ADJUSTMENT_ID USER | orders YYYY-MM>";

/// 默认数据库路径
///
/// 优先级: 环境变量 WAREHOUSE_PLANNER_DB_PATH → 用户数据目录 → 当前目录
fn default_db_path() -> String {
    if let Ok(path) = std::env::var("WAREHOUSE_PLANNER_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./warehouse_planner.db");
    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("warehouse-planner");
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("warehouse_planner.db");
        }
    }
    path.to_string_lossy().to_string()
}

fn parse_month(raw: Option<String>) -> Result<YearMonth> {
    let raw = raw.ok_or_else(|| anyhow!("缺少月份参数 (YYYY-MM)\n{}", USAGE))?;
    YearMonth::parse(&raw).ok_or_else(|| anyhow!("月份格式错误: {} (期望 YYYY-MM)", raw))
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    let db_path = match args.iter().position(|a| a == "--db") {
        Some(i) => {
            if i + 1 >= args.len() {
                bail!("--db 需要路径参数\n{}", USAGE);
            }
            let path = args.remove(i + 1);
            args.remove(i);
            path
        }
        None => default_db_path(),
    };
    let mut args = args.into_iter();
    let command = args.next().ok_or_else(|| anyhow!(USAGE))?;

    tracing::info!(version = warehouse_planner::VERSION, db = %db_path, command = %command, "{}", warehouse_planner::APP_NAME);

    let mut conn = open_sqlite_connection(&db_path)
        .with_context(|| format!("无法打开数据库: {}", db_path))?;
    perf::install_sqlite_tracing(&mut conn);
    init_schema(&conn).context("建表失败")?;
    let conn = Arc::new(Mutex::new(conn));
    let today = Utc::now().date_naive();

    match command.as_str() {
        "init" => {
            println!("数据库已初始化: {}", db_path);
        }
        "forecast" => {
            let warehouses: Vec<String> = args.collect();
            let request = ForecastRequest {
                warehouses: if warehouses.is_empty() {
                    None
                } else {
                    Some(warehouses)
                },
                growth_override: None,
                requested_by: Some("cli".to_string()),
            };
            let queue = ForecastJobQueue::new(conn.clone())?;
            let run_id = queue.submit(request).await?;
            let run = queue.wait_for(&run_id).await?;
            print_json(&run)?;
        }
        "accuracy" => {
            let period = parse_month(args.next())?;
            let report = AccuracyService::new(conn.clone()).update_period(period, today)?;
            print_json(&report)?;
        }
        "learn" => {
            let adjustments = LearningService::new(conn.clone()).generate(None)?;
            print_json(&adjustments)?;
        }
        "approve" => {
            let id = args.next().ok_or_else(|| anyhow!("缺少调整建议 ID\n{}", USAGE))?;
            let user = args.next().ok_or_else(|| anyhow!("缺少审批人\n{}", USAGE))?;
            let adjustment = LearningService::new(conn.clone()).approve(&id, &user)?;
            print_json(&adjustment)?;
        }
        "orders" => {
            let month = parse_month(args.next())?;
            let report = OrderService::new(conn.clone())?.generate(month, today)?;
            print_json(&report)?;
        }
        other => bail!("未知命令: {}\n{}", other, USAGE),
    }
    Ok(())
}
