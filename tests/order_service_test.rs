// ==========================================
// 月度补货服务集成测试
// ==========================================
// 职责: 验证 生成 / 重新生成保留用户字段 / 锁定拒绝编辑 / 淘汰 SKU 处理
// ==========================================

#[path = "test_helpers.rs"]
mod test_helpers;

#[cfg(test)]
mod order_service_test {
    use crate::test_helpers::{create_test_db, flat_sales, seed, sku, ym};
    use chrono::{Duration, NaiveDate};
    use rusqlite::Connection;
    use std::sync::{Arc, Mutex};
    use warehouse_planner::config::PlanningParameters;
    use warehouse_planner::domain::{
        ConfirmationEdit, ForecastRequest, ForecastRun, InventoryLevel, PendingOrder,
        PendingOrderStatus, SupplierLeadTimeProfile,
    };
    use warehouse_planner::engine::MonthlyOrderEngine;
    use warehouse_planner::repository::{
        ForecastRunRepository, InventoryRepository, PendingOrderRepository,
        SupplierLeadTimeRepository,
    };
    use warehouse_planner::services::{ForecastBatchService, OrderService, ServiceError};
    use warehouse_planner::{perf, DemandSource, ForecastRunStatus, SkuStatus, UrgencyLevel};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
    }

    /// S1: AX 平稳 100/月，库存 50，供应商 P95 提前期 30 天
    /// S2: 待淘汰，平稳 10/月，库存 1000
    fn setup() -> (tempfile::NamedTempFile, Arc<Mutex<Connection>>) {
        let (tmp, conn) = create_test_db().unwrap();
        let mut death_row = sku("S2", "C", "X");
        death_row.status = SkuStatus::DeathRow;
        let mut sales = flat_sales("S1", "W1", ym(2023, 1), 24, 100.0);
        sales.extend(flat_sales("S2", "W1", ym(2023, 1), 24, 10.0));
        seed(&conn, &[sku("S1", "A", "X"), death_row], &sales);

        InventoryRepository::from_connection(conn.clone())
            .batch_upsert(&[
                InventoryLevel {
                    sku_id: "S1".to_string(),
                    warehouse: "W1".to_string(),
                    on_hand: 50.0,
                },
                InventoryLevel {
                    sku_id: "S2".to_string(),
                    warehouse: "W1".to_string(),
                    on_hand: 1000.0,
                },
            ])
            .unwrap();
        SupplierLeadTimeRepository::from_connection(conn.clone())
            .batch_upsert(&[SupplierLeadTimeProfile {
                supplier: "SUP1".to_string(),
                warehouse: "W1".to_string(),
                avg_lead_time_days: 25.0,
                p95_lead_time_days: Some(30.0),
                min_lead_time_days: Some(20.0),
                reliability_score: 0.9,
                avg_delay_days_when_late: None,
                shipments_observed: 12,
            }])
            .unwrap();

        let run = ForecastRun::new(&ForecastRequest::default(), ForecastRunStatus::Running);
        ForecastRunRepository::from_connection(conn.clone())
            .insert(&run)
            .unwrap();
        ForecastBatchService::new(conn.clone())
            .unwrap()
            .execute_run(&run.run_id)
            .unwrap();
        (tmp, conn)
    }

    #[test]
    fn test_generate_uses_high_confidence_forecast() {
        warehouse_planner::logging::init_test();
        let (_tmp, conn) = setup();
        let service = OrderService::new(conn.clone()).unwrap();

        let report = service.generate(ym(2025, 1), today()).unwrap();
        assert_eq!(report.rows, 2);
        assert_eq!(report.by_urgency.get("must_order"), Some(&1));

        let s1 = service
            .list(ym(2025, 1))
            .unwrap()
            .into_iter()
            .find(|r| r.sku_id == "S1")
            .unwrap();
        assert_eq!(s1.demand_source, DemandSource::Forecast, "置信度 0.9 > 0.75 用预测");
        assert!((s1.monthly_demand - 100.0).abs() < 1e-6);
        assert_eq!(s1.lead_time_days, 30, "供应商 P95 提前期");
        assert_eq!(s1.expected_arrival, today() + Duration::days(30));
        assert_eq!(s1.urgency, UrgencyLevel::MustOrder);
        // 再订货点 = 100/30 × (30+30) + 7 × 100/30
        assert!((s1.reorder_point - 670.0 / 3.0).abs() < 1e-6);
        assert_eq!(s1.suggested_qty, 174.0);
        assert_eq!(s1.confirmed_qty, None);
        assert_eq!(s1.final_qty(), 174.0, "未确认时最终数量回落到建议数量");
    }

    #[test]
    fn test_death_row_skip_has_zero_quantity() {
        let (_tmp, conn) = setup();
        let service = OrderService::new(conn.clone()).unwrap();
        service.generate(ym(2025, 1), today()).unwrap();

        let s2 = service
            .list(ym(2025, 1))
            .unwrap()
            .into_iter()
            .find(|r| r.sku_id == "S2")
            .unwrap();
        assert_eq!(s2.urgency, UrgencyLevel::Skip);
        assert_eq!(s2.suggested_qty, 0.0);
    }

    #[test]
    fn test_pending_orders_reduce_suggestion() {
        let (_tmp, conn) = setup();
        PendingOrderRepository::from_connection(conn.clone())
            .batch_upsert(&[PendingOrder {
                order_id: "PO1".to_string(),
                sku_id: "S1".to_string(),
                warehouse: "W1".to_string(),
                supplier: Some("SUP1".to_string()),
                quantity: 100.0,
                order_date: today() - Duration::days(20),
                expected_arrival: today() + Duration::days(10),
                status: PendingOrderStatus::Shipped,
            }])
            .unwrap();

        let service = OrderService::new(conn.clone()).unwrap();
        service.generate(ym(2025, 1), today()).unwrap();
        let s1 = service
            .list(ym(2025, 1))
            .unwrap()
            .into_iter()
            .find(|r| r.sku_id == "S1")
            .unwrap();
        assert_eq!(s1.raw_pending, 100.0);
        assert!(s1.effective_pending > 0.0);
        assert!(s1.suggested_qty < 174.0, "在途计入后建议量下降");
    }

    #[test]
    fn test_lock_blocks_edit_and_regeneration_keeps_user_fields() {
        let (_tmp, conn) = setup();
        let service = OrderService::new(conn.clone()).unwrap();
        let month = ym(2025, 1);
        service.generate(month, today()).unwrap();

        // 场景1: 锁定后编辑被拒绝
        let locked = service.lock("S1", "W1", month, "planner").unwrap();
        assert!(locked.locked);
        assert_eq!(locked.locked_by.as_deref(), Some("planner"));
        let edit = ConfirmationEdit {
            confirmed_qty: Some(200.0),
            lead_time_override: Some(45),
            arrival_override: None,
        };
        assert!(matches!(
            service.edit_confirmed("S1", "W1", month, &edit),
            Err(ServiceError::RowLocked(_))
        ));

        // 场景2: 解锁后编辑成功
        service.unlock("S1", "W1", month).unwrap();
        let edited = service.edit_confirmed("S1", "W1", month, &edit).unwrap();
        assert_eq!(edited.confirmed_qty, Some(200.0));

        // 场景3: 重新生成只刷新系统字段；提前期覆写参与计算
        service.lock("S1", "W1", month, "planner").unwrap();
        service.generate(month, today()).unwrap();
        let row = service
            .list(month)
            .unwrap()
            .into_iter()
            .find(|r| r.sku_id == "S1")
            .unwrap();
        assert_eq!(row.confirmed_qty, Some(200.0));
        assert_eq!(row.lead_time_override, Some(45));
        assert_eq!(row.lead_time_days, 45);
        assert!(row.locked, "重新生成不改变锁定状态");
        assert_eq!(row.final_qty(), 200.0);
        assert_eq!(service.list(month).unwrap().len(), 2, "重复生成不产生重复行");

        // 场景4: 非法输入与不存在的行
        let bad = ConfirmationEdit {
            confirmed_qty: Some(-1.0),
            ..Default::default()
        };
        assert!(matches!(
            service.edit_confirmed("S1", "W1", month, &bad),
            Err(ServiceError::InvalidInput(_))
        ));
        assert!(matches!(
            service.lock("NOPE", "W1", month, "planner"),
            Err(ServiceError::NotFound(_))
        ));
    }

    #[test]
    fn test_compute_phase_issues_no_sql() {
        std::env::set_var("WAREHOUSE_PLANNER_PERF_SQL", "1");
        let (_tmp, conn) = setup();
        perf::install_sqlite_tracing(&mut conn.lock().unwrap());
        let service = OrderService::new(conn.clone()).unwrap();
        let params = PlanningParameters::default();

        let load = perf::PerfGuard::new("order_snapshot_load");
        let snapshot = service
            .load_snapshot(ym(2025, 1), today(), params.pending_fetch_horizon_days)
            .unwrap();
        assert!(load.sql_executed() > 0, "快照读取阶段应被计数");
        drop(load);

        let compute = perf::PerfGuard::new("order_compute");
        let rows = MonthlyOrderEngine::new(&params).compute_all(&snapshot, ym(2025, 1), today());
        assert_eq!(compute.sql_executed(), 0, "计算阶段不访问存储");
        assert_eq!(rows.len(), 2);
    }
}
