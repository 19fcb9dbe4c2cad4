//! 篮子生命周期集成测试
//!
//! 需要可用的MySQL与环境配置，默认忽略；本地联调时
//! `cargo test -- --ignored` 运行。

use grid_quant::app_config::db::get_db_pool;
use grid_quant::app_init;
use grid_quant::trading::model::basket::{Basket, BasketStatus, SqlxBasketRepository};
use grid_quant::trading::model::bot_config::SqlxBotConfigRepository;
use grid_quant::trading::services::system_status::{GateStatus, SystemStatusService};
use grid_quant::trading::strategy::grid_config::{
    GridConfig, HardStopMode, PlaceMode, ReanchorRules,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn sample_config() -> GridConfig {
    GridConfig {
        pair: "SOLUSDC".to_string(),
        anchor_price_p0: dec!(150.000),
        levels_pct: vec![dec!(-5), dec!(-10), dec!(-15)],
        alloc_weights: vec![dec!(0.3), dec!(0.3), dec!(0.4)],
        max_grid_capital_quote: dec!(500),
        tick_size: dec!(0.001),
        lot_size: dec!(0.01),
        min_notional: dec!(5.0),
        tp_start_pct: dec!(0.012),
        tp_step_pct: dec!(0.0015),
        tp_min_pct: dec!(0.003),
        tp2_delta_pct: dec!(0.008),
        tp1_share: dec!(0.4),
        tp2_share: dec!(0.35),
        trail_share: dec!(0.25),
        trailing_callback_pct: dec!(0.02),
        hard_stop_mode: HardStopMode::None,
        hard_stop_pct: Decimal::ZERO,
        place_mode: PlaceMode::AllUnfilled,
        k_next: 0,
        reanchor_rules: ReanchorRules {
            close_ratio: Decimal::ZERO,
            time_ttl_s: 86_400,
        },
    }
}

/// 建篮→读取→重锚→关闭的完整存储路径
#[tokio::test]
#[ignore] // 需要数据库配置
async fn test_basket_store_round_trip() {
    if let Err(e) = app_init().await {
        eprintln!("应用初始化失败: {}", e);
        return;
    }

    let repo = SqlxBasketRepository::new(get_db_pool().clone());
    let cfg = sample_config();
    let basket = Basket::new(
        &cfg.pair,
        cfg.anchor_price_p0,
        serde_json::to_string(&cfg).unwrap(),
        chrono::Utc::now().timestamp_millis(),
    );
    repo.save(&basket).await.expect("保存篮子应该成功");

    let loaded = repo
        .find_by_basket_id(&basket.basket_id)
        .await
        .unwrap()
        .expect("应能读回刚保存的篮子");
    assert_eq!(loaded.pair, "SOLUSDC");
    assert_eq!(loaded.status, BasketStatus::Active);
    let parsed = GridConfig::from_json(&loaded.config_json).unwrap();
    assert_eq!(parsed.levels_pct.len(), 3);

    repo.update_anchor_price(&basket.basket_id, dec!(140.0))
        .await
        .unwrap();
    let reanchored = repo
        .find_by_basket_id(&basket.basket_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(reanchored.anchor_price, dec!(140.0));

    repo.update_status(&basket.basket_id, BasketStatus::Closed)
        .await
        .unwrap();
    let closed = repo
        .find_by_basket_id(&basket.basket_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(closed.status, BasketStatus::Closed);
    assert!(closed.closed_at.is_some());
}

/// 系统状态门：缺省running，stop/start持久化可读回
#[tokio::test]
#[ignore] // 需要数据库配置
async fn test_system_status_gate_round_trip() {
    if let Err(e) = app_init().await {
        eprintln!("应用初始化失败: {}", e);
        return;
    }

    let pool = get_db_pool().clone();
    let config_repo = SqlxBotConfigRepository::new(pool.clone());
    let gate = SystemStatusService::new(pool);

    // 清掉已有记录后读取应得默认running
    let _ = config_repo.set("system_status", r#"{"status":"running"}"#).await;
    assert_eq!(gate.status().await.unwrap(), GateStatus::Running);

    gate.stop().await.unwrap();
    assert!(!gate.is_running().await.unwrap());

    gate.start().await.unwrap();
    assert!(gate.is_running().await.unwrap());
}
