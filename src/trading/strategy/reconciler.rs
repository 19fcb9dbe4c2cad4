//! 订单对账
//!
//! 纯diff：以客户端订单ID为唯一键比较“应有”与“实有”两个集合，
//! 产出最小变更计划。价格或数量偏差超过1e-8的订单先撤后重下。

use std::collections::HashMap;

use crate::trading::exchange::VenueOrder;
use crate::trading::strategy::grid_strategy::OrderSpec;
use crate::trading::strategy::numeric::eps;

/// 对账计数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileCounters {
    pub canceled: usize,
    pub created: usize,
    pub unchanged: usize,
}

/// 变更计划：先撤销to_cancel，再创建to_create
#[derive(Debug, Clone)]
pub struct ReconcilePlan {
    pub to_cancel: Vec<String>,
    pub to_create: Vec<OrderSpec>,
    pub counters: ReconcileCounters,
}

fn needs_update(desired: &OrderSpec, actual: &VenueOrder) -> bool {
    (desired.price - actual.price).abs() > eps() || (desired.qty - actual.orig_qty).abs() > eps()
}

/// 计算应有与实有订单集的diff
pub fn reconcile(desired: &[OrderSpec], actual: &[VenueOrder]) -> ReconcilePlan {
    let desired_by_id: HashMap<&str, &OrderSpec> = desired
        .iter()
        .map(|spec| (spec.client_order_id.as_str(), spec))
        .collect();
    let actual_by_id: HashMap<&str, &VenueOrder> = actual
        .iter()
        .map(|order| (order.client_order_id.as_str(), order))
        .collect();

    let mut counters = ReconcileCounters::default();

    let mut to_cancel: Vec<String> = Vec::new();
    for order in actual {
        match desired_by_id.get(order.client_order_id.as_str()) {
            None => to_cancel.push(order.client_order_id.clone()),
            Some(spec) if needs_update(spec, order) => {
                to_cancel.push(order.client_order_id.clone())
            }
            Some(_) => counters.unchanged += 1,
        }
    }

    let mut to_create: Vec<OrderSpec> = Vec::new();
    for spec in desired {
        match actual_by_id.get(spec.client_order_id.as_str()) {
            None => to_create.push(spec.clone()),
            Some(order) if needs_update(spec, order) => to_create.push(spec.clone()),
            Some(_) => {}
        }
    }

    counters.canceled = to_cancel.len();
    counters.created = to_create.len();

    ReconcilePlan {
        to_cancel,
        to_create,
        counters,
    }
}
