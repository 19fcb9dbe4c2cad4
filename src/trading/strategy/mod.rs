pub mod grid_config;
pub mod grid_strategy;
pub mod numeric;
pub mod reconciler;

pub use grid_config::{GridConfig, HardStopMode, PlaceMode, ReanchorRules};
pub use grid_strategy::{
    dust_threshold, plan_grid, FillRecord, GridPlan, MarketView, OrderSpec, PlanMeta,
    StrategyState,
};
pub use reconciler::{reconcile, ReconcileCounters, ReconcilePlan};
