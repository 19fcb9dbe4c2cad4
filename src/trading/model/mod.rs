pub mod account_snapshot;
pub mod basket;
pub mod bot_config;
pub mod fill;
pub mod order;

pub use account_snapshot::{AccountSnapshot, SqlxAccountSnapshotRepository};
pub use basket::{Basket, BasketStatus, SqlxBasketRepository};
pub use bot_config::SqlxBotConfigRepository;
pub use fill::{summarize_position, Fill, PositionSummary, SqlxFillRepository};
pub use order::{GridOrder, OrderStatus, SqlxOrderRepository};
