pub mod binance;
pub mod exchange;
pub mod model;
pub mod services;
pub mod strategy;
