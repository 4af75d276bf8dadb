//! Physical stock domain module (event-sourced).
//!
//! Business rules for on-hand quantities per (item, warehouse), implemented
//! as deterministic domain logic (no IO, no storage).

pub mod stock_bin;

pub use stock_bin::{
    BinOpened, OpenBin, PostStockMovement, STOCK_BIN_STREAM, StockBin, StockBinCommand,
    StockBinEvent, StockPosted,
};
