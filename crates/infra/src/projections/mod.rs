//! Projection implementations (read model builders).
//!
//! Projections consume published envelopes and build query-optimized read
//! models. All projections are:
//! - **Rebuildable**: can be reconstructed from the event store
//! - **Idempotent**: envelopes at or below a stream's cursor are ignored

pub mod physical_stock;
pub mod reservations;

pub use physical_stock::{BinReadModel, PhysicalStockProjection, PhysicalStockProjectionError};
pub use reservations::{ReservationProjection, ReservationProjectionError};
