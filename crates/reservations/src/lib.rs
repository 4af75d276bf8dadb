//! Stock reservation domain module (event-sourced).
//!
//! Reservations are soft holds on stock tied to a voucher line. All holds on
//! one (item, warehouse) live in a single `ReservationBucket` aggregate, which
//! is the consistency boundary for creating, fulfilling and cancelling them.
//! No IO here; persistence and queries live in `stockhold-infra`.

pub mod availability;
pub mod bucket;
pub mod record;
pub mod settings;
pub mod stock;
pub mod voucher;

pub use availability::AvailabilityCheck;
pub use bucket::{
    CancelReservations, DeliveredQtyUpdated, DeliveryShare, EntryOrigin, MarkDelivered,
    RESERVATION_BUCKET_STREAM, RecordDelivery, Reserve, ReservationBucket,
    ReservationCancelled, ReservationCommand, ReservationCreated, ReservationEvent,
    SetDeliveredQty,
};
pub use record::{ReservationRecord, ReservationStatus};
pub use settings::{ReservationSettings, Role, VoucherTypeToggles};
pub use stock::PhysicalStock;
pub use voucher::{Voucher, VoucherLine, VoucherType};
