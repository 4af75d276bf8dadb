//! Reservation settings, passed explicitly to whoever drives the ledger.

use std::borrow::Cow;

use serde::{Deserialize, Serialize};

use crate::voucher::VoucherType;

/// Role identifier (opaque string, e.g. "Stock Manager").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(Cow<'static, str>);

impl Role {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per voucher type switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoucherTypeToggles {
    pub sales_invoice: bool,
    pub delivery_note: bool,
    pub stock_entry: bool,
}

impl Default for VoucherTypeToggles {
    fn default() -> Self {
        Self {
            sales_invoice: true,
            delivery_note: true,
            stock_entry: true,
        }
    }
}

impl VoucherTypeToggles {
    pub fn get(&self, voucher_type: VoucherType) -> bool {
        match voucher_type {
            VoucherType::SalesInvoice => self.sales_invoice,
            VoucherType::DeliveryNote => self.delivery_note,
            VoucherType::StockEntry => self.stock_entry,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReservationSettings {
    /// Master switch.
    pub enabled: bool,
    /// Check availability while a voucher is being saved.
    pub validate_on_save: bool,
    pub enabled_for: VoucherTypeToggles,
    /// Holders of any of these roles skip availability validation.
    pub bypass_roles: Vec<Role>,
}

impl Default for ReservationSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            validate_on_save: true,
            enabled_for: VoucherTypeToggles::default(),
            bypass_roles: Vec::new(),
        }
    }
}

impl ReservationSettings {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    pub fn is_enabled_for(&self, voucher_type: VoucherType) -> bool {
        self.enabled && self.enabled_for.get(voucher_type)
    }

    pub fn is_bypassed(&self, roles: &[Role]) -> bool {
        roles.iter().any(|r| self.bypass_roles.contains(r))
    }

    /// Whether a save of this voucher type by a user with `roles` must be validated.
    pub fn should_validate(&self, voucher_type: VoucherType, roles: &[Role]) -> bool {
        self.validate_on_save && self.is_enabled_for(voucher_type) && !self.is_bypassed(roles)
    }
}
