//! Vouchers: the business documents that commit or release stock.

use core::str::FromStr;

use serde::{Deserialize, Serialize};

use stockhold_core::DomainError;

/// Supported voucher types.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum VoucherType {
    SalesInvoice,
    DeliveryNote,
    StockEntry,
}

impl VoucherType {
    pub const ALL: [VoucherType; 3] = [
        VoucherType::SalesInvoice,
        VoucherType::DeliveryNote,
        VoucherType::StockEntry,
    ];

    /// Human-readable document name ("Sales Invoice").
    pub fn label(self) -> &'static str {
        match self {
            VoucherType::SalesInvoice => "Sales Invoice",
            VoucherType::DeliveryNote => "Delivery Note",
            VoucherType::StockEntry => "Stock Entry",
        }
    }
}

impl core::fmt::Display for VoucherType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for VoucherType {
    type Err = DomainError;

    /// Accepts both the label ("Sales Invoice") and the identifier ("SalesInvoice").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let compact: String = s.chars().filter(|c| !c.is_whitespace()).collect();
        VoucherType::ALL
            .into_iter()
            .find(|t| format!("{t:?}").eq_ignore_ascii_case(&compact))
            .ok_or_else(|| DomainError::validation(format!("unsupported voucher type: {s}")))
    }
}

/// A concrete voucher: its type and document number.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "voucher_type", content = "voucher_no")]
pub enum Voucher {
    SalesInvoice(String),
    DeliveryNote(String),
    StockEntry(String),
}

impl Voucher {
    pub fn new(voucher_type: VoucherType, voucher_no: impl Into<String>) -> Self {
        let no = voucher_no.into();
        match voucher_type {
            VoucherType::SalesInvoice => Voucher::SalesInvoice(no),
            VoucherType::DeliveryNote => Voucher::DeliveryNote(no),
            VoucherType::StockEntry => Voucher::StockEntry(no),
        }
    }

    pub fn sales_invoice(no: impl Into<String>) -> Self {
        Voucher::SalesInvoice(no.into())
    }

    pub fn delivery_note(no: impl Into<String>) -> Self {
        Voucher::DeliveryNote(no.into())
    }

    pub fn stock_entry(no: impl Into<String>) -> Self {
        Voucher::StockEntry(no.into())
    }

    pub fn voucher_type(&self) -> VoucherType {
        match self {
            Voucher::SalesInvoice(_) => VoucherType::SalesInvoice,
            Voucher::DeliveryNote(_) => VoucherType::DeliveryNote,
            Voucher::StockEntry(_) => VoucherType::StockEntry,
        }
    }

    pub fn voucher_no(&self) -> &str {
        match self {
            Voucher::SalesInvoice(no) | Voucher::DeliveryNote(no) | Voucher::StockEntry(no) => no,
        }
    }
}

impl core::fmt::Display for Voucher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{} {}", self.voucher_type(), self.voucher_no())
    }
}

/// A single voucher line: the natural owner of one reservation per (item, warehouse).
///
/// `detail_no` is optional; vouchers that reserve at header level use `None`,
/// and an empty string is normalized to `None`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VoucherLine {
    pub voucher: Voucher,
    pub detail_no: Option<String>,
}

impl VoucherLine {
    pub fn new(voucher: Voucher, detail_no: Option<&str>) -> Self {
        Self {
            voucher,
            detail_no: normalize_detail(detail_no).map(str::to_string),
        }
    }

    /// Whether this line is selected by a (voucher, optional line) filter.
    ///
    /// A `None` filter selects every line of the voucher.
    pub fn selected_by(&self, voucher: &Voucher, detail_no: Option<&str>) -> bool {
        if &self.voucher != voucher {
            return false;
        }
        match normalize_detail(detail_no) {
            None => true,
            Some(d) => self.detail_no.as_deref() == Some(d),
        }
    }
}

impl core::fmt::Display for VoucherLine {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match &self.detail_no {
            Some(d) => write!(f, "{} / {}", self.voucher, d),
            None => write!(f, "{}", self.voucher),
        }
    }
}

fn normalize_detail(detail_no: Option<&str>) -> Option<&str> {
    detail_no.map(str::trim).filter(|d| !d.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn voucher_type_parses_labels_and_identifiers() {
        assert_eq!("Sales Invoice".parse::<VoucherType>().unwrap(), VoucherType::SalesInvoice);
        assert_eq!("DeliveryNote".parse::<VoucherType>().unwrap(), VoucherType::DeliveryNote);
        assert_eq!("stock entry".parse::<VoucherType>().unwrap(), VoucherType::StockEntry);
        assert!("Journal Entry".parse::<VoucherType>().is_err());
    }

    #[test]
    fn voucher_round_trips_type_and_number() {
        let v = Voucher::new(VoucherType::StockEntry, "STE-0001");
        assert_eq!(v.voucher_type(), VoucherType::StockEntry);
        assert_eq!(v.voucher_no(), "STE-0001");
        assert_eq!(v.to_string(), "Stock Entry STE-0001");
    }

    #[test]
    fn voucher_serializes_with_explicit_fields() {
        let json = serde_json::to_value(Voucher::sales_invoice("SI-001")).unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "voucher_type": "SalesInvoice", "voucher_no": "SI-001" })
        );
    }

    #[test]
    fn empty_detail_is_header_level() {
        let line = VoucherLine::new(Voucher::sales_invoice("SI-001"), Some("  "));
        assert_eq!(line.detail_no, None);
    }

    #[test]
    fn selection_by_voucher_and_line() {
        let si = Voucher::sales_invoice("SI-001");
        let line = VoucherLine::new(si.clone(), Some("d1"));

        assert!(line.selected_by(&si, None));
        assert!(line.selected_by(&si, Some("d1")));
        assert!(!line.selected_by(&si, Some("d2")));
        assert!(!line.selected_by(&Voucher::delivery_note("SI-001"), None));
    }
}
