//! Shipping address snapshots
//!
//! Orders carry a frozen copy of the address they ship to, not a live
//! reference into the address book. The address book itself is a
//! collaborator; what crosses the boundary is [`ShippingAddress`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// What an address book entry is used for.
///
/// An entry can serve as both billing and shipping address at once, so usage
/// is a set of tags rather than a three-state enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AddressTag {
    /// Usable as a billing address.
    Billing,

    /// Usable as a shipping address.
    Shipping,
}

/// Tag set attached to an address book entry.
pub type AddressTags = BTreeSet<AddressTag>;

/// Immutable address snapshot taken at order-creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShippingAddress {
    /// Recipient name.
    pub name: String,

    /// Contact phone number.
    pub phone: String,

    /// First address line.
    pub address_line_1: String,

    /// Optional second address line.
    pub address_line_2: Option<String>,

    /// City.
    pub city: String,

    /// State or province.
    pub state: String,

    /// Postal code.
    pub postal_code: String,

    /// Country.
    pub country: String,
}

impl ShippingAddress {
    /// Render the address as a single display line for order summaries.
    #[must_use]
    pub fn summary_line(&self) -> String {
        let mut line = format!("{}, {}", self.name, self.address_line_1);

        if let Some(line_2) = &self.address_line_2 {
            line.push_str(", ");
            line.push_str(line_2);
        }

        line.push_str(&format!(
            ", {} {} {}, {}",
            self.city, self.state, self.postal_code, self.country
        ));

        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn address(line_2: Option<&str>) -> ShippingAddress {
        ShippingAddress {
            name: "Asha Rao".to_string(),
            phone: "+91 98765 43210".to_string(),
            address_line_1: "14 Lake View Road".to_string(),
            address_line_2: line_2.map(str::to_string),
            city: "Pune".to_string(),
            state: "MH".to_string(),
            postal_code: "411001".to_string(),
            country: "IN".to_string(),
        }
    }

    #[test]
    fn tags_model_dual_use_addresses() {
        let tags: AddressTags = [AddressTag::Billing, AddressTag::Shipping].into();

        assert!(tags.contains(&AddressTag::Shipping));
        assert!(tags.contains(&AddressTag::Billing));
    }

    #[test]
    fn summary_line_includes_optional_second_line() {
        let with = address(Some("Flat 3B")).summary_line();
        let without = address(None).summary_line();

        assert!(with.contains("Flat 3B"), "expected second line in {with}");
        assert!(!without.contains("Flat 3B"), "unexpected second line in {without}");
    }
}
