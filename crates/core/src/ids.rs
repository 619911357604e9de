//! Typed entity identifiers
//!
//! Every entity gets its own UUID newtype so a [`BookId`] can never be passed
//! where an [`OrderId`] is expected. Identifiers are UUIDv7 so they sort by
//! creation time in the store.

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            serde::Serialize,
            serde::Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(uuid::Uuid);

        impl $name {
            /// Mint a fresh identifier.
            #[must_use]
            pub fn new() -> Self {
                Self(uuid::Uuid::now_v7())
            }

            /// Wrap an existing UUID, e.g. one read back from the store.
            #[must_use]
            pub const fn from_uuid(uuid: uuid::Uuid) -> Self {
                Self(uuid)
            }

            /// The underlying UUID.
            #[must_use]
            pub const fn into_uuid(self) -> uuid::Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<uuid::Uuid> for $name {
            fn from(value: uuid::Uuid) -> Self {
                Self::from_uuid(value)
            }
        }

        impl From<$name> for uuid::Uuid {
            fn from(value: $name) -> Self {
                value.into_uuid()
            }
        }
    };
}

entity_id!(
    /// Identifier of a book in the catalog.
    BookId
);

entity_id!(
    /// Identifier of the acting customer.
    UserId
);

entity_id!(
    /// Identifier of a cart.
    CartId
);

entity_id!(
    /// Identifier of an order.
    OrderId
);

entity_id!(
    /// Identifier of a payment attempt.
    PaymentId
);

entity_id!(
    /// Identifier of a shipment.
    ShipmentId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_round_trip_through_uuid() {
        let id = OrderId::new();
        let uuid: uuid::Uuid = id.into();

        assert_eq!(OrderId::from(uuid), id);
    }

    #[test]
    fn fresh_ids_are_distinct() {
        assert_ne!(BookId::new(), BookId::new());
    }
}
