//! Cart service
//!
//! Thin orchestration over the core cart: fetch the live book, mutate the
//! user's active cart, persist. The falsy returns of the core guards pass
//! straight through so callers can surface "could not add" messages without
//! treating them as errors.

use std::sync::Arc;

use folio_core::{
    cart::Cart,
    ids::{BookId, UserId},
};
use tracing::debug;

use crate::store::{CommerceStore, StoreError};

/// Cart operations for one storefront.
#[derive(Clone)]
pub struct CartService {
    store: Arc<dyn CommerceStore>,
}

impl CartService {
    /// Build the service over a store.
    #[must_use]
    pub fn new(store: Arc<dyn CommerceStore>) -> Self {
        Self { store }
    }

    /// The user's active cart, created empty on first use.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the store fails.
    pub async fn view(&self, user_id: UserId) -> Result<Cart, StoreError> {
        self.store.active_cart(user_id).await
    }

    /// Add copies of a book to the user's cart. Returns `false` when the
    /// book is inactive or stock cannot cover the merged quantity.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown book, or any other
    /// [`StoreError`] when the store fails.
    pub async fn add_book(
        &self,
        user_id: UserId,
        book_id: BookId,
        quantity: u32,
    ) -> Result<bool, StoreError> {
        let book = self.store.book(book_id).await?;
        let mut cart = self.store.active_cart(user_id).await?;

        if !cart.add_book(&book, quantity) {
            debug!(%book_id, quantity, "rejected cart add");
            return Ok(false);
        }

        self.store.save_cart(&cart).await?;

        Ok(true)
    }

    /// Set the quantity of a book's line; zero removes it. Returns `false`
    /// when stock cannot cover the new quantity.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::NotFound`] for an unknown book, or any other
    /// [`StoreError`] when the store fails.
    pub async fn update_quantity(
        &self,
        user_id: UserId,
        book_id: BookId,
        quantity: u32,
    ) -> Result<bool, StoreError> {
        let book = self.store.book(book_id).await?;
        let mut cart = self.store.active_cart(user_id).await?;

        if !cart.update_quantity(&book, quantity) {
            return Ok(false);
        }

        self.store.save_cart(&cart).await?;

        Ok(true)
    }

    /// Remove a book's line entirely. Returns `false` when no such line
    /// exists.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the store fails.
    pub async fn remove_book(&self, user_id: UserId, book_id: BookId) -> Result<bool, StoreError> {
        let mut cart = self.store.active_cart(user_id).await?;

        if !cart.remove_book(book_id) {
            return Ok(false);
        }

        self.store.save_cart(&cart).await?;

        Ok(true)
    }

    /// Drop every line from the user's cart.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the store fails.
    pub async fn clear(&self, user_id: UserId) -> Result<(), StoreError> {
        let mut cart = self.store.active_cart(user_id).await?;
        cart.clear();

        self.store.save_cart(&cart).await
    }
}
