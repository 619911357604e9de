//! App Context

use std::sync::Arc;

use thiserror::Error;

use crate::{
    carts::CartService,
    checkout::CheckoutService,
    config::AppConfig,
    notify::{NoopNotifier, Notifier},
    orders::OrderService,
    payments::PaymentService,
    shipments::ShipmentService,
    store::{CommerceStore, pg::PgStore},
    webhook::WebhookHandler,
};

#[derive(Debug, Error)]
pub enum AppInitError {
    #[error("failed to connect to database")]
    Database(#[source] sqlx::Error),
}

/// The wired-up commerce services, sharing one store.
#[derive(Clone)]
pub struct AppContext {
    /// The persistence seam the services run over.
    pub store: Arc<dyn CommerceStore>,
    /// Cart mutations.
    pub carts: CartService,
    /// Cart-to-order checkout.
    pub checkout: CheckoutService,
    /// Order lifecycle.
    pub orders: OrderService,
    /// Payment lifecycle and cascades.
    pub payments: PaymentService,
    /// Shipment lifecycle and cascades.
    pub shipments: ShipmentService,
    /// Signed payment processor webhooks.
    pub webhook: WebhookHandler,
}

impl AppContext {
    /// Wire the services over any store and notifier.
    #[must_use]
    pub fn new(
        store: Arc<dyn CommerceStore>,
        notifier: Arc<dyn Notifier>,
        webhook_secret: &str,
    ) -> Self {
        Self {
            carts: CartService::new(Arc::clone(&store)),
            checkout: CheckoutService::new(Arc::clone(&store), notifier),
            orders: OrderService::new(Arc::clone(&store)),
            payments: PaymentService::new(Arc::clone(&store)),
            shipments: ShipmentService::new(Arc::clone(&store)),
            webhook: WebhookHandler::new(webhook_secret, Arc::clone(&store)),
            store,
        }
    }

    /// Build application context from configuration, over Postgres.
    ///
    /// # Errors
    ///
    /// Returns an error when establishing a database connection fails.
    pub async fn from_config(config: &AppConfig) -> Result<Self, AppInitError> {
        let store = PgStore::connect(&config.database_url)
            .await
            .map_err(AppInitError::Database)?;

        Ok(Self::new(
            Arc::new(store),
            Arc::new(NoopNotifier),
            &config.webhook_secret,
        ))
    }
}
