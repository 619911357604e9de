//! PostgreSQL commerce store
//!
//! Expects the obvious relational schema: `books`, `carts` (unique per user)
//! with `cart_items` (primary key `(cart_id, book_id)`, cascade delete),
//! `orders` (unique `order_number`) with `order_items` (cascade delete),
//! `payments`, and `shipments` (unique `order_id` and `tracking_number`).
//! Unique constraints are the backstop behind generated references: inserts
//! surface violations as [`StoreError::Conflict`] and callers regenerate.
//!
//! `commit_checkout` runs in a single transaction and re-checks stock at
//! decrement time with a conditional update, so two checkouts racing for the
//! last copy can never both succeed.

use async_trait::async_trait;
use folio_core::{
    cart::{Cart, CartItem},
    catalog::Book,
    ids::{BookId, CartId, OrderId, PaymentId, ShipmentId, UserId},
    order::{Order, OrderItem, OrderParts},
    payment::{Payment, PaymentParts},
    shipment::{Shipment, ShipmentParts},
};
use folio_core::address::ShippingAddress;
use jiff::Timestamp;
use jiff_sqlx::ToSqlx;
use rust_decimal::Decimal;
use rustc_hash::FxHashMap;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use super::{CommerceStore, StoreError};

/// Postgres-backed store.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Wrap an existing pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect to `PostgreSQL`.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub async fn connect(database_url: &str) -> Result<Self, sqlx::Error> {
        Ok(Self::new(PgPool::connect(database_url).await?))
    }

    async fn cart_items(&self, cart_id: CartId) -> Result<Vec<CartItem>, StoreError> {
        let rows = sqlx::query(
            "SELECT book_id, quantity, unit_price FROM cart_items WHERE cart_id = $1",
        )
        .bind(cart_id.into_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;

        rows.iter()
            .map(|row| {
                Ok(CartItem {
                    book_id: BookId::from_uuid(row.try_get("book_id").map_err(map_err)?),
                    quantity: from_db_quantity(row.try_get("quantity").map_err(map_err)?)?,
                    unit_price: row.try_get("unit_price").map_err(map_err)?,
                })
            })
            .collect()
    }
}

fn map_err(error: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_error) = &error {
        if db_error.is_unique_violation() {
            return StoreError::Conflict;
        }
    }

    match error {
        sqlx::Error::RowNotFound => StoreError::NotFound,
        other => StoreError::Backend(other.to_string()),
    }
}

fn to_db_quantity(quantity: u32) -> Result<i32, StoreError> {
    i32::try_from(quantity).map_err(|_| StoreError::Backend("quantity out of range".to_string()))
}

fn from_db_quantity(quantity: i32) -> Result<u32, StoreError> {
    u32::try_from(quantity).map_err(|_| StoreError::Backend("negative quantity in row".to_string()))
}

fn parse_status<T>(value: &str) -> Result<T, StoreError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|error: T::Err| StoreError::Backend(error.to_string()))
}

fn timestamp(row: &PgRow, column: &str) -> Result<Timestamp, StoreError> {
    Ok(row
        .try_get::<jiff_sqlx::Timestamp, _>(column)
        .map_err(map_err)?
        .to_jiff())
}

fn opt_timestamp(row: &PgRow, column: &str) -> Result<Option<Timestamp>, StoreError> {
    Ok(row
        .try_get::<Option<jiff_sqlx::Timestamp>, _>(column)
        .map_err(map_err)?
        .map(jiff_sqlx::Timestamp::to_jiff))
}

fn book_from_row(row: &PgRow) -> Result<Book, StoreError> {
    Ok(Book {
        id: BookId::from_uuid(row.try_get("id").map_err(map_err)?),
        title: row.try_get("title").map_err(map_err)?,
        price: row.try_get("price").map_err(map_err)?,
        stock_quantity: from_db_quantity(row.try_get("stock_quantity").map_err(map_err)?)?,
        is_active: row.try_get("is_active").map_err(map_err)?,
    })
}

fn order_from_row(row: &PgRow) -> Result<Order, StoreError> {
    let status: String = row.try_get("status").map_err(map_err)?;

    Ok(Order::from(OrderParts {
        id: OrderId::from_uuid(row.try_get("id").map_err(map_err)?),
        user_id: UserId::from_uuid(row.try_get("user_id").map_err(map_err)?),
        order_number: row.try_get("order_number").map_err(map_err)?,
        status: parse_status(&status)?,
        subtotal: row.try_get("subtotal").map_err(map_err)?,
        shipping_cost: row.try_get("shipping_cost").map_err(map_err)?,
        total_amount: row.try_get("total_amount").map_err(map_err)?,
        shipping_address: ShippingAddress {
            name: row.try_get("ship_name").map_err(map_err)?,
            phone: row.try_get("ship_phone").map_err(map_err)?,
            address_line_1: row.try_get("ship_address_line_1").map_err(map_err)?,
            address_line_2: row.try_get("ship_address_line_2").map_err(map_err)?,
            city: row.try_get("ship_city").map_err(map_err)?,
            state: row.try_get("ship_state").map_err(map_err)?,
            postal_code: row.try_get("ship_postal_code").map_err(map_err)?,
            country: row.try_get("ship_country").map_err(map_err)?,
        },
        notes: row.try_get("notes").map_err(map_err)?,
        shipped_at: opt_timestamp(row, "shipped_at")?,
        delivered_at: opt_timestamp(row, "delivered_at")?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    }))
}

fn payment_from_row(row: &PgRow) -> Result<Payment, StoreError> {
    let method: String = row.try_get("method").map_err(map_err)?;
    let status: String = row.try_get("status").map_err(map_err)?;

    Ok(Payment::from(PaymentParts {
        id: PaymentId::from_uuid(row.try_get("id").map_err(map_err)?),
        order_id: OrderId::from_uuid(row.try_get("order_id").map_err(map_err)?),
        method: parse_status(&method)?,
        status: parse_status(&status)?,
        amount: row.try_get("amount").map_err(map_err)?,
        transaction_id: row.try_get("transaction_id").map_err(map_err)?,
        completed_at: opt_timestamp(row, "completed_at")?,
        notes: row.try_get("notes").map_err(map_err)?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    }))
}

fn shipment_from_row(row: &PgRow) -> Result<Shipment, StoreError> {
    let status: String = row.try_get("status").map_err(map_err)?;

    Ok(Shipment::from(ShipmentParts {
        id: ShipmentId::from_uuid(row.try_get("id").map_err(map_err)?),
        order_id: OrderId::from_uuid(row.try_get("order_id").map_err(map_err)?),
        tracking_number: row.try_get("tracking_number").map_err(map_err)?,
        carrier: row.try_get("carrier").map_err(map_err)?,
        status: parse_status(&status)?,
        shipped_at: opt_timestamp(row, "shipped_at")?,
        delivered_at: opt_timestamp(row, "delivered_at")?,
        notes: row.try_get("notes").map_err(map_err)?,
        created_at: timestamp(row, "created_at")?,
        updated_at: timestamp(row, "updated_at")?,
    }))
}

async fn insert_order_header(
    tx: &mut Transaction<'_, Postgres>,
    order: &Order,
) -> Result<(), StoreError> {
    let parts = order.parts();

    sqlx::query(
        "INSERT INTO orders (id, user_id, order_number, status, subtotal, shipping_cost, \
         total_amount, ship_name, ship_phone, ship_address_line_1, ship_address_line_2, \
         ship_city, ship_state, ship_postal_code, ship_country, notes, shipped_at, \
         delivered_at, created_at, updated_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, \
         $18, $19, $20)",
    )
    .bind(parts.id.into_uuid())
    .bind(parts.user_id.into_uuid())
    .bind(&parts.order_number)
    .bind(parts.status.as_str())
    .bind(parts.subtotal)
    .bind(parts.shipping_cost)
    .bind(parts.total_amount)
    .bind(&parts.shipping_address.name)
    .bind(&parts.shipping_address.phone)
    .bind(&parts.shipping_address.address_line_1)
    .bind(&parts.shipping_address.address_line_2)
    .bind(&parts.shipping_address.city)
    .bind(&parts.shipping_address.state)
    .bind(&parts.shipping_address.postal_code)
    .bind(&parts.shipping_address.country)
    .bind(&parts.notes)
    .bind(parts.shipped_at.map(ToSqlx::to_sqlx))
    .bind(parts.delivered_at.map(ToSqlx::to_sqlx))
    .bind(parts.created_at.to_sqlx())
    .bind(parts.updated_at.to_sqlx())
    .execute(&mut **tx)
    .await
    .map_err(map_err)?;

    Ok(())
}

#[async_trait]
impl CommerceStore for PgStore {
    async fn book(&self, id: BookId) -> Result<Book, StoreError> {
        let row = sqlx::query(
            "SELECT id, title, price, stock_quantity, is_active FROM books WHERE id = $1",
        )
        .bind(id.into_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_err)?
        .ok_or(StoreError::NotFound)?;

        book_from_row(&row)
    }

    async fn books(&self, ids: &[BookId]) -> Result<FxHashMap<BookId, Book>, StoreError> {
        let uuids: Vec<Uuid> = ids.iter().map(|id| id.into_uuid()).collect();

        let rows = sqlx::query(
            "SELECT id, title, price, stock_quantity, is_active FROM books WHERE id = ANY($1)",
        )
        .bind(&uuids)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;

        rows.iter()
            .map(|row| {
                let book = book_from_row(row)?;
                Ok((book.id, book))
            })
            .collect()
    }

    async fn restore_stock(&self, book_id: BookId, quantity: u32) -> Result<(), StoreError> {
        let result =
            sqlx::query("UPDATE books SET stock_quantity = stock_quantity + $1 WHERE id = $2")
                .bind(to_db_quantity(quantity)?)
                .bind(book_id.into_uuid())
                .execute(&self.pool)
                .await
                .map_err(map_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        Ok(())
    }

    async fn active_cart(&self, user_id: UserId) -> Result<Cart, StoreError> {
        let existing = sqlx::query("SELECT id, expires_at FROM carts WHERE user_id = $1")
            .bind(user_id.into_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?;

        match existing {
            Some(row) => {
                let id = CartId::from_uuid(row.try_get("id").map_err(map_err)?);
                let expires_at = opt_timestamp(&row, "expires_at")?;
                let items = self.cart_items(id).await?;

                Ok(Cart::from_parts(id, user_id, items, expires_at))
            }
            None => {
                let cart = Cart::new(user_id, None);

                sqlx::query("INSERT INTO carts (id, user_id, expires_at) VALUES ($1, $2, NULL)")
                    .bind(cart.id().into_uuid())
                    .bind(user_id.into_uuid())
                    .execute(&self.pool)
                    .await
                    .map_err(map_err)?;

                Ok(cart)
            }
        }
    }

    async fn save_cart(&self, cart: &Cart) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_err)?;

        sqlx::query(
            "INSERT INTO carts (id, user_id, expires_at) VALUES ($1, $2, $3) \
             ON CONFLICT (id) DO UPDATE SET expires_at = EXCLUDED.expires_at",
        )
        .bind(cart.id().into_uuid())
        .bind(cart.user_id().into_uuid())
        .bind(cart.expires_at().map(ToSqlx::to_sqlx))
        .execute(&mut *tx)
        .await
        .map_err(map_err)?;

        sqlx::query("DELETE FROM cart_items WHERE cart_id = $1")
            .bind(cart.id().into_uuid())
            .execute(&mut *tx)
            .await
            .map_err(map_err)?;

        for item in cart.items() {
            sqlx::query(
                "INSERT INTO cart_items (cart_id, book_id, quantity, unit_price) \
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(cart.id().into_uuid())
            .bind(item.book_id.into_uuid())
            .bind(to_db_quantity(item.quantity)?)
            .bind(item.unit_price)
            .execute(&mut *tx)
            .await
            .map_err(map_err)?;
        }

        tx.commit().await.map_err(map_err)
    }

    async fn commit_checkout(
        &self,
        order: &Order,
        items: &[OrderItem],
        cart_id: CartId,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await.map_err(map_err)?;

        insert_order_header(&mut tx, order).await?;

        for item in items {
            let mut item = item.clone();
            item.normalise();

            sqlx::query(
                "INSERT INTO order_items (order_id, book_id, book_title, quantity, unit_price, \
                 total_price) VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(item.order_id.into_uuid())
            .bind(item.book_id.into_uuid())
            .bind(&item.book_title)
            .bind(to_db_quantity(item.quantity)?)
            .bind(item.unit_price)
            .bind(item.total_price)
            .execute(&mut *tx)
            .await
            .map_err(map_err)?;

            // Conditional decrement: re-checks remaining stock under the
            // transaction, the backstop against checkout races.
            let decremented = sqlx::query(
                "UPDATE books SET stock_quantity = stock_quantity - $1 \
                 WHERE id = $2 AND stock_quantity >= $1",
            )
            .bind(to_db_quantity(item.quantity)?)
            .bind(item.book_id.into_uuid())
            .execute(&mut *tx)
            .await
            .map_err(map_err)?;

            if decremented.rows_affected() == 0 {
                return Err(StoreError::InsufficientStock(item.book_id));
            }
        }

        sqlx::query("DELETE FROM carts WHERE id = $1")
            .bind(cart_id.into_uuid())
            .execute(&mut *tx)
            .await
            .map_err(map_err)?;

        tx.commit().await.map_err(map_err)
    }

    async fn order_for_user(
        &self,
        user_id: UserId,
        order_id: OrderId,
    ) -> Result<Order, StoreError> {
        let row = sqlx::query("SELECT * FROM orders WHERE id = $1 AND user_id = $2")
            .bind(order_id.into_uuid())
            .bind(user_id.into_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?
            .ok_or(StoreError::NotFound)?;

        order_from_row(&row)
    }

    async fn order(&self, order_id: OrderId) -> Result<Order, StoreError> {
        let row = sqlx::query("SELECT * FROM orders WHERE id = $1")
            .bind(order_id.into_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?
            .ok_or(StoreError::NotFound)?;

        order_from_row(&row)
    }

    async fn order_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>, StoreError> {
        let rows = sqlx::query(
            "SELECT order_id, book_id, book_title, quantity, unit_price, total_price \
             FROM order_items WHERE order_id = $1",
        )
        .bind(order_id.into_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;

        rows.iter()
            .map(|row| {
                Ok(OrderItem {
                    order_id: OrderId::from_uuid(row.try_get("order_id").map_err(map_err)?),
                    book_id: BookId::from_uuid(row.try_get("book_id").map_err(map_err)?),
                    book_title: row.try_get("book_title").map_err(map_err)?,
                    quantity: from_db_quantity(row.try_get("quantity").map_err(map_err)?)?,
                    unit_price: row.try_get("unit_price").map_err(map_err)?,
                    total_price: row.try_get::<Decimal, _>("total_price").map_err(map_err)?,
                })
            })
            .collect()
    }

    async fn save_order(&self, order: &Order) -> Result<(), StoreError> {
        let parts = order.parts();

        let result = sqlx::query(
            "UPDATE orders SET status = $2, notes = $3, shipped_at = $4, delivered_at = $5, \
             updated_at = $6 WHERE id = $1",
        )
        .bind(parts.id.into_uuid())
        .bind(parts.status.as_str())
        .bind(&parts.notes)
        .bind(parts.shipped_at.map(ToSqlx::to_sqlx))
        .bind(parts.delivered_at.map(ToSqlx::to_sqlx))
        .bind(parts.updated_at.to_sqlx())
        .execute(&self.pool)
        .await
        .map_err(map_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        Ok(())
    }

    async fn insert_payment(&self, payment: &Payment) -> Result<(), StoreError> {
        let parts = payment.parts();

        sqlx::query(
            "INSERT INTO payments (id, order_id, method, status, amount, transaction_id, \
             completed_at, notes, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(parts.id.into_uuid())
        .bind(parts.order_id.into_uuid())
        .bind(parts.method.as_str())
        .bind(parts.status.as_str())
        .bind(parts.amount)
        .bind(&parts.transaction_id)
        .bind(parts.completed_at.map(ToSqlx::to_sqlx))
        .bind(&parts.notes)
        .bind(parts.created_at.to_sqlx())
        .bind(parts.updated_at.to_sqlx())
        .execute(&self.pool)
        .await
        .map_err(map_err)?;

        Ok(())
    }

    async fn save_payment(&self, payment: &Payment) -> Result<(), StoreError> {
        let parts = payment.parts();

        let result = sqlx::query(
            "UPDATE payments SET status = $2, transaction_id = $3, completed_at = $4, \
             notes = $5, updated_at = $6 WHERE id = $1",
        )
        .bind(parts.id.into_uuid())
        .bind(parts.status.as_str())
        .bind(&parts.transaction_id)
        .bind(parts.completed_at.map(ToSqlx::to_sqlx))
        .bind(&parts.notes)
        .bind(parts.updated_at.to_sqlx())
        .execute(&self.pool)
        .await
        .map_err(map_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        Ok(())
    }

    async fn payment(&self, id: PaymentId) -> Result<Payment, StoreError> {
        let row = sqlx::query("SELECT * FROM payments WHERE id = $1")
            .bind(id.into_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?
            .ok_or(StoreError::NotFound)?;

        payment_from_row(&row)
    }

    async fn latest_payment_for_order(&self, order_id: OrderId) -> Result<Payment, StoreError> {
        let row = sqlx::query(
            "SELECT * FROM payments WHERE order_id = $1 ORDER BY created_at DESC, id DESC LIMIT 1",
        )
        .bind(order_id.into_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(map_err)?
        .ok_or(StoreError::NotFound)?;

        payment_from_row(&row)
    }

    async fn payment_by_transaction(&self, transaction_id: &str) -> Result<Payment, StoreError> {
        let row = sqlx::query("SELECT * FROM payments WHERE transaction_id = $1")
            .bind(transaction_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?
            .ok_or(StoreError::NotFound)?;

        payment_from_row(&row)
    }

    async fn insert_shipment(&self, shipment: &Shipment) -> Result<(), StoreError> {
        let parts = shipment.parts();

        sqlx::query(
            "INSERT INTO shipments (id, order_id, tracking_number, carrier, status, shipped_at, \
             delivered_at, notes, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(parts.id.into_uuid())
        .bind(parts.order_id.into_uuid())
        .bind(&parts.tracking_number)
        .bind(&parts.carrier)
        .bind(parts.status.as_str())
        .bind(parts.shipped_at.map(ToSqlx::to_sqlx))
        .bind(parts.delivered_at.map(ToSqlx::to_sqlx))
        .bind(&parts.notes)
        .bind(parts.created_at.to_sqlx())
        .bind(parts.updated_at.to_sqlx())
        .execute(&self.pool)
        .await
        .map_err(map_err)?;

        Ok(())
    }

    async fn save_shipment(&self, shipment: &Shipment) -> Result<(), StoreError> {
        let parts = shipment.parts();

        let result = sqlx::query(
            "UPDATE shipments SET tracking_number = $2, carrier = $3, status = $4, \
             shipped_at = $5, delivered_at = $6, notes = $7, updated_at = $8 WHERE id = $1",
        )
        .bind(parts.id.into_uuid())
        .bind(&parts.tracking_number)
        .bind(&parts.carrier)
        .bind(parts.status.as_str())
        .bind(parts.shipped_at.map(ToSqlx::to_sqlx))
        .bind(parts.delivered_at.map(ToSqlx::to_sqlx))
        .bind(&parts.notes)
        .bind(parts.updated_at.to_sqlx())
        .execute(&self.pool)
        .await
        .map_err(map_err)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }

        Ok(())
    }

    async fn shipment_for_order(&self, order_id: OrderId) -> Result<Shipment, StoreError> {
        let row = sqlx::query("SELECT * FROM shipments WHERE order_id = $1")
            .bind(order_id.into_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(map_err)?
            .ok_or(StoreError::NotFound)?;

        shipment_from_row(&row)
    }
}
