//! PostgreSQL [`Store`].
//!
//! Multi-row operations run inside one transaction. Rows whose state is
//! read and then written (stock, reservations, orders, returns) are locked
//! with `FOR UPDATE` first, so concurrent requests for the same order or
//! product serialize on the database.

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::postgres::{PgConnection, PgPool, PgPoolOptions};
use sqlx::FromRow;
use uuid::Uuid;

use super::models::{group_lines, Confirmation, NewProduct, NewPromoCode, NewReturn, NewReview, NewShippingMethod, OrderDraft, PaymentApplied, ProductFilter, ProductPatch, StatusChange};
use super::Store;
use crate::domain::aggregates::{
    CartItem, Order, OrderItem, OrderReturn, OrderStatus, Product, ProductReservation, ProductVariant, PromoCode,
    RefundStatus, ReservationLine, ReturnStatus, Review, ShippingMethod, UnknownVariant, WishlistItem,
};
use crate::domain::value_objects::{PromoCodeKey, Quantity};
use crate::{EcommerceError, Result};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new().max_connections(10).connect(url).await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

// =============================================================================
// Rows
// =============================================================================

fn parse<T: FromStr<Err = UnknownVariant>>(value: &str) -> Result<T> {
    value.parse().map_err(|e: UnknownVariant| EcommerceError::Storage(e.to_string()))
}

fn count(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}

fn db_int(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

#[derive(FromRow)]
struct ProductRow {
    id: Uuid,
    name: String,
    description: String,
    price: Decimal,
    original_price: Option<Decimal>,
    discount_percent: i32,
    category: Option<String>,
    stock: i32,
    image_url: Option<String>,
    is_active: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct VariantRow {
    id: Uuid,
    product_id: Uuid,
    name: String,
    price: Option<Decimal>,
    stock: i32,
}

impl ProductRow {
    fn into_product(self, variants: Vec<ProductVariant>) -> Product {
        Product {
            id: self.id,
            name: self.name,
            description: self.description,
            price: self.price,
            original_price: self.original_price,
            discount_percent: self.discount_percent,
            category: self.category,
            stock: count(self.stock),
            image_url: self.image_url,
            is_active: self.is_active,
            variants,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl From<VariantRow> for ProductVariant {
    fn from(row: VariantRow) -> Self {
        Self { id: row.id, product_id: row.product_id, name: row.name, price: row.price, stock: count(row.stock) }
    }
}

#[derive(FromRow)]
struct ShippingRow {
    id: Uuid,
    name: String,
    base_price: Decimal,
    free_shipping_threshold: Option<Decimal>,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl From<ShippingRow> for ShippingMethod {
    fn from(row: ShippingRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            base_price: row.base_price,
            free_shipping_threshold: row.free_shipping_threshold,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct PromoRow {
    id: Uuid,
    code: String,
    discount_type: String,
    discount_value: Decimal,
    min_purchase_amount: Option<Decimal>,
    max_discount_amount: Option<Decimal>,
    usage_limit: Option<i32>,
    used_count: i32,
    valid_from: Option<DateTime<Utc>>,
    valid_until: Option<DateTime<Utc>>,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl TryFrom<PromoRow> for PromoCode {
    type Error = EcommerceError;
    fn try_from(row: PromoRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            code: PromoCodeKey::new(row.code).map_err(|e| EcommerceError::Storage(e.to_string()))?,
            discount_type: parse(&row.discount_type)?,
            discount_value: row.discount_value,
            min_purchase_amount: row.min_purchase_amount,
            max_discount_amount: row.max_discount_amount,
            usage_limit: row.usage_limit.map(count),
            used_count: count(row.used_count),
            valid_from: row.valid_from,
            valid_until: row.valid_until,
            is_active: row.is_active,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct CartRow {
    id: Uuid,
    user_id: Uuid,
    product_id: Uuid,
    variant_id: Option<Uuid>,
    quantity: i32,
    created_at: DateTime<Utc>,
}

impl From<CartRow> for CartItem {
    fn from(row: CartRow) -> Self {
        Self {
            id: row.id,
            user_id: row.user_id,
            product_id: row.product_id,
            variant_id: row.variant_id,
            quantity: count(row.quantity),
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct OrderRow {
    id: Uuid,
    user_id: Uuid,
    status: String,
    subtotal: Decimal,
    discount_amount: Decimal,
    shipping_cost: Decimal,
    total: Decimal,
    promo_code_id: Option<Uuid>,
    payment_method: String,
    payment_id: Option<String>,
    shipping_method_id: Uuid,
    shipping_address: String,
    comment: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct OrderItemRow {
    id: Uuid,
    order_id: Uuid,
    product_id: Uuid,
    variant_id: Option<Uuid>,
    product_name: String,
    quantity: i32,
    unit_price: Decimal,
}

impl OrderRow {
    fn into_order(self, items: Vec<OrderItem>) -> Result<Order> {
        Ok(Order {
            id: self.id,
            user_id: self.user_id,
            status: parse(&self.status)?,
            items,
            subtotal: self.subtotal,
            discount_amount: self.discount_amount,
            shipping_cost: self.shipping_cost,
            total: self.total,
            promo_code_id: self.promo_code_id,
            payment_method: parse(&self.payment_method)?,
            payment_id: self.payment_id,
            shipping_method_id: self.shipping_method_id,
            shipping_address: self.shipping_address,
            comment: self.comment,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

impl From<OrderItemRow> for OrderItem {
    fn from(row: OrderItemRow) -> Self {
        Self {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            variant_id: row.variant_id,
            product_name: row.product_name,
            quantity: count(row.quantity),
            unit_price: row.unit_price,
        }
    }
}

#[derive(FromRow)]
struct ReservationRow {
    id: Uuid,
    order_id: Uuid,
    product_id: Uuid,
    variant_id: Option<Uuid>,
    quantity: i32,
    status: String,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl TryFrom<ReservationRow> for ProductReservation {
    type Error = EcommerceError;
    fn try_from(row: ReservationRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            order_id: row.order_id,
            product_id: row.product_id,
            variant_id: row.variant_id,
            quantity: count(row.quantity),
            status: parse(&row.status)?,
            expires_at: row.expires_at,
            created_at: row.created_at,
        })
    }
}

#[derive(FromRow)]
struct ReturnRow {
    id: Uuid,
    order_id: Uuid,
    user_id: Uuid,
    reason: String,
    status: String,
    refund_amount: Decimal,
    refund_status: String,
    admin_comment: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<ReturnRow> for OrderReturn {
    type Error = EcommerceError;
    fn try_from(row: ReturnRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            order_id: row.order_id,
            user_id: row.user_id,
            reason: row.reason,
            status: parse(&row.status)?,
            refund_amount: row.refund_amount,
            refund_status: parse(&row.refund_status)?,
            admin_comment: row.admin_comment,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct ReviewRow {
    id: Uuid,
    product_id: Uuid,
    user_id: Uuid,
    rating: i16,
    text: Option<String>,
    created_at: DateTime<Utc>,
}

impl From<ReviewRow> for Review {
    fn from(row: ReviewRow) -> Self {
        Self {
            id: row.id,
            product_id: row.product_id,
            user_id: row.user_id,
            rating: u8::try_from(row.rating).unwrap_or(0),
            text: row.text,
            created_at: row.created_at,
        }
    }
}

#[derive(FromRow)]
struct WishlistRow {
    user_id: Uuid,
    product_id: Uuid,
    created_at: DateTime<Utc>,
}

impl From<WishlistRow> for WishlistItem {
    fn from(row: WishlistRow) -> Self {
        Self { user_id: row.user_id, product_id: row.product_id, created_at: row.created_at }
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

// =============================================================================
// Loaders
// =============================================================================

async fn attach_variants(conn: &mut PgConnection, rows: Vec<ProductRow>) -> Result<Vec<Product>> {
    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let variants = sqlx::query_as::<_, VariantRow>("SELECT * FROM product_variants WHERE product_id = ANY($1) ORDER BY name")
        .bind(&ids)
        .fetch_all(&mut *conn)
        .await?;
    let mut by_product: HashMap<Uuid, Vec<ProductVariant>> = HashMap::new();
    for v in variants {
        by_product.entry(v.product_id).or_default().push(v.into());
    }
    Ok(rows.into_iter().map(|r| { let vs = by_product.remove(&r.id).unwrap_or_default(); r.into_product(vs) }).collect())
}

async fn attach_items(conn: &mut PgConnection, rows: Vec<OrderRow>) -> Result<Vec<Order>> {
    let ids: Vec<Uuid> = rows.iter().map(|r| r.id).collect();
    let items = sqlx::query_as::<_, OrderItemRow>("SELECT * FROM order_items WHERE order_id = ANY($1) ORDER BY id")
        .bind(&ids)
        .fetch_all(&mut *conn)
        .await?;
    let mut by_order: HashMap<Uuid, Vec<OrderItem>> = HashMap::new();
    for item in items {
        by_order.entry(item.order_id).or_default().push(item.into());
    }
    rows.into_iter().map(|r| { let items = by_order.remove(&r.id).unwrap_or_default(); r.into_order(items) }).collect()
}

async fn load_order(conn: &mut PgConnection, id: Uuid, lock: bool) -> Result<Option<Order>> {
    let sql = if lock { "SELECT * FROM orders WHERE id = $1 FOR UPDATE" } else { "SELECT * FROM orders WHERE id = $1" };
    let row = sqlx::query_as::<_, OrderRow>(sql).bind(id).fetch_optional(&mut *conn).await?;
    match row {
        Some(row) => Ok(attach_items(conn, vec![row]).await?.pop()),
        None => Ok(None),
    }
}

// =============================================================================
// Inventory steps, composed inside callers' transactions
// =============================================================================

async fn expire_in(conn: &mut PgConnection, now: DateTime<Utc>) -> Result<u32> {
    let done = sqlx::query("UPDATE product_reservations SET status = 'EXPIRED' WHERE status = 'PENDING' AND expires_at <= $1")
        .bind(now)
        .execute(&mut *conn)
        .await?;
    Ok(done.rows_affected() as u32)
}

async fn lock_stock(conn: &mut PgConnection, product_id: Uuid, variant_id: Option<Uuid>) -> Result<u32> {
    let stock: Option<i32> = match variant_id {
        Some(variant_id) => {
            sqlx::query_scalar("SELECT stock FROM product_variants WHERE id = $1 AND product_id = $2 FOR UPDATE")
                .bind(variant_id)
                .bind(product_id)
                .fetch_optional(&mut *conn)
                .await?
        }
        None => {
            sqlx::query_scalar("SELECT stock FROM products WHERE id = $1 FOR UPDATE")
                .bind(product_id)
                .fetch_optional(&mut *conn)
                .await?
        }
    };
    stock.map(count).ok_or(EcommerceError::NotFound(if variant_id.is_some() { "Product variant" } else { "Product" }))
}

async fn adjust_stock(conn: &mut PgConnection, product_id: Uuid, variant_id: Option<Uuid>, delta: i32) -> Result<()> {
    let sql = match variant_id {
        Some(_) => "UPDATE product_variants SET stock = stock + $2 WHERE id = $1 AND stock + $2 >= 0",
        None => "UPDATE products SET stock = stock + $2, updated_at = NOW() WHERE id = $1 AND stock + $2 >= 0",
    };
    let done = sqlx::query(sql)
        .bind(variant_id.unwrap_or(product_id))
        .bind(delta)
        .execute(&mut *conn)
        .await?;
    if done.rows_affected() == 0 {
        return Err(EcommerceError::conflict(format!("stock of product {} cannot go below zero", product_id)));
    }
    Ok(())
}

async fn held_by_others(conn: &mut PgConnection, hold: &ProductReservation, now: DateTime<Utc>) -> Result<u32> {
    let held: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(quantity), 0)::BIGINT FROM product_reservations \
         WHERE product_id = $1 AND variant_id IS NOT DISTINCT FROM $2 AND order_id <> $3 \
         AND status = 'PENDING' AND expires_at > $4",
    )
    .bind(hold.product_id)
    .bind(hold.variant_id)
    .bind(hold.order_id)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;
    Ok(u32::try_from(held).unwrap_or(u32::MAX))
}

async fn reserve_in(
    conn: &mut PgConnection,
    order_id: Uuid,
    lines: &[ReservationLine],
    now: DateTime<Utc>,
    expires_at: DateTime<Utc>,
) -> Result<Vec<ProductReservation>> {
    expire_in(conn, now).await?;
    // Sorted by stock unit so concurrent reservations take row locks in the same order.
    let grouped = group_lines(lines);
    for line in &grouped {
        let stock = lock_stock(conn, line.product_id, line.variant_id).await?;
        let held: i64 = sqlx::query_scalar(
            "SELECT COALESCE(SUM(quantity), 0)::BIGINT FROM product_reservations \
             WHERE product_id = $1 AND variant_id IS NOT DISTINCT FROM $2 AND status = 'PENDING' AND expires_at > $3",
        )
        .bind(line.product_id)
        .bind(line.variant_id)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;
        let available = u32::try_from(i64::from(stock) - held).unwrap_or(0);
        if line.quantity > available {
            return Err(EcommerceError::InsufficientStock {
                product_id: line.product_id,
                variant_id: line.variant_id,
                requested: line.quantity,
                available,
            });
        }
    }

    let mut created = Vec::with_capacity(grouped.len());
    for line in grouped {
        let row = sqlx::query_as::<_, ReservationRow>(
            "INSERT INTO product_reservations (id, order_id, product_id, variant_id, quantity, status, expires_at, created_at) \
             VALUES ($1, $2, $3, $4, $5, 'PENDING', $6, $7) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(order_id)
        .bind(line.product_id)
        .bind(line.variant_id)
        .bind(db_int(line.quantity))
        .bind(expires_at)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;
        created.push(row.try_into()?);
    }
    Ok(created)
}

async fn confirm_in(conn: &mut PgConnection, order_id: Uuid) -> Result<Confirmation> {
    // Lock first: a concurrent confirm blocks here and then sees no confirmable rows.
    let rows = sqlx::query_as::<_, ReservationRow>(
        "SELECT * FROM product_reservations WHERE order_id = $1 AND status IN ('PENDING', 'EXPIRED') \
         ORDER BY product_id, variant_id FOR UPDATE",
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;
    let now = Utc::now();
    let mut outcome = Confirmation::default();
    for row in rows {
        let hold: ProductReservation = row.try_into()?;
        let stock = lock_stock(conn, hold.product_id, hold.variant_id).await?;
        let others = held_by_others(conn, &hold, now).await?;
        let status = if hold.is_covered(stock, others, now) {
            adjust_stock(conn, hold.product_id, hold.variant_id, -db_int(hold.quantity)).await?;
            outcome.confirmed += 1;
            "CONFIRMED"
        } else {
            tracing::warn!(%order_id, product_id = %hold.product_id, quantity = hold.quantity, stock, "stock gone before payment, hold released");
            outcome.unfulfilled.push(hold.line());
            "RELEASED"
        };
        sqlx::query("UPDATE product_reservations SET status = $2 WHERE id = $1")
            .bind(hold.id)
            .bind(status)
            .execute(&mut *conn)
            .await?;
    }
    Ok(outcome)
}

async fn release_in(conn: &mut PgConnection, order_id: Uuid) -> Result<u32> {
    let done = sqlx::query("UPDATE product_reservations SET status = 'RELEASED' WHERE order_id = $1 AND status = 'PENDING'")
        .bind(order_id)
        .execute(&mut *conn)
        .await?;
    Ok(done.rows_affected() as u32)
}

async fn restock_in(conn: &mut PgConnection, order_id: Uuid) -> Result<u32> {
    let rows = sqlx::query_as::<_, ReservationRow>(
        "SELECT * FROM product_reservations WHERE order_id = $1 AND status = 'CONFIRMED' ORDER BY product_id, variant_id FOR UPDATE",
    )
    .bind(order_id)
    .fetch_all(&mut *conn)
    .await?;
    for row in &rows {
        adjust_stock(conn, row.product_id, row.variant_id, row.quantity).await?;
        sqlx::query("UPDATE product_reservations SET status = 'RELEASED' WHERE id = $1")
            .bind(row.id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(rows.len() as u32)
}

async fn set_status_in(conn: &mut PgConnection, order_id: Uuid, status: OrderStatus) -> Result<()> {
    sqlx::query("UPDATE orders SET status = $2, updated_at = NOW() WHERE id = $1")
        .bind(order_id)
        .bind(status.as_str())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

// =============================================================================
// Store
// =============================================================================

const PRODUCT_FILTER: &str = "($1 OR is_active) AND ($2::TEXT IS NULL OR category = $2) \
     AND ($3::TEXT IS NULL OR name ILIKE '%' || $3 || '%')";

#[async_trait]
impl Store for PgStore {
    async fn list_products(&self, filter: &ProductFilter) -> Result<(Vec<Product>, u64)> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query_as::<_, ProductRow>(&format!(
            "SELECT * FROM products WHERE {} ORDER BY created_at DESC LIMIT $4 OFFSET $5",
            PRODUCT_FILTER
        ))
        .bind(filter.include_inactive)
        .bind(&filter.category)
        .bind(&filter.search)
        .bind(i64::from(filter.per_page))
        .bind(i64::try_from(filter.offset()).unwrap_or(i64::MAX))
        .fetch_all(&mut *conn)
        .await?;
        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM products WHERE {}", PRODUCT_FILTER))
            .bind(filter.include_inactive)
            .bind(&filter.category)
            .bind(&filter.search)
            .fetch_one(&mut *conn)
            .await?;
        Ok((attach_variants(&mut conn, rows).await?, total.max(0) as u64))
    }

    async fn get_product(&self, id: Uuid) -> Result<Option<Product>> {
        Ok(self.get_products(&[id]).await?.pop())
    }

    async fn get_products(&self, ids: &[Uuid]) -> Result<Vec<Product>> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = ANY($1)")
            .bind(ids)
            .fetch_all(&mut *conn)
            .await?;
        attach_variants(&mut conn, rows).await
    }

    async fn insert_product(&self, new: NewProduct) -> Result<Product> {
        let mut tx = self.pool.begin().await?;
        let id = Uuid::now_v7();
        let row = sqlx::query_as::<_, ProductRow>(
            "INSERT INTO products (id, name, description, price, original_price, discount_percent, category, stock, image_url, is_active, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, TRUE, NOW(), NOW()) RETURNING *",
        )
        .bind(id)
        .bind(&new.name)
        .bind(&new.description)
        .bind(new.price)
        .bind(new.original_price)
        .bind(new.discount_percent)
        .bind(&new.category)
        .bind(db_int(new.stock))
        .bind(&new.image_url)
        .fetch_one(&mut *tx)
        .await?;
        let mut variants = Vec::with_capacity(new.variants.len());
        for v in new.variants {
            let variant = sqlx::query_as::<_, VariantRow>(
                "INSERT INTO product_variants (id, product_id, name, price, stock) VALUES ($1, $2, $3, $4, $5) RETURNING *",
            )
            .bind(Uuid::now_v7())
            .bind(id)
            .bind(&v.name)
            .bind(v.price)
            .bind(db_int(v.stock))
            .fetch_one(&mut *tx)
            .await?;
            variants.push(variant.into());
        }
        tx.commit().await?;
        Ok(row.into_product(variants))
    }

    async fn update_product(&self, id: Uuid, patch: ProductPatch) -> Result<Option<Product>> {
        let mut tx = self.pool.begin().await?;
        let Some(row) = sqlx::query_as::<_, ProductRow>("SELECT * FROM products WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(None);
        };
        let mut product = attach_variants(&mut tx, vec![row]).await?.remove(0);
        patch.apply(&mut product);
        sqlx::query(
            "UPDATE products SET name = $2, description = $3, price = $4, original_price = $5, discount_percent = $6, \
             category = $7, stock = $8, image_url = $9, is_active = $10, updated_at = $11 WHERE id = $1",
        )
        .bind(id)
        .bind(&product.name)
        .bind(&product.description)
        .bind(product.price)
        .bind(product.original_price)
        .bind(product.discount_percent)
        .bind(&product.category)
        .bind(db_int(product.stock))
        .bind(&product.image_url)
        .bind(product.is_active)
        .bind(product.updated_at)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;
        Ok(Some(product))
    }

    async fn deactivate_product(&self, id: Uuid) -> Result<bool> {
        let done = sqlx::query("UPDATE products SET is_active = FALSE, updated_at = NOW() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    async fn list_shipping_methods(&self, include_inactive: bool) -> Result<Vec<ShippingMethod>> {
        let rows = sqlx::query_as::<_, ShippingRow>("SELECT * FROM shipping_methods WHERE $1 OR is_active ORDER BY base_price, name")
            .bind(include_inactive)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn get_shipping_method(&self, id: Uuid) -> Result<Option<ShippingMethod>> {
        let row = sqlx::query_as::<_, ShippingRow>("SELECT * FROM shipping_methods WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn insert_shipping_method(&self, new: NewShippingMethod) -> Result<ShippingMethod> {
        let row = sqlx::query_as::<_, ShippingRow>(
            "INSERT INTO shipping_methods (id, name, base_price, free_shipping_threshold, is_active, created_at) \
             VALUES ($1, $2, $3, $4, TRUE, NOW()) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(&new.name)
        .bind(new.base_price)
        .bind(new.free_shipping_threshold)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn find_promo(&self, code: &PromoCodeKey) -> Result<Option<PromoCode>> {
        let row = sqlx::query_as::<_, PromoRow>("SELECT * FROM promo_codes WHERE UPPER(code) = $1")
            .bind(code.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list_promos(&self) -> Result<Vec<PromoCode>> {
        let rows = sqlx::query_as::<_, PromoRow>("SELECT * FROM promo_codes ORDER BY created_at DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn insert_promo(&self, new: NewPromoCode, code: PromoCodeKey) -> Result<PromoCode> {
        let inserted = sqlx::query_as::<_, PromoRow>(
            "INSERT INTO promo_codes (id, code, discount_type, discount_value, min_purchase_amount, max_discount_amount, \
             usage_limit, used_count, valid_from, valid_until, is_active, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, 0, $8, $9, TRUE, NOW()) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(code.as_str())
        .bind(new.discount_type.as_str())
        .bind(new.discount_value)
        .bind(new.min_purchase_amount)
        .bind(new.max_discount_amount)
        .bind(new.usage_limit.map(db_int))
        .bind(new.valid_from)
        .bind(new.valid_until)
        .fetch_one(&self.pool)
        .await;
        match inserted {
            Ok(row) => row.try_into(),
            Err(e) if is_unique_violation(&e) => Err(EcommerceError::conflict(format!("promo code {} already exists", code))),
            Err(e) => Err(e.into()),
        }
    }

    async fn cart_items(&self, user_id: Uuid) -> Result<Vec<CartItem>> {
        let rows = sqlx::query_as::<_, CartRow>("SELECT * FROM cart_items WHERE user_id = $1 ORDER BY created_at")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn add_cart_item(&self, user_id: Uuid, product_id: Uuid, variant_id: Option<Uuid>, quantity: Quantity) -> Result<CartItem> {
        let row = sqlx::query_as::<_, CartRow>(
            "INSERT INTO cart_items (id, user_id, product_id, variant_id, quantity, created_at) VALUES ($1, $2, $3, $4, $5, NOW()) \
             ON CONFLICT (user_id, product_id, (COALESCE(variant_id, '00000000-0000-0000-0000-000000000000'::uuid))) \
             DO UPDATE SET quantity = LEAST(cart_items.quantity + EXCLUDED.quantity, $6) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(user_id)
        .bind(product_id)
        .bind(variant_id)
        .bind(db_int(quantity.value()))
        .bind(db_int(Quantity::MAX))
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn set_cart_quantity(&self, user_id: Uuid, item_id: Uuid, quantity: Quantity) -> Result<Option<CartItem>> {
        let row = sqlx::query_as::<_, CartRow>("UPDATE cart_items SET quantity = $3 WHERE id = $1 AND user_id = $2 RETURNING *")
            .bind(item_id)
            .bind(user_id)
            .bind(db_int(quantity.value()))
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn remove_cart_item(&self, user_id: Uuid, item_id: Uuid) -> Result<bool> {
        let done = sqlx::query("DELETE FROM cart_items WHERE id = $1 AND user_id = $2")
            .bind(item_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    async fn clear_cart(&self, user_id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM cart_items WHERE user_id = $1").bind(user_id).execute(&self.pool).await?;
        Ok(())
    }

    async fn place_order(&self, draft: OrderDraft) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        if let Some(promo_id) = draft.promo_code_id {
            let redeemed = sqlx::query(
                "UPDATE promo_codes SET used_count = used_count + 1 \
                 WHERE id = $1 AND is_active AND (usage_limit IS NULL OR used_count < usage_limit)",
            )
            .bind(promo_id)
            .execute(&mut *tx)
            .await?;
            if redeemed.rows_affected() == 0 {
                return Err(EcommerceError::InvalidPromoCode("usage limit reached".to_string()));
            }
        }

        let order = draft.to_order();
        sqlx::query(
            "INSERT INTO orders (id, user_id, status, subtotal, discount_amount, shipping_cost, total, promo_code_id, payment_method, \
             payment_id, shipping_method_id, shipping_address, comment, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, NULL, $10, $11, $12, $13, $13)",
        )
        .bind(order.id)
        .bind(order.user_id)
        .bind(order.status.as_str())
        .bind(order.subtotal)
        .bind(order.discount_amount)
        .bind(order.shipping_cost)
        .bind(order.total)
        .bind(order.promo_code_id)
        .bind(order.payment_method.as_str())
        .bind(order.shipping_method_id)
        .bind(&order.shipping_address)
        .bind(&order.comment)
        .bind(order.created_at)
        .execute(&mut *tx)
        .await?;

        for item in &order.items {
            sqlx::query(
                "INSERT INTO order_items (id, order_id, product_id, variant_id, product_name, quantity, unit_price) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7)",
            )
            .bind(item.id)
            .bind(order.id)
            .bind(item.product_id)
            .bind(item.variant_id)
            .bind(&item.product_name)
            .bind(db_int(item.quantity))
            .bind(item.unit_price)
            .execute(&mut *tx)
            .await?;
        }

        reserve_in(&mut tx, order.id, &draft.reservation_lines(), draft.created_at, draft.reservation_expires_at).await?;

        for priced in &draft.cart_items {
            sqlx::query("DELETE FROM cart_items WHERE id = $1 AND user_id = $2 AND quantity <= $3")
                .bind(priced.id)
                .bind(order.user_id)
                .bind(db_int(priced.quantity))
                .execute(&mut *tx)
                .await?;
            sqlx::query("UPDATE cart_items SET quantity = quantity - $3 WHERE id = $1 AND user_id = $2 AND quantity > $3")
                .bind(priced.id)
                .bind(order.user_id)
                .bind(db_int(priced.quantity))
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(order)
    }

    async fn get_order(&self, id: Uuid) -> Result<Option<Order>> {
        let mut conn = self.pool.acquire().await?;
        load_order(&mut conn, id, false).await
    }

    async fn list_orders(&self, user_id: Option<Uuid>) -> Result<Vec<Order>> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query_as::<_, OrderRow>("SELECT * FROM orders WHERE $1::UUID IS NULL OR user_id = $1 ORDER BY created_at DESC")
            .bind(user_id)
            .fetch_all(&mut *conn)
            .await?;
        attach_items(&mut conn, rows).await
    }

    async fn set_payment_id(&self, order_id: Uuid, payment_id: &str) -> Result<()> {
        let done = sqlx::query("UPDATE orders SET payment_id = $2, updated_at = NOW() WHERE id = $1")
            .bind(order_id)
            .bind(payment_id)
            .execute(&self.pool)
            .await?;
        if done.rows_affected() == 0 {
            return Err(EcommerceError::NotFound("Order"));
        }
        Ok(())
    }

    async fn apply_payment(&self, order_id: Uuid, payment_id: &str) -> Result<PaymentApplied> {
        let mut tx = self.pool.begin().await?;
        let mut order = load_order(&mut tx, order_id, true).await?.ok_or(EcommerceError::NotFound("Order"))?;
        if order.status == OrderStatus::Cancelled {
            tracing::warn!(%order_id, payment_id, "payment received for cancelled order");
            return Ok(PaymentApplied { order, transitioned: false, confirmation: Confirmation::default() });
        }

        let confirmation = confirm_in(&mut tx, order_id).await?;
        let transitioned = order.status == OrderStatus::Pending;
        if transitioned {
            sqlx::query("UPDATE orders SET status = $2, payment_id = COALESCE(payment_id, $3), updated_at = NOW() WHERE id = $1")
                .bind(order_id)
                .bind(OrderStatus::Processing.as_str())
                .bind(payment_id)
                .execute(&mut *tx)
                .await?;
            order.status = OrderStatus::Processing;
            order.payment_id.get_or_insert_with(|| payment_id.to_string());
            order.updated_at = Utc::now();
        }
        tx.commit().await?;
        Ok(PaymentApplied { order, transitioned, confirmation })
    }

    async fn change_order_status(&self, order_id: Uuid, to: OrderStatus, only_from: Option<OrderStatus>) -> Result<StatusChange> {
        let mut tx = self.pool.begin().await?;
        let mut order = load_order(&mut tx, order_id, true).await?.ok_or(EcommerceError::NotFound("Order"))?;
        let from = order.status;
        if only_from.is_some_and(|expected| expected != from) {
            return Err(EcommerceError::conflict(format!("order is {}", from)));
        }
        if from == to {
            return Ok(StatusChange { order, from });
        }
        if !from.can_transition_to(to) {
            return Err(EcommerceError::conflict(format!("cannot move order from {} to {}", from, to)));
        }
        match to {
            OrderStatus::Cancelled => {
                release_in(&mut tx, order_id).await?;
                restock_in(&mut tx, order_id).await?;
            }
            OrderStatus::Processing => {
                confirm_in(&mut tx, order_id).await?;
            }
            _ => {}
        }
        set_status_in(&mut tx, order_id, to).await?;
        tx.commit().await?;
        order.status = to;
        order.updated_at = Utc::now();
        Ok(StatusChange { order, from })
    }

    async fn reserve(&self, order_id: Uuid, lines: &[ReservationLine], now: DateTime<Utc>, expires_at: DateTime<Utc>) -> Result<Vec<ProductReservation>> {
        let mut tx = self.pool.begin().await?;
        let created = reserve_in(&mut tx, order_id, lines, now, expires_at).await?;
        tx.commit().await?;
        Ok(created)
    }

    async fn confirm(&self, order_id: Uuid) -> Result<Confirmation> {
        let mut tx = self.pool.begin().await?;
        let confirmed = confirm_in(&mut tx, order_id).await?;
        tx.commit().await?;
        Ok(confirmed)
    }

    async fn release(&self, order_id: Uuid) -> Result<u32> {
        let mut conn = self.pool.acquire().await?;
        release_in(&mut conn, order_id).await
    }

    async fn expire_stale(&self, now: DateTime<Utc>) -> Result<u32> {
        let mut conn = self.pool.acquire().await?;
        expire_in(&mut conn, now).await
    }

    async fn reservations_for(&self, order_id: Uuid) -> Result<Vec<ProductReservation>> {
        let rows = sqlx::query_as::<_, ReservationRow>("SELECT * FROM product_reservations WHERE order_id = $1 ORDER BY created_at, id")
            .bind(order_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn create_return(&self, request: NewReturn) -> Result<OrderReturn> {
        let mut tx = self.pool.begin().await?;
        let order = load_order(&mut tx, request.order_id, true).await?.ok_or(EcommerceError::NotFound("Order"))?;
        let refund_amount = request.refund_amount.unwrap_or(order.total);
        let open: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM order_returns WHERE order_id = $1 AND status <> 'REJECTED'")
            .bind(order.id)
            .fetch_one(&mut *tx)
            .await?;
        OrderReturn::check_request(&order, request.user_id, refund_amount, open.max(0) as usize)?;
        let row = sqlx::query_as::<_, ReturnRow>(
            "INSERT INTO order_returns (id, order_id, user_id, reason, status, refund_amount, refund_status, admin_comment, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, NULL, NOW(), NOW()) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(order.id)
        .bind(request.user_id)
        .bind(&request.reason)
        .bind(ReturnStatus::Pending.as_str())
        .bind(refund_amount)
        .bind(RefundStatus::Pending.as_str())
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        row.try_into()
    }

    async fn get_return(&self, id: Uuid) -> Result<Option<OrderReturn>> {
        let row = sqlx::query_as::<_, ReturnRow>("SELECT * FROM order_returns WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn list_returns(&self, user_id: Option<Uuid>) -> Result<Vec<OrderReturn>> {
        let rows = sqlx::query_as::<_, ReturnRow>("SELECT * FROM order_returns WHERE $1::UUID IS NULL OR user_id = $1 ORDER BY created_at DESC")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn set_return_status(&self, id: Uuid, to: ReturnStatus, admin_comment: Option<String>) -> Result<OrderReturn> {
        let mut tx = self.pool.begin().await?;
        let current: OrderReturn = sqlx::query_as::<_, ReturnRow>("SELECT * FROM order_returns WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(EcommerceError::NotFound("Return"))?
            .try_into()?;
        if current.status != to && !current.status.can_transition_to(to) {
            return Err(EcommerceError::conflict(format!("cannot move return from {} to {}", current.status.as_str(), to.as_str())));
        }
        let row = sqlx::query_as::<_, ReturnRow>(
            "UPDATE order_returns SET status = $2, admin_comment = COALESCE($3, admin_comment), updated_at = NOW() WHERE id = $1 RETURNING *",
        )
        .bind(id)
        .bind(to.as_str())
        .bind(admin_comment)
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        row.try_into()
    }

    async fn set_refund_status(&self, id: Uuid, to: RefundStatus) -> Result<OrderReturn> {
        let mut tx = self.pool.begin().await?;
        let current: OrderReturn = sqlx::query_as::<_, ReturnRow>("SELECT * FROM order_returns WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(EcommerceError::NotFound("Return"))?
            .try_into()?;
        if current.refund_status != to && !current.refund_status.can_transition_to(to) {
            return Err(EcommerceError::conflict(format!(
                "cannot move refund from {} to {}",
                current.refund_status.as_str(),
                to.as_str()
            )));
        }
        let row = sqlx::query_as::<_, ReturnRow>("UPDATE order_returns SET refund_status = $2, updated_at = NOW() WHERE id = $1 RETURNING *")
            .bind(id)
            .bind(to.as_str())
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;
        row.try_into()
    }

    async fn insert_review(&self, new: NewReview) -> Result<Review> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM products WHERE id = $1)")
            .bind(new.product_id)
            .fetch_one(&self.pool)
            .await?;
        if !exists {
            return Err(EcommerceError::NotFound("Product"));
        }
        let inserted = sqlx::query_as::<_, ReviewRow>(
            "INSERT INTO reviews (id, product_id, user_id, rating, text, created_at) VALUES ($1, $2, $3, $4, $5, NOW()) RETURNING *",
        )
        .bind(Uuid::now_v7())
        .bind(new.product_id)
        .bind(new.user_id)
        .bind(i16::from(new.rating))
        .bind(&new.text)
        .fetch_one(&self.pool)
        .await;
        match inserted {
            Ok(row) => Ok(row.into()),
            Err(e) if is_unique_violation(&e) => Err(EcommerceError::conflict("product already reviewed")),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_reviews(&self, product_id: Uuid) -> Result<Vec<Review>> {
        let rows = sqlx::query_as::<_, ReviewRow>("SELECT * FROM reviews WHERE product_id = $1 ORDER BY created_at DESC")
            .bind(product_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn delete_review(&self, id: Uuid) -> Result<bool> {
        let done = sqlx::query("DELETE FROM reviews WHERE id = $1").bind(id).execute(&self.pool).await?;
        Ok(done.rows_affected() > 0)
    }

    async fn add_to_wishlist(&self, user_id: Uuid, product_id: Uuid) -> Result<WishlistItem> {
        let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM products WHERE id = $1)")
            .bind(product_id)
            .fetch_one(&self.pool)
            .await?;
        if !exists {
            return Err(EcommerceError::NotFound("Product"));
        }
        let row = sqlx::query_as::<_, WishlistRow>(
            "INSERT INTO wishlist_items (user_id, product_id, created_at) VALUES ($1, $2, NOW()) \
             ON CONFLICT (user_id, product_id) DO UPDATE SET created_at = wishlist_items.created_at RETURNING *",
        )
        .bind(user_id)
        .bind(product_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn remove_from_wishlist(&self, user_id: Uuid, product_id: Uuid) -> Result<bool> {
        let done = sqlx::query("DELETE FROM wishlist_items WHERE user_id = $1 AND product_id = $2")
            .bind(user_id)
            .bind(product_id)
            .execute(&self.pool)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    async fn wishlist(&self, user_id: Uuid) -> Result<Vec<WishlistItem>> {
        let rows = sqlx::query_as::<_, WishlistRow>("SELECT * FROM wishlist_items WHERE user_id = $1 ORDER BY created_at DESC")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }
}
