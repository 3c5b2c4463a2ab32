//! Products, shipping methods and promo codes.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::catalog_csv::{self, RowAction, RowError};
use crate::domain::aggregates::{Cart, Product, PromoCode, ShippingMethod};
use crate::domain::value_objects::PromoCodeKey;
use crate::pricing::{compute_order_totals, OrderTotals, PricedLine};
use crate::storage::{NewProduct, NewPromoCode, NewShippingMethod, ProductFilter, ProductPatch, Store};
use crate::{EcommerceError, Result};

const DEFAULT_PER_PAGE: u32 = 20;
const MAX_PER_PAGE: u32 = 100;

#[derive(Debug, Default, Deserialize)]
pub struct ProductQuery {
    pub category: Option<String>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct ProductPage {
    pub items: Vec<Product>,
    pub total: u64,
    pub page: u32,
    pub per_page: u32,
}

#[derive(Debug, Deserialize)]
pub struct PromoPreviewRequest {
    pub code: String,
    pub shipping_method_id: Option<Uuid>,
}

#[derive(Debug, Serialize)]
pub struct PromoPreview {
    pub code: PromoCodeKey,
    pub totals: OrderTotals,
}

#[derive(Debug, Default, Serialize)]
pub struct CsvImportReport {
    pub created: u32,
    pub updated: u32,
    pub errors: Vec<RowError>,
}

#[derive(Clone)]
pub struct CatalogService {
    store: Arc<dyn Store>,
}

impl CatalogService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn list_products(&self, query: ProductQuery, include_inactive: bool) -> Result<ProductPage> {
        let filter = ProductFilter {
            category: query.category.filter(|c| !c.trim().is_empty()),
            search: query.search.filter(|s| !s.trim().is_empty()),
            include_inactive,
            page: query.page.unwrap_or(1).max(1),
            per_page: query.per_page.unwrap_or(DEFAULT_PER_PAGE).clamp(1, MAX_PER_PAGE),
        };
        let (items, total) = self.store.list_products(&filter).await?;
        Ok(ProductPage { items, total, page: filter.page, per_page: filter.per_page })
    }

    /// Deactivated products are hidden from buyers.
    pub async fn get_product(&self, id: Uuid, include_inactive: bool) -> Result<Product> {
        self.store
            .get_product(id)
            .await?
            .filter(|p| include_inactive || p.is_active)
            .ok_or(EcommerceError::NotFound("Product"))
    }

    pub async fn create_product(&self, new: NewProduct) -> Result<Product> {
        new.validate()?;
        let product = self.store.insert_product(new).await?;
        tracing::info!(product_id = %product.id, name = %product.name, "Product created");
        Ok(product)
    }

    pub async fn update_product(&self, id: Uuid, patch: ProductPatch) -> Result<Product> {
        patch.check()?;
        if patch.is_empty() {
            return Err(EcommerceError::validation("no fields to update"));
        }
        self.store.update_product(id, patch).await?.ok_or(EcommerceError::NotFound("Product"))
    }

    pub async fn delete_product(&self, id: Uuid) -> Result<()> {
        if !self.store.deactivate_product(id).await? {
            return Err(EcommerceError::NotFound("Product"));
        }
        tracing::info!(product_id = %id, "Product deactivated");
        Ok(())
    }

    pub async fn shipping_methods(&self, include_inactive: bool) -> Result<Vec<ShippingMethod>> {
        self.store.list_shipping_methods(include_inactive).await
    }

    pub async fn create_shipping_method(&self, new: NewShippingMethod) -> Result<ShippingMethod> {
        new.validate()?;
        self.store.insert_shipping_method(new).await
    }

    pub async fn promo_codes(&self) -> Result<Vec<PromoCode>> {
        self.store.list_promos().await
    }

    pub async fn create_promo_code(&self, new: NewPromoCode) -> Result<PromoCode> {
        new.check()?;
        let key = PromoCodeKey::new(new.code.as_str()).map_err(|e| EcommerceError::validation(e.to_string()))?;
        let promo = self.store.insert_promo(new, key).await?;
        tracing::info!(code = %promo.code, "Promo code created");
        Ok(promo)
    }

    /// Prices the buyer's current cart with `code` applied, without
    /// redeeming it.
    pub async fn preview_promo(&self, user_id: Uuid, req: PromoPreviewRequest) -> Result<PromoPreview> {
        let key = PromoCodeKey::new(req.code)?;
        let promo = self
            .store
            .find_promo(&key)
            .await?
            .ok_or_else(|| EcommerceError::InvalidPromoCode(format!("{}: unknown code", key)))?;

        let items = self.store.cart_items(user_id).await?;
        if items.is_empty() {
            return Err(EcommerceError::validation("cart is empty"));
        }
        let ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
        let cart = Cart::price(user_id, &items, &self.store.get_products(&ids).await?)?;
        let shipping = match req.shipping_method_id {
            Some(id) => Some(self.store.get_shipping_method(id).await?.ok_or(EcommerceError::NotFound("Shipping method"))?),
            None => None,
        };

        let lines: Vec<PricedLine> = cart.lines.iter().map(|l| PricedLine { unit_price: l.unit_price, quantity: l.quantity }).collect();
        let totals = compute_order_totals(&lines, Some(&promo), shipping.as_ref(), Utc::now())?;
        Ok(PromoPreview { code: key, totals })
    }

    pub async fn export_csv(&self) -> Result<String> {
        let filter = ProductFilter { include_inactive: true, page: 1, per_page: u32::MAX, ..Default::default() };
        let (products, _) = self.store.list_products(&filter).await?;
        Ok(catalog_csv::export(&products))
    }

    /// Applies every well-formed row; the rest are reported back.
    pub async fn import_csv(&self, text: &str) -> Result<CsvImportReport> {
        let parsed = catalog_csv::parse(text)?;
        let mut report = CsvImportReport { errors: parsed.errors, ..Default::default() };
        for (line, action) in parsed.rows {
            let outcome = match action {
                RowAction::Create(new) => self.create_product(new).await.map(|_| report.created += 1),
                RowAction::Update(id, patch) => self.update_product(id, patch).await.map(|_| report.updated += 1),
            };
            match outcome {
                Ok(()) => {}
                Err(e @ EcommerceError::Storage(_)) => return Err(e),
                Err(e) => report.errors.push(RowError { line, message: e.to_string() }),
            }
        }
        report.errors.sort_by_key(|e| e.line);
        tracing::info!(created = report.created, updated = report.updated, failed = report.errors.len(), "Catalog imported");
        Ok(report)
    }
}
