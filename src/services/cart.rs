use std::sync::Arc;

use serde::Deserialize;
use uuid::Uuid;

use crate::domain::aggregates::Cart;
use crate::domain::value_objects::Quantity;
use crate::storage::Store;
use crate::{EcommerceError, Result};

#[derive(Debug, Deserialize)]
pub struct AddToCart {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: Quantity,
}

#[derive(Clone)]
pub struct CartService {
    store: Arc<dyn Store>,
}

impl CartService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// The buyer's cart priced against the current catalog.
    pub async fn view(&self, user_id: Uuid) -> Result<Cart> {
        let items = self.store.cart_items(user_id).await?;
        let ids: Vec<Uuid> = items.iter().map(|i| i.product_id).collect();
        let products = self.store.get_products(&ids).await?;
        Cart::price(user_id, &items, &products)
    }

    pub async fn add(&self, user_id: Uuid, req: AddToCart) -> Result<Cart> {
        let product = self.store.get_product(req.product_id).await?.ok_or(EcommerceError::NotFound("Product"))?;
        product.ensure_purchasable()?;
        let stock = product.stock_of(req.variant_id)?;
        if req.quantity.value() > stock {
            return Err(EcommerceError::InsufficientStock {
                product_id: product.id,
                variant_id: req.variant_id,
                requested: req.quantity.value(),
                available: stock,
            });
        }
        self.store.add_cart_item(user_id, req.product_id, req.variant_id, req.quantity).await?;
        self.view(user_id).await
    }

    pub async fn update(&self, user_id: Uuid, item_id: Uuid, quantity: Quantity) -> Result<Cart> {
        self.store
            .set_cart_quantity(user_id, item_id, quantity)
            .await?
            .ok_or(EcommerceError::NotFound("Cart item"))?;
        self.view(user_id).await
    }

    pub async fn remove(&self, user_id: Uuid, item_id: Uuid) -> Result<Cart> {
        if !self.store.remove_cart_item(user_id, item_id).await? {
            return Err(EcommerceError::NotFound("Cart item"));
        }
        self.view(user_id).await
    }

    pub async fn clear(&self, user_id: Uuid) -> Result<()> {
        self.store.clear_cart(user_id).await
    }
}
