//! Reviews and wishlists.

use std::sync::Arc;

use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::domain::aggregates::{Review, WishlistItem};
use crate::storage::{NewReview, Store};
use crate::{EcommerceError, Result};

#[derive(Debug, Deserialize, Validate)]
pub struct ReviewRequest {
    #[validate(range(min = 1, max = 5))]
    pub rating: u8,
    #[validate(length(max = 2000))]
    pub text: Option<String>,
}

#[derive(Clone)]
pub struct EngagementService {
    store: Arc<dyn Store>,
}

impl EngagementService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn add_review(&self, user_id: Uuid, product_id: Uuid, req: ReviewRequest) -> Result<Review> {
        req.validate()?;
        self.store.insert_review(NewReview { product_id, user_id, rating: req.rating, text: req.text }).await
    }

    pub async fn reviews(&self, product_id: Uuid) -> Result<Vec<Review>> {
        self.store.list_reviews(product_id).await
    }

    pub async fn delete_review(&self, id: Uuid) -> Result<()> {
        if !self.store.delete_review(id).await? {
            return Err(EcommerceError::NotFound("Review"));
        }
        Ok(())
    }

    pub async fn wishlist(&self, user_id: Uuid) -> Result<Vec<WishlistItem>> {
        self.store.wishlist(user_id).await
    }

    pub async fn add_to_wishlist(&self, user_id: Uuid, product_id: Uuid) -> Result<WishlistItem> {
        self.store.add_to_wishlist(user_id, product_id).await
    }

    pub async fn remove_from_wishlist(&self, user_id: Uuid, product_id: Uuid) -> Result<()> {
        if !self.store.remove_from_wishlist(user_id, product_id).await? {
            return Err(EcommerceError::NotFound("Wishlist item"));
        }
        Ok(())
    }
}
