use axum::{
    routing::{delete, get, post, put},
    Router,
};

use super::AppState;

mod admin;
mod cart;
mod catalog;
mod engagement;
mod orders;
mod payments;
mod returns;

pub fn api() -> Router<AppState> {
    Router::new()
        .route("/products", get(catalog::list_products))
        .route("/products/:id", get(catalog::get_product))
        .route("/products/:id/reviews", get(engagement::list_reviews).post(engagement::add_review))
        .route("/shipping-methods", get(catalog::list_shipping_methods))
        .route("/promo/validate", post(catalog::validate_promo))
        .route("/cart", get(cart::view).post(cart::add).delete(cart::clear))
        .route("/cart/:item_id", put(cart::update).delete(cart::remove))
        .route("/orders", get(orders::list).post(orders::create))
        .route("/orders/:id", get(orders::get))
        .route("/orders/:id/cancel", post(orders::cancel))
        .route("/orders/:id/pay", post(orders::pay))
        .route("/returns", get(returns::list).post(returns::create))
        .route("/wishlist", get(engagement::wishlist))
        .route("/wishlist/:product_id", post(engagement::add_to_wishlist).delete(engagement::remove_from_wishlist))
        .route("/payments/webhook", post(payments::webhook))
        .nest("/admin", admin_routes())
}

fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/products", get(admin::list_products).post(admin::create_product))
        .route("/products/export", get(admin::export_products))
        .route("/products/import", post(admin::import_products))
        .route("/products/:id", put(admin::update_product).delete(admin::delete_product))
        .route("/orders", get(admin::list_orders))
        .route("/orders/:id/status", put(admin::set_order_status))
        .route("/returns", get(admin::list_returns))
        .route("/returns/:id/status", put(admin::set_return_status))
        .route("/returns/:id/refund", put(admin::set_refund_status))
        .route("/promo-codes", get(admin::list_promo_codes).post(admin::create_promo_code))
        .route("/shipping-methods", get(admin::list_shipping_methods).post(admin::create_shipping_method))
        .route("/reviews/:id", delete(admin::delete_review))
        .route("/reservations/sweep", post(admin::sweep_reservations))
}
