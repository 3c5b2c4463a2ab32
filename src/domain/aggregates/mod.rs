//! Aggregates module
pub mod product;
pub mod order;
pub mod cart;
pub mod promo;
pub mod reservation;
pub mod order_return;
pub mod shipping;
pub mod engagement;

pub use product::{Product, ProductVariant};
pub use order::{Order, OrderItem, OrderStatus, PaymentMethod, UnknownVariant};
pub use cart::{Cart, CartItem, CartLine};
pub use promo::{DiscountType, PromoCode};
pub use reservation::{ProductReservation, ReservationLine, ReservationStatus};
pub use order_return::{OrderReturn, RefundStatus, ReturnStatus};
pub use shipping::ShippingMethod;
pub use engagement::{Review, WishlistItem};
