//! Outbound integrations: payment provider and buyer notifications.

pub mod notify;
pub mod payment;

pub use notify::{LogNotifier, NatsNotifier, Notifier};
pub use payment::{HttpPaymentGateway, PaymentGateway, PaymentSession, StubPaymentGateway};
