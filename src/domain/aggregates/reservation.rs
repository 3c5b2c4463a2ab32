//! Stock reservations held for unpaid orders

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use super::order::UnknownVariant;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductReservation {
    pub id: Uuid,
    pub order_id: Uuid,
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: u32,
    pub status: ReservationStatus,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl ProductReservation {
    /// A pending hold that still counts against available stock.
    pub fn holds_stock(&self, now: DateTime<Utc>) -> bool {
        self.status == ReservationStatus::Pending && self.expires_at > now
    }

    pub fn is_stale(&self, now: DateTime<Utc>) -> bool {
        self.status == ReservationStatus::Pending && self.expires_at <= now
    }

    /// Pending and lapsed holds can still be confirmed when payment arrives.
    pub fn is_confirmable(&self) -> bool {
        matches!(self.status, ReservationStatus::Pending | ReservationStatus::Expired)
    }

    pub fn same_stock(&self, product_id: Uuid, variant_id: Option<Uuid>) -> bool {
        self.product_id == product_id && self.variant_id == variant_id
    }

    /// Whether `stock` still covers this hold at payment time. A lapsed hold
    /// stopped counting against availability, so live holds of other orders
    /// (`held_by_others`) take precedence over it.
    pub fn is_covered(&self, stock: u32, held_by_others: u32, now: DateTime<Utc>) -> bool {
        let lapsed = self.status == ReservationStatus::Expired || self.is_stale(now);
        let free = if lapsed { stock.saturating_sub(held_by_others) } else { stock };
        self.quantity <= free
    }

    pub fn line(&self) -> ReservationLine {
        ReservationLine { product_id: self.product_id, variant_id: self.variant_id, quantity: self.quantity }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Released,
    Expired,
}

impl ReservationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Confirmed => "CONFIRMED",
            Self::Released => "RELEASED",
            Self::Expired => "EXPIRED",
        }
    }
}

impl FromStr for ReservationStatus {
    type Err = UnknownVariant;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(Self::Pending),
            "CONFIRMED" => Ok(Self::Confirmed),
            "RELEASED" => Ok(Self::Released),
            "EXPIRED" => Ok(Self::Expired),
            _ => Err(UnknownVariant::new("reservation status", s)),
        }
    }
}

/// One line to reserve for an order.
#[derive(Clone, Debug, PartialEq)]
pub struct ReservationLine {
    pub product_id: Uuid,
    pub variant_id: Option<Uuid>,
    pub quantity: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn reservation(status: ReservationStatus, expires_in: Duration) -> ProductReservation {
        let now = Utc::now();
        ProductReservation {
            id: Uuid::now_v7(), order_id: Uuid::now_v7(), product_id: Uuid::now_v7(), variant_id: None,
            quantity: 1, status, expires_at: now + expires_in, created_at: now,
        }
    }

    #[test]
    fn test_pending_hold_counts_until_expiry() {
        let now = Utc::now();
        assert!(reservation(ReservationStatus::Pending, Duration::minutes(5)).holds_stock(now));
        let lapsed = reservation(ReservationStatus::Pending, Duration::minutes(-5));
        assert!(!lapsed.holds_stock(now));
        assert!(lapsed.is_stale(now));
    }

    #[test]
    fn test_confirmed_is_not_confirmable_again() {
        assert!(!reservation(ReservationStatus::Confirmed, Duration::minutes(5)).is_confirmable());
        assert!(reservation(ReservationStatus::Expired, Duration::minutes(-5)).is_confirmable());
        assert!(!reservation(ReservationStatus::Released, Duration::minutes(5)).is_confirmable());
    }

    #[test]
    fn test_lapsed_hold_yields_to_live_holds() {
        let mut lapsed = reservation(ReservationStatus::Expired, Duration::minutes(-5));
        lapsed.quantity = 3;
        let now = Utc::now();
        assert!(lapsed.is_covered(3, 0, now));
        assert!(!lapsed.is_covered(3, 1, now));
        assert!(!lapsed.is_covered(2, 0, now));

        let mut pending = reservation(ReservationStatus::Pending, Duration::minutes(5));
        pending.quantity = 3;
        assert!(pending.is_covered(3, 3, now));
        assert!(!pending.is_covered(2, 0, now));

        let mut unswept = reservation(ReservationStatus::Pending, Duration::minutes(-5));
        unswept.quantity = 3;
        assert!(!unswept.is_covered(3, 1, now));
    }
}
