use chrono::{DateTime, Utc};
use common::{CustomerId, Money, OrderId, SalesId, VoucherId};
use serde::{Deserialize, Serialize};

/// A percentage discount voucher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Voucher {
    pub id: VoucherId,
    pub code: String,
    pub discount_percent: f64,
    /// Upper bound on the discount granted by one sale.
    pub max_discount: Option<Money>,
    pub is_active: bool,
}

impl Voucher {
    /// Computes the discount on `amount`, capped at `max_discount`.
    pub fn discount_for(&self, amount: Money) -> Money {
        let discount = amount.percentage(self.discount_percent);
        match self.max_discount {
            Some(cap) if discount > cap => cap,
            _ => discount,
        }
    }
}

/// Input for creating a voucher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewVoucher {
    pub code: String,
    pub discount_percent: f64,
    #[serde(default)]
    pub max_discount: Option<Money>,
}

/// Status of a sales transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SalesStatus {
    /// Recorded from an ORDER_CREATED event, no voucher applied yet.
    Pending,
    Completed,
    /// Undone by a saga compensation.
    Reversed,
}

impl SalesStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SalesStatus::Pending => "pending",
            SalesStatus::Completed => "completed",
            SalesStatus::Reversed => "reversed",
        }
    }
}

impl std::fmt::Display for SalesStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SalesStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(SalesStatus::Pending),
            "completed" => Ok(SalesStatus::Completed),
            "reversed" => Ok(SalesStatus::Reversed),
            other => Err(format!("unknown sales status '{other}'")),
        }
    }
}

/// A sales transaction, at most one per order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SalesTransaction {
    pub id: SalesId,
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub voucher_id: Option<VoucherId>,
    pub voucher_code: Option<String>,
    pub original_amount: Money,
    pub discount_amount: Money,
    pub final_amount: Money,
    pub status: SalesStatus,
    pub created_at: DateTime<Utc>,
}

/// Request to charge an order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessSale {
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    pub original_amount: Money,
    #[serde(default)]
    pub voucher_code: Option<String>,
}

/// Priced sale about to be stored.
#[derive(Debug, Clone, PartialEq)]
pub struct Pricing {
    pub voucher: Option<Voucher>,
    pub original_amount: Money,
    pub discount_amount: Money,
    pub final_amount: Money,
}

impl Pricing {
    /// Prices an amount with an optional voucher.
    pub fn new(original_amount: Money, voucher: Option<Voucher>) -> Self {
        let discount_amount = voucher
            .as_ref()
            .map(|v| v.discount_for(original_amount))
            .unwrap_or_default();
        Self {
            voucher,
            original_amount,
            discount_amount,
            final_amount: original_amount - discount_amount,
        }
    }
}
