//! Sales participant trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use common::{Money, SalesId};
use domain::ProcessSale;
use serde::{Deserialize, Serialize};

use super::CallLog;
use crate::error::{Result, SagaError};

/// Result of a successful sale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessedSale {
    pub sales_id: SalesId,
    pub final_amount: Money,
    pub status: String,
}

/// Operations the saga needs from the sales service.
#[async_trait]
pub trait SalesParticipant: Send + Sync + 'static {
    /// Charges an order, applying the voucher if any.
    async fn process_sales(&self, request: &ProcessSale) -> Result<ProcessedSale>;

    /// Reverses a sale. Used as compensation.
    async fn reverse_sales(&self, sales_id: SalesId) -> Result<()>;
}

#[derive(Debug)]
struct InMemorySalesState {
    sales_id: SalesId,
    final_amount: Money,
    sales: HashMap<SalesId, &'static str>,
    fail_on_process: bool,
    fail_on_reverse: bool,
}

/// Scripted sales service for testing.
///
/// Every sale gets the configured id and final amount (7 and 17.98 by
/// default).
#[derive(Debug, Clone)]
pub struct InMemorySalesParticipant {
    state: Arc<Mutex<InMemorySalesState>>,
    log: CallLog,
}

impl InMemorySalesParticipant {
    /// Creates a participant recording its calls into `log`.
    pub fn new(log: CallLog) -> Self {
        Self {
            state: Arc::new(Mutex::new(InMemorySalesState {
                sales_id: SalesId::new(7),
                final_amount: Money::from_cents(1798),
                sales: HashMap::new(),
                fail_on_process: false,
                fail_on_reverse: false,
            })),
            log,
        }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, InMemorySalesState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Configures `process_sales` to fail.
    pub fn set_fail_on_process(&self, fail: bool) {
        self.state().fail_on_process = fail;
    }

    /// Configures `reverse_sales` to fail.
    pub fn set_fail_on_reverse(&self, fail: bool) {
        self.state().fail_on_reverse = fail;
    }

    /// Returns the status of a sale, if it was processed.
    pub fn sale_status(&self, sales_id: SalesId) -> Option<&'static str> {
        self.state().sales.get(&sales_id).copied()
    }
}

#[async_trait]
impl SalesParticipant for InMemorySalesParticipant {
    async fn process_sales(&self, request: &ProcessSale) -> Result<ProcessedSale> {
        self.log.record(format!("process_sales({})", request.order_id));
        let mut state = self.state();
        if state.fail_on_process {
            return Err(SagaError::participant("sales", "payment declined"));
        }
        let sales_id = state.sales_id;
        state.sales.insert(sales_id, "completed");

        Ok(ProcessedSale {
            sales_id,
            final_amount: state.final_amount,
            status: "completed".to_string(),
        })
    }

    async fn reverse_sales(&self, sales_id: SalesId) -> Result<()> {
        self.log.record(format!("reverse_sales({sales_id})"));
        let mut state = self.state();
        if state.fail_on_reverse {
            return Err(SagaError::participant("sales", "sales service unavailable"));
        }
        state.sales.insert(sales_id, "reversed");
        Ok(())
    }
}
