//! Participant services invoked by the order placement saga.
//!
//! Each participant is a trait so the coordinator can drive remote services
//! over HTTP, the domain services in-process, or scripted fakes in tests.

pub mod http;
pub mod local;
pub mod order;
pub mod sales;

use std::sync::{Arc, Mutex, PoisonError};

pub use http::{HttpOrderParticipant, HttpSalesParticipant};
pub use local::{LocalOrderParticipant, LocalSalesParticipant};
pub use order::{CreatedOrder, InMemoryOrderParticipant, OrderParticipant};
pub use sales::{InMemorySalesParticipant, ProcessedSale, SalesParticipant};

/// Ordered record of participant calls shared by the in-memory fakes.
#[derive(Debug, Clone, Default)]
pub struct CallLog {
    calls: Arc<Mutex<Vec<String>>>,
}

impl CallLog {
    /// Creates an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&self, call: impl Into<String>) {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call.into());
    }

    /// Returns the calls made so far, oldest first.
    pub fn calls(&self) -> Vec<String> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns how many recorded calls equal `call`.
    pub fn count(&self, call: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|c| c.as_str() == call)
            .count()
    }
}
