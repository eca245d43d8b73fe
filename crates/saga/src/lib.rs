//! Saga orchestration for order placement.
//!
//! The order placement saga calls the participants in a fixed order:
//! 1. Create the order
//! 2. Process the sale
//! 3. Confirm the order
//!
//! If a step fails, the steps before it are compensated in reverse order.
//! Workflows live in a [`WorkflowStore`] for the lifetime of the process.

pub mod coordinator;
pub mod error;
pub mod order_placement;
pub mod services;
pub mod state;
pub mod store;
pub mod workflow;

pub use coordinator::{CoordinatorConfig, SagaCoordinator};
pub use error::{Result, SagaError};
pub use services::{
    CallLog, CreatedOrder, HttpOrderParticipant, HttpSalesParticipant, InMemoryOrderParticipant,
    InMemorySalesParticipant, LocalOrderParticipant, LocalSalesParticipant, OrderParticipant,
    ProcessedSale, SalesParticipant,
};
pub use state::{StepStatus, WorkflowStatus};
pub use store::{WorkflowHandle, WorkflowStore};
pub use workflow::{
    CompensationRecord, OrchestrationRequest, OrchestrationResponse, Workflow, WorkflowStep,
};
