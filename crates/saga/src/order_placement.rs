//! Order placement saga constants.

/// Step name: create the order and reserve stock.
pub const STEP_CREATE_ORDER: &str = "create_order";

/// Step name: charge the order, applying any voucher.
pub const STEP_PROCESS_SALES: &str = "process_sales";

/// Step name: confirm the order once charged.
pub const STEP_CONFIRM_ORDER: &str = "confirm_order";

/// Forward steps in execution order.
pub const STEPS: [&str; 3] = [STEP_CREATE_ORDER, STEP_PROCESS_SALES, STEP_CONFIRM_ORDER];
