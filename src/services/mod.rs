// Order lifecycle
pub mod state_machine;
pub mod order_status;
pub mod order_lookup;
pub mod reconciliation;

// Checkout and payment
pub mod checkout;
pub mod payments;
pub mod sessions;
pub mod shipping;
pub mod submission_guard;

// Inventory
pub mod stock;
