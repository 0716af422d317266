//! Domain types for the custody state machine.

pub mod group;
pub mod receipt;
pub mod units;

pub use group::{CreateGroupRequest, Group, GroupResponse};
pub use receipt::{receipt_id, Receipt, ReceiptResponse, ReceiptStatus};
