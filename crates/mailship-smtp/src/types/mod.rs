//! Core SMTP protocol types.

mod address;
mod capability;
mod reply;

pub use address::Address;
pub use capability::{AuthMechanism, ServerCapabilities};
pub use reply::{Reply, ReplyCode};
