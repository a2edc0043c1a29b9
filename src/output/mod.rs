//! Output module
//!
//! Responders that turn domain results and templates into HTTP responses.

pub mod payload;
pub mod view;

pub use payload::{Payload, PayloadError, PayloadResponder};
pub use view::{ViewError, ViewResponder};
