//! Canonical schema: the typed Alert and Action shapes all raw input is
//! normalized into, plus the registered site set.

pub mod action;
pub mod alert;
pub mod enums;
pub mod site;

pub use action::*;
pub use alert::*;
pub use enums::*;
pub use site::*;
