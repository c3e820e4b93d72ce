pub mod catalog;
pub mod common;
pub mod order;
pub mod payment;

pub use catalog::*;
pub use common::*;
pub use order::*;
pub use payment::*;
