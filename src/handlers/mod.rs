pub mod order;
pub mod payment;
pub mod webhook;

pub use order::order_config;
pub use payment::payment_config;
pub use webhook::webhook_config;
