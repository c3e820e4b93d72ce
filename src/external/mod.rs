pub mod mercadopago;

pub use mercadopago::*;
