pub mod currency;
pub mod fx;
pub mod models;
pub mod pii;
