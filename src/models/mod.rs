pub mod stock;
pub mod fundamental;
pub mod screening;
