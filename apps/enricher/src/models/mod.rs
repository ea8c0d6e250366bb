pub mod field;
pub mod previous;
pub mod unit_config;
