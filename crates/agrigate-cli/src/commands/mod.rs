pub mod check;
pub mod config;
pub mod query;
pub mod roles;
