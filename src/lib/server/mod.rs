pub mod error;
pub mod manager;
pub mod pages;
pub mod rate_limit;
