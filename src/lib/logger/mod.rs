pub mod history;
pub mod manager;
