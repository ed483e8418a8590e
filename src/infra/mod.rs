pub mod db;
pub mod discord;
pub mod ledger;
pub mod memory;
pub mod platform;
