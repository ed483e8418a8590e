pub mod audit_listener;
pub mod maintenance;
