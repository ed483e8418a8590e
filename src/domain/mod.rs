pub mod action;
pub mod quota;
