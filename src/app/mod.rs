pub mod authorizer;
pub mod capability;
pub mod engine;
pub mod error;
pub mod locks;
pub mod policy;
pub mod reconciler;
