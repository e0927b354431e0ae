pub mod identity_tracker;
pub mod session;
