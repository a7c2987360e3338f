//! Settings, on-disk layout and record persistence

pub mod crypto;
pub mod layout;
pub mod records;
pub mod settings;
