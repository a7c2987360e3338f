//! Background work

pub mod tasks;
