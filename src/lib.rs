#![cfg_attr(not(test), no_std)]

pub mod config;
pub mod conn_state;
pub mod dispatch;
pub mod error;
pub mod gatt;
pub mod link_ctx;
pub mod qwr;
pub mod stack;

pub use error::Error;
