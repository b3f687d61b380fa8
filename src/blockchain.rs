// Thin re-export module: implementation lives in `blockchain/core.rs`.

pub mod core;
pub use core::*;
