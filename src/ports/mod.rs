//! Ports - Traits implemented by adapters.

pub mod storage;
