//! # Services module
//!
//! This module provide services to interact with the DocumentDB control
//! plane and helpers to do so.
pub mod cfg;
pub mod docdb;
pub mod reconciler;
