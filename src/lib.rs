//! Berth - volume lifecycle broker
//!
//! Finds or creates worker volumes by identity so that concurrent
//! requests for the same identity converge on a single physical volume.

pub mod broker;
pub mod catalog;
pub mod cli;
pub mod config;
pub mod error;
pub mod lock;
pub mod storage;
pub mod ui;
pub mod volume;

pub use error::{BerthError, BerthResult};
