//! Pool management layer.
//!
//! This module provides:
//! - The per-target [`Manager`] (engine lifecycle, probe, scoped sessions)
//! - The [`Registry`] guaranteeing one manager per target identity
//! - Session factory and release guard

pub mod manager;
pub mod registry;
pub mod session;

pub use manager::{Manager, ManagerState};
pub use registry::{Registry, get_or_create};
pub use session::SessionFactory;
