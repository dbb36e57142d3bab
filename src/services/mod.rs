//! Domain services used by the HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own session state, persistence and catalog queries so
//! route handlers can stay focused on protocol translation and cookies.

pub mod avatar;
pub mod catalog;
pub mod forms;
pub mod registry;
pub mod session;
pub mod snapshot;
