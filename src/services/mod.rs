//! Domain services used by websocket and HTTP routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own business logic and persistence concerns so route
//! handlers can stay focused on protocol translation and auth plumbing.

pub mod access;
pub mod credits;
pub mod notify;
pub mod queue;
pub mod session;
pub mod sweeper;
pub mod trial;
pub mod visibility;
pub mod vitrine;
