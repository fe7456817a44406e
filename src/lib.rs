//! Core engine for merging independent application windows into tab groups:
//! window discovery and identity resolution, group lifecycle with MRU
//! cycling, and the bridge that keeps groups consistent with external
//! window notifications.

pub mod actor;
pub mod common;
pub mod model;
pub mod resolver;
pub mod sys;
