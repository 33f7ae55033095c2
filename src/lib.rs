//! Fit Assist: a fitness chat relay with a keyword topic gate, plus
//! per-user workout and nutrition history.

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod llm;
pub mod server;
pub mod store;
pub mod topic;
