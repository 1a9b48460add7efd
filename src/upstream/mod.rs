//! Upstream generation worker
//!
//! HTTP transport to the worker's chat-completions route plus the logic that
//! pulls a usable result out of its loosely shaped replies.

pub mod client;
pub mod reply;

pub use client::{ImageAsset, UpstreamClient};
pub use reply::UpstreamReply;
