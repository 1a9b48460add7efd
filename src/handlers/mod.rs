//! Tool handlers
//!
//! Each invocation is independent: validate, call upstream, interpret, and for
//! images optionally download and save.

pub mod chat;
pub mod image;

pub use chat::get_chat_completion;
pub use image::generate_image;
