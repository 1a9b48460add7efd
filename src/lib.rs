//! Tool server that puts a FLUX-style generation worker behind two host tools
//!
//! `generate_image` validates its parameters, asks the worker for an image,
//! pulls the image URL out of the reply and optionally saves the file locally.
//! `get_chat_completion` forwards a single prompt and returns the text answer.

pub mod config;
pub mod envelope;
pub mod error;
pub mod handlers;
pub mod mime;
pub mod models;
pub mod server;
pub mod storage;
pub mod upstream;
pub mod validate;

pub use config::Config;
pub use envelope::ResultEnvelope;
pub use error::{Error, Result};
pub use server::ToolServer;
