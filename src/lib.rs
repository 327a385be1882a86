//! A small tool-calling agent library and the weather demos built on it.
//!
//! A [`ChatModel`] wraps a [`CompletionProvider`]; an [`agent::Agent`] runs the
//! model/tool loop over it, optionally persisting threads through a
//! [`agent::Checkpointer`] and coercing the answer into a schema.

// Lets `#[derive(Structured)]` refer to `weather_agent::...` inside this crate too
extern crate self as weather_agent;

pub mod agent;
pub mod chat_model;
pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod providers;
pub mod traits;
pub mod weather;

pub use chat_model::{init_chat_model, ChatModel, ModelProvider, ModelSettings};
pub use error::*;
pub use models::*;
pub use traits::*;
pub use weather_agent_derive::Structured;

#[doc(hidden)]
pub use serde_json;
