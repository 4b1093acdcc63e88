//! agentbox: run a coding agent in a container and keep its conversations.
//!
//! The [`engine`] drives one agent run end to end: it launches the agent
//! through a [`supervisor::AgentLauncher`], decodes its line-delimited JSON
//! output, relays each event live and checkpoints the run into a session log.
//! Runs can be grouped into threads that share the agent's resumption token.
//!
//! # Quick start
//!
//! ```no_run
//! use agentbox::config::load_config;
//! use agentbox::engine::{Engine, RunRequest};
//!
//! # async fn example() {
//! let config = load_config(None).unwrap();
//! let engine = Engine::new(&config);
//! let result = engine
//!     .run(RunRequest {
//!         project: "demo".into(),
//!         prompt: "list files".into(),
//!         ..RunRequest::default()
//!     })
//!     .await
//!     .unwrap();
//! println!("{}", result.response);
//! # }
//! ```

pub mod build_info;
pub mod config;
pub mod decoder;
pub mod engine;
pub mod error;
pub mod events;
pub mod logging;
pub mod render;
pub mod store;
pub mod supervisor;
pub mod textutil;
pub mod timeline;
