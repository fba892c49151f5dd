//! # Reply Harness
//!
//! Retrieval-backed email reply drafting. Example emails are embedded and
//! stored per company; an incoming email is embedded, its nearest examples
//! are retrieved, and a hosted chat model drafts a reply in the same tone.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌───────────┐   ┌─────────────┐   ┌──────────────┐
//! │ Embedding │──▶│  Example  │──▶│   Prompt    │──▶│    Reply     │
//! │  Provider │   │   Store   │   │  Assembler  │   │  Generator   │
//! └───────────┘   └───────────┘   └─────────────┘   └──────┬───────┘
//!                                                          │ deadline race
//!                      ┌───────────────────────────────────┘
//!                      ▼
//!                 ┌──────────┐       ┌──────────┐
//!                 │   CLI    │       │   HTTP   │
//!                 └──────────┘       └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`error`] | Error taxonomy |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`store`] | Company-scoped example storage and similarity search |
//! | [`prompt`] | Prompt rendering |
//! | [`llm`] | Chat-completion clients |
//! | `http` | Shared HTTP client helpers (crate-private) |
//! | [`deadline`] | Operation vs. timeout race |
//! | [`reply`] | Reply generation with fallback |
//! | [`pipeline`] | Ingest and reply orchestration |
//! | [`server`] | HTTP API |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod config;
pub mod db;
pub mod deadline;
pub mod embedding;
pub mod error;
mod http;
pub mod llm;
pub mod migrate;
pub mod models;
pub mod pipeline;
pub mod prompt;
pub mod reply;
pub mod server;
pub mod store;
