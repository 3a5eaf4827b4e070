//! # newsdesk
//!
//! Incremental indexing of crawled news articles into a local vector index,
//! and grounded question answering over that index.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌──────────────┐   ┌──────────────┐
//! │ Article store│──▶│   Indexer    │──▶│ Vector index │
//! │ (SQLite docs)│   │ fingerprint  │   │ (SQLite)     │
//! └──────────────┘   │ + embed      │   └──────┬───────┘
//!                    └──────────────┘          │
//!                                              ▼
//!                    ┌──────────────┐   ┌──────────────┐
//!                    │   Answer     │◀──│  Retriever   │
//!                    │  generator   │   │  top-k hits  │
//!                    └──────────────┘   └──────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! newsdesk init                          # create both databases
//! newsdesk import articles.jsonl         # load crawler output
//! newsdesk index                         # embed new and changed articles
//! newsdesk ask "What did the council decide?" --stream
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Core data types |
//! | [`fingerprint`] | Content fingerprints and embedding input |
//! | [`articles`] | Article store access and JSON Lines import |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`vector_index`] | Vector index trait, SQLite and in-memory backends |
//! | [`indexer`] | Incremental indexing with per-record outcomes |
//! | [`retriever`] | Nearest-article retrieval |
//! | [`context`] | Document context rendering |
//! | [`generation`] | Chat model clients and streaming decode |
//! | [`answer`] | Grounded answers, batch or streamed |
//! | [`progress`] | Indexing progress on stderr |
//! | [`status`] | Store and index overview |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`logging`] | Diagnostic logging setup |

pub mod answer;
pub mod articles;
pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod fingerprint;
pub mod generation;
pub mod indexer;
pub mod logging;
pub mod migrate;
pub mod models;
pub mod progress;
pub mod retriever;
pub mod status;
pub mod vector_index;
