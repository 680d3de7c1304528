//! # staffdir
//!
//! A directory-backed contact lookup service. staffdir mirrors a subset of
//! an organizational directory into a local SQLite store, keeps a token
//! inverted index up to date incrementally, and serves lookups over a CLI
//! and a small authenticated HTTP API.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐   ┌──────────────┐   ┌───────────┐
//! │  Directory  │──▶│  Delta sync  │──▶│  SQLite   │
//! │  (snapshot) │   │ normalize +  │   │ records + │
//! └─────────────┘   │ index diff   │   │ index     │
//!                   └──────────────┘   └─────┬─────┘
//!                                            │
//!                          ┌─────────────────┤
//!                          ▼                 ▼
//!                     ┌──────────┐     ┌──────────┐
//!                     │   CLI    │     │   HTTP   │
//!                     │(staffdir)│     │  (API)   │
//!                     └──────────┘     └──────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Raw entries, normalized records, run metadata |
//! | [`directory`] | Directory source abstraction and snapshot reader |
//! | [`normalize`] | Entry normalization: guid, FILETIME, groups, UAC |
//! | [`tokenize`] | Search tokenizer |
//! | [`index`] | Incremental inverted-index maintenance |
//! | [`sync`] | The delta-sync pass |
//! | [`search`] | Token search over the index |
//! | [`manual`] | Admin path for manual records |
//! | [`server`] | Authenticated HTTP API |
//! | [`store`] | Named-collection key-value backends |
//! | [`db`] | SQLite connection |
//! | [`migrate`] | Schema creation |
//! | [`report`] | Sync progress reporting and per-run logs |

pub mod config;
pub mod db;
pub mod directory;
pub mod get;
pub mod index;
pub mod manual;
pub mod migrate;
pub mod models;
pub mod normalize;
pub mod report;
pub mod search;
pub mod server;
pub mod store;
pub mod sync;
pub mod tokenize;
