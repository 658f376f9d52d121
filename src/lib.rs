//! hanzi-palace - a memory palace for learning Chinese characters.
//!
//! Actors stand for pinyin initials, sets for pinyin finals, props for
//! components, and each character is a scene that ties them together. This
//! library keeps those four collections consistent, gives every change an
//! undo step, and persists everything as JSON documents with timestamped
//! backups.
//!
//! # Modules
//!
//! - [`model`] - Entity records, form payloads and load-time normalization
//! - [`repository`] - The collections and their validation rules
//! - [`search`] - Filtering with cross-entity joins
//! - [`history`] - Snapshot undo/redo
//! - [`backup`] - On-demand and periodic backups
//! - [`storage`] - Storage backend trait and implementations
//! - [`session`] - One open palace: repository, history, storage and backups together
//! - [`commands`] - High-level operations behind the CLI and shell
//! - [`config`] - Configuration loading
//! - [`cli`] - Command-line interface definitions

pub mod backup;
pub mod cli;
pub mod commands;
pub mod config;
pub mod history;
pub mod model;
pub mod repository;
pub mod search;
pub mod session;
pub mod storage;
