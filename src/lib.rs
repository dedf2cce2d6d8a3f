//! # sheetdb - A sheet-backed database server in Rust
//!
//! Tables are stored as directories of small CSV files ("sheets"), each
//! holding at most `tuples_limit` rows, and queried over TCP with a small
//! SQL-like command language:
//! - **SELECT** with cross joins and `AND` / `OR` equality filters
//! - **INSERT** with auto-assigned, persistent primary keys
//! - **DELETE** of whole tables or of the rows matching a filter
//! - **Per-table locking**: statements over disjoint tables run in parallel
//!
//! ## Architecture Overview
//!
//! 1. **Server Layer** (`server` module): TCP connections and the prompt / response protocol
//! 2. **SQL Layer** (`sql` module): statement grammar, locking and dispatch
//! 3. **Engine Layer** (`engine` module): schema, sheets, conditions, joins and locks
//!
//! ## On-disk Layout
//!
//! ```text
//! <storage_path>/<schema name>/<table>/1.csv
//!                                     /2.csv
//!                                     /<table>_pk_sequence
//! ```
//!
//! ## Usage Example
//!
//! ```bash
//! # Start the server
//! cargo run -- --config ./config/local.json
//!
//! # Connect and run commands
//! nc 127.0.0.1 7432
//! >> INSERT INTO beer VALUES ('Duvel', 'Belgian Ale', '8.5')
//! >> SELECT beer.name, beer.abv FROM beer WHERE beer.style = 'Belgian Ale'
//! ```

/// Server configuration file
pub mod config;

/// TCP server and client connection handling
pub mod server;

/// Schema, sheet storage, conditions, joins and table locks
pub mod engine;

/// Command grammar and statement execution
pub mod sql;
