//! TrinityChain client - node selection and message dispatch for bindings
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Ledger Types
//! - [`block`] - Blocks, outputs, addresses and transaction payloads
//! - [`crypto`] - Key pairs and signatures (secp256k1)
//!
//! ## Node Access
//! - [`node_manager`] - Node pool, health sync and request dispatch
//! - [`quorum`] - Agreement checks across nodes
//! - [`node_api`] - Typed node and indexer routes
//! - [`events`] - Event feed subscriptions
//!
//! ## Client Operations
//! - [`client`] - The client handle and its builder
//! - [`pow`] - Proof-of-work miner
//! - [`api`] - Input selection, transactions, promotion and reattachment
//! - [`secret`] - Secret managers and signing
//!
//! ## Bindings
//! - [`message_interface`] - Serialized command dispatch
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types
//! - [`cache`] - Caching utilities
//! - [`utils`] - Address and mnemonic helpers

#![forbid(unsafe_code)]

// ============================================================================
// Ledger Types
// ============================================================================
pub mod block;
pub mod crypto;

// ============================================================================
// Node Access
// ============================================================================
pub mod events;
pub mod node_api;
pub mod node_manager;
pub mod quorum;

// ============================================================================
// Client Operations
// ============================================================================
pub mod api;
pub mod client;
pub mod pow;
pub mod secret;

// ============================================================================
// Bindings
// ============================================================================
pub mod message_interface;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod cache;
pub mod config;
pub mod error;
pub mod utils;

pub use client::{Client, ClientBuilder};
pub use error::{Error, ErrorKind, Result};
