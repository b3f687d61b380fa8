//! CornellChain - an educational UTXO blockchain with pluggable seals
//!
//! # Architecture
//!
//! The crate is organized into logical modules:
//!
//! ## Core Blockchain
//! - [`blockchain`] - Blocks, the validity engine and the fork-aware ledger
//! - [`transaction`] - Transaction types and syntactic validity
//! - [`encoding`] - Canonical string encoding and double SHA-256
//!
//! ## Consensus
//! - [`consensus`] - Proof-of-work and proof-of-authority seal strategies
//! - [`miner`] - Blocking and background sealing with cancellation
//!
//! ## Cryptography
//! - [`crypto`] - Signatures and verification (secp256k1)
//!
//! ## State Management
//! - [`persistence`] - Database layer (SQLite)
//! - [`node`] - Single-writer node owning the ledger and its store
//!
//! ## Configuration & Utilities
//! - [`config`] - Configuration management
//! - [`error`] - Error types

#![forbid(unsafe_code)]

// ============================================================================
// Core Blockchain
// ============================================================================
pub mod blockchain;
pub mod encoding;
pub mod transaction;

// ============================================================================
// Consensus & Mining
// ============================================================================
pub mod consensus;
pub mod miner;

// ============================================================================
// Cryptography
// ============================================================================
pub mod crypto;

// ============================================================================
// State Management
// ============================================================================
pub mod node;
pub mod persistence;

// ============================================================================
// Configuration & Utilities
// ============================================================================
pub mod config;
pub mod error;
