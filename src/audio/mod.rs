//! # Audio Module
//!
//! Per-guild playback core for Subsonica.
//!
//! This module provides the playback functionality including:
//! - Strict FIFO queue with uniform shuffle
//! - Autoplay selection (random or by similarity) when the queue drains
//! - Voice connection management with bounded retries
//! - Multi-guild concurrent playback with full state isolation
//!
//! ## Architecture
//!
//! ### [`player`] - Playback State Machine
//! - Owns the queue, the current song and the per-guild state
//! - Single-flight advance cycle with exactly-once track completion
//!
//! ### [`registry`] - Player Registry
//! - One player per guild, created lazily and torn down on idle
//! - Grace timer before disconnecting an empty voice channel
//!
//! ### [`voice`] / [`transport`] - Voice Layer
//! - [`voice::VoiceTransport`] abstracts the driver for the core
//! - [`transport::SongbirdTransport`] is the real songbird-backed one

pub mod autoplay;
pub mod player;
pub mod queue;
pub mod registry;
pub mod transport;
pub mod voice;
