//! # UI Module
//!
//! Discord-facing presentation: embeds and the channel announcement sink.

pub mod embeds;
pub mod sink;
