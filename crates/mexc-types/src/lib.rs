//! Shared types for the MEXC stream SDK
//!
//! This crate provides the core type definitions used across the workspace.
//! It has minimal dependencies and can be used independently.
//!
//! # Key Types
//!
//! - [`MexcError`] - Error taxonomy shared by every crate
//! - [`ProtocolVariant`], [`Visibility`] - Which wire protocol and channel class a topic uses
//! - [`Speed`], [`KlineInterval`], [`DepthLevel`], [`Timezone`] - Typed topic parameters

pub mod enums;
pub mod error;

// Re-export commonly used types
pub use enums::*;
pub use error::*;
