//! Core pipeline errors.

use thiserror::Error;

/// Core errors for crossgate.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Invalid state transition.
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    /// Target triple could not be parsed.
    #[error("Invalid target triple '{0}': expected <arch>-<vendor>-<os>[-<libc>]")]
    InvalidTarget(String),

    /// Path filter glob could not be compiled.
    #[error("Invalid path filter '{pattern}': {message}")]
    InvalidPathFilter { pattern: String, message: String },

    /// Pipeline definition failed validation.
    #[error("Invalid pipeline: {0}")]
    InvalidPipeline(String),

    /// Pipeline file could not be read.
    #[error("Failed to read pipeline definition '{path}': {message}")]
    ConfigRead { path: String, message: String },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}
