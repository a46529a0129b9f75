#![cfg_attr(not(any(test, feature = "std")), no_std)]

extern crate alloc;

use alloc::string::String;

pub mod binding;
#[cfg(feature = "std")]
pub mod blueprint;
pub mod echo;
#[cfg(feature = "std")]
pub mod ffi;
pub mod host;

pub use echo::hello;
pub use host::*;

#[macro_use]
extern crate log;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BufEchoError {
    /// The call received fewer arguments than the export requires
    #[error("wrong number of arguments: expected {expected}, got {got}")]
    InvalidArgumentCount { expected: usize, got: usize },

    #[error("wrong argument type at position {index}: expected {expected}, got {got}")]
    InvalidArgumentType {
        index: usize,
        expected: &'static str,
        got: &'static str,
    },

    #[error("buffer too small: expected at least {expected} bytes, got {got}")]
    BufferTooSmall { expected: usize, got: usize },

    #[error("output buffer must be exactly {expected} bytes, got {got}")]
    OutputSizeMismatch { expected: usize, got: usize },

    #[error("no export named {0:?}")]
    UnknownExport(String),

    /// A guest supplied region does not fit into its linear memory
    #[error("region {ptr:#x}+{len} is outside of guest memory ({memory_size} bytes)")]
    OutOfBounds {
        ptr: usize,
        len: usize,
        memory_size: usize,
    },

    /// The guest allocator handed back memory overlapping the input buffer
    #[error("guest allocation at {0:#x} overlaps the input buffer")]
    AliasedAllocation(usize),

    #[error("could not load wasm module")]
    WasmLoadError,

    #[error("wasm value has an unexpected type")]
    UnexpectedWasmType,

    // The specified memory was not found
    #[error("no such wasm memory")]
    NoSuchWasmMemory,

    #[error("guest does not export {0:?}")]
    MissingGuestExport(String),

    #[error("guest trapped: {0}")]
    GuestTrap(String),
}
