//! Dynamically typed call surface
//!
//! A host runtime hands over an untyped list of arguments and calls exports by name. This module
//! does the arity and type checking such a runtime would otherwise leave to the native function, so
//! that [crate::echo] only ever sees well formed input.

use alloc::collections::BTreeMap;
use alloc::string::ToString;
use alloc::vec::Vec;

use crate::{echo, BufEchoError};

/// Name under which [echo::hello] is exported
pub const HELLO_EXPORT: &str = "hello";

/// An argument as passed by the host
#[derive(Debug)]
pub enum Value<'a> {
    /// Mutable byte buffer owned by the caller
    Buffer(&'a mut [u8]),
    Int(i64),
    Str(&'a str),
    Undefined,
}

impl Value<'_> {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Buffer(_) => "buffer",
            Value::Int(_) => "int",
            Value::Str(_) => "string",
            Value::Undefined => "undefined",
        }
    }
}

/// Signature shared by all exported native functions
pub type NativeFn = fn(&mut [Value<'_>]) -> Result<Vec<u8>, BufEchoError>;

/// Table of exported native functions
pub struct Exports {
    functions: BTreeMap<&'static str, NativeFn>,
}

impl Default for Exports {
    fn default() -> Self {
        Self::new()
    }
}

impl Exports {
    /// Set up the table with every native function of this crate
    pub fn new() -> Self {
        let mut functions: BTreeMap<&'static str, NativeFn> = BTreeMap::new();
        functions.insert(HELLO_EXPORT, hello);
        debug!("registered exports {:?}", functions.keys());
        Self { functions }
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.functions.keys().copied()
    }

    /// Call the export `name` with `args`
    pub fn call(&self, name: &str, args: &mut [Value<'_>]) -> Result<Vec<u8>, BufEchoError> {
        let Some(f) = self.functions.get(name) else {
            error!("no export named {name:?}");
            return Err(BufEchoError::UnknownExport(name.to_string()));
        };
        trace!("calling {name:?} with {} arguments", args.len());
        f(args)
    }
}

fn hello(args: &mut [Value<'_>]) -> Result<Vec<u8>, BufEchoError> {
    // Anything past the first argument is ignored
    let Some(first) = args.first_mut() else {
        error!("{HELLO_EXPORT:?} called without arguments");
        return Err(BufEchoError::InvalidArgumentCount {
            expected: 1,
            got: 0,
        });
    };

    match first {
        Value::Buffer(buf) => echo::hello(buf),
        other => {
            error!("{HELLO_EXPORT:?} expects a buffer, got {}", other.type_name());
            Err(BufEchoError::InvalidArgumentType {
                index: 0,
                expected: "buffer",
                got: other.type_name(),
            })
        }
    }
}
