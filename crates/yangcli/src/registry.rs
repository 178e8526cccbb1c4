//! Handler registry: stable `namespace:function` symbols → typed handlers.
//!
//! Schema documents name handlers by symbol (`ex:cli-handler "core:hello"`).
//! The registry is populated at startup; resolution is a plain map lookup.

use std::collections::BTreeMap;
use std::fmt;

use anyhow::{anyhow, Result};
use thiserror::Error;

use crate::session::Session;

/// Arguments handed to a handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Raw tokens (positional commands and `show <field> ...`).
    Positional(Vec<String>),
    /// Parsed `key=value` tokens; later duplicates overwrite earlier ones.
    KeyValue(BTreeMap<String, String>),
}

impl Payload {
    pub fn into_key_value(self, command: &str) -> Result<BTreeMap<String, String>> {
        match self {
            Payload::KeyValue(args) => Ok(args),
            Payload::Positional(_) => Err(anyhow!("{command} expects key=value arguments")),
        }
    }

    pub fn into_positional(self, command: &str) -> Result<Vec<String>> {
        match self {
            Payload::Positional(tokens) => Ok(tokens),
            Payload::KeyValue(_) => Err(anyhow!("{command} expects positional arguments")),
        }
    }
}

pub trait Handler {
    fn call(&self, session: &mut Session, payload: Payload) -> Result<()>;
}

impl<F> Handler for F
where
    F: Fn(&mut Session, Payload) -> Result<()>,
{
    fn call(&self, session: &mut Session, payload: Payload) -> Result<()> {
        self(session, payload)
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("invalid handler symbol `{symbol}` (expected `namespace:function`)")]
    Malformed { symbol: String },
    #[error("handler namespace `{namespace}` is not registered")]
    UnknownNamespace { namespace: String },
    #[error("no handler `{function}` in namespace `{namespace}`")]
    UnknownFunction { namespace: String, function: String },
}

#[derive(Default)]
pub struct HandlerRegistry {
    namespaces: BTreeMap<String, BTreeMap<String, Box<dyn Handler>>>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.symbols()).finish()
    }
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the `core` namespace.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::builtins::register(&mut registry);
        registry
    }

    /// Register (or replace) the handler behind `symbol`.
    pub fn register<H>(&mut self, symbol: &str, handler: H) -> Result<(), ResolutionError>
    where
        H: Handler + 'static,
    {
        let (namespace, function) = split_symbol(symbol)?;
        self.namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(function.to_string(), Box::new(handler));
        Ok(())
    }

    pub fn resolve(&self, symbol: &str) -> Result<&dyn Handler, ResolutionError> {
        let (namespace, function) = split_symbol(symbol)?;
        let functions =
            self.namespaces
                .get(namespace)
                .ok_or_else(|| ResolutionError::UnknownNamespace {
                    namespace: namespace.to_string(),
                })?;
        functions
            .get(function)
            .map(|h| h.as_ref())
            .ok_or_else(|| ResolutionError::UnknownFunction {
                namespace: namespace.to_string(),
                function: function.to_string(),
            })
    }

    pub fn symbols(&self) -> impl Iterator<Item = String> + '_ {
        self.namespaces.iter().flat_map(|(namespace, functions)| {
            functions
                .keys()
                .map(move |function| format!("{namespace}:{function}"))
        })
    }
}

fn split_symbol(symbol: &str) -> Result<(&str, &str), ResolutionError> {
    let malformed = || ResolutionError::Malformed {
        symbol: symbol.to_string(),
    };
    let (namespace, function) = symbol.split_once(':').ok_or_else(malformed)?;
    let (namespace, function) = (namespace.trim(), function.trim());
    if namespace.is_empty() || function.is_empty() {
        return Err(malformed());
    }
    Ok((namespace, function))
}
