// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Traced value shapes
//!
//! A node wraps one opaque [`Value`]: text, a number, a boolean, a structured
//! mapping, or an arbitrary JSON document. Shape-specific access goes through
//! the [`ValueView`]/[`ValueViewMut`] delegates rather than the node itself,
//! so that raw item access never creates graph edges. Direct item access is
//! a discouraged backdoor and is surfaced as a warning; computations over
//! traced values belong on the operation-node path (see [`crate::ops`]).

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};

/// An opaque value wrapped by a trace node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Plain text
    Text(String),
    /// A floating-point number
    Number(f64),
    /// A boolean
    Bool(bool),
    /// A structured key/value mapping
    Mapping(serde_json::Map<String, serde_json::Value>),
    /// Any other JSON document
    Opaque(serde_json::Value),
}

impl Value {
    /// Short kind name, also used as the default base name at registration.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Text(_) => "text",
            Value::Number(_) => "number",
            Value::Bool(_) => "bool",
            Value::Mapping(_) => "mapping",
            Value::Opaque(_) => "opaque",
        }
    }

    /// Truthiness of the wrapped value, used by conditional operators.
    ///
    /// Empty text, zero, `false`, an empty mapping, and JSON null are falsy.
    #[must_use]
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Text(s) => !s.is_empty(),
            Value::Number(n) => *n != 0.0,
            Value::Bool(b) => *b,
            Value::Mapping(m) => !m.is_empty(),
            Value::Opaque(v) => !v.is_null(),
        }
    }

    /// Read-only shape-specific view of this value.
    #[must_use]
    pub fn view(&self) -> ValueView<'_> {
        match self {
            Value::Text(s) => ValueView::Text(TextView(s)),
            Value::Mapping(m) => ValueView::Mapping(MappingView(m)),
            Value::Number(_) | Value::Bool(_) | Value::Opaque(_) => ValueView::Opaque(self),
        }
    }

    /// Mutable shape-specific view of this value.
    pub fn view_mut(&mut self) -> ValueViewMut<'_> {
        match self {
            Value::Mapping(m) => ValueViewMut::Mapping(MappingViewMut(m)),
            other => ValueViewMut::Opaque(other),
        }
    }

    pub(crate) fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        #[allow(clippy::cast_precision_loss)]
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for Value {
    fn from(m: serde_json::Map<String, serde_json::Value>) -> Self {
        Value::Mapping(m)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Object(m) => Value::Mapping(m),
            other => Value::Opaque(other),
        }
    }
}

/// Read-only delegate over a wrapped value.
///
/// Each variant exposes only the accesses its shape supports; requesting an
/// unsupported access fails with [`Error::UnsupportedAccess`] instead of
/// guessing a behavior.
#[derive(Debug)]
pub enum ValueView<'a> {
    /// View over text
    Text(TextView<'a>),
    /// View over a structured mapping
    Mapping(MappingView<'a>),
    /// View over a value with no item structure
    Opaque(&'a Value),
}

impl<'a> ValueView<'a> {
    /// Number of items: characters for text, entries for a mapping.
    pub fn len(&self) -> Result<usize> {
        match self {
            ValueView::Text(t) => Ok(t.len()),
            ValueView::Mapping(m) => Ok(m.len()),
            ValueView::Opaque(v) => Err(Error::UnsupportedAccess {
                access: "len",
                kind: v.kind(),
            }),
        }
    }

    /// Whether the value has no items.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Containment check: substring for text, key presence for a mapping.
    pub fn contains(&self, key: &str) -> Result<bool> {
        match self {
            ValueView::Text(t) => Ok(t.0.contains(key)),
            ValueView::Mapping(m) => Ok(m.0.contains_key(key)),
            ValueView::Opaque(v) => Err(Error::UnsupportedAccess {
                access: "contains",
                kind: v.kind(),
            }),
        }
    }

    /// Keyed item access on a mapping.
    ///
    /// Surfaces a usage warning: reads that feed further computation should
    /// go through a traced `getitem` operation instead.
    pub fn get(&self, key: &str) -> Result<&'a serde_json::Value> {
        match self {
            ValueView::Mapping(m) => m.get(key),
            ValueView::Text(_) => Err(Error::UnsupportedAccess {
                access: "get",
                kind: "text",
            }),
            ValueView::Opaque(v) => Err(Error::UnsupportedAccess {
                access: "get",
                kind: v.kind(),
            }),
        }
    }
}

/// Read-only view over wrapped text.
#[derive(Debug)]
pub struct TextView<'a>(&'a str);

impl<'a> TextView<'a> {
    /// Character count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.chars().count()
    }

    /// Whether the text is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Character at a position.
    ///
    /// Surfaces a usage warning, mirroring [`MappingView::get`].
    pub fn char_at(&self, index: usize) -> Result<char> {
        warn!(index, "direct item access on traced text bypasses the operation path");
        self.0.chars().nth(index).ok_or(Error::IndexOutOfBounds {
            index,
            len: self.len(),
        })
    }

    /// Iterator over characters.
    pub fn chars(&self) -> impl Iterator<Item = char> + 'a {
        self.0.chars()
    }

    /// The underlying text.
    #[must_use]
    pub fn as_str(&self) -> &'a str {
        self.0
    }
}

/// Read-only view over a wrapped mapping.
#[derive(Debug)]
pub struct MappingView<'a>(&'a serde_json::Map<String, serde_json::Value>);

impl<'a> MappingView<'a> {
    /// Entry count.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the mapping is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Keyed item access.
    ///
    /// Surfaces a usage warning: reads that feed further computation should
    /// go through a traced `getitem` operation instead.
    pub fn get(&self, key: &str) -> Result<&'a serde_json::Value> {
        warn!(key, "direct item access on traced mapping bypasses the operation path");
        self.0.get(key).ok_or_else(|| Error::KeyNotFound {
            key: key.to_owned(),
        })
    }

    /// Key presence check.
    #[must_use]
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Iterator over keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &'a str> {
        self.0.keys().map(String::as_str)
    }
}

/// Mutable delegate over a wrapped value.
///
/// Writes through this view are a sanctioned-but-discouraged backdoor: they
/// do not create graph edges, so any downstream consumer of the node keeps a
/// stale provenance record. Every write emits a warning.
#[derive(Debug)]
pub enum ValueViewMut<'a> {
    /// Mutable view over a structured mapping
    Mapping(MappingViewMut<'a>),
    /// A value with no item structure
    Opaque(&'a mut Value),
}

impl<'a> ValueViewMut<'a> {
    /// Insert or replace an entry in a mapping.
    pub fn set(&mut self, key: &str, value: serde_json::Value) -> Result<()> {
        match self {
            ValueViewMut::Mapping(m) => {
                m.set(key, value);
                Ok(())
            }
            ValueViewMut::Opaque(v) => Err(Error::UnsupportedAccess {
                access: "set",
                kind: v.kind(),
            }),
        }
    }

    /// Remove an entry from a mapping.
    pub fn remove(&mut self, key: &str) -> Result<serde_json::Value> {
        match self {
            ValueViewMut::Mapping(m) => m.remove(key),
            ValueViewMut::Opaque(v) => Err(Error::UnsupportedAccess {
                access: "remove",
                kind: v.kind(),
            }),
        }
    }
}

/// Mutable view over a wrapped mapping.
#[derive(Debug)]
pub struct MappingViewMut<'a>(&'a mut serde_json::Map<String, serde_json::Value>);

impl MappingViewMut<'_> {
    /// Insert or replace an entry. Emits a backdoor warning.
    pub fn set(&mut self, key: &str, value: serde_json::Value) {
        warn!(key, "direct item mutation on a traced mapping bypasses the operation path");
        self.0.insert(key.to_owned(), value);
    }

    /// Remove an entry. Emits a backdoor warning.
    pub fn remove(&mut self, key: &str) -> Result<serde_json::Value> {
        warn!(key, "direct item removal on a traced mapping bypasses the operation path");
        self.0.remove(key).ok_or_else(|| Error::KeyNotFound {
            key: key.to_owned(),
        })
    }
}
