//! Named output streams of the graph.
//!
//! Every output the graph can produce flows through a named stream. The full set of streams must
//! be declared before the graph starts; once running, the set is frozen.

use thiserror::Error;

/// What a stream carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Serialized result packets ([`Packet`](crate::packet::Packet)).
    Packet,
    /// Processed video frames ([`VideoFrame`](crate::frame::VideoFrame)).
    Frame,
}

/// Declaration of a single named output stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamDecl {
    name: String,
    kind: StreamKind,
}

impl StreamDecl {
    /// Returns the stream's unique name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns what the stream carries.
    #[inline]
    pub fn kind(&self) -> StreamKind {
        self.kind
    }
}

/// The set of output streams declared for a graph.
///
/// Registration is idempotent: declaring a name that is already present with the same kind is a
/// no-op. Redeclaring a name with a *different* kind is rejected, since it would change what an
/// already-declared stream means.
#[derive(Debug, Clone, Default)]
pub struct StreamSet {
    // Sessions declare a handful of streams at most, so a `Vec` keeps declaration order and
    // avoids hashing.
    streams: Vec<StreamDecl>,
}

impl StreamSet {
    /// Creates an empty stream set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares an output stream named `name` carrying `kind` data.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        kind: StreamKind,
    ) -> Result<(), StreamKindMismatch> {
        let name = name.into();
        match self.get(&name) {
            Some(existing) if existing.kind == kind => Ok(()),
            Some(existing) => Err(StreamKindMismatch {
                name,
                existing: existing.kind,
                requested: kind,
            }),
            None => {
                self.streams.push(StreamDecl { name, kind });
                Ok(())
            }
        }
    }

    /// Returns the declaration for `name`, if it was registered.
    pub fn get(&self, name: &str) -> Option<&StreamDecl> {
        self.streams.iter().find(|decl| decl.name == name)
    }

    /// Returns whether a stream named `name` was registered.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Returns an iterator over all declarations, in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &StreamDecl> {
        self.streams.iter()
    }

    /// Returns the number of declared streams.
    pub fn len(&self) -> usize {
        self.streams.len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }
}

impl<'a> IntoIterator for &'a StreamSet {
    type Item = &'a StreamDecl;
    type IntoIter = std::slice::Iter<'a, StreamDecl>;

    fn into_iter(self) -> Self::IntoIter {
        self.streams.iter()
    }
}

/// Error returned when a stream name is redeclared with a different [`StreamKind`].
#[derive(Debug, Clone, Error)]
#[error("stream '{name}' is already declared as a {existing:?} stream, cannot redeclare as {requested:?}")]
pub struct StreamKindMismatch {
    name: String,
    existing: StreamKind,
    requested: StreamKind,
}

impl StreamKindMismatch {
    /// Returns the name of the conflicting stream.
    pub fn name(&self) -> &str {
        &self.name
    }
}
