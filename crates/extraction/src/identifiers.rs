//! Newtype domain identifiers.
//!
//! Every routed name is a distinct newtype wrapping a `String`. This prevents
//! passing an [`OutputId`] where a [`LibraryKey`] is expected even though
//! both are plain strings on the wire.
//!
//! All identifiers serialise transparently as JSON strings.

use serde::{Deserialize, Serialize};

/// Separator between the library prefix and the backend-local extractor id
/// inside a [`CombinedKey`].
pub const KEY_SEPARATOR: char = ':';

// ---------------------------------------------------------------------------
// Macro for String-wrapped newtypes.
// Generates: struct, new() returning Option<Self>, as_str(), Display.
// ---------------------------------------------------------------------------
macro_rules! string_id {
    (
        $(#[$attr:meta])*
        $name:ident
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new identifier, returning `None` if the value is empty.
            pub fn new(value: impl Into<String>) -> Option<Self> {
                let v = value.into();
                if v.is_empty() { None } else { Some(Self(v)) }
            }

            /// Returns the identifier as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id! {
    /// Names one analysis library within the service registry
    /// (e.g. `"vamp-example-plugins"`, `"pyin"`).
    ///
    /// Unique within a running worker. Routing compares keys byte-for-byte;
    /// there is no case folding or trimming.
    LibraryKey
}

string_id! {
    /// Identifies one output of an extractor (e.g. `"counts"`, `"amplitude"`).
    OutputId
}

string_id! {
    /// Opaque, caller-supplied correlation identifier for one request crossing
    /// the worker boundary. The worker never generates these.
    RequestId
}

string_id! {
    /// Where a not-yet-imported library module can be fetched from.
    ///
    /// The interpretation (URL, path, catalog entry) belongs to the module
    /// fetcher in use.
    FetchLocation
}

// ---------------------------------------------------------------------------

/// Request-scoped extractor key of the form `<LibraryKey>:<LocalExtractorId>`.
///
/// Only the text before the first [`KEY_SEPARATOR`] takes part in routing. A
/// key without a separator routes on its entire text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CombinedKey(String);

impl CombinedKey {
    /// Creates a new combined key, returning `None` if the value is empty.
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let v = value.into();
        if v.is_empty() {
            None
        } else {
            Some(Self(v))
        }
    }

    /// Builds a combined key from its two halves.
    pub fn from_parts(library: &LibraryKey, local_id: &str) -> Self {
        Self(format!("{library}{KEY_SEPARATOR}{local_id}"))
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns the routing prefix: everything before the first separator.
    pub fn library_prefix(&self) -> &str {
        match self.0.split_once(KEY_SEPARATOR) {
            Some((prefix, _)) => prefix,
            None => &self.0,
        }
    }

    /// Returns the backend-local extractor id, or `None` if the key has no
    /// separator.
    pub fn local_id(&self) -> Option<&str> {
        self.0.split_once(KEY_SEPARATOR).map(|(_, rest)| rest)
    }
}

impl std::fmt::Display for CombinedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_is_taken_before_the_first_separator() {
        let key = CombinedKey::new("pyin:pyin:notes").unwrap();
        assert_eq!(key.library_prefix(), "pyin");
        assert_eq!(key.local_id(), Some("pyin:notes"));
    }

    #[test]
    fn key_without_separator_routes_on_whole_text() {
        let key = CombinedKey::new("qm-vamp-plugins").unwrap();
        assert_eq!(key.library_prefix(), "qm-vamp-plugins");
        assert_eq!(key.local_id(), None);
    }

    #[test]
    fn routing_prefix_is_case_sensitive() {
        let key = CombinedKey::new("PYIN:pyin").unwrap();
        assert_ne!(key.library_prefix(), "pyin");
    }

    #[test]
    fn empty_identifiers_are_rejected() {
        assert!(LibraryKey::new("").is_none());
        assert!(CombinedKey::new("").is_none());
        assert!(RequestId::new("").is_none());
    }

    #[test]
    fn from_parts_round_trips_through_accessors() {
        let lib = LibraryKey::new("vamp-example-plugins").unwrap();
        let key = CombinedKey::from_parts(&lib, "zerocrossing");
        assert_eq!(key.as_str(), "vamp-example-plugins:zerocrossing");
        assert_eq!(key.library_prefix(), lib.as_str());
    }
}
