//! Type/code registry for ICMP message classification
//!
//! A registry maps a two-part key (message type, code) to a named descriptor.
//! It is an ordinary value: callers create one, share it behind an `Arc` and
//! pass it to whatever needs to resolve names (see [`crate::decode::Decoder`]).
//! ICMPv4 and ICMPv6 reuse type numbers, so each version gets its own registry.
//!
//! Registering a key that is already present replaces the entry and returns
//! the previous descriptor. Entries are never removed.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use tracing::{info, warn};

/// Composite registry key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeCode {
    /// ICMP message type
    pub message_type: u8,
    /// Code within the message type
    pub code: u8,
}

impl TypeCode {
    pub const fn new(message_type: u8, code: u8) -> Self {
        TypeCode { message_type, code }
    }
}

impl fmt::Display for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.message_type, self.code)
    }
}

/// A named entry, together with the key it was registered under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeCodeDescriptor {
    pub key: TypeCode,
    pub name: String,
}

impl TypeCodeDescriptor {
    /// Name shown for keys that were never registered
    pub const UNNAMED: &'static str = "unnamed";

    pub fn new(key: TypeCode, name: impl Into<String>) -> Self {
        TypeCodeDescriptor {
            key,
            name: name.into(),
        }
    }
}

impl fmt::Display for TypeCodeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.key)
    }
}

/// Thread-safe (type, code) → descriptor table
pub struct TypeCodeRegistry {
    label: &'static str,
    entries: RwLock<HashMap<TypeCode, TypeCodeDescriptor>>,
}

impl TypeCodeRegistry {
    /// Create an empty registry; `label` only appears in log output
    pub fn new(label: &'static str) -> Self {
        TypeCodeRegistry {
            label,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Registry pre-populated with the ICMPv4 messages of RFC 792 and RFC 1256
    pub fn icmpv4() -> Self {
        Self::with_defaults("ICMPv4", ICMPV4_DEFAULTS)
    }

    /// Registry pre-populated with the ICMPv6 messages of RFC 4443 and RFC 4861
    pub fn icmpv6() -> Self {
        Self::with_defaults("ICMPv6", ICMPV6_DEFAULTS)
    }

    fn with_defaults(label: &'static str, defaults: &[(u8, u8, &str)]) -> Self {
        let entries = defaults
            .iter()
            .map(|&(message_type, code, name)| {
                let key = TypeCode::new(message_type, code);
                (key, TypeCodeDescriptor::new(key, name))
            })
            .collect();
        info!(registry = label, entries = defaults.len(), "Loaded default type/code table");
        TypeCodeRegistry {
            label,
            entries: RwLock::new(entries),
        }
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    /// Insert or overwrite the entry for (`message_type`, `code`), returning
    /// whatever occupied that key before
    pub fn register(
        &self,
        message_type: u8,
        code: u8,
        name: impl Into<String>,
    ) -> Option<TypeCodeDescriptor> {
        let key = TypeCode::new(message_type, code);
        let descriptor = TypeCodeDescriptor::new(key, name);
        info!(
            registry = self.label,
            key = %key,
            name = %descriptor.name,
            "Registering type/code"
        );

        let previous = self.entries.write().insert(key, descriptor);
        if let Some(previous) = &previous {
            warn!(
                registry = self.label,
                key = %key,
                previous = %previous.name,
                "Type/code already registered, entry replaced"
            );
        }
        previous
    }

    /// The descriptor registered under (`message_type`, `code`), if any
    pub fn lookup(&self, message_type: u8, code: u8) -> Option<TypeCodeDescriptor> {
        self.entries
            .read()
            .get(&TypeCode::new(message_type, code))
            .cloned()
    }

    /// Like [`lookup`](Self::lookup), but never fails: unregistered keys
    /// resolve to a descriptor named [`TypeCodeDescriptor::UNNAMED`]
    pub fn resolve(&self, message_type: u8, code: u8) -> TypeCodeDescriptor {
        self.lookup(message_type, code).unwrap_or_else(|| {
            TypeCodeDescriptor::new(
                TypeCode::new(message_type, code),
                TypeCodeDescriptor::UNNAMED,
            )
        })
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Snapshot of all entries, ordered by key
    pub fn descriptors(&self) -> Vec<TypeCodeDescriptor> {
        let mut all: Vec<_> = self.entries.read().values().cloned().collect();
        all.sort_by_key(|descriptor| descriptor.key);
        all
    }
}

impl fmt::Debug for TypeCodeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeCodeRegistry")
            .field("label", &self.label)
            .field("entries", &self.len())
            .finish()
    }
}

const ICMPV4_DEFAULTS: &[(u8, u8, &str)] = &[
    (0, 0, "Echo reply"),
    (3, 0, "Net unreachable"),
    (3, 1, "Host unreachable"),
    (3, 2, "Protocol unreachable"),
    (3, 3, "Port unreachable"),
    (3, 4, "Fragmentation needed and DF set"),
    (3, 5, "Source route failed"),
    (3, 6, "Destination network unknown"),
    (3, 7, "Destination host unknown"),
    (3, 8, "Source host isolated"),
    (3, 9, "Destination network administratively prohibited"),
    (3, 10, "Destination host administratively prohibited"),
    (3, 11, "Network unreachable for TOS"),
    (3, 12, "Host unreachable for TOS"),
    (3, 13, "Communication administratively prohibited"),
    (3, 14, "Host precedence violation"),
    (3, 15, "Precedence cutoff in effect"),
    (4, 0, "Source quench"),
    (5, 0, "Redirect for network"),
    (5, 1, "Redirect for host"),
    (5, 2, "Redirect for TOS and network"),
    (5, 3, "Redirect for TOS and host"),
    (8, 0, "Echo request"),
    (9, 0, "Router advertisement"),
    (10, 0, "Router solicitation"),
    (11, 0, "TTL exceeded in transit"),
    (11, 1, "Fragment reassembly time exceeded"),
    (12, 0, "Pointer indicates the error"),
    (12, 1, "Missing a required option"),
    (12, 2, "Bad length"),
    (13, 0, "Timestamp"),
    (14, 0, "Timestamp reply"),
    (15, 0, "Information request"),
    (16, 0, "Information reply"),
];

const ICMPV6_DEFAULTS: &[(u8, u8, &str)] = &[
    (1, 0, "No route to destination"),
    (1, 1, "Communication with destination administratively prohibited"),
    (1, 2, "Beyond scope of source address"),
    (1, 3, "Address unreachable"),
    (1, 4, "Port unreachable"),
    (1, 5, "Source address failed ingress/egress policy"),
    (1, 6, "Reject route to destination"),
    (2, 0, "Packet too big"),
    (3, 0, "Hop limit exceeded in transit"),
    (3, 1, "Fragment reassembly time exceeded"),
    (4, 0, "Erroneous header field encountered"),
    (4, 1, "Unrecognized next header type encountered"),
    (4, 2, "Unrecognized IPv6 option encountered"),
    (128, 0, "Echo request"),
    (129, 0, "Echo reply"),
    (130, 0, "Multicast listener query"),
    (131, 0, "Multicast listener report"),
    (132, 0, "Multicast listener done"),
    (133, 0, "Router solicitation"),
    (134, 0, "Router advertisement"),
    (135, 0, "Neighbor solicitation"),
    (136, 0, "Neighbor advertisement"),
    (137, 0, "Redirect message"),
];

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_register_returns_previous() {
        let registry = TypeCodeRegistry::new("test");
        assert!(registry.register(128, 0, "Echo request").is_none());

        let previous = registry.register(128, 0, "Custom").unwrap();
        assert_eq!(previous.name, "Echo request");
        assert_eq!(previous.key, TypeCode::new(128, 0));
        assert_eq!(registry.lookup(128, 0).unwrap().name, "Custom");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_defaults() {
        let v4 = TypeCodeRegistry::icmpv4();
        let v6 = TypeCodeRegistry::icmpv6();
        assert_eq!(v4.lookup(8, 0).unwrap().name, "Echo request");
        assert_eq!(v4.lookup(3, 3).unwrap().name, "Port unreachable");
        assert_eq!(v6.lookup(128, 0).unwrap().name, "Echo request");
        assert_eq!(v6.lookup(135, 0).unwrap().name, "Neighbor solicitation");
        // Same numbers mean different things in the two versions
        assert_eq!(v4.lookup(3, 0).unwrap().name, "Net unreachable");
        assert_eq!(v6.lookup(3, 0).unwrap().name, "Hop limit exceeded in transit");
        assert!(v4.lookup(128, 0).is_none());
    }

    #[test]
    fn test_resolve_unregistered() {
        let registry = TypeCodeRegistry::new("test");
        assert!(registry.is_empty());
        let descriptor = registry.resolve(200, 7);
        assert_eq!(descriptor.name, TypeCodeDescriptor::UNNAMED);
        assert_eq!(descriptor.to_string(), "unnamed (200/7)");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_descriptors_are_sorted() {
        let registry = TypeCodeRegistry::new("test");
        registry.register(9, 0, "b");
        registry.register(1, 5, "a2");
        registry.register(1, 0, "a1");
        let keys: Vec<_> = registry.descriptors().iter().map(|d| d.key).collect();
        assert_eq!(
            keys,
            vec![TypeCode::new(1, 0), TypeCode::new(1, 5), TypeCode::new(9, 0)]
        );
    }

    #[test]
    fn test_concurrent_registration() {
        let registry = Arc::new(TypeCodeRegistry::new("test"));
        let handles: Vec<_> = (0..4u8)
            .map(|t| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || {
                    for code in 0..50u8 {
                        registry.register(t, code, format!("{}-{}", t, code));
                        assert!(registry.lookup(t, code).is_some());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.len(), 200);
    }
}
