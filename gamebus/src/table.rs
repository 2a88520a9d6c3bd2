//! Method tables: the shared numbering of an interface's methods.
//!
//! Both sides of a call hold a table built from the same interface
//! definition. Calls carry the method's ordinal instead of its name, plus
//! the table's version so a node built from different sources refuses to
//! dispatch rather than invoking the wrong method.

/// One remotely invokable method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodDesc {
    /// Position of the method in the interface's stable numbering.
    pub ordinal: u8,
    /// Method name, for diagnostics and logs.
    pub name: &'static str,
    /// Number of declared parameters.
    pub arity: u8,
    /// Whether the method produces a value the caller waits for.
    pub returns_value: bool,
}

/// Stable ordinal numbering of an interface's methods.
///
/// Produced by [`remote_interface!`](crate::remote_interface); hand-written
/// tables are possible but gain nothing.
#[derive(Debug, PartialEq, Eq)]
pub struct MethodTable {
    interface: &'static str,
    methods: &'static [MethodDesc],
}

impl MethodTable {
    /// Builds a table over a static method list.
    pub const fn new(interface: &'static str, methods: &'static [MethodDesc]) -> Self {
        Self { interface, methods }
    }

    /// Name of the interface this table describes.
    pub fn interface(&self) -> &'static str {
        self.interface
    }

    /// All methods in ordinal order.
    pub fn methods(&self) -> &'static [MethodDesc] {
        self.methods
    }

    /// Looks a method up by its wire ordinal.
    pub fn by_ordinal(&self, ordinal: u8) -> Option<&'static MethodDesc> {
        self.methods.iter().find(|m| m.ordinal == ordinal)
    }

    /// True when every method is void, which is what fan-out over a channel
    /// requires: there is no reply leg to carry a value back.
    pub fn broadcast_eligible(&self) -> bool {
        self.methods.iter().all(|m| !m.returns_value)
    }

    /// Version fingerprint over the interface name and every method's
    /// ordinal, name, arity and return presence.
    ///
    /// Two builds agree on the version exactly when they agree on the
    /// numbering, so a mismatch means the builds must not talk.
    pub fn version(&self) -> u64 {
        const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
        const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

        fn mix(hash: &mut u64, bytes: &[u8]) {
            for b in bytes {
                *hash ^= u64::from(*b);
                *hash = hash.wrapping_mul(FNV_PRIME);
            }
        }

        let mut hash = FNV_OFFSET;
        mix(&mut hash, self.interface.as_bytes());
        for method in self.methods {
            mix(&mut hash, &[0xFE, method.ordinal]);
            mix(&mut hash, method.name.as_bytes());
            mix(&mut hash, &[0xFD, method.arity, u8::from(method.returns_value)]);
        }
        hash
    }
}
