//! Endpoint naming.

use std::fmt;
use std::hash::{Hash, Hasher};

use crate::table::MethodTable;

/// Binds a unique endpoint name to the method table callers and
/// implementors of that endpoint must share.
///
/// Two names are equal exactly when their strings are equal; the table is
/// carried along so lookups can verify both sides speak the same schema,
/// but it does not participate in identity.
#[derive(Debug, Clone)]
pub struct RemoteName {
    name: String,
    schema: &'static MethodTable,
}

impl RemoteName {
    /// Binds `name` to `schema`.
    ///
    /// # Panics
    ///
    /// Panics if `name` is empty. An empty name is a programming defect,
    /// not a runtime condition.
    pub fn new(name: impl Into<String>, schema: &'static MethodTable) -> Self {
        let name = name.into();
        assert!(!name.is_empty(), "endpoint name must not be empty");
        Self { name, schema }
    }

    /// The unique endpoint name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The method table bound to this endpoint.
    pub fn schema(&self) -> &'static MethodTable {
        self.schema
    }
}

impl PartialEq for RemoteName {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for RemoteName {}

impl Hash for RemoteName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl fmt::Display for RemoteName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}
