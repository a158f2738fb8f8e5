//! Key layout.

/// Default namespace for every key this crate writes.
pub const DEFAULT_NAMESPACE: &str = "sidekiq-antidote";

/// Derives backend keys from a namespace.
///
/// ```text
/// <namespace>                      hash   rule id -> ["treatment","pattern"]
/// <namespace>:suspend:<group>      list   job payloads, newest first
/// <namespace>:suspensions          set    registered group names
/// ```
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Keyspace {
    namespace: String,
}

impl Keyspace {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    /// Hash holding every rule.
    pub fn rules(&self) -> &str {
        &self.namespace
    }

    /// List holding the suspended jobs of one group.
    pub fn suspension(&self, group: &str) -> String {
        format!("{}:suspend:{}", self.namespace, group)
    }

    /// Set of known suspension group names.
    pub fn suspension_registry(&self) -> String {
        format!("{}:suspensions", self.namespace)
    }
}

impl Default for Keyspace {
    fn default() -> Self {
        Self::new(DEFAULT_NAMESPACE)
    }
}
