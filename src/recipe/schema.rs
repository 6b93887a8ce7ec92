use std::collections::BTreeSet;

/// Immutable registry of recipe schema versions this build understands.
///
/// Constructed once at startup and passed into the loader explicitly;
/// never consulted through ambient global state.
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    versions: BTreeSet<String>,
}

impl SchemaRegistry {
    /// Versions shipped with this build. `1.1` added the `Localized`
    /// text block; the scoring grammar is unchanged between them.
    pub fn builtin() -> Self {
        Self::from_versions(["1", "1.1"])
    }

    pub fn from_versions<I, S>(versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            versions: versions.into_iter().map(Into::into).collect(),
        }
    }

    pub fn supports(&self, version: &str) -> bool {
        self.versions.contains(version)
    }

    /// Supported versions, ascending, for error messages.
    pub fn supported(&self) -> Vec<&str> {
        self.versions.iter().map(String::as_str).collect()
    }
}
