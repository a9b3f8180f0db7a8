use serde::{Deserialize, Serialize};

use cask_store::BackendSpec;

/// Configuration for one namespace: a disjoint key space with its own
/// backend binding and GC policy.
///
/// Supplied by the configuration boundary as a read-only list; the engine
/// never persists or mutates it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceSpec {
    /// Namespace identifier, unique across the configuration.
    pub id: String,
    /// Which physical backend holds this namespace's objects.
    pub backend: BackendSpec,
    /// Minimum age, in hours, an unreachable blob must reach before the
    /// collector deletes it.
    pub gc_grace_hours: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn spec_serde_roundtrip() {
        let spec = NamespaceSpec {
            id: "builds".into(),
            backend: BackendSpec::Filesystem {
                root: PathBuf::from("/var/lib/cask"),
            },
            gc_grace_hours: 24,
        };
        let json = serde_json::to_string(&spec).unwrap();
        let parsed: NamespaceSpec = serde_json::from_str(&json).unwrap();
        assert_eq!(spec, parsed);
    }

    #[test]
    fn spec_parses_from_plain_json() {
        let json = r#"{
            "id": "scratch",
            "backend": { "kind": "memory" },
            "gc_grace_hours": 1
        }"#;
        let parsed: NamespaceSpec = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.id, "scratch");
        assert_eq!(parsed.backend, BackendSpec::Memory);
        assert_eq!(parsed.gc_grace_hours, 1);
    }
}
