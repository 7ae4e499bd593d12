//! The in-memory data model. This is what the spec loader produces and what
//! every other component consumes; nothing in this module talks to git or
//! the filesystem.
use std::{collections::HashMap, path::PathBuf, sync::LazyLock};

use regex::Regex;

/// Name of the special slot that gets shallow-by-default clones, no
/// cone-mode sparse checkout, and a locale-filtered checkout instead.
pub const ODOO_SLOT: &str = "odoo";

static PR_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^refs/pull/\d+/head$").unwrap());
static REF_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-f0-9]{40}$").unwrap());

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum RefType {
    Branch,
    Pr,
    Ref,
}

impl RefType {
    /// Classify a refspec string. Purely syntactic: a 40-hex branch name is
    /// indistinguishable from a commit id. That's a known, accepted quirk of
    /// this scheme rather than a bug.
    pub fn classify(refspec: &str) -> Self {
        if PR_PATTERN.is_match(refspec) {
            Self::Pr
        } else if REF_PATTERN.is_match(refspec) {
            Self::Ref
        } else {
            Self::Branch
        }
    }
}

/// A single ref to fetch against one of a slot's remotes.
#[derive(Clone, Debug)]
pub struct ReferenceDescriptor {
    pub remote: String,
    pub refspec: String,
    pub ref_type: RefType,
    /// The human-readable name this refspec had before a frozen commit id
    /// was substituted in. `Some(_)` implies `ref_type == RefType::Ref`.
    pub pinned_name: Option<String>,
}

impl ReferenceDescriptor {
    pub fn new(remote: impl Into<String>, refspec: impl Into<String>) -> Self {
        let refspec = refspec.into();
        let ref_type = RefType::classify(&refspec);
        Self {
            remote: remote.into(),
            refspec,
            ref_type,
            pinned_name: None,
        }
    }

    /// Rewrite this descriptor to point at a frozen commit id, remembering
    /// the name it used to have so freeze/unfreeze can round-trip.
    pub fn pin_to(&mut self, commit: impl Into<String>) {
        self.pinned_name = Some(std::mem::replace(&mut self.refspec, commit.into()));
        self.ref_type = RefType::Ref;
    }

    /// The name under which this ref is fetched locally, stable across
    /// freeze/unfreeze.
    pub fn local_ref(&self) -> String {
        format!("loc-{}", self.pinned_name.as_deref().unwrap_or(&self.refspec))
    }

    /// The name to key the frozen-reference document's innermost map by:
    /// the original human name if this was already pinned, otherwise the
    /// refspec itself.
    pub fn frozen_key(&self) -> &str {
        self.pinned_name.as_deref().unwrap_or(&self.refspec)
    }
}

/// Insertion-order-preserving remote name -> URL table. Small (a handful of
/// entries per slot at most) so a `Vec` scan beats pulling in an ordered-map
/// dependency just for this.
#[derive(Clone, Debug, Default)]
pub struct RemoteTable(Vec<(String, String)>);

impl RemoteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, url)| url.as_str())
    }

    /// Insert, or overwrite if `name` is already present (used by the
    /// `src:` desugaring so it doesn't create a colliding second `origin`
    /// entry).
    pub fn insert(&mut self, name: impl Into<String>, url: impl Into<String>) {
        let name = name.into();
        if let Some(slot) = self.0.iter_mut().find(|(n, _)| *n == name) {
            slot.1 = url.into();
        } else {
            self.0.push((name, url.into()));
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, u)| (n.as_str(), u.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Deserializes straight off a YAML mapping, preserving document order -
/// `serde_yaml` visits map entries in the order they appear in the source,
/// so the remotes a slot registers against its clone come back in the same
/// order an operator wrote them in.
impl<'de> serde::Deserialize<'de> for RemoteTable {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct RemoteTableVisitor;

        impl<'de> serde::de::Visitor<'de> for RemoteTableVisitor {
            type Value = RemoteTable;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a map of remote name to URL")
            }

            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: serde::de::MapAccess<'de>,
            {
                let mut table = RemoteTable::new();
                while let Some((name, url)) = map.next_entry::<String, String>()? {
                    table.insert(name, url);
                }
                Ok(table)
            }
        }

        deserializer.deserialize_map(RemoteTableVisitor)
    }
}

/// One named entry from the project: the unit of concurrency.
#[derive(Clone, Debug)]
pub struct SlotDescriptor {
    pub name: String,
    pub modules: Vec<String>,
    pub remotes: RemoteTable,
    /// First element is the base (cloned, never merged); the rest are
    /// merged on top in order.
    pub references: Vec<ReferenceDescriptor>,
    pub shell_commands: Vec<String>,
    pub patch_globs: Vec<String>,
    pub target_folder: Option<PathBuf>,
    pub locales: Vec<String>,
}

impl SlotDescriptor {
    pub fn is_odoo(&self) -> bool {
        self.name == ODOO_SLOT
    }

    pub fn base(&self) -> Option<&ReferenceDescriptor> {
        self.references.first()
    }

    pub fn merges(&self) -> &[ReferenceDescriptor] {
        if self.references.is_empty() {
            &[]
        } else {
            &self.references[1..]
        }
    }
}

/// The whole parsed spec, plus the working directory it assembles into.
#[derive(Clone, Debug)]
pub struct Project {
    pub slots: HashMap<String, SlotDescriptor>,
    pub workdir: PathBuf,
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("main", RefType::Branch)]
    #[test_case("feature/foo", RefType::Branch)]
    #[test_case("refs/pull/7/head", RefType::Pr)]
    #[test_case("refs/pull/12345/head", RefType::Pr)]
    #[test_case("080b8ecbad3e34e55c5a035af80100f73b742a8d", RefType::Ref)]
    // Anything shorter than 40 hex chars doesn't match the REF pattern.
    #[test_case("080b8ec", RefType::Branch)]
    fn classify(refspec: &str, expected: RefType) {
        assert_eq!(RefType::classify(refspec), expected);
    }

    #[test]
    fn pin_to_sets_pinned_name_and_type() {
        let mut d = ReferenceDescriptor::new("origin", "main");
        d.pin_to("080b8ecbad3e34e55c5a035af80100f73b742a8d");
        assert_eq!(d.ref_type, RefType::Ref);
        assert_eq!(d.pinned_name.as_deref(), Some("main"));
        assert_eq!(d.refspec, "080b8ecbad3e34e55c5a035af80100f73b742a8d");
        assert_eq!(d.local_ref(), "loc-main");
        assert_eq!(d.frozen_key(), "main");
    }

    #[test]
    fn local_ref_uses_refspec_when_unpinned() {
        let d = ReferenceDescriptor::new("origin", "refs/pull/7/head");
        assert_eq!(d.local_ref(), "loc-refs/pull/7/head");
        assert_eq!(d.frozen_key(), "refs/pull/7/head");
    }

    #[test]
    fn remote_table_insert_overwrites_existing() {
        let mut t = RemoteTable::new();
        t.insert("origin", "https://example.com/a.git");
        t.insert("other", "https://example.com/b.git");
        t.insert("origin", "https://example.com/c.git");
        assert_eq!(t.get("origin"), Some("https://example.com/c.git"));
        assert_eq!(
            t.iter().collect::<Vec<_>>(),
            vec![
                ("origin", "https://example.com/c.git"),
                ("other", "https://example.com/b.git"),
            ]
        );
    }
}
