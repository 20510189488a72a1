//! Field guarding for payload assignment.
//!
//! A [`DenyList`] names fields a payload must never overwrite; an
//! [`AllowList`] punches explicit holes into it, or disables guarding
//! entirely for trusted callers. The two are separate named types so the
//! deny/allow semantics stay visible in signatures instead of hiding in a
//! sentinel value.
//!
//! The guard is permissive by default: unknown payload keys are assigned
//! unless listed. Identity and audit fields are protected regardless of
//! caller intent via [`SYSTEM_FIELDS`].

use std::collections::HashSet;

/// Fields owned by the persistence lifecycle, never by caller input.
/// These are always part of the effective guard.
pub const SYSTEM_FIELDS: [&str; 5] = ["id", "created_at", "updated_at", "deleted_at", "version"];

/// True if `field` is one of the built-in system-managed fields.
pub fn is_system_field(field: &str) -> bool {
    SYSTEM_FIELDS.contains(&field)
}

/// Set of field names protected from payload overwrite.
///
/// The built-in system fields do not need to be listed; they are merged in
/// when the effective guard is computed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DenyList(HashSet<String>);

impl DenyList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>) -> &mut Self {
        self.0.insert(field.into());
        self
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for DenyList {
    fn from_iter<T: IntoIterator<Item = S>>(iter: T) -> Self {
        DenyList(iter.into_iter().map(Into::into).collect())
    }
}

impl<S: Into<String>, const N: usize> From<[S; N]> for DenyList {
    fn from(fields: [S; N]) -> Self {
        fields.into_iter().collect()
    }
}

/// Fields exempted from the guard, or the `All` sentinel disabling it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum AllowList {
    /// No exemptions; the full effective guard applies.
    #[default]
    Empty,
    /// The named fields are removed from the effective guard.
    Fields(HashSet<String>),
    /// Guarding is disabled entirely, system fields included.
    All,
}

impl AllowList {
    /// Exempt the given fields from the guard.
    pub fn fields<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        AllowList::Fields(fields.into_iter().map(Into::into).collect())
    }
}

/// Compute the set of fields a payload may not touch.
///
/// Effective guard = `deny` plus the built-in system fields; `AllowList::All`
/// empties it, a field allow-list is subtracted from it.
pub fn effective_guard(deny: &DenyList, allow: &AllowList) -> HashSet<String> {
    if let AllowList::All = allow {
        return HashSet::new();
    }

    let mut guard: HashSet<String> = deny.iter().cloned().collect();
    guard.extend(SYSTEM_FIELDS.iter().map(|field| field.to_string()));

    if let AllowList::Fields(allowed) = allow {
        for field in allowed {
            guard.remove(field);
        }
    }

    guard
}
