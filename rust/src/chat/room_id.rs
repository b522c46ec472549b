use std::fmt;

/// Deterministic key of the room between two parties.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RoomKey(String);

impl RoomKey {
    /// Wrap a key that was resolved elsewhere (e.g. read back from the store).
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for RoomKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for RoomKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Both ids sorted byte-wise and joined with `_`, then `_{context}` when a
/// non-blank context is given.
pub fn resolve_room_id(party_a: &str, party_b: &str, context_id: Option<&str>) -> RoomKey {
    let (lo, hi) = if party_a <= party_b {
        (party_a, party_b)
    } else {
        (party_b, party_a)
    };
    match context_id.filter(|ctx| !ctx.trim().is_empty()) {
        Some(ctx) => RoomKey(format!("{lo}_{hi}_{ctx}")),
        None => RoomKey(format!("{lo}_{hi}")),
    }
}
