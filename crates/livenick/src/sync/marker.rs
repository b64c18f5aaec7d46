//! Live marker handling on display names.

/// Discord rejects nicknames longer than this many characters.
pub const MAX_NICKNAME_CHARS: usize = 32;

/// Longest usable token: it needs room for a space and one name character.
pub const MAX_MARKER_CHARS: usize = MAX_NICKNAME_CHARS - 2;

/// Default marker token.
pub const DEFAULT_MARKER: &str = "🦄";

/// Token prepended to a nickname while its owner is live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Marker {
    token: String,
}

impl Marker {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Literal substring test, so a marker the member moved is still seen.
    pub fn is_applied(&self, name: &str) -> bool {
        name.contains(&self.token)
    }

    /// `"{token} {name}"`, with the name cut to fit the nickname length
    /// limit. The token itself is never cut.
    pub fn apply(&self, name: &str) -> String {
        let room = MAX_NICKNAME_CHARS.saturating_sub(self.token.chars().count() + 1);
        let name: String = name.chars().take(room).collect();
        format!("{} {}", self.token, name)
    }

    /// Remove the first marker occurrence and the whitespace around the rest.
    pub fn strip(&self, name: &str) -> String {
        name.replacen(&self.token, "", 1).trim().to_string()
    }
}

impl Default for Marker {
    fn default() -> Self {
        Self::new(DEFAULT_MARKER)
    }
}
