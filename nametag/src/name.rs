//! Resolved on-chain names.
//!
//! A [`Name`] is the only form in which text returned by the name-service
//! contract leaves the engine. Construction goes through [`Name::sanitize`],
//! which removes characters usable for visual spoofing and bounds the length,
//! so downstream rendering never sees raw contract output.

use std::fmt;

use serde::Serialize;

/// A sanitized, length-bounded name returned by reverse resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Name(String);

impl Name {
    /// Maximum number of characters (Unicode scalar values) kept.
    pub const MAX_CHARS: usize = 64;

    /// Sanitize raw contract output into a [`Name`].
    ///
    /// Strips C0/C1 controls, bidirectional embedding/override/isolate marks
    /// and zero-width or otherwise invisible format characters, then truncates
    /// to [`Name::MAX_CHARS`]. Returns `None` when nothing is left.
    #[must_use]
    pub fn sanitize(raw: &str) -> Option<Self> {
        let cleaned: String = raw
            .chars()
            .filter(|c| !is_denied(*c))
            .take(Self::MAX_CHARS)
            .collect();

        if cleaned.is_empty() {
            None
        } else {
            Some(Self(cleaned))
        }
    }

    /// Borrow the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the name, returning the inner string.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Name {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<str> for Name {
    fn eq(&self, other: &str) -> bool {
        self.0 == other
    }
}

impl PartialEq<&str> for Name {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// Fixed denylist of code points removed from names.
const fn is_denied(c: char) -> bool {
    matches!(
        c,
        // C0 controls, DEL, C1 controls
        '\u{0000}'..='\u{001F}'
            | '\u{007F}'..='\u{009F}'
            // soft hyphen
            | '\u{00AD}'
            // combining grapheme joiner
            | '\u{034F}'
            // arabic letter mark
            | '\u{061C}'
            // hangul fillers
            | '\u{115F}'..='\u{1160}'
            | '\u{3164}'
            | '\u{FFA0}'
            // mongolian vowel separator
            | '\u{180E}'
            // zero-width space/joiners, LRM, RLM
            | '\u{200B}'..='\u{200F}'
            // line/paragraph separators, bidi embeddings and overrides
            | '\u{2028}'..='\u{202E}'
            // word joiner, invisible operators, bidi isolates, deprecated format
            | '\u{2060}'..='\u{206F}'
            // variation selectors
            | '\u{FE00}'..='\u{FE0F}'
            // zero-width no-break space / BOM
            | '\u{FEFF}'
            // interlinear annotation
            | '\u{FFF9}'..='\u{FFFB}'
            // tag characters
            | '\u{E0000}'..='\u{E007F}'
            | '\u{E0100}'..='\u{E01EF}'
    )
}
