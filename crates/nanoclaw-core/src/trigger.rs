// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Trigger pattern (§6.4): `@<assistant_name>` addressed at the start of a
//! message, matched case-insensitively with a word-boundary suffix.

use regex::Regex;

/// A compiled trigger pattern for one assistant name.
pub struct TriggerPattern {
    regex: Regex,
}

impl TriggerPattern {
    /// Build the pattern for `assistant_name`. The name is regex-escaped so
    /// names containing characters like `.` or `+` are matched literally.
    pub fn new(assistant_name: &str) -> Self {
        let escaped = regex::escape(assistant_name);
        let pattern = format!(r"(?i)^@{escaped}\b");
        let regex = Regex::new(&pattern).expect("trigger pattern must compile");
        Self { regex }
    }

    /// `true` iff `text` starts with `@<assistant_name>` (case-insensitive,
    /// word-boundary suffix).
    pub fn matches(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

/// A group receives a message iff it is main, or the trigger matches (§6.4).
pub fn is_addressed(is_main: bool, require_trigger: bool, trigger: &TriggerPattern, text: &str) -> bool {
    if is_main && !require_trigger {
        return true;
    }
    trigger.matches(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_case_insensitively_with_word_boundary() {
        let t = TriggerPattern::new("Andy");
        assert!(t.matches("@Andy hello"));
        assert!(t.matches("@andy hello"));
        assert!(t.matches("@Andy!"));
    }

    #[test]
    fn rejects_non_prefix_or_suffix_glued_matches() {
        let t = TriggerPattern::new("Andy");
        assert!(!t.matches("Andy hello"));
        assert!(!t.matches("hello @Andy"));
        assert!(!t.matches("@Andyxxx"));
    }

    #[test]
    fn regex_escapes_special_characters_in_name() {
        let t = TriggerPattern::new("A.I.");
        assert!(t.matches("@A.I. hi"));
        // Without escaping, `.` would also match `@AxIx hi`; it must not.
        assert!(!t.matches("@AxIx hi"));
    }

    #[test]
    fn main_group_is_always_addressed_unless_trigger_required() {
        let t = TriggerPattern::new("Andy");
        assert!(is_addressed(true, false, &t, "no trigger here"));
        assert!(!is_addressed(true, true, &t, "no trigger here"));
        assert!(is_addressed(true, true, &t, "@Andy hi"));
    }

    #[test]
    fn non_main_group_always_requires_trigger() {
        let t = TriggerPattern::new("Andy");
        assert!(!is_addressed(false, false, &t, "no trigger here"));
        assert!(is_addressed(false, false, &t, "@Andy hi"));
    }
}
