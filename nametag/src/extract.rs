//! Address extraction from page text, link targets and display labels.
//!
//! [`AddressExtractor`] owns three compiled pattern sets:
//!
//! - the **full** pattern, locating complete addresses (`0x` + 40 hex),
//! - the **abbreviated** pattern, recognizing shortened labels such as
//!   `0x1234…abcd` (capture 1 = prefix, capture 2 = suffix),
//! - ordered **href rules**, site-specific patterns whose designated capture
//!   group holds the address.
//!
//! All patterns are user-overridable. [`validate_pattern`] is the single gate
//! for user input: the pattern must compile and must pass a static lint for
//! catastrophic-backtracking shapes. The lint is best-effort and runs at
//! configuration time only; the `regex` engine itself never backtracks, but
//! configured patterns are also shared with hosts whose engines do.

use std::sync::LazyLock;

use alloy::primitives::Address;
use regex::Regex;

use crate::address::{hex_body, parse_address};
use crate::config::{Config, HrefRuleConfig};
use crate::error::{Error, Result};

/// Default full-address pattern.
pub const DEFAULT_FULL_ADDRESS_PATTERN: &str = r"\b0x[0-9a-fA-F]{40}\b";

/// Default abbreviated-address pattern (`0x` + prefix + ellipsis + suffix).
pub const DEFAULT_ABBREVIATED_PATTERN: &str =
    r"0x([0-9a-fA-F]{4,})(?:\x{2026}|\.{2,3})([0-9a-fA-F]{4,})";

static FULL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(DEFAULT_FULL_ADDRESS_PATTERN).expect("valid regex"));
static ABBREVIATED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(DEFAULT_ABBREVIATED_PATTERN).expect("valid regex"));

/// Compile a user-supplied pattern, rejecting invalid or hazardous ones.
///
/// # Errors
///
/// Returns [`Error::Pattern`] if the pattern does not compile or is flagged
/// by the backtracking lint.
pub fn validate_pattern(pattern: &str) -> Result<Regex> {
    let regex = Regex::new(pattern).map_err(|e| Error::pattern(pattern, e.to_string()))?;
    lint_backtracking(pattern).map_err(|reason| Error::pattern(pattern, reason))?;
    Ok(regex)
}

/// A site-specific rule extracting the address from one capture group.
#[derive(Debug, Clone)]
pub struct HrefRule {
    pattern: Regex,
    group: usize,
}

impl HrefRule {
    /// Compile a rule.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Pattern`] if the pattern is rejected by
    /// [`validate_pattern`] or has no capture group `group`.
    pub fn new(pattern: &str, group: usize) -> Result<Self> {
        let regex = validate_pattern(pattern)?;
        if group >= regex.captures_len() {
            return Err(Error::pattern(
                pattern,
                format!(
                    "capture group {group} does not exist (pattern has {})",
                    regex.captures_len() - 1
                ),
            ));
        }
        Ok(Self {
            pattern: regex,
            group,
        })
    }

    /// The address captured by this rule in `href`, if any.
    #[must_use]
    pub fn capture(&self, href: &str) -> Option<Address> {
        self.pattern
            .captures_iter(href)
            .filter_map(|caps| caps.get(self.group))
            .find_map(|m| parse_address(m.as_str()))
    }

    /// The rule's pattern source.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.pattern.as_str()
    }

    /// The designated capture group.
    #[must_use]
    pub const fn group(&self) -> usize {
        self.group
    }
}

impl TryFrom<&HrefRuleConfig> for HrefRule {
    type Error = Error;

    fn try_from(rule: &HrefRuleConfig) -> Result<Self> {
        Self::new(&rule.pattern, rule.group)
    }
}

/// Finds full and abbreviated addresses according to configured patterns.
#[derive(Debug, Clone)]
pub struct AddressExtractor {
    full: Regex,
    abbreviated: Regex,
    rules: Vec<HrefRule>,
}

impl Default for AddressExtractor {
    fn default() -> Self {
        Self {
            full: FULL_RE.clone(),
            abbreviated: ABBREVIATED_RE.clone(),
            rules: Vec::new(),
        }
    }
}

impl AddressExtractor {
    /// Build an extractor from explicit pattern sources.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Pattern`] if a pattern is rejected, or if the
    /// abbreviated pattern has fewer than two capture groups.
    pub fn new(full: &str, abbreviated: &str, rules: Vec<HrefRule>) -> Result<Self> {
        let full = validate_pattern(full)?;
        let abbreviated_re = validate_pattern(abbreviated)?;
        if abbreviated_re.captures_len() < 3 {
            return Err(Error::pattern(
                abbreviated,
                "abbreviated pattern needs two capture groups (prefix, suffix)",
            ));
        }
        Ok(Self {
            full,
            abbreviated: abbreviated_re,
            rules,
        })
    }

    /// Build an extractor from the pattern section of a [`Config`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Pattern`] for the first rejected pattern.
    pub fn from_config(config: &Config) -> Result<Self> {
        let rules = config
            .href_rules
            .iter()
            .map(HrefRule::try_from)
            .collect::<Result<Vec<_>>>()?;

        Self::new(
            config
                .full_address_pattern
                .as_deref()
                .unwrap_or(DEFAULT_FULL_ADDRESS_PATTERN),
            config
                .abbreviated_pattern
                .as_deref()
                .unwrap_or(DEFAULT_ABBREVIATED_PATTERN),
            rules,
        )
    }

    /// Whether any site-specific href rules are configured.
    #[must_use]
    pub fn has_custom_rules(&self) -> bool {
        !self.rules.is_empty()
    }

    /// All full addresses in `text`, in order of occurrence, duplicates kept.
    ///
    /// Matches that are not exactly 40 hex digits after the marker (possible
    /// with custom patterns) are dropped.
    #[must_use]
    pub fn find_full_addresses(&self, text: &str) -> Vec<Address> {
        self.full
            .find_iter(text)
            .filter_map(|m| parse_address(m.as_str()))
            .collect()
    }

    /// The first candidate matching an abbreviated label by prefix and suffix.
    #[must_use]
    pub fn match_abbreviated(&self, label: &str, candidates: &[Address]) -> Option<Address> {
        let caps = self.abbreviated.captures(label)?;
        let prefix = normalize_fragment(caps.get(1)?.as_str());
        let suffix = normalize_fragment(caps.get(2)?.as_str());

        candidates
            .iter()
            .find(|candidate| {
                let body = hex_body(candidate);
                body.starts_with(&prefix) && body.ends_with(&suffix)
            })
            .copied()
    }

    /// The address captured by the first matching href rule.
    #[must_use]
    pub fn match_custom_rules(&self, href: &str) -> Option<Address> {
        self.rules.iter().find_map(|rule| rule.capture(href))
    }

    /// Candidate addresses for a link target.
    ///
    /// When href rules are configured they decide alone: the rule result, or
    /// nothing. Otherwise every full address in `href` is a candidate.
    #[must_use]
    pub fn candidates(&self, href: &str) -> Vec<Address> {
        if self.has_custom_rules() {
            return self.match_custom_rules(href).into_iter().collect();
        }
        self.find_full_addresses(href)
    }
}

fn normalize_fragment(fragment: &str) -> String {
    let lower = fragment.to_ascii_lowercase();
    match lower.strip_prefix("0x") {
        Some(rest) => rest.to_owned(),
        None => lower,
    }
}

/// One open group while scanning a pattern.
#[derive(Debug, Default)]
struct Frame {
    start: usize,
    repeats: bool,
    branches: Vec<String>,
    current: String,
}

/// Static lint for classic catastrophic-backtracking shapes.
///
/// Flags a repeated group whose body itself repeats (`(a+)+`, `(\w+\s?)*`)
/// and a repeated alternation with identical branches (`(a|a)*`). Shapes it
/// does not recognize pass; this is not a ReDoS proof.
fn lint_backtracking(pattern: &str) -> std::result::Result<(), String> {
    let chars: Vec<char> = pattern.chars().collect();
    let mut stack = vec![Frame::default()];
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' => {
                let end = escape_end(&chars, i);
                push_text(&mut stack, &chars[i..end]);
                i = end;
                continue;
            }
            '[' => {
                let end = class_end(&chars, i);
                push_text(&mut stack, &chars[i..end]);
                i = end;
                continue;
            }
            '(' => {
                if chars.get(i + 1) == Some(&'?') {
                    // Skip the group modifier; a bare flag group `(?i)` opens nothing.
                    let mut j = i + 2;
                    while j < chars.len() && !matches!(chars[j], ':' | '>' | ')') {
                        j += 1;
                    }
                    if chars.get(j) == Some(&')') {
                        push_text(&mut stack, &chars[i..=j]);
                        i = j + 1;
                        continue;
                    }
                    stack.push(Frame {
                        start: i,
                        ..Frame::default()
                    });
                    i = j + 1;
                    continue;
                }
                stack.push(Frame {
                    start: i,
                    ..Frame::default()
                });
            }
            '|' => {
                if let Some(top) = stack.last_mut() {
                    let branch = std::mem::take(&mut top.current);
                    top.branches.push(branch);
                }
            }
            ')' => {
                if stack.len() < 2 {
                    i += 1;
                    continue;
                }
                let Some(mut frame) = stack.pop() else { break };
                frame.branches.push(std::mem::take(&mut frame.current));

                let (quantified, _) = quantifier_at(&chars, i + 1);
                if quantified {
                    if frame.repeats {
                        return Err(format!(
                            "nested quantifier: repeated group `{}` contains a repeated element",
                            chars[frame.start..=i].iter().collect::<String>()
                        ));
                    }
                    if has_duplicate_branch(&frame.branches) {
                        return Err(format!(
                            "repeated alternation `{}` has duplicate branches",
                            chars[frame.start..=i].iter().collect::<String>()
                        ));
                    }
                }

                if let Some(parent) = stack.last_mut() {
                    parent.repeats |= frame.repeats;
                    parent.current.extend(&chars[frame.start..=i]);
                }
            }
            '*' | '+' | '{' => {
                let (repeats, end) = quantifier_at(&chars, i);
                if let Some(top) = stack.last_mut() {
                    top.repeats |= repeats;
                    top.current.extend(&chars[i..end.max(i + 1)]);
                }
                i = end.max(i + 1);
                continue;
            }
            _ => push_text(&mut stack, &chars[i..=i]),
        }
        i += 1;
    }

    Ok(())
}

fn push_text(stack: &mut [Frame], text: &[char]) {
    if let Some(top) = stack.last_mut() {
        top.current.extend(text);
    }
}

/// End (exclusive) of the escape sequence starting at `start`.
fn escape_end(chars: &[char], start: usize) -> usize {
    let next = start + 1;
    match chars.get(next) {
        Some('x' | 'u' | 'p' | 'P') if chars.get(next + 1) == Some(&'{') => chars[next..]
            .iter()
            .position(|c| *c == '}')
            .map_or(chars.len(), |p| next + p + 1),
        Some(_) => next + 1,
        None => chars.len(),
    }
}

/// End (exclusive) of the character class starting at `start`.
fn class_end(chars: &[char], start: usize) -> usize {
    let mut j = start + 1;
    if chars.get(j) == Some(&'^') {
        j += 1;
    }
    if chars.get(j) == Some(&']') {
        j += 1;
    }
    let mut depth = 1usize;
    while j < chars.len() {
        match chars[j] {
            '\\' => j += 1,
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return j + 1;
                }
            }
            _ => {}
        }
        j += 1;
    }
    chars.len()
}

/// Whether a repeating quantifier starts at `at`, and where it ends.
///
/// `?` alone does not repeat. `{n}` repeats when `n > 1`, `{n,}` always,
/// `{n,m}` when `m > 1`. A `{` that is not a counted repetition is a literal.
fn quantifier_at(chars: &[char], at: usize) -> (bool, usize) {
    match chars.get(at) {
        Some('*' | '+') => (true, at + 1),
        Some('{') => {
            let Some(close) = chars[at..].iter().position(|c| *c == '}') else {
                return (false, at + 1);
            };
            let body: String = chars[at + 1..at + close].iter().collect();
            let repeats = match body.split_once(',') {
                None => body.trim().parse::<u32>().is_ok_and(|n| n > 1),
                Some((min, max)) if max.trim().is_empty() => min.trim().parse::<u32>().is_ok(),
                Some((min, max)) => {
                    min.trim().parse::<u32>().is_ok()
                        && max.trim().parse::<u32>().is_ok_and(|m| m > 1)
                }
            };
            let counted = body
                .chars()
                .all(|c| c.is_ascii_digit() || c == ',' || c == ' ');
            if counted && !body.is_empty() {
                (repeats, at + close + 1)
            } else {
                (false, at + 1)
            }
        }
        _ => (false, at),
    }
}

fn has_duplicate_branch(branches: &[String]) -> bool {
    branches.len() > 1
        && branches
            .iter()
            .enumerate()
            .any(|(i, b)| branches[i + 1..].contains(b))
}
