//! Inbox search ranking and thread dedup helpers.
//!
//! Pure functions over already-fetched rows: scoring, contact-name
//! normalization, near-duplicate thread collapse, and the display
//! formatters the inbox endpoints share.

use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;
use unicode_normalization::UnicodeNormalization;

// Per-field weights. Name matches are tiered (exact > prefix > contains)
// and only the best tier counts; other fields are flat contains checks.
const WEIGHT_NAME_EXACT: u32 = 100;
const WEIGHT_NAME_PREFIX: u32 = 50;
const WEIGHT_NAME_CONTAINS: u32 = 30;
const WEIGHT_EMAIL_CONTAINS: u32 = 25;
const WEIGHT_PHONE_CONTAINS: u32 = 20;
const WEIGHT_SUBJECT_CONTAINS: u32 = 15;
const WEIGHT_BODY_CONTAINS: u32 = 10;

/// Jaro-Winkler threshold above which two display names are treated as
/// the same contact when collapsing threads.
const NAME_SIMILARITY_THRESHOLD: f64 = 0.92;

/// The searchable projection of an inbox item.
#[derive(Debug, Clone, Default)]
pub struct SearchItem {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub subject: String,
    pub body: String,
}

/// Score an item against a tokenized query.
///
/// AND semantics across terms, OR semantics across fields: every term
/// must match at least one field or the whole score is 0. Matching
/// fields contribute additively for each term.
pub fn search_score(item: &SearchItem, terms: &[String]) -> u32 {
    if terms.is_empty() {
        return 0;
    }

    let name = item.name.to_lowercase();
    let email = item.email.to_lowercase();
    let phone_digits: String = item.phone.chars().filter(|c| c.is_ascii_digit()).collect();
    let subject = item.subject.to_lowercase();
    let body = item.body.to_lowercase();

    let mut total = 0u32;
    for term in terms {
        let term = term.to_lowercase();
        if term.is_empty() {
            continue;
        }

        let mut term_score = 0u32;

        if name == term {
            term_score += WEIGHT_NAME_EXACT;
        } else if name.starts_with(&term) {
            term_score += WEIGHT_NAME_PREFIX;
        } else if name.contains(&term) {
            term_score += WEIGHT_NAME_CONTAINS;
        }

        if !email.is_empty() && email.contains(&term) {
            term_score += WEIGHT_EMAIL_CONTAINS;
        }

        let term_digits: String = term.chars().filter(|c| c.is_ascii_digit()).collect();
        if !term_digits.is_empty() && phone_digits.contains(&term_digits) {
            term_score += WEIGHT_PHONE_CONTAINS;
        }

        if !subject.is_empty() && subject.contains(&term) {
            term_score += WEIGHT_SUBJECT_CONTAINS;
        }
        if !body.is_empty() && body.contains(&term) {
            term_score += WEIGHT_BODY_CONTAINS;
        }

        if term_score == 0 {
            // One unmatched term disqualifies the item entirely
            return 0;
        }
        total += term_score;
    }
    total
}

/// Split a raw query string into search terms.
pub fn tokenize_query(query: &str) -> Vec<String> {
    query
        .split_whitespace()
        .map(|s| s.to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Normalize a contact display name for dedup keys.
///
/// Unicode-normalized (NFKC), lowercased, whitespace collapsed, and
/// "A and B" / "A & B" reduced to the first party. The multi-party
/// collapse is a heuristic: reordered names ("B and A") produce a
/// different key and will not dedup.
pub fn normalize_contact_name(name: &str) -> String {
    let normalized: String = name.nfkc().collect::<String>().to_lowercase();
    let collapsed = normalized
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    for separator in [" and ", " & "] {
        if let Some(pos) = collapsed.find(separator) {
            return collapsed[..pos].trim().to_string();
        }
    }
    collapsed
}

/// One entry in a merged conversation listing.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadSummary {
    pub contact_name: String,
    /// Email or normalized phone, whichever channel the thread rides on.
    pub contact_key: String,
    pub last_message_id: String,
    pub last_message_at: String,
    pub last_body: String,
    pub unread_count: u32,
}

/// Collapse near-duplicate threads.
///
/// Threads sharing a contact key, a normalized name, or a name within
/// the Jaro-Winkler similarity threshold merge into one entry keeping
/// the newest message and summing unread counts. Output is newest-first.
pub fn merge_threads(threads: Vec<ThreadSummary>) -> Vec<ThreadSummary> {
    let mut merged: Vec<(String, ThreadSummary)> = Vec::new();

    for thread in threads {
        let norm_name = normalize_contact_name(&thread.contact_name);
        let matched = merged.iter().position(|(existing_name, existing)| {
            let same_key =
                !thread.contact_key.is_empty() && thread.contact_key == existing.contact_key;
            let same_name = !norm_name.is_empty()
                && (norm_name == *existing_name
                    || strsim::jaro_winkler(&norm_name, existing_name)
                        >= NAME_SIMILARITY_THRESHOLD);
            same_key || same_name
        });

        match matched {
            Some(i) => {
                let existing = &mut merged[i].1;
                existing.unread_count += thread.unread_count;
                if thread.last_message_at > existing.last_message_at {
                    let unread = existing.unread_count;
                    *existing = thread;
                    existing.unread_count = unread;
                }
            }
            None => merged.push((norm_name, thread)),
        }
    }

    let mut result: Vec<ThreadSummary> = merged.into_iter().map(|(_, t)| t).collect();
    result.sort_by(|a, b| b.last_message_at.cmp(&a.last_message_at));
    result
}

/// Collapse nested reply prefixes to a single "Re: ".
///
/// "RE: Re: Quote" and "Fwd: RE: Quote" both become "Re: Quote".
pub fn format_reply_subject(subject: &str) -> String {
    static PREFIX: OnceLock<Regex> = OnceLock::new();
    let re = PREFIX.get_or_init(|| Regex::new(r"(?i)^(\s*(re|fw|fwd)\s*:\s*)+").expect("static regex"));

    let stripped = re.replace(subject.trim(), "");
    let stripped = stripped.trim();
    if stripped.is_empty() {
        "Re:".to_string()
    } else {
        format!("Re: {}", stripped)
    }
}

/// Format a phone number for display: "(404) 555-1234".
///
/// A leading country code `1` is stripped only when the digit count is
/// exactly 11. Anything that isn't a 10-digit NANP number after that
/// passes through unchanged.
pub fn format_phone_for_display(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    let digits = if digits.len() == 11 && digits.starts_with('1') {
        digits[1..].to_string()
    } else {
        digits
    };
    if digits.len() != 10 {
        return raw.to_string();
    }
    format!("({}) {}-{}", &digits[0..3], &digits[3..6], &digits[6..10])
}
