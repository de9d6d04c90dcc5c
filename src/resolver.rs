//! Identity resolution for inbound contacts.
//!
//! Maps a raw phone number or email address to an internal party. The
//! priority order (leads, then property owners, then user phone
//! assignments) is a business rule, not an accident of query order:
//! a phone number shared by a lead and an owner always resolves to the
//! lead. First match wins; there is no best-match scoring.

use serde::Serialize;

use crate::db::CommsDb;

/// Outcome of resolving a raw contact string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolvedIdentity {
    Lead { id: String },
    Owner { id: String },
    User { id: String },
    Unmatched,
}

/// Reduce a phone number to its last ten digits.
///
/// "+1 (404) 555-1234", "14045551234" and "4045551234" all normalize to
/// "4045551234". Numbers shorter than ten digits are returned as their
/// bare digits; they won't match anything stored, which is the intent.
pub fn normalize_phone(raw: &str) -> String {
    let digits: String = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() > 10 {
        digits[digits.len() - 10..].to_string()
    } else {
        digits
    }
}

/// Resolve a phone number to an internal party, in fixed priority order.
pub fn resolve_phone(db: &CommsDb, raw_phone: &str) -> Result<ResolvedIdentity, String> {
    let normalized = normalize_phone(raw_phone);
    if normalized.is_empty() {
        return Ok(ResolvedIdentity::Unmatched);
    }

    if let Some(lead) = db.find_lead_by_phone(&normalized)? {
        return Ok(ResolvedIdentity::Lead { id: lead.id });
    }
    if let Some(owner) = db.find_owner_by_phone(&normalized)? {
        return Ok(ResolvedIdentity::Owner { id: owner.id });
    }
    if let Some(assignment) = db.find_active_assignment(&normalized)? {
        return Ok(ResolvedIdentity::User {
            id: assignment.user_id,
        });
    }
    Ok(ResolvedIdentity::Unmatched)
}

/// Resolve an email address to an internal party. Same priority order as
/// phones; assignments are phone-only so the cascade ends at owners.
pub fn resolve_email(db: &CommsDb, email: &str) -> Result<ResolvedIdentity, String> {
    let trimmed = email.trim();
    if trimmed.is_empty() {
        return Ok(ResolvedIdentity::Unmatched);
    }

    if let Some(lead) = db.find_lead_by_email(trimmed)? {
        return Ok(ResolvedIdentity::Lead { id: lead.id });
    }
    if let Some(owner) = db.find_owner_by_email(trimmed)? {
        return Ok(ResolvedIdentity::Owner { id: owner.id });
    }
    Ok(ResolvedIdentity::Unmatched)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::contacts::tests::{sample_lead, sample_owner};
    use crate::db::test_utils::test_db;

    #[test]
    fn test_normalize_phone() {
        assert_eq!(normalize_phone("+1 (404) 555-1234"), "4045551234");
        assert_eq!(normalize_phone("14045551234"), "4045551234");
        assert_eq!(normalize_phone("4045551234"), "4045551234");
        assert_eq!(normalize_phone("555-1234"), "5551234");
        assert_eq!(normalize_phone(""), "");
        assert_eq!(normalize_phone("not a number"), "");
    }

    #[test]
    fn test_lead_wins_over_owner_on_shared_phone() {
        let db = test_db();
        // Same phone number on both a lead and an owner. Current behavior:
        // the lead always wins. Pinned here so a priority change is a
        // deliberate decision, not a refactoring accident.
        db.upsert_owner(&sample_owner("own-1", "4045551234")).expect("owner");
        db.upsert_lead(&sample_lead("lead-1", "4045551234")).expect("lead");

        let resolved = resolve_phone(&db, "+14045551234").expect("resolve");
        assert_eq!(
            resolved,
            ResolvedIdentity::Lead {
                id: "lead-1".to_string()
            }
        );
    }

    #[test]
    fn test_owner_resolution_when_no_lead() {
        let db = test_db();
        db.upsert_owner(&sample_owner("own-2", "4045550002")).expect("owner");

        let resolved = resolve_phone(&db, "4045550002").expect("resolve");
        assert_eq!(
            resolved,
            ResolvedIdentity::Owner {
                id: "own-2".to_string()
            }
        );
    }

    #[test]
    fn test_assignment_resolution_last() {
        let db = test_db();
        db.assign_phone("4045550003", "user-9").expect("assign");

        let resolved = resolve_phone(&db, "(404) 555-0003").expect("resolve");
        assert_eq!(
            resolved,
            ResolvedIdentity::User {
                id: "user-9".to_string()
            }
        );
    }

    #[test]
    fn test_unmatched_phone() {
        let db = test_db();
        assert_eq!(
            resolve_phone(&db, "4049999999").expect("resolve"),
            ResolvedIdentity::Unmatched
        );
        assert_eq!(
            resolve_phone(&db, "").expect("resolve"),
            ResolvedIdentity::Unmatched
        );
    }

    #[test]
    fn test_email_resolution_priority() {
        let db = test_db();
        let mut owner = sample_owner("own-3", "4045550004");
        owner.email = Some("shared@example.com".to_string());
        db.upsert_owner(&owner).expect("owner");

        let mut lead = sample_lead("lead-3", "4045550005");
        lead.email = Some("shared@example.com".to_string());
        db.upsert_lead(&lead).expect("lead");

        let resolved = resolve_email(&db, "Shared@Example.com").expect("resolve");
        assert_eq!(
            resolved,
            ResolvedIdentity::Lead {
                id: "lead-3".to_string()
            }
        );
    }

    #[test]
    fn test_unmatched_email() {
        let db = test_db();
        assert_eq!(
            resolve_email(&db, "nobody@example.com").expect("resolve"),
            ResolvedIdentity::Unmatched
        );
    }
}
