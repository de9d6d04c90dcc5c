//! The store writer: normalized provider events in, communication rows out.
//!
//! Every webhook adapter and the background sync produce a
//! `NormalizedMessage`; this module owns the rest of the pipeline:
//! routing by phone assignment, identity resolution, the idempotent
//! upsert, and the best-effort side effects (timeline entry, notification,
//! event publish). Side effects run after the upsert and are not
//! transactionally linked to it: a failed timeline write logs a warning
//! and the communication row stays.

use chrono::Utc;
use sha2::{Digest, Sha256};

use crate::db::{
    notifications::notification_for_inbound, CommunicationType, DbCommunication, Direction,
};
use crate::fanout::CommsEvent;
use crate::resolver::{self, ResolvedIdentity};
use crate::state::AppState;

/// A provider event reduced to the application's communication shape.
#[derive(Debug, Clone)]
pub struct NormalizedMessage {
    pub communication_type: CommunicationType,
    pub direction: Direction,
    pub from_contact: String,
    pub to_contact: String,
    pub body: String,
    pub subject: Option<String>,
    /// Provider message id. None when the payload carries no usable id;
    /// a deterministic one is synthesized so retries still dedup.
    pub external_id: Option<String>,
    pub status: String,
    pub recording_url: Option<String>,
    pub duration_secs: Option<i64>,
    pub metadata: Option<serde_json::Value>,
    pub occurred_at: Option<String>,
}

impl NormalizedMessage {
    pub fn inbound_sms(from: &str, to: &str, body: &str, external_id: Option<String>) -> Self {
        Self {
            communication_type: CommunicationType::Sms,
            direction: Direction::Inbound,
            from_contact: from.to_string(),
            to_contact: to.to_string(),
            body: body.to_string(),
            subject: None,
            external_id,
            status: "received".to_string(),
            recording_url: None,
            duration_secs: None,
            metadata: None,
            occurred_at: None,
        }
    }
}

/// What happened to a normalized message.
#[derive(Debug)]
pub enum RecordOutcome {
    Stored {
        communication_id: String,
        newly_inserted: bool,
        identity: ResolvedIdentity,
        assigned_user: Option<String>,
    },
    /// Inbound SMS/voicemail whose destination number has no active
    /// assignment. Acknowledged upstream, written nowhere.
    DroppedUnattributed,
}

impl RecordOutcome {
    pub fn wrote_row(&self) -> bool {
        matches!(self, RecordOutcome::Stored { .. })
    }
}

/// Stable fallback id for payloads without a provider message id.
fn synthesize_external_id(msg: &NormalizedMessage) -> String {
    let mut hasher = Sha256::new();
    hasher.update(msg.communication_type.as_str());
    hasher.update(b"|");
    hasher.update(&msg.from_contact);
    hasher.update(b"|");
    hasher.update(&msg.to_contact);
    hasher.update(b"|");
    hasher.update(msg.occurred_at.as_deref().unwrap_or(""));
    hasher.update(b"|");
    hasher.update(&msg.body);
    format!("synth-{}", hex::encode(&hasher.finalize()[..16]))
}

/// Record an inbound message end to end.
///
/// For SMS and voicemail the destination number must carry an active
/// phone assignment; the assignment is what routes the message to a
/// user's inbox. With no assignment the message is dropped without a
/// trace beyond a warning log. Calls and emails are stored regardless;
/// they attribute by counterparty and simply skip the notification when
/// no assignment exists.
pub fn record_inbound(state: &AppState, msg: NormalizedMessage) -> Result<RecordOutcome, String> {
    let db = state.db.lock();

    let requires_assignment = matches!(
        msg.communication_type,
        CommunicationType::Sms | CommunicationType::Voicemail
    ) && msg.direction == Direction::Inbound;

    let assigned_user = if msg.communication_type == CommunicationType::Email {
        None
    } else {
        let to_normalized = resolver::normalize_phone(&msg.to_contact);
        db.find_active_assignment(&to_normalized)?
            .map(|a| a.user_id)
    };

    if requires_assignment && assigned_user.is_none() {
        log::warn!(
            "Ingest: no active assignment for {}, dropping inbound {}",
            msg.to_contact,
            msg.communication_type.as_str()
        );
        return Ok(RecordOutcome::DroppedUnattributed);
    }

    let identity = if msg.communication_type == CommunicationType::Email {
        resolver::resolve_email(&db, &msg.from_contact)?
    } else {
        resolver::resolve_phone(&db, &msg.from_contact)?
    };

    let comm = build_communication(&msg, &identity, false);
    let newly_inserted = db.upsert_communication(&comm)?;

    // Best-effort side effects. Retried webhooks (newly_inserted = false)
    // skip them so a redelivery can't double-notify.
    if newly_inserted {
        if let ResolvedIdentity::Lead { id } = &identity {
            let summary = timeline_summary(&comm);
            if let Err(e) = db.append_lead_timeline(id, &timeline_entry_type(&comm), &summary) {
                log::warn!("Ingest: timeline write failed for lead {}: {}", id, e);
            }
        }
        if let Some(work_order_id) = work_order_id_from_metadata(msg.metadata.as_ref()) {
            let summary = timeline_summary(&comm);
            if let Err(e) =
                db.append_work_order_timeline(&work_order_id, &timeline_entry_type(&comm), &summary)
            {
                log::warn!(
                    "Ingest: timeline write failed for work order {}: {}",
                    work_order_id,
                    e
                );
            }
        }
        if let Some(user_id) = &assigned_user {
            let notification = notification_for_inbound(user_id, &comm);
            if let Err(e) = db.insert_notification(&notification) {
                log::warn!("Ingest: notification write failed for {}: {}", user_id, e);
            } else {
                let _ = state.events.send(CommsEvent::NotificationCreated {
                    user_id: user_id.clone(),
                });
            }
        }
    }
    drop(db);

    let event = if newly_inserted {
        CommsEvent::CommunicationInserted {
            id: comm.id.clone(),
            communication_type: comm.communication_type,
            direction: comm.direction,
        }
    } else {
        CommsEvent::CommunicationUpdated { id: comm.id.clone() }
    };
    let _ = state.events.send(event);
    state.debouncer.notify();

    Ok(RecordOutcome::Stored {
        communication_id: comm.id,
        newly_inserted,
        identity,
        assigned_user,
    })
}

/// Record an outbound send: attributed to the recipient, born read.
pub fn record_outbound(state: &AppState, msg: NormalizedMessage) -> Result<String, String> {
    let db = state.db.lock();

    let identity = if msg.communication_type == CommunicationType::Email {
        resolver::resolve_email(&db, &msg.to_contact)?
    } else {
        resolver::resolve_phone(&db, &msg.to_contact)?
    };

    let comm = build_communication(&msg, &identity, true);
    db.upsert_communication(&comm)?;

    if let ResolvedIdentity::Lead { id } = &identity {
        let summary = timeline_summary(&comm);
        if let Err(e) = db.append_lead_timeline(id, &timeline_entry_type(&comm), &summary) {
            log::warn!("Ingest: timeline write failed for lead {}: {}", id, e);
        }
    }
    drop(db);

    let _ = state.events.send(CommsEvent::CommunicationInserted {
        id: comm.id.clone(),
        communication_type: comm.communication_type,
        direction: comm.direction,
    });
    state.debouncer.notify();

    Ok(comm.id)
}

fn build_communication(
    msg: &NormalizedMessage,
    identity: &ResolvedIdentity,
    is_read: bool,
) -> DbCommunication {
    let now = Utc::now().to_rfc3339();
    let (lead_id, owner_id) = match identity {
        ResolvedIdentity::Lead { id } => (Some(id.clone()), None),
        ResolvedIdentity::Owner { id } => (None, Some(id.clone())),
        _ => (None, None),
    };
    let external_id = msg
        .external_id
        .clone()
        .unwrap_or_else(|| synthesize_external_id(msg));

    DbCommunication {
        id: uuid::Uuid::new_v4().to_string(),
        lead_id,
        owner_id,
        communication_type: msg.communication_type,
        direction: msg.direction,
        body: msg.body.clone(),
        subject: msg.subject.clone(),
        from_contact: msg.from_contact.clone(),
        to_contact: msg.to_contact.clone(),
        external_id,
        status: msg.status.clone(),
        delivery_status: None,
        error_code: None,
        is_read,
        recording_url: msg.recording_url.clone(),
        duration_secs: msg.duration_secs,
        metadata: msg
            .metadata
            .as_ref()
            .map(|m| m.to_string()),
        archived: false,
        created_at: msg.occurred_at.clone().unwrap_or(now.clone()),
        updated_at: now,
    }
}

fn timeline_entry_type(comm: &DbCommunication) -> String {
    format!(
        "{}_{}",
        comm.communication_type.as_str(),
        match comm.direction {
            Direction::Inbound => "received",
            Direction::Outbound => "sent",
        }
    )
}

fn timeline_summary(comm: &DbCommunication) -> String {
    match comm.communication_type {
        CommunicationType::Sms => format!(
            "SMS {} {}",
            match comm.direction {
                Direction::Inbound => "from",
                Direction::Outbound => "to",
            },
            crate::search::format_phone_for_display(match comm.direction {
                Direction::Inbound => &comm.from_contact,
                Direction::Outbound => &comm.to_contact,
            })
        ),
        CommunicationType::Email => format!(
            "Email: {}",
            comm.subject.as_deref().unwrap_or("(no subject)")
        ),
        CommunicationType::Call => format!(
            "Call from {}",
            crate::search::format_phone_for_display(&comm.from_contact)
        ),
        CommunicationType::Voicemail => format!(
            "Voicemail from {}",
            crate::search::format_phone_for_display(&comm.from_contact)
        ),
    }
}

fn work_order_id_from_metadata(metadata: Option<&serde_json::Value>) -> Option<String> {
    metadata?
        .get("work_order_id")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::contacts::tests::sample_lead;
    use crate::state::test_utils::test_state;

    fn seed_assignment_and_lead(state: &AppState) {
        let db = state.db.lock();
        db.assign_phone("4045550100", "agent-1").expect("assign");
        db.upsert_lead(&sample_lead("lead-1", "4045551234"))
            .expect("lead");
    }

    #[tokio::test]
    async fn test_inbound_sms_full_pipeline() {
        let state = test_state();
        seed_assignment_and_lead(&state);
        let mut rx = state.events.subscribe();

        let msg = NormalizedMessage::inbound_sms(
            "+14045551234",
            "4045550100",
            "Is the Maple St unit still open?",
            Some("tx-1".to_string()),
        );
        let outcome = record_inbound(&state, msg).expect("record");

        match outcome {
            RecordOutcome::Stored {
                newly_inserted,
                identity,
                assigned_user,
                ..
            } => {
                assert!(newly_inserted);
                assert_eq!(
                    identity,
                    ResolvedIdentity::Lead {
                        id: "lead-1".to_string()
                    }
                );
                assert_eq!(assigned_user.as_deref(), Some("agent-1"));
            }
            other => panic!("expected Stored, got {:?}", other),
        }

        let db = state.db.lock();
        assert_eq!(db.count_communications().expect("count"), 1);
        assert_eq!(db.get_lead_timeline("lead-1", 10).expect("timeline").len(), 1);
        assert_eq!(db.get_notifications("agent-1").expect("notifications").len(), 1);
        drop(db);

        // Events: notification + insert
        let mut saw_insert = false;
        let mut saw_notification = false;
        while let Ok(event) = rx.try_recv() {
            match event {
                CommsEvent::CommunicationInserted { .. } => saw_insert = true,
                CommsEvent::NotificationCreated { user_id } => {
                    assert_eq!(user_id, "agent-1");
                    saw_notification = true;
                }
                _ => {}
            }
        }
        assert!(saw_insert);
        assert!(saw_notification);
    }

    #[tokio::test]
    async fn test_webhook_retry_no_duplicate_side_effects() {
        let state = test_state();
        seed_assignment_and_lead(&state);

        let msg = NormalizedMessage::inbound_sms(
            "4045551234",
            "4045550100",
            "hello",
            Some("tx-dup".to_string()),
        );
        record_inbound(&state, msg.clone()).expect("first");
        record_inbound(&state, msg).expect("retry");

        let db = state.db.lock();
        assert_eq!(db.count_communications().expect("count"), 1);
        assert_eq!(
            db.get_notifications("agent-1").expect("notifications").len(),
            1,
            "retry must not re-notify"
        );
        assert_eq!(
            db.get_lead_timeline("lead-1", 10).expect("timeline").len(),
            1,
            "retry must not re-append timeline"
        );
    }

    #[tokio::test]
    async fn test_unassigned_voicemail_silently_dropped() {
        let state = test_state();

        let msg = NormalizedMessage {
            communication_type: CommunicationType::Voicemail,
            direction: Direction::Inbound,
            from_contact: "4045551234".to_string(),
            to_contact: "4049999999".to_string(),
            body: String::new(),
            subject: None,
            external_id: Some("rec-1".to_string()),
            status: "voicemail".to_string(),
            recording_url: Some("https://recordings.example.com/rec-1.mp3".to_string()),
            duration_secs: Some(32),
            metadata: None,
            occurred_at: None,
        };
        let outcome = record_inbound(&state, msg).expect("record");
        assert!(matches!(outcome, RecordOutcome::DroppedUnattributed));

        let db = state.db.lock();
        assert_eq!(db.count_communications().expect("count"), 0, "zero rows written");
        let notif_count: i64 = db
            .conn_ref()
            .query_row("SELECT COUNT(*) FROM notifications", [], |r| r.get(0))
            .expect("count");
        assert_eq!(notif_count, 0);
    }

    #[tokio::test]
    async fn test_inbound_call_stored_without_assignment() {
        let state = test_state();

        let msg = NormalizedMessage {
            communication_type: CommunicationType::Call,
            direction: Direction::Inbound,
            from_contact: "4045551234".to_string(),
            to_contact: "4049999999".to_string(),
            body: String::new(),
            subject: None,
            external_id: Some("CA-1".to_string()),
            status: "answered".to_string(),
            recording_url: None,
            duration_secs: Some(120),
            metadata: None,
            occurred_at: None,
        };
        let outcome = record_inbound(&state, msg).expect("record");
        assert!(outcome.wrote_row(), "calls do not require an assignment");
    }

    #[tokio::test]
    async fn test_work_order_metadata_writes_work_order_timeline() {
        let state = test_state();
        state
            .db
            .lock()
            .assign_phone("4045550100", "agent-1")
            .expect("assign");

        let mut msg = NormalizedMessage::inbound_sms(
            "4045551234",
            "4045550100",
            "The sink is fixed",
            Some("tx-wo".to_string()),
        );
        msg.metadata = Some(serde_json::json!({ "work_order_id": "wo-12" }));
        record_inbound(&state, msg).expect("record");

        let count: i64 = state
            .db
            .lock()
            .conn_ref()
            .query_row(
                "SELECT COUNT(*) FROM work_order_timeline WHERE work_order_id = 'wo-12'",
                [],
                |r| r.get(0),
            )
            .expect("count");
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_outbound_is_read_and_attributed_by_recipient() {
        let state = test_state();
        state
            .db
            .lock()
            .upsert_lead(&sample_lead("lead-1", "4045551234"))
            .expect("lead");

        let msg = NormalizedMessage {
            communication_type: CommunicationType::Sms,
            direction: Direction::Outbound,
            from_contact: "4045550100".to_string(),
            to_contact: "4045551234".to_string(),
            body: "Your showing is confirmed for 3pm.".to_string(),
            subject: None,
            external_id: Some("tx-out".to_string()),
            status: "sent".to_string(),
            recording_url: None,
            duration_secs: None,
            metadata: None,
            occurred_at: None,
        };
        let id = record_outbound(&state, msg).expect("record");

        let db = state.db.lock();
        let stored = db.get_communication(&id).expect("query").expect("row");
        assert!(stored.is_read, "outbound rows are born read");
        assert_eq!(stored.lead_id.as_deref(), Some("lead-1"));
        assert_eq!(db.get_lead_timeline("lead-1", 10).expect("timeline").len(), 1);
    }

    #[test]
    fn test_synthesized_external_id_is_deterministic() {
        let msg = NormalizedMessage::inbound_sms("a", "b", "hello", None);
        let other = NormalizedMessage::inbound_sms("a", "b", "hello", None);
        assert_eq!(synthesize_external_id(&msg), synthesize_external_id(&other));

        let different = NormalizedMessage::inbound_sms("a", "b", "different body", None);
        assert_ne!(
            synthesize_external_id(&msg),
            synthesize_external_id(&different)
        );
    }
}
