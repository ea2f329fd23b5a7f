//! Runs against a live MongoDB. Ignored by default:
//!
//! ```text
//! MONGO_URI=mongodb://localhost:27017 cargo test --test mongo_store -- --ignored
//! ```
//!
//! Each test works in its own throwaway database and drops it afterwards.

use chrono::Utc;
use mongodb::Client;

use examwatch_server::models::{
    AuditEntry, Exam, ExamSession, SessionStatus, User, UserRole, Verdict, ViolationRecord,
};
use examwatch_server::reducer::VerdictReducer;
use examwatch_server::severity::ViolationKind;
use examwatch_server::store::{Admission, MongoStore, SessionStore, Transition};

struct TestDb {
    uri: String,
    name: String,
    store: MongoStore,
}

impl TestDb {
    async fn open() -> Option<Self> {
        let Ok(uri) = std::env::var("MONGO_URI") else {
            eprintln!("MONGO_URI not set, skipping");
            return None;
        };
        let name = format!("examwatch_test_{}", uuid::Uuid::new_v4().simple());
        let store = MongoStore::connect(&uri, &name).await.unwrap();
        Some(Self { uri, name, store })
    }

    async fn cleanup(self) {
        let client = Client::with_uri_str(&self.uri).await.unwrap();
        client.database(&self.name).drop(None).await.unwrap();
    }
}

fn user(id: &str, email: &str) -> User {
    User {
        id: id.into(),
        email: email.into(),
        full_name: None,
        role: UserRole::Student,
        is_active: true,
        created_at: Utc::now(),
    }
}

fn exam(id: &str) -> Exam {
    Exam {
        id: id.into(),
        title: "Organic Chemistry".into(),
        created_by: None,
        duration_minutes: 90,
        config: Default::default(),
        is_active: true,
        created_at: Utc::now(),
    }
}

fn violation(session_id: &str, tag: &str) -> ViolationRecord {
    ViolationRecord {
        id: uuid::Uuid::new_v4().to_string(),
        session_id: session_id.into(),
        kind: ViolationKind::from(tag),
        timestamp: Utc::now(),
        severity_score: Some(3),
        confidence: Some(0.7),
        evidence_url: None,
    }
}

#[tokio::test]
#[ignore = "needs MONGO_URI"]
async fn begin_finalization_is_a_single_conditional_write() {
    let Some(db) = TestDb::open().await else { return };
    let store = &db.store;
    let session = ExamSession::start("e1".into(), "u1".into());
    store.insert_session(&session).await.unwrap();

    let first = store.begin_finalization(&session.id, Utc::now()).await.unwrap();
    match first {
        Transition::Applied(s) => {
            assert_eq!(s.status, SessionStatus::Processing);
            assert!(s.end_time.is_some());
        }
        other => panic!("expected Applied, got {other:?}"),
    }
    assert_eq!(
        store.begin_finalization(&session.id, Utc::now()).await.unwrap(),
        Transition::Rejected(SessionStatus::Processing)
    );
    assert_eq!(
        store.begin_finalization("nope", Utc::now()).await.unwrap(),
        Transition::Missing
    );

    db.cleanup().await;
}

#[tokio::test]
#[ignore = "needs MONGO_URI"]
async fn complete_finalization_only_matches_processing() {
    let Some(db) = TestDb::open().await else { return };
    let store = &db.store;
    let session = ExamSession::start("e1".into(), "u1".into());
    store.insert_session(&session).await.unwrap();
    store
        .append_violation(&violation(&session.id, "phone_detected"))
        .await
        .unwrap();

    let records = store.load_violations(&session.id).await.unwrap();
    let result = VerdictReducer::default().reduce(&records);

    // still active
    assert!(!store.complete_finalization(&session.id, &result).await.unwrap());

    store.begin_finalization(&session.id, Utc::now()).await.unwrap();
    assert!(store.complete_finalization(&session.id, &result).await.unwrap());
    assert!(!store.complete_finalization(&session.id, &result).await.unwrap());

    let done = store.load_session(&session.id).await.unwrap().unwrap();
    assert_eq!(done.status, SessionStatus::Completed);
    assert_eq!(done.verdict, Verdict::Suspicious);
    assert_eq!(done.ai_summary.unwrap().total_severity, 3);

    db.cleanup().await;
}

#[tokio::test]
#[ignore = "needs MONGO_URI"]
async fn late_violations_are_rejected() {
    let Some(db) = TestDb::open().await else { return };
    let store = &db.store;
    let session = ExamSession::start("e1".into(), "u1".into());
    store.insert_session(&session).await.unwrap();

    store.begin_finalization(&session.id, Utc::now()).await.unwrap();
    assert_eq!(
        store.append_violation(&violation(&session.id, "gaze_away")).await.unwrap(),
        Admission::Rejected(SessionStatus::Processing)
    );
    assert_eq!(
        store.append_violation(&violation("nope", "gaze_away")).await.unwrap(),
        Admission::Missing
    );
    assert!(store.load_violations(&session.id).await.unwrap().is_empty());

    db.cleanup().await;
}

#[tokio::test]
#[ignore = "needs MONGO_URI"]
async fn deletes_cascade_to_sessions_and_violations() {
    let Some(db) = TestDb::open().await else { return };
    let store = &db.store;
    store.insert_exam(&exam("e1")).await.unwrap();
    store.insert_user(&user("u1", "ada@uni.edu")).await.unwrap();

    let by_exam = ExamSession::start("e1".into(), "u2".into());
    let by_user = ExamSession::start("e2".into(), "u1".into());
    for session in [&by_exam, &by_user] {
        store.insert_session(session).await.unwrap();
        store
            .append_violation(&violation(&session.id, "tab_switch"))
            .await
            .unwrap();
    }

    assert!(store.delete_exam("e1").await.unwrap());
    assert!(store.load_session(&by_exam.id).await.unwrap().is_none());
    assert!(store.load_violations(&by_exam.id).await.unwrap().is_empty());
    assert!(store.load_session(&by_user.id).await.unwrap().is_some());

    assert!(store.delete_user("u1").await.unwrap());
    assert!(store.load_session(&by_user.id).await.unwrap().is_none());
    assert!(store.load_violations(&by_user.id).await.unwrap().is_empty());
    assert!(!store.delete_user("u1").await.unwrap());

    db.cleanup().await;
}

#[tokio::test]
#[ignore = "needs MONGO_URI"]
async fn toggle_flips_server_side_and_audit_reads_newest_first() {
    let Some(db) = TestDb::open().await else { return };
    let store = &db.store;
    store.insert_user(&user("u1", "ada@uni.edu")).await.unwrap();

    let off = store.toggle_user_active("u1").await.unwrap().unwrap();
    assert!(!off.is_active);
    let on = store.toggle_user_active("u1").await.unwrap().unwrap();
    assert!(on.is_active);
    assert!(store.toggle_user_active("ghost").await.unwrap().is_none());

    assert!(store.find_user_by_email("ada@uni.edu").await.unwrap().is_some());

    for action in ["user.created", "user.toggled", "user.deleted"] {
        let entry = AuditEntry::new(action, Some(&on), serde_json::json!({ "n": action }));
        store.append_audit(&entry).await.unwrap();
        // keep created_at strictly increasing
        tokio::time::sleep(std::time::Duration::from_millis(2)).await;
    }
    let entries = store.list_audit(2).await.unwrap();
    let actions: Vec<&str> = entries.iter().map(|e| e.action.as_str()).collect();
    assert_eq!(actions, ["user.deleted", "user.toggled"]);
    assert_eq!(entries[0].user_email.as_deref(), Some("ada@uni.edu"));

    db.cleanup().await;
}
