//! Orchestrator scenarios against a scripted in-memory backend

use crate::backend::{CaseBackend, HealthStatus, RequestError, SearchRequest, SearchResponse};
use crate::matches::SearchState;
use crate::model::{BackupEntry, Case, CaseFilter, CaseStatus, MatchCandidate, Statistics, SubmitReceipt};
use crate::notify::{Notice, NoticeLevel, Notifier};
use crate::orchestrator::{Orchestrator, SearchOutcome, Trigger};
use crate::refresh::{Refresh, View};
use crate::settings::SettingsStore;
use crate::upload::{CaseSubmission, ImageUpload, ValidatedCase};
use crate::ClientConfig;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;

enum Scripted {
    Reply(Result<SearchResponse, RequestError>),
    Gate(oneshot::Receiver<Result<SearchResponse, RequestError>>),
    Hang,
}

#[derive(Default)]
struct FakeBackend {
    calls: Mutex<Vec<&'static str>>,
    searches: Mutex<VecDeque<Scripted>>,
    thresholds_sent: Mutex<Vec<Option<f64>>>,
    delete_error: Mutex<Option<RequestError>>,
    stats_error: Mutex<Option<RequestError>>,
    reject_login: bool,
}

impl FakeBackend {
    fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }

    fn script(&self, step: Scripted) {
        self.searches.lock().unwrap().push_back(step);
    }
}

#[async_trait]
impl CaseBackend for FakeBackend {
    fn name(&self) -> &str {
        "fake"
    }

    async fn submit_case(&self, _case: &ValidatedCase) -> Result<SubmitReceipt, RequestError> {
        self.record("submit_case");
        Ok(SubmitReceipt {
            case_id: Some(7),
            faces_detected: 1,
            image_path: Some("uploads/7.jpg".to_string()),
        })
    }

    async fn search_face(&self, request: SearchRequest) -> Result<SearchResponse, RequestError> {
        self.record("search_face");
        self.thresholds_sent.lock().unwrap().push(request.min_similarity);
        let step = self.searches.lock().unwrap().pop_front();
        match step {
            Some(Scripted::Reply(result)) => result,
            Some(Scripted::Gate(rx)) => rx
                .await
                .unwrap_or_else(|_| Err(RequestError::Connection("gate dropped".to_string()))),
            Some(Scripted::Hang) => std::future::pending().await,
            None => Ok(SearchResponse::default()),
        }
    }

    async fn list_cases(&self, _filter: CaseFilter) -> Result<Vec<Case>, RequestError> {
        self.record("list_cases");
        Ok(vec![Case {
            case_id: 1,
            name: "Ana".to_string(),
            status: CaseStatus::Missing,
            description: "Last seen downtown".to_string(),
            contact: "555-0100".to_string(),
            image_path: None,
            created_at: None,
        }])
    }

    async fn case_detail(&self, _case_id: i64) -> Result<Case, RequestError> {
        self.record("case_detail");
        Err(RequestError::Rejected("Case not found".to_string()))
    }

    async fn statistics(&self) -> Result<Statistics, RequestError> {
        self.record("statistics");
        match self.stats_error.lock().unwrap().take() {
            Some(e) => Err(e),
            None => Ok(Statistics {
                total_cases: 3,
                missing_persons: 2,
                found_persons: 1,
            }),
        }
    }

    async fn fetch_image(&self, image_path: &str) -> Result<ImageUpload, RequestError> {
        self.record("fetch_image");
        Ok(ImageUpload::new(image_path, "image/jpeg", vec![1u8; 16]))
    }

    async fn login(&self, _password: &str) -> Result<bool, RequestError> {
        self.record("login");
        Ok(!self.reject_login)
    }

    async fn delete_case(&self, _case_id: i64, _admin_password: &str) -> Result<(), RequestError> {
        self.record("delete_case");
        match self.delete_error.lock().unwrap().take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn create_backup(&self, _admin_password: &str) -> Result<String, RequestError> {
        self.record("create_backup");
        Ok("backup_20240301.db".to_string())
    }

    async fn list_backups(&self, _admin_password: &str) -> Result<Vec<BackupEntry>, RequestError> {
        self.record("list_backups");
        Ok(Vec::new())
    }

    async fn restore_backup(&self, _file: &str, _admin_password: &str) -> Result<String, RequestError> {
        self.record("restore_backup");
        Ok("Database restored".to_string())
    }

    async fn health_check(&self) -> HealthStatus {
        HealthStatus {
            healthy: true,
            latency_ms: Some(1),
            database: Some("connected".to_string()),
            error: None,
        }
    }
}

#[derive(Default)]
struct RecordingNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingNotifier {
    fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap().clone()
    }

    fn last(&self) -> Notice {
        self.notices().pop().expect("no notice emitted")
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}

struct Harness {
    backend: Arc<FakeBackend>,
    notifier: Arc<RecordingNotifier>,
    orchestrator: Arc<Orchestrator>,
}

fn harness_with(backend: FakeBackend, threshold: Option<f64>) -> Harness {
    let backend = Arc::new(backend);
    let notifier = Arc::new(RecordingNotifier::default());
    let orchestrator = Arc::new(Orchestrator::new(
        &ClientConfig::default(),
        backend.clone(),
        Arc::new(SettingsStore::in_memory(threshold)),
        notifier.clone(),
    ));
    Harness {
        backend,
        notifier,
        orchestrator,
    }
}

fn harness() -> Harness {
    harness_with(FakeBackend::default(), None)
}

fn photo() -> ImageUpload {
    ImageUpload::new("face.jpg", "image/jpeg", vec![0u8; 128])
}

fn candidate(name: &str, percentage: f64) -> MatchCandidate {
    MatchCandidate {
        case_id: None,
        name: name.to_string(),
        status: CaseStatus::Missing,
        description: String::new(),
        contact: String::new(),
        image_path: None,
        similarity_score: None,
        similarity_percentage: percentage,
    }
}

fn list_response(candidates: Vec<MatchCandidate>) -> SearchResponse {
    SearchResponse {
        matches: Some(candidates),
        ..Default::default()
    }
}

fn submission() -> CaseSubmission {
    CaseSubmission {
        name: "Maria Lopez".to_string(),
        status: "missing".to_string(),
        description: "Last seen near the station".to_string(),
        contact: "555-0100".to_string(),
        photo: Some(photo()),
    }
}

fn names(state: &SearchState) -> Vec<String> {
    match state {
        SearchState::Results(matches) => matches.iter().map(|m| m.candidate.name.clone()).collect(),
        _ => Vec::new(),
    }
}

#[tokio::test]
async fn test_submit_with_empty_description_makes_no_calls() {
    let h = harness();
    let mut input = submission();
    input.description = "  ".to_string();

    let err = h.orchestrator.submit_case(&input).await.unwrap_err();
    match err {
        RequestError::Validation(v) => assert_eq!(v.field, "description"),
        other => panic!("unexpected: {:?}", other),
    }
    assert!(h.backend.calls().is_empty());
    assert_eq!(h.notifier.last().level, NoticeLevel::Warning);
}

#[tokio::test]
async fn test_submit_success_reloads_stats_and_cases() {
    let h = harness();
    let receipt = h.orchestrator.submit_case(&submission()).await.unwrap();
    assert_eq!(receipt.case_id, Some(7));

    let calls = h.backend.calls();
    assert_eq!(calls[0], "submit_case");
    assert!(calls.contains(&"statistics"));
    assert!(calls.contains(&"list_cases"));
    assert_eq!(h.orchestrator.statistics().map(|s| s.total_cases), Some(3));
    assert_eq!(h.notifier.notices()[0].title, "Case Submitted");
    assert!(!h.orchestrator.is_busy());
}

#[tokio::test]
async fn test_search_without_photo() {
    let h = harness();
    let err = h.orchestrator.search(None).await.unwrap_err();
    assert_eq!(err.to_string(), "photo required");
    assert!(h.backend.calls().is_empty());
    assert_eq!(h.orchestrator.search_state(), SearchState::Idle);
    assert_eq!(h.notifier.last().title, "Photo Required");
}

#[tokio::test]
async fn test_invalid_photo_rejected_before_network() {
    let h = harness();
    let webp = ImageUpload::new("face.webp", "image/webp", vec![0u8; 10]);
    assert!(matches!(
        h.orchestrator.search(Some(&webp)).await,
        Err(RequestError::Validation(_))
    ));
    assert!(h.backend.calls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_search_timeout_resets_panel_and_busy() {
    let h = harness();
    h.backend.script(Scripted::Hang);

    let err = h.orchestrator.search(Some(&photo())).await.unwrap_err();
    assert!(matches!(err, RequestError::Timeout(d) if d == Duration::from_secs(60)));
    assert_eq!(h.orchestrator.search_state(), SearchState::Idle);
    assert!(!h.orchestrator.is_busy());
    assert_eq!(h.notifier.last().title, "Timeout");
}

#[tokio::test]
async fn test_search_filters_below_floor_and_keeps_order() {
    let h = harness();
    h.backend.script(Scripted::Reply(Ok(list_response(vec![
        candidate("low", 55.0),
        candidate("best", 91.0),
        candidate("edge", 60.0),
    ]))));

    let outcome = h.orchestrator.search(Some(&photo())).await.unwrap();
    let SearchOutcome::Displayed(state) = outcome else {
        panic!("search was superseded");
    };
    assert_eq!(names(&state), vec!["best", "edge"]);
    assert_eq!(h.orchestrator.search_state(), state);
    assert_eq!(h.notifier.last().title, "Matches Found");
}

#[tokio::test]
async fn test_search_all_below_floor_is_no_results() {
    let h = harness();
    h.backend.script(Scripted::Reply(Ok(SearchResponse {
        best_match: Some(candidate("weak", 42.0)),
        ..Default::default()
    })));

    let outcome = h.orchestrator.search(Some(&photo())).await.unwrap();
    assert_eq!(outcome, SearchOutcome::Displayed(SearchState::NoResults));
    assert!(h.orchestrator.render_search_panel().contains("no-results"));
}

#[tokio::test]
async fn test_rejected_search_returns_to_idle() {
    let h = harness();
    h.backend.script(Scripted::Reply(Err(RequestError::Rejected(
        "No face detected in the image".to_string(),
    ))));

    let err = h.orchestrator.search(Some(&photo())).await.unwrap_err();
    assert_eq!(err.to_string(), "No face detected in the image");
    assert_eq!(h.orchestrator.search_state(), SearchState::Idle);
    assert_eq!(h.notifier.last().title, "Search Error");
}

#[tokio::test]
async fn test_threshold_is_sent_with_search() {
    let h = harness_with(FakeBackend::default(), Some(72.0));
    h.orchestrator.search(Some(&photo())).await.unwrap();

    h.orchestrator.clear_threshold().unwrap();
    h.orchestrator.search(Some(&photo())).await.unwrap();

    assert_eq!(*h.backend.thresholds_sent.lock().unwrap(), vec![Some(72.0), None]);
}

#[tokio::test]
async fn test_latest_issued_search_wins() {
    let h = harness();
    let (first_tx, first_rx) = oneshot::channel();
    let (second_tx, second_rx) = oneshot::channel();
    h.backend.script(Scripted::Gate(first_rx));
    h.backend.script(Scripted::Gate(second_rx));

    let image = photo();
    let (first, second, ()) = tokio::join!(
        h.orchestrator.search(Some(&image)),
        h.orchestrator.search(Some(&image)),
        async {
            // second-issued resolves first, the first arrives late
            second_tx.send(Ok(list_response(vec![candidate("second", 88.0)]))).unwrap();
            for _ in 0..3 {
                tokio::task::yield_now().await;
            }
            first_tx.send(Ok(list_response(vec![candidate("first", 99.0)]))).unwrap();
        }
    );

    assert_eq!(first.unwrap(), SearchOutcome::Superseded);
    assert!(matches!(second.unwrap(), SearchOutcome::Displayed(_)));
    assert_eq!(names(&h.orchestrator.search_state()), vec!["second"]);
    assert!(!h.orchestrator.is_busy());
}

#[tokio::test]
async fn test_failed_stale_search_keeps_newer_results() {
    let h = harness();
    let (first_tx, first_rx) = oneshot::channel();
    let (second_tx, second_rx) = oneshot::channel();
    h.backend.script(Scripted::Gate(first_rx));
    h.backend.script(Scripted::Gate(second_rx));

    let image = photo();
    let (first, second, ()) = tokio::join!(
        h.orchestrator.search(Some(&image)),
        h.orchestrator.search(Some(&image)),
        async {
            second_tx.send(Ok(list_response(vec![candidate("second", 88.0)]))).unwrap();
            for _ in 0..3 {
                tokio::task::yield_now().await;
            }
            first_tx
                .send(Err(RequestError::Rejected("No face detected in the image".to_string())))
                .unwrap();
        }
    );

    assert!(matches!(first, Err(RequestError::Rejected(_))));
    assert!(matches!(second.unwrap(), SearchOutcome::Displayed(_)));
    assert_eq!(names(&h.orchestrator.search_state()), vec!["second"]);
    assert!(!h.orchestrator.is_busy());
}

#[tokio::test]
async fn test_search_from_case_fetches_then_searches() {
    let h = harness();
    h.orchestrator.search_from_case("uploads/ana.jpg").await.unwrap();
    assert_eq!(h.backend.calls(), vec!["fetch_image", "search_face"]);
}

#[tokio::test]
async fn test_privileged_calls_require_login() {
    let h = harness();
    assert!(matches!(h.orchestrator.delete_case(1).await, Err(RequestError::AuthExpired)));
    assert!(h.backend.calls().is_empty());
}

#[tokio::test]
async fn test_wrong_password_keeps_logged_out() {
    let h = harness_with(
        FakeBackend {
            reject_login: true,
            ..Default::default()
        },
        None,
    );
    let err = h.orchestrator.login("nope").await.unwrap_err();
    assert_eq!(err.to_string(), "Invalid admin password");
    assert!(!h.orchestrator.is_logged_in());

    assert!(matches!(h.orchestrator.login("").await, Err(RequestError::Validation(_))));
}

#[tokio::test]
async fn test_delete_unauthorized_clears_session() {
    let h = harness();
    h.orchestrator.login("secret").await.unwrap();
    assert!(h.orchestrator.is_logged_in());
    *h.backend.delete_error.lock().unwrap() = Some(RequestError::AuthExpired);

    let err = h.orchestrator.delete_case(42).await.unwrap_err();
    assert!(matches!(err, RequestError::AuthExpired));
    assert!(!h.orchestrator.is_logged_in());
    assert_eq!(h.notifier.last().title, "Session Expired");
}

#[tokio::test]
async fn test_delete_success_refreshes() {
    let h = harness();
    h.orchestrator.login("secret").await.unwrap();
    h.orchestrator.delete_case(42).await.unwrap();

    let calls = h.backend.calls();
    assert!(calls.contains(&"delete_case"));
    assert!(calls.contains(&"list_cases"));
    assert!(h.orchestrator.is_logged_in());
    assert!(h.orchestrator.logout());
    assert!(!h.orchestrator.logout());
}

#[tokio::test]
async fn test_backup_operations() {
    let h = harness();
    h.orchestrator.login("secret").await.unwrap();
    assert_eq!(h.orchestrator.create_backup().await.unwrap(), "backup_20240301.db");
    assert!(h.orchestrator.list_backups().await.unwrap().is_empty());
    assert!(matches!(
        h.orchestrator.restore_backup(" ").await,
        Err(RequestError::Validation(_))
    ));
    assert_eq!(h.orchestrator.restore_backup("backup_20240301.db").await.unwrap(), "Database restored");
}

#[tokio::test]
async fn test_poll_failures_are_not_notified() {
    let h = harness();
    *h.backend.stats_error.lock().unwrap() = Some(RequestError::Connection("refused".to_string()));

    assert!(h.orchestrator.refresh(View::Dashboard).await.is_err());
    assert!(h.notifier.notices().is_empty());
    assert_eq!(h.orchestrator.statistics(), None);

    h.orchestrator.refresh(View::Cases).await.unwrap();
    assert_eq!(h.orchestrator.cases().map(|c| c.len()), Some(1));
    h.orchestrator.refresh(View::Search).await.unwrap();
    assert_eq!(h.backend.calls(), vec!["statistics", "list_cases"]);
}

#[tokio::test]
async fn test_user_load_failure_is_notified() {
    let h = harness();
    *h.backend.stats_error.lock().unwrap() = Some(RequestError::ResponseFormat("bad".to_string()));
    assert!(h.orchestrator.load_statistics(Trigger::User).await.is_err());
    assert_eq!(h.notifier.last().title, "Statistics Error");

    let err = h.orchestrator.case_detail(9).await.unwrap_err();
    assert_eq!(err.to_string(), "Case not found");
}
