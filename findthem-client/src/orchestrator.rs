//! Request orchestration
//!
//! [`Orchestrator`] sits between user actions and the backend. It validates
//! input before anything touches the network, bounds every call by the
//! configured timeout, classifies failures into notices and commits results
//! into the fenced panels.

use crate::backend::{CaseBackend, HealthStatus, Operation, RequestError, SearchRequest};
use crate::matches::{displayable_matches, SearchState};
use crate::model::{BackupEntry, Case, CaseFilter, Statistics, SubmitReceipt};
use crate::notify::{Notice, Notifier};
use crate::panel::Panel;
use crate::refresh::{Refresh, View};
use crate::render;
use crate::settings::{AdminSession, SessionStore, SettingsError, SettingsStore};
use crate::upload::{validate_photo, CaseSubmission, ImageUpload, ValidationError};
use crate::ClientConfig;
use async_trait::async_trait;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Who started a request. Polled requests never notify.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    User,
    Poll,
}

/// Result of a search that completed without error
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// Committed to the search panel
    Displayed(SearchState),
    /// A newer search was issued first; this result was dropped
    Superseded,
}

/// Counts in-flight user requests
#[derive(Debug, Default)]
pub struct BusyIndicator {
    active: AtomicUsize,
}

impl BusyIndicator {
    pub fn enter(&self) -> BusyGuard<'_> {
        self.active.fetch_add(1, Ordering::SeqCst);
        BusyGuard { indicator: self }
    }

    pub fn is_busy(&self) -> bool {
        self.active.load(Ordering::SeqCst) > 0
    }
}

/// Leaves the busy state when dropped
#[must_use = "the busy state ends when the guard is dropped"]
pub struct BusyGuard<'a> {
    indicator: &'a BusyIndicator,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.indicator.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// The request orchestrator
pub struct Orchestrator {
    backend: Arc<dyn CaseBackend>,
    settings: Arc<SettingsStore>,
    notifier: Arc<dyn Notifier>,
    session: SessionStore,
    search_panel: Panel<SearchState>,
    cases_panel: Panel<Option<Vec<Case>>>,
    stats_panel: Panel<Option<Statistics>>,
    cases_filter: Mutex<CaseFilter>,
    busy: BusyIndicator,
    uploads_base: String,
    timeout: Duration,
}

impl Orchestrator {
    pub fn new(
        config: &ClientConfig,
        backend: Arc<dyn CaseBackend>,
        settings: Arc<SettingsStore>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        info!(backend = backend.name(), timeout_secs = config.request_timeout_secs, "Creating orchestrator");
        Self {
            backend,
            settings,
            notifier,
            session: SessionStore::default(),
            search_panel: Panel::default(),
            cases_panel: Panel::default(),
            stats_panel: Panel::default(),
            cases_filter: Mutex::new(CaseFilter::All),
            busy: BusyIndicator::default(),
            uploads_base: config.uploads_base(),
            timeout: config.request_timeout(),
        }
    }

    pub fn search_state(&self) -> SearchState {
        self.search_panel.get()
    }

    pub fn cases(&self) -> Option<Vec<Case>> {
        self.cases_panel.get()
    }

    pub fn statistics(&self) -> Option<Statistics> {
        self.stats_panel.get()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.is_busy()
    }

    pub fn is_logged_in(&self) -> bool {
        self.session.is_active()
    }

    pub fn threshold(&self) -> Option<f64> {
        self.settings.threshold()
    }

    pub fn uploads_base(&self) -> &str {
        &self.uploads_base
    }

    /// Markup for the current search panel
    pub fn render_search_panel(&self) -> String {
        render::render_search(&self.search_state(), &self.uploads_base)
    }

    fn cases_filter(&self) -> CaseFilter {
        *self.cases_filter.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run a backend call inside its own timeout window. Dropping the future
    /// on expiry aborts the transfer.
    async fn bounded<T>(
        &self,
        call: impl Future<Output = Result<T, RequestError>>,
    ) -> Result<T, RequestError> {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(RequestError::Timeout(self.timeout)),
        }
    }

    fn report(&self, operation: Operation, trigger: Trigger, err: &RequestError) {
        if matches!(err, RequestError::AuthExpired) && self.session.clear() {
            warn!(operation = %operation, "Admin session expired, cleared");
        }
        match trigger {
            Trigger::User => self.notifier.notify(Notice::for_error(err, operation)),
            Trigger::Poll => warn!(operation = %operation, error = %err, "Background refresh failed"),
        }
    }

    fn rejected<T>(&self, operation: Operation, err: RequestError) -> Result<T, RequestError> {
        self.report(operation, Trigger::User, &err);
        Err(err)
    }

    /// Validate and upload a new case, then reload statistics and cases
    pub async fn submit_case(&self, submission: &CaseSubmission) -> Result<SubmitReceipt, RequestError> {
        let case = match submission.validate() {
            Ok(case) => case,
            Err(e) => return self.rejected(Operation::SubmitCase, e.into()),
        };

        let receipt = {
            let _busy = self.busy.enter();
            match self.bounded(self.backend.submit_case(&case)).await {
                Ok(receipt) => receipt,
                Err(e) => return self.rejected(Operation::SubmitCase, e),
            }
        };

        info!(case_id = ?receipt.case_id, faces = receipt.faces_detected, "Case submitted");
        self.notifier.notify(Notice::success(
            "Case Submitted",
            format!(
                "Case reported successfully! Faces detected: {}",
                receipt.faces_detected
            ),
        ));
        self.refresh_after_mutation().await;
        Ok(receipt)
    }

    /// Search with the caller's current selection.
    ///
    /// The panel shows `Searching` until this ticket resolves. A failure puts
    /// the panel back to `Idle` unless a newer search owns it.
    pub async fn search(&self, selection: Option<&ImageUpload>) -> Result<SearchOutcome, RequestError> {
        let image = match validate_photo(selection) {
            Ok(image) => image,
            Err(e) => return self.rejected(Operation::Search, e.into()),
        };

        let ticket = self.search_panel.issue(Some(SearchState::Searching));
        let request = SearchRequest {
            image,
            min_similarity: self.settings.threshold(),
        };
        debug!(threshold = ?request.min_similarity, "Searching");

        let result = {
            let _busy = self.busy.enter();
            self.bounded(self.backend.search_face(request)).await
        };

        let response = match result {
            Ok(response) => response,
            Err(e) => {
                self.search_panel.commit(ticket, SearchState::Idle);
                return self.rejected(Operation::Search, e);
            }
        };

        let state = SearchState::from_matches(displayable_matches(response));
        if !self.search_panel.commit(ticket, state.clone()) {
            debug!("Search result superseded by a newer search");
            return Ok(SearchOutcome::Superseded);
        }

        let notice = match state.match_count() {
            0 => Notice::info("No Matches", "No similar faces found in the database."),
            1 => Notice::success("Match Found", "Found 1 potential match."),
            n => Notice::success("Matches Found", format!("Found {} potential matches.", n)),
        };
        self.notifier.notify(notice);
        Ok(SearchOutcome::Displayed(state))
    }

    /// Fetch a stored case image and search with it
    pub async fn search_from_case(&self, image_path: &str) -> Result<SearchOutcome, RequestError> {
        if image_path.trim().is_empty() {
            return self.rejected(Operation::FetchImage, ValidationError::required("photo").into());
        }

        let image = {
            let _busy = self.busy.enter();
            match self.bounded(self.backend.fetch_image(image_path)).await {
                Ok(image) => image,
                Err(e) => return self.rejected(Operation::FetchImage, e),
            }
        };
        debug!(file = %image.file_name, bytes = image.size(), "Fetched case image");

        self.search(Some(&image)).await
    }

    /// Load the case list into the cases panel
    pub async fn load_cases(&self, filter: CaseFilter, trigger: Trigger) -> Result<Vec<Case>, RequestError> {
        *self.cases_filter.lock().unwrap_or_else(PoisonError::into_inner) = filter;
        let ticket = self.cases_panel.issue(None);

        let result = {
            let _busy = (trigger == Trigger::User).then(|| self.busy.enter());
            self.bounded(self.backend.list_cases(filter)).await
        };

        match result {
            Ok(cases) => {
                if !self.cases_panel.commit(ticket, Some(cases.clone())) {
                    debug!("Case list superseded");
                }
                Ok(cases)
            }
            Err(e) => {
                self.report(Operation::ListCases, trigger, &e);
                Err(e)
            }
        }
    }

    /// Load statistics into the statistics panel
    pub async fn load_statistics(&self, trigger: Trigger) -> Result<Statistics, RequestError> {
        let ticket = self.stats_panel.issue(None);

        let result = {
            let _busy = (trigger == Trigger::User).then(|| self.busy.enter());
            self.bounded(self.backend.statistics()).await
        };

        match result {
            Ok(stats) => {
                if !self.stats_panel.commit(ticket, Some(stats)) {
                    debug!("Statistics superseded");
                }
                Ok(stats)
            }
            Err(e) => {
                self.report(Operation::Statistics, trigger, &e);
                Err(e)
            }
        }
    }

    pub async fn case_detail(&self, case_id: i64) -> Result<Case, RequestError> {
        let _busy = self.busy.enter();
        match self.bounded(self.backend.case_detail(case_id)).await {
            Ok(case) => Ok(case),
            Err(e) => self.rejected(Operation::CaseDetail, e),
        }
    }

    /// Authenticate and keep the session in memory
    pub async fn login(&self, password: &str) -> Result<AdminSession, RequestError> {
        if password.is_empty() {
            return self.rejected(Operation::Login, ValidationError::required("password").into());
        }

        let accepted = {
            let _busy = self.busy.enter();
            match self.bounded(self.backend.login(password)).await {
                Ok(accepted) => accepted,
                Err(e) => return self.rejected(Operation::Login, e),
            }
        };

        if !accepted {
            return self.rejected(
                Operation::Login,
                RequestError::Rejected("Invalid admin password".to_string()),
            );
        }

        let session = self.session.start(password);
        info!("Admin logged in");
        self.notifier.notify(Notice::success("Login Successful", "Welcome to the admin dashboard."));
        Ok(session)
    }

    /// Returns whether a session was active
    pub fn logout(&self) -> bool {
        let was_active = self.session.clear();
        if was_active {
            info!("Admin logged out");
            self.notifier.notify(Notice::info("Logged Out", "You have been logged out."));
        }
        was_active
    }

    fn require_session(&self, operation: Operation) -> Result<AdminSession, RequestError> {
        match self.session.current() {
            Some(session) => Ok(session),
            None => self.rejected(operation, RequestError::AuthExpired),
        }
    }

    /// Delete a case with the current admin session
    pub async fn delete_case(&self, case_id: i64) -> Result<(), RequestError> {
        let session = self.require_session(Operation::DeleteCase)?;

        {
            let _busy = self.busy.enter();
            if let Err(e) = self.bounded(self.backend.delete_case(case_id, &session.password)).await {
                return self.rejected(Operation::DeleteCase, e);
            }
        }

        info!(case_id, "Deleted case");
        self.notifier.notify(Notice::success("Case Deleted", "Case deleted successfully."));
        self.refresh_after_mutation().await;
        Ok(())
    }

    pub async fn create_backup(&self) -> Result<String, RequestError> {
        let session = self.require_session(Operation::CreateBackup)?;
        let _busy = self.busy.enter();

        match self.bounded(self.backend.create_backup(&session.password)).await {
            Ok(file) => {
                info!(file = %file, "Backup created");
                self.notifier.notify(Notice::success("Backup Created", format!("Backup created: {}", file)));
                Ok(file)
            }
            Err(e) => self.rejected(Operation::CreateBackup, e),
        }
    }

    pub async fn list_backups(&self) -> Result<Vec<BackupEntry>, RequestError> {
        let session = self.require_session(Operation::ListBackups)?;
        let _busy = self.busy.enter();

        match self.bounded(self.backend.list_backups(&session.password)).await {
            Ok(backups) => Ok(backups),
            Err(e) => self.rejected(Operation::ListBackups, e),
        }
    }

    /// Restore a backup, then reload statistics and cases
    pub async fn restore_backup(&self, backup_filename: &str) -> Result<String, RequestError> {
        if backup_filename.trim().is_empty() {
            return self.rejected(Operation::RestoreBackup, ValidationError::required("backup").into());
        }
        let session = self.require_session(Operation::RestoreBackup)?;

        let message = {
            let _busy = self.busy.enter();
            match self
                .bounded(self.backend.restore_backup(backup_filename, &session.password))
                .await
            {
                Ok(message) => message,
                Err(e) => return self.rejected(Operation::RestoreBackup, e),
            }
        };

        info!(file = backup_filename, "Backup restored");
        self.notifier.notify(Notice::success("Backup Restored", message.clone()));
        self.refresh_after_mutation().await;
        Ok(message)
    }

    pub async fn health(&self) -> HealthStatus {
        match tokio::time::timeout(self.timeout, self.backend.health_check()).await {
            Ok(status) => status,
            Err(_) => HealthStatus {
                healthy: false,
                latency_ms: None,
                database: None,
                error: Some(RequestError::Timeout(self.timeout).to_string()),
            },
        }
    }

    pub fn set_threshold(&self, value: f64) -> Result<(), SettingsError> {
        self.settings.set_threshold(value)?;
        self.notifier.notify(Notice::success(
            "Settings Saved",
            format!("Similarity threshold set to {}%", value),
        ));
        Ok(())
    }

    pub fn clear_threshold(&self) -> Result<(), SettingsError> {
        self.settings.clear_threshold()?;
        self.notifier.notify(Notice::info("Settings Saved", "Similarity threshold cleared"));
        Ok(())
    }

    /// Failures here are logged by `report`
    async fn refresh_after_mutation(&self) {
        let filter = self.cases_filter();
        let _ = tokio::join!(
            self.load_statistics(Trigger::Poll),
            self.load_cases(filter, Trigger::Poll)
        );
    }
}

#[async_trait]
impl Refresh for Orchestrator {
    async fn refresh(&self, view: View) -> Result<(), RequestError> {
        match view {
            View::Dashboard => self.load_statistics(Trigger::Poll).await.map(|_| ()),
            View::Cases => self.load_cases(self.cases_filter(), Trigger::Poll).await.map(|_| ()),
            View::Search | View::Settings => Ok(()),
        }
    }
}
