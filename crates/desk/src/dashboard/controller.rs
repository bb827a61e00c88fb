//! Dashboard state and the handlers that mutate it
//!
//! All state lives in one [`DashboardController`] shared through `Arc`. The
//! lock is never held across an await; every collaborator call happens
//! between two short critical sections.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};
use uuid::Uuid;
use userdesk_common::{validate_changes, Profile, ProfileChanges, Session, USERS_COLLECTION};

use crate::auth::IdentityProvider;
use crate::config::DashboardSettings;
use crate::notify::{Navigator, Notifier, Route};
use crate::store::RecordStore;
use super::visibility::{affordances_for, visible_rows, VisibleRow};
use super::DashboardError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewerStatus {
    /// No session event processed yet.
    Pending,
    SignedOut,
    Fetching,
    Resolved,
    /// Session present but no profile document exists.
    Missing,
    Failed,
}

impl ViewerStatus {
    pub fn is_settled(&self) -> bool {
        !matches!(self, ViewerStatus::Pending | ViewerStatus::Fetching)
    }
}

#[derive(Debug, Default)]
struct DashboardState {
    session_id: Option<Uuid>,
    session_user: Option<String>,
    viewer: Option<Profile>,
    roster: Vec<Profile>,
    loading: bool,
    editing: Option<String>,
}

/// Snapshot handed to renderers.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub status: ViewerStatus,
    pub viewer: Option<Profile>,
    pub loading: bool,
    pub rows: Vec<VisibleRow>,
    pub editing: Option<String>,
}

impl DashboardView {
    pub fn title(&self) -> &'static str {
        match &self.viewer {
            Some(viewer) if viewer.is_admin() => "Admin Dashboard",
            _ => "User Details",
        }
    }
}

pub struct DashboardController {
    identity: Arc<dyn IdentityProvider>,
    store: Arc<dyn RecordStore>,
    notifier: Notifier,
    navigator: Navigator,
    settings: DashboardSettings,
    state: RwLock<DashboardState>,
    status: watch::Sender<ViewerStatus>,
}

/// Keeps the session subscription alive. Dropping it unsubscribes.
pub struct SessionListener {
    handle: JoinHandle<()>,
}

impl SessionListener {
    pub fn detach(self) {
        self.handle.abort();
    }
}

impl Drop for SessionListener {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

impl DashboardController {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn RecordStore>,
        notifier: Notifier,
        navigator: Navigator,
        settings: DashboardSettings,
    ) -> Arc<Self> {
        let (status, _) = watch::channel(ViewerStatus::Pending);
        Arc::new(Self {
            identity,
            store,
            notifier,
            navigator,
            settings,
            state: RwLock::new(DashboardState { loading: true, ..Default::default() }),
            status,
        })
    }

    /// Subscribe to session changes. The provider's current state is handled first.
    pub fn attach(self: &Arc<Self>) -> SessionListener {
        let mut rx = self.identity.subscribe();
        let controller = Arc::clone(self);

        let handle = tokio::spawn(async move {
            let initial = rx.borrow_and_update().clone();
            controller.on_session_change(initial).await;

            while rx.changed().await.is_ok() {
                let session = rx.borrow_and_update().clone();
                controller.on_session_change(session).await;
            }
            debug!("Session feed closed");
        });

        SessionListener { handle }
    }

    pub async fn on_session_change(&self, session: Option<Session>) {
        let Some(session) = session else {
            {
                let mut state = self.state.write();
                state.session_id = None;
                state.session_user = None;
                state.viewer = None;
                state.roster.clear();
                state.editing = None;
            }
            self.status.send_replace(ViewerStatus::SignedOut);
            self.navigator.navigate(Route::Login);
            return;
        };

        {
            let mut state = self.state.write();
            // The feed keeps only the latest value, so a sign-out followed by a
            // sign-in can arrive as the new session alone.
            if state.session_id != Some(session.id) {
                state.roster.clear();
                state.editing = None;
            }
            state.session_id = Some(session.id);
            state.session_user = Some(session.user_id.clone());
            state.viewer = None;
        }
        self.status.send_replace(ViewerStatus::Fetching);

        let result = self.store.get_by_id(USERS_COLLECTION, &session.user_id).await;

        let status = match result {
            Ok(Some(profile)) => {
                {
                    let mut state = self.state.write();
                    if state.session_user.as_deref() != Some(session.user_id.as_str()) {
                        debug!("Session moved on while resolving {}", session.user_id);
                        return;
                    }
                    info!("Resolved viewer {} ({})", profile.username, profile.role);
                    state.viewer = Some(profile);
                }
                let _ = self.load_roster().await;
                ViewerStatus::Resolved
            }
            Ok(None) => {
                debug!("No profile document for {}", session.user_id);
                ViewerStatus::Missing
            }
            Err(e) => {
                error!("Profile lookup failed: {}", e);
                self.notifier.error("Failed to fetch user details.");
                ViewerStatus::Failed
            }
        };

        self.status.send_replace(status);
    }

    /// Replace the roster with a fresh fetch. On failure the previous roster stays.
    pub async fn load_roster(&self) -> Result<(), DashboardError> {
        self.state.write().loading = true;

        let result = self.store.get_all(USERS_COLLECTION).await;

        let outcome = {
            let mut state = self.state.write();
            state.loading = false;
            match result {
                Ok(roster) => {
                    debug!("Fetched {} profiles", roster.len());
                    if let Some(viewer) = state.viewer.as_ref() {
                        if let Some(fresh) = roster.iter().find(|p| p.id == viewer.id) {
                            state.viewer = Some(fresh.clone());
                        }
                    }
                    state.roster = roster;
                    Ok(())
                }
                Err(e) => Err(e),
            }
        };

        outcome.map_err(|e| {
            error!("Roster fetch failed: {}", e);
            self.notifier.error("Error fetching users.");
            DashboardError::from(e)
        })
    }

    /// Open the edit surface on a row the viewer may edit; returns the form prefill.
    pub fn begin_edit(&self, id: &str) -> Result<Profile, DashboardError> {
        let mut state = self.state.write();
        let row = visible_rows(state.viewer.as_ref(), &state.roster)
            .into_iter()
            .find(|row| row.profile.id == id && row.affordances.can_edit)
            .ok_or_else(|| DashboardError::NotPermitted(id.to_string()))?;

        state.editing = Some(id.to_string());
        Ok(row.profile)
    }

    pub fn cancel_edit(&self) {
        self.state.write().editing = None;
    }

    pub fn editing(&self) -> Option<String> {
        self.state.read().editing.clone()
    }

    /// Submit the open edit surface. Does nothing when no edit is open.
    pub async fn submit_edit(&self, changes: &ProfileChanges) -> Result<(), DashboardError> {
        let Some(target) = self.editing() else {
            return Ok(());
        };
        self.update_profile(&target, changes).await
    }

    /// Push `changes` for `id`, merge them locally, then re-fetch the roster.
    ///
    /// The re-fetch starts only after the update has completed, and its result
    /// replaces the local merge.
    pub async fn update_profile(&self, id: &str, changes: &ProfileChanges) -> Result<(), DashboardError> {
        validate_changes(changes)?;

        if self.settings.enforce_affordances && !self.affordances(id).can_edit {
            self.notifier.error("Update failed!");
            return Err(DashboardError::NotPermitted(id.to_string()));
        }

        if let Err(e) = self.store.update_partial(USERS_COLLECTION, id, changes).await {
            error!("Update of {} failed: {}", id, e);
            self.notifier.error("Update failed!");
            return Err(e.into());
        }

        {
            let mut state = self.state.write();
            if let Some(row) = state.roster.iter_mut().find(|p| p.id == id) {
                changes.apply_to(row);
            }
            if let Some(viewer) = state.viewer.as_mut().filter(|v| v.id == id) {
                changes.apply_to(viewer);
            }
            state.editing = None;
        }
        self.notifier.success("User updated successfully!");

        let _ = self.load_roster().await;
        Ok(())
    }

    pub async fn delete_profile(&self, id: &str) -> Result<(), DashboardError> {
        if self.settings.enforce_affordances && !self.affordances(id).can_delete {
            self.notifier.error("Failed to delete user.");
            return Err(DashboardError::NotPermitted(id.to_string()));
        }

        if let Err(e) = self.store.delete(USERS_COLLECTION, id).await {
            error!("Delete of {} failed: {}", id, e);
            self.notifier.error("Failed to delete user.");
            return Err(e.into());
        }

        self.notifier.success("User deleted successfully!");
        let _ = self.load_roster().await;
        Ok(())
    }

    fn affordances(&self, id: &str) -> super::visibility::Affordances {
        affordances_for(self.state.read().viewer.as_ref(), id)
    }

    pub fn view(&self) -> DashboardView {
        let state = self.state.read();
        DashboardView {
            status: *self.status.borrow(),
            viewer: state.viewer.clone(),
            loading: state.loading,
            rows: visible_rows(state.viewer.as_ref(), &state.roster),
            editing: state.editing.clone(),
        }
    }

    pub fn status_feed(&self) -> watch::Receiver<ViewerStatus> {
        self.status.subscribe()
    }

    /// Wait until the latest session event has been fully handled.
    pub async fn settled(&self) -> ViewerStatus {
        let mut rx = self.status_feed();
        let status = match rx.wait_for(ViewerStatus::is_settled).await {
            Ok(status) => *status,
            Err(_) => *self.status.borrow(),
        };
        status
    }
}
