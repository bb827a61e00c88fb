//! Account flows and the wiring between provider, store and dashboard

use std::sync::Arc;

use chrono::NaiveDate;
use thiserror::Error;
use tracing::error;
use userdesk_common::{
    validate_login, validate_reset_request, Profile, RegistrationForm, Role, Session,
    ValidationErrors, USERS_COLLECTION,
};

use crate::auth::{AuthError, IdentityProvider};
use crate::config::DashboardSettings;
use crate::dashboard::DashboardController;
use crate::notify::{Navigator, Notifier, Route};
use crate::store::{RecordStore, StoreError};

#[derive(Debug, Error)]
pub enum RegisterError {
    #[error("{0}")]
    Invalid(#[from] ValidationErrors),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failure of a single-form flow: the form was rejected locally, or the provider refused it.
#[derive(Debug, Error)]
pub enum FlowError {
    #[error("{0}")]
    Invalid(#[from] ValidationErrors),
    #[error(transparent)]
    Auth(#[from] AuthError),
}

pub struct App {
    identity: Arc<dyn IdentityProvider>,
    store: Arc<dyn RecordStore>,
    notifier: Notifier,
    navigator: Navigator,
    dashboard: Arc<DashboardController>,
}

impl App {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        store: Arc<dyn RecordStore>,
        notifier: Notifier,
        settings: DashboardSettings,
    ) -> Self {
        let navigator = Navigator::new(Route::Login);
        let dashboard = DashboardController::new(
            identity.clone(),
            store.clone(),
            notifier.clone(),
            navigator.clone(),
            settings,
        );

        Self { identity, store, notifier, navigator, dashboard }
    }

    pub fn dashboard(&self) -> &Arc<DashboardController> {
        &self.dashboard
    }

    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    /// Malformed input is rejected before the provider is called.
    pub async fn login(&self, email: &str, password: &str) -> Result<Session, FlowError> {
        validate_login(email, password)?;

        match self.identity.sign_in_with_credentials(email.trim(), password).await {
            Ok(session) => {
                self.notifier.success("Login successful!");
                self.navigator.navigate(Route::Dashboard);
                Ok(session)
            }
            Err(e) => {
                self.notifier.error("Invalid email or password!");
                Err(e.into())
            }
        }
    }

    /// Continue a session from a token issued by an earlier `login`.
    pub async fn resume(&self, token: &str) -> Result<Session, AuthError> {
        match self.identity.resume_session(token.trim()).await {
            Ok(session) => {
                self.navigator.navigate(Route::Dashboard);
                Ok(session)
            }
            Err(e) => {
                self.notifier.error("Session expired. Please log in again.");
                self.navigator.navigate(Route::Login);
                Err(e)
            }
        }
    }

    /// Register a regular user. The new account is not signed in.
    pub async fn register(&self, form: &RegistrationForm, today: NaiveDate) -> Result<String, RegisterError> {
        form.validate(today)?;

        let uid = self.create_profile(form, Role::User).await?;

        self.notifier.success("Registration successful! You can now log in.");
        self.navigator.navigate(Route::Login);
        Ok(uid)
    }

    /// Create an administrator. Registration never grants the admin role.
    pub async fn seed_admin(&self, form: &RegistrationForm, today: NaiveDate) -> Result<String, RegisterError> {
        form.validate(today)?;

        let uid = self.create_profile(form, Role::Admin).await?;
        self.notifier.success(format!("Administrator {} created.", form.username));
        Ok(uid)
    }

    async fn create_profile(&self, form: &RegistrationForm, role: Role) -> Result<String, RegisterError> {
        let (Some(gender), Some(dob)) = (form.gender, form.dob) else {
            return Err(RegisterError::Invalid(ValidationErrors::default()));
        };

        let uid = match self.identity.create_account(&form.email, &form.password).await {
            Ok(uid) => uid,
            Err(e) => {
                self.notifier.error(format!("Error: {}", e));
                return Err(e.into());
            }
        };

        let profile = Profile {
            id: uid.clone(),
            username: form.username.clone(),
            email: form.email.trim().to_string(),
            mobile: form.mobile.clone(),
            gender,
            dob,
            address: form.address.clone(),
            role,
        };

        if let Err(e) = self.store.create(USERS_COLLECTION, &uid, &profile).await {
            error!("Profile creation for {} failed: {}", uid, e);
            self.notifier.error("An unexpected error occurred. Please try again later.");
            return Err(e.into());
        }

        Ok(uid)
    }

    pub async fn request_password_reset(&self, email: &str) -> Result<(), FlowError> {
        validate_reset_request(email)?;

        match self.identity.send_password_reset(email.trim()).await {
            Ok(()) => {
                self.notifier.success("Password reset email sent!");
                self.navigator.navigate(Route::Login);
                Ok(())
            }
            Err(e) => {
                self.notifier.error("Error sending reset email!");
                Err(e.into())
            }
        }
    }

    pub async fn confirm_password_reset(&self, code: &str, new_password: &str) -> Result<(), AuthError> {
        match self.identity.confirm_password_reset(code, new_password).await {
            Ok(()) => {
                self.notifier.success("Password has been reset. You can now log in.");
                self.navigator.navigate(Route::Login);
                Ok(())
            }
            Err(e) => {
                self.notifier.error(format!("Error resetting password: {}", e));
                Err(e)
            }
        }
    }

    pub async fn logout(&self) -> Result<(), AuthError> {
        match self.identity.sign_out().await {
            Ok(()) => {
                self.notifier.success("Logged out successfully!");
                self.navigator.navigate(Route::Login);
                Ok(())
            }
            Err(e) => {
                self.notifier.error("Logout failed!");
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::mpsc::UnboundedReceiver;
    use userdesk_common::Gender;

    use crate::dashboard::ViewerStatus;
    use crate::notify::{Level, Notification};
    use crate::testing::{provider_with, FlakyStore, RecordingMailer};

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    fn form(username: &str, email: &str) -> RegistrationForm {
        RegistrationForm {
            username: username.to_string(),
            email: email.to_string(),
            password: "Secret1!".to_string(),
            confirm_password: "Secret1!".to_string(),
            mobile: "9876543210".to_string(),
            gender: Some(Gender::Male),
            dob: NaiveDate::from_ymd_opt(1990, 1, 1),
            address: "1 Main Street".to_string(),
        }
    }

    struct Fixture {
        app: App,
        store: Arc<FlakyStore>,
        mailer: Arc<RecordingMailer>,
        notes: UnboundedReceiver<Notification>,
    }

    impl Fixture {
        fn last_note(&mut self) -> Option<(Level, String)> {
            let mut last = None;
            while let Ok(n) = self.notes.try_recv() {
                last = Some((n.level, n.message));
            }
            last
        }
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(FlakyStore::seeded(Vec::new()).await);
        let mailer = Arc::new(RecordingMailer::default());
        let identity = Arc::new(provider_with(mailer.clone()));
        let (notifier, notes) = Notifier::channel();
        let app = App::new(identity, store.clone(), notifier, DashboardSettings::default());
        Fixture { app, store, mailer, notes }
    }

    #[tokio::test]
    async fn test_register_forces_user_role() {
        let mut f = fixture().await;
        f.app.navigator().navigate(Route::Register);

        let uid = f.app.register(&form("ivy", "ivy@example.com"), today()).await.unwrap();

        let stored = f.store.document(&uid).await.unwrap();
        assert_eq!(stored.role, Role::User);
        assert_eq!(stored.username, "ivy");
        assert_eq!(f.app.navigator().current(), Route::Login);
        assert_eq!(
            f.last_note(),
            Some((Level::Success, "Registration successful! You can now log in.".to_string()))
        );
    }

    #[tokio::test]
    async fn test_invalid_registration_creates_nothing() {
        let f = fixture().await;
        let mut bad = form("ivy", "ivy@example.com");
        bad.dob = NaiveDate::from_ymd_opt(2015, 1, 1);

        assert!(matches!(
            f.app.register(&bad, today()).await,
            Err(RegisterError::Invalid(_))
        ));
        assert!(f.app.login("ivy@example.com", "Secret1!").await.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_email_reports_identity_error() {
        let mut f = fixture().await;
        f.app.register(&form("jon", "jon@example.com"), today()).await.unwrap();

        assert!(f.app.register(&form("jon2", "jon@example.com"), today()).await.is_err());
        assert_eq!(
            f.last_note(),
            Some((Level::Error, "Error: Email already in use".to_string()))
        );
    }

    #[tokio::test]
    async fn test_profile_write_failure_is_unexpected_error() {
        let mut f = fixture().await;
        f.store.fail_writes(true);

        assert!(matches!(
            f.app.register(&form("kim", "kim@example.com"), today()).await,
            Err(RegisterError::Store(_))
        ));
        assert_eq!(
            f.last_note(),
            Some((Level::Error, "An unexpected error occurred. Please try again later.".to_string()))
        );
    }

    #[tokio::test]
    async fn test_login_and_logout_navigation() {
        let mut f = fixture().await;
        f.app.register(&form("lea", "lea@example.com"), today()).await.unwrap();

        assert!(f.app.login("lea@example.com", "Wrong1!!").await.is_err());
        assert_eq!(f.last_note(), Some((Level::Error, "Invalid email or password!".to_string())));
        assert_eq!(f.app.navigator().current(), Route::Login);

        f.app.login("lea@example.com", "Secret1!").await.unwrap();
        assert_eq!(f.last_note(), Some((Level::Success, "Login successful!".to_string())));
        assert_eq!(f.app.navigator().current(), Route::Dashboard);

        f.app.logout().await.unwrap();
        assert_eq!(f.last_note(), Some((Level::Success, "Logged out successfully!".to_string())));
        assert_eq!(f.app.navigator().current(), Route::Login);
    }

    #[tokio::test]
    async fn test_malformed_login_never_reaches_provider() {
        let mut f = fixture().await;
        f.app.register(&form("lou", "lou@example.com"), today()).await.unwrap();
        f.last_note();

        let err = f.app.login("lou-at-example.com", "Secret1!").await.unwrap_err();
        match err {
            FlowError::Invalid(errors) => assert!(errors.has("email")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(f.last_note().is_none());
        assert_eq!(f.app.navigator().current(), Route::Login);

        assert!(matches!(
            f.app.request_password_reset("not an email").await,
            Err(FlowError::Invalid(_))
        ));
        assert!(f.mailer.sent.lock().is_empty());
        assert!(f.last_note().is_none());
    }

    #[tokio::test]
    async fn test_resume_then_logout_revokes_token() {
        let mut f = fixture().await;
        f.app.register(&form("mia", "mia@example.com"), today()).await.unwrap();
        let session = f.app.login("mia@example.com", "Secret1!").await.unwrap();

        let resumed = f.app.resume(&session.token).await.unwrap();
        assert_eq!(resumed.id, session.id);

        f.app.logout().await.unwrap();
        assert!(f.app.resume(&session.token).await.is_err());
        assert_eq!(
            f.last_note(),
            Some((Level::Error, "Session expired. Please log in again.".to_string()))
        );
        assert_eq!(f.app.navigator().current(), Route::Login);
    }

    #[tokio::test]
    async fn test_password_reset_round() {
        let mut f = fixture().await;
        f.app.register(&form("max", "max@example.com"), today()).await.unwrap();

        assert!(f.app.request_password_reset("nobody@example.com").await.is_err());
        assert_eq!(f.last_note(), Some((Level::Error, "Error sending reset email!".to_string())));

        f.app.request_password_reset("max@example.com").await.unwrap();
        assert_eq!(f.last_note(), Some((Level::Success, "Password reset email sent!".to_string())));

        let code = f.mailer.sent.lock()[0].1.clone();
        f.app.confirm_password_reset(&code, "Fresh7&pass").await.unwrap();
        f.app.login("max@example.com", "Fresh7&pass").await.unwrap();
    }

    #[tokio::test]
    async fn test_admin_sees_registered_users() {
        let f = fixture().await;
        let admin_id = f.app.seed_admin(&form("root", "root@example.com"), today()).await.unwrap();
        let user_id = f.app.register(&form("ned", "ned@example.com"), today()).await.unwrap();

        let _listener = f.app.dashboard().attach();
        f.app.login("root@example.com", "Secret1!").await.unwrap();

        let mut feed = f.app.dashboard().status_feed();
        tokio::time::timeout(Duration::from_secs(5), feed.wait_for(|s| *s == ViewerStatus::Resolved))
            .await
            .unwrap()
            .unwrap();

        let view = f.app.dashboard().view();
        assert_eq!(view.viewer.as_ref().unwrap().id, admin_id);
        assert_eq!(
            view.rows.iter().map(|r| r.profile.id.clone()).collect::<Vec<_>>(),
            vec![user_id]
        );
    }
}
