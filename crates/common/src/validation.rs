//! Form rules for registration and profile edits

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{Gender, ProfileChanges};

pub const MIN_AGE_YEARS: u32 = 18;
pub const PASSWORD_SPECIALS: &str = "@$!%*?&";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Error)]
#[error("{}", join_messages(.errors))]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

fn join_messages(errors: &[FieldError]) -> String {
    errors.iter().map(|e| e.message.as_str()).collect::<Vec<_>>().join("; ")
}

impl ValidationErrors {
    fn push(&mut self, field: &'static str, message: &str) {
        self.errors.push(FieldError { field, message: message.to_string() });
    }

    pub fn has(&self, field: &str) -> bool {
        self.errors.iter().any(|e| e.field == field)
    }

    fn into_result(self) -> Result<(), ValidationErrors> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistrationForm {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub mobile: String,
    pub gender: Option<Gender>,
    pub dob: Option<NaiveDate>,
    pub address: String,
}

impl RegistrationForm {
    /// Check every rule against `today`, collecting all failures.
    pub fn validate(&self, today: NaiveDate) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::default();

        if self.username.is_empty() {
            errors.push("username", "Please enter your username!");
        } else {
            let len = self.username.chars().count();
            if !(3..=20).contains(&len) {
                errors.push("username", "Username must be between 3 and 20 characters!");
            }
            if !self.username.chars().all(|c| c.is_ascii_alphanumeric()) {
                errors.push("username", "Username must be alphanumeric!");
            }
        }

        if !is_valid_email(&self.email) {
            errors.push("email", "Please enter a valid email!");
        }

        if let Err(message) = check_password(&self.password) {
            errors.push("password", message);
        }

        if self.confirm_password.is_empty() {
            errors.push("confirm_password", "Please confirm your password!");
        } else if self.confirm_password != self.password {
            errors.push("confirm_password", "Passwords do not match!");
        }

        if self.mobile.is_empty() {
            errors.push("mobile", "Please enter your mobile number!");
        } else if !is_valid_mobile(&self.mobile) {
            errors.push("mobile", "Please enter a valid 10-digit mobile number!");
        }

        if self.gender.is_none() {
            errors.push("gender", "Please select your gender!");
        }

        match self.dob {
            None => errors.push("dob", "Date of Birth is required!"),
            Some(dob) if !is_adult(dob, today) => {
                errors.push("dob", "You must be at least 18 years old!")
            }
            Some(_) => {}
        }

        if self.address.trim().is_empty() {
            errors.push("address", "Please enter your address!");
        }

        errors.into_result()
    }
}

/// Rules of the dashboard edit form: required fields may not be blanked.
pub fn validate_changes(changes: &ProfileChanges) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();

    if changes.username.as_deref().is_some_and(|v| v.trim().is_empty()) {
        errors.push("username", "Please enter username");
    }
    if changes.email.as_deref().is_some_and(|v| v.trim().is_empty()) {
        errors.push("email", "Please enter email");
    }
    if changes.mobile.as_deref().is_some_and(|v| v.trim().is_empty()) {
        errors.push("mobile", "Please enter mobile number");
    }

    errors.into_result()
}

/// Rules of the login form. Checked before any credentials leave the client.
pub fn validate_login(email: &str, password: &str) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();

    if !is_valid_email(email.trim()) {
        errors.push("email", "Please enter a valid email!");
    }
    if password.is_empty() {
        errors.push("password", "Please enter your password!");
    }

    errors.into_result()
}

pub fn validate_reset_request(email: &str) -> Result<(), ValidationErrors> {
    let mut errors = ValidationErrors::default();
    if !is_valid_email(email.trim()) {
        errors.push("email", "Please enter your email!");
    }
    errors.into_result()
}

pub fn check_password(password: &str) -> Result<(), &'static str> {
    if password.chars().count() < 6 {
        return Err("Password must be at least 6 characters!");
    }

    let allowed = |c: char| c.is_ascii_alphanumeric() || PASSWORD_SPECIALS.contains(c);
    let complete = password.chars().all(allowed)
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_digit())
        && password.chars().any(|c| PASSWORD_SPECIALS.contains(c));

    if complete {
        Ok(())
    } else {
        Err("Password must contain at least one uppercase letter, one number, and one special character!")
    }
}

pub fn is_valid_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.contains('@') {
        return false;
    }
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2 && labels.iter().all(|l| !l.is_empty())
}

pub fn is_valid_mobile(mobile: &str) -> bool {
    mobile.len() == 10 && mobile.chars().all(|c| c.is_ascii_digit())
}

pub fn is_adult(dob: NaiveDate, today: NaiveDate) -> bool {
    today.years_since(dob).is_some_and(|years| years >= MIN_AGE_YEARS)
}
