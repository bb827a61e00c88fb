pub mod models;
pub mod crypto;
pub mod validation;

pub use models::{
    Gender, Role, Profile, ProfileChanges, Session,
    USERS_COLLECTION,
};

pub use validation::{
    FieldError, ValidationErrors, RegistrationForm,
    validate_changes, validate_login, validate_reset_request, check_password, is_valid_email, is_valid_mobile, is_adult,
};
