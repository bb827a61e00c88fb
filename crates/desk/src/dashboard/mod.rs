//! Role-aware user dashboard

mod controller;
mod render;
mod visibility;

pub use controller::*;
pub use render::{render, RowOrder};
pub use visibility::{affordances_for, visible_rows, Affordances, VisibleRow};

use thiserror::Error;
use userdesk_common::ValidationErrors;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum DashboardError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("Row {0} does not offer this action to the current viewer")]
    NotPermitted(String),
    #[error("{0}")]
    Invalid(#[from] ValidationErrors),
}
