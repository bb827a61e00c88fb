//! Which roster rows a viewer sees, and what they may do with them

use serde::Serialize;
use userdesk_common::Profile;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Affordances {
    pub can_edit: bool,
    pub can_delete: bool,
}

impl Affordances {
    const NONE: Affordances = Affordances { can_edit: false, can_delete: false };
    const EDIT: Affordances = Affordances { can_edit: true, can_delete: false };
    const FULL: Affordances = Affordances { can_edit: true, can_delete: true };
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VisibleRow {
    pub profile: Profile,
    #[serde(flatten)]
    pub affordances: Affordances,
}

/// Filter `roster` for `viewer`, preserving roster order.
///
/// - admin: everyone except the admin's own entry, all editable and deletable;
/// - user: only the viewer's own profile, editable but never deletable;
/// - unresolved: the roster unchanged, without any affordance.
pub fn visible_rows(viewer: Option<&Profile>, roster: &[Profile]) -> Vec<VisibleRow> {
    match viewer {
        Some(admin) if admin.is_admin() => roster
            .iter()
            .filter(|row| row.id != admin.id)
            .map(|row| VisibleRow { profile: row.clone(), affordances: Affordances::FULL })
            .collect(),
        Some(user) => vec![VisibleRow { profile: user.clone(), affordances: Affordances::EDIT }],
        None => roster
            .iter()
            .map(|row| VisibleRow { profile: row.clone(), affordances: Affordances::NONE })
            .collect(),
    }
}

/// Affordances `viewer` has on the row with `row_id`, consistent with [`visible_rows`].
pub fn affordances_for(viewer: Option<&Profile>, row_id: &str) -> Affordances {
    match viewer {
        Some(admin) if admin.is_admin() && admin.id != row_id => Affordances::FULL,
        Some(user) if !user.is_admin() && user.id == row_id => Affordances::EDIT,
        _ => Affordances::NONE,
    }
}
