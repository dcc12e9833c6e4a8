use crate::{
    error::{Error, HtmlError},
    jwt::SessionData,
    schema::{Id, UserRole},
};

const ACTION_TABLE: &[(UserRole, &[ActionType])] = &[
    (
        UserRole::User,
        &[
            ActionType::CreateRecipes,
            ActionType::ManageOwnRecipes,
            ActionType::ManageOwnFavorites,
            ActionType::ManageOwnShoppingCart,
            ActionType::ManageOwnSubscriptions,
        ],
    ),
    (
        UserRole::Admin,
        &[
            ActionType::CreateRecipes,
            ActionType::ManageOwnRecipes,
            ActionType::ManageOwnFavorites,
            ActionType::ManageOwnShoppingCart,
            ActionType::ManageOwnSubscriptions,
            ActionType::ManageAllRecipes,
            ActionType::ManageUsers,
        ],
    ),
];

#[derive(Debug, Hash, PartialEq, Eq, PartialOrd, Ord, Clone, Copy)]
pub enum ActionType {
    CreateRecipes,

    ManageOwnRecipes,
    ManageOwnFavorites,
    ManageOwnShoppingCart,
    ManageOwnSubscriptions,

    ManageAllRecipes,
    ManageUsers,
}

impl ActionType {
    pub fn authenticate(self, session: &SessionData) -> bool {
        // superusers get the admin row whatever their stored role is
        let role = if session.is_admin() {
            &UserRole::Admin
        } else {
            &session.role
        };

        ACTION_TABLE
            .iter()
            .find(|(uid, _)| uid == role)
            .map(|(_, actions)| actions.contains(&self))
            .unwrap_or(false)
    }
}

/// Who may touch a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Policy {
    /// Anyone, including anonymous callers.
    ReadOnly,
    /// Any authenticated user.
    Authenticated,
    /// The owner of the resource, or an admin.
    OwnerOrAdmin(Id),
    AdminOnly,
}

impl Policy {
    /// No session is `Unauthorized`; a session that fails the policy is
    /// `Forbidden`.
    pub fn check(self, session: Option<&SessionData>) -> Result<(), Error> {
        let session = match (self, session) {
            (Policy::ReadOnly, _) => return Ok(()),
            (_, None) => return Err(HtmlError::Unauthorized.default()),
            (_, Some(session)) => session,
        };

        let allowed = match self {
            Policy::ReadOnly | Policy::Authenticated => true,
            Policy::OwnerOrAdmin(owner_id) => {
                session.user_id == owner_id
                    || ActionType::ManageAllRecipes.authenticate(session)
            }
            Policy::AdminOnly => ActionType::ManageUsers.authenticate(session),
        };

        if allowed {
            Ok(())
        } else {
            Err(HtmlError::Forbidden.default())
        }
    }
}
