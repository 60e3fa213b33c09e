use models::{ProjectId, UserId};
use serde::Serialize;

/// Role a user holds in a project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectRole {
    Owner,
    Admin,
    Member,
    Viewer,
}

impl ProjectRole {
    fn from_name(name: &str) -> Option<Self> {
        match name {
            "owner" => Some(Self::Owner),
            "admin" => Some(Self::Admin),
            "member" => Some(Self::Member),
            "viewer" => Some(Self::Viewer),
            _ => None,
        }
    }

    /// Owners and admins may manage notification channels.
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Owner | Self::Admin)
    }
}

/// Fetches the role of `user_id` within the project, or None if the user
/// has no access to it. Ownership takes precedence over membership.
pub async fn fetch_role(
    project_id: ProjectId,
    user_id: UserId,
    db: impl sqlx::PgExecutor<'_>,
) -> sqlx::Result<Option<ProjectRole>> {
    let role = sqlx::query_scalar::<_, Option<String>>(
        r#"
        select coalesce(
            (select 'owner' from projects where id = $1 and owner_id = $2),
            (select role from project_members where project_id = $1 and user_id = $2)
        )
        "#,
    )
    .bind(project_id)
    .bind(user_id)
    .fetch_one(db)
    .await?;

    Ok(role.as_deref().and_then(ProjectRole::from_name))
}

#[cfg(test)]
mod test {
    use super::ProjectRole;

    #[test]
    fn test_role_names() {
        assert_eq!(ProjectRole::from_name("owner"), Some(ProjectRole::Owner));
        assert_eq!(ProjectRole::from_name("superuser"), None);
        assert!(ProjectRole::Admin.is_admin());
        assert!(!ProjectRole::Member.is_admin());
        assert!(!ProjectRole::Viewer.is_admin());
    }
}
