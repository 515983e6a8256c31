use curator_core::models::{ChildBatchParameters, EntityKind, User};
use curator_core::AppError;

/// Binary allow/deny decision for creating entities of a bundle.
pub trait AccessPolicy: Send + Sync {
    fn can_create(&self, user: &User, kind: EntityKind, bundle: &str) -> bool;
}

/// Allows everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

impl AccessPolicy for AllowAll {
    fn can_create(&self, _user: &User, _kind: EntityKind, _bundle: &str) -> bool {
        true
    }
}

/// The user must be able to create both the child node type and the media type.
pub fn check_add_children(
    policy: &dyn AccessPolicy,
    user: &User,
    params: &ChildBatchParameters,
) -> Result<(), AppError> {
    let can_create_node = policy.can_create(user, EntityKind::Node, &params.child_type);
    let can_create_media = policy.can_create(user, EntityKind::Media, &params.media_type);

    if can_create_node && can_create_media {
        Ok(())
    } else {
        tracing::debug!(user_id = user.id, "Add children denied");
        Err(AppError::AccessDenied(format!(
            "User {} may not add {} children with {} media",
            user.id, params.child_type, params.media_type
        )))
    }
}
