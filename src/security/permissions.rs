// Privilege rules between an acting admin and a target user

use crate::core::error::CoreError;
use crate::models::user::UserType;

/// Level 0 is a regular user; anything above may use admin functions
pub fn is_staff_level(level: i32) -> bool {
    level > 0
}

pub fn require_staff(level: i32) -> Result<(), CoreError> {
    if is_staff_level(level) {
        Ok(())
    } else {
        Err(CoreError::PermissionDenied("admin functions".to_string()))
    }
}

/// An admin may hand out types up to their own level, and only to users
/// who do not outrank them.
pub fn check_type_change(admin_level: i32, target_level: i32, new_type_level: i32) -> Result<(), CoreError> {
    if admin_level < new_type_level {
        return Err(CoreError::PermissionDenied("set that type".to_string()));
    }
    if target_level > admin_level {
        return Err(CoreError::PermissionDenied("modify that user".to_string()));
    }
    Ok(())
}

/// Types the admin could assign to the target, or None if the target is
/// not strictly below the admin
pub fn assignable_types(types: Vec<UserType>, admin_level: i32, target_level: i32) -> Option<Vec<UserType>> {
    if target_level >= admin_level {
        return None;
    }
    Some(types.into_iter().filter(|t| t.level <= admin_level).collect())
}
