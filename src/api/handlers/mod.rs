mod admin;
mod courses;
mod sessions;
mod users;

use serde::{Deserialize, Serialize};

use crate::api::response::{ApiError, Pagination};

/// Shared pagination query parameters for list endpoints
#[derive(Debug, Deserialize)]
pub struct PaginationParams {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

impl PaginationParams {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.limit == 0 {
            return Err(ApiError::bad_request("limit must be greater than 0"));
        }
        if self.limit > MAX_LIMIT {
            return Err(ApiError::bad_request(format!(
                "limit must not exceed {MAX_LIMIT}"
            )));
        }
        Ok(())
    }

    /// Slice one page out of a full (cached) listing
    pub fn page<T>(&self, items: Vec<T>) -> (Vec<T>, Pagination) {
        let total = items.len() as u64;
        let page = items
            .into_iter()
            .skip(self.offset as usize)
            .take(self.limit as usize)
            .collect();
        (
            page,
            Pagination {
                limit: self.limit,
                offset: self.offset,
                total,
            },
        )
    }
}

const MAX_LIMIT: u32 = 100;

fn default_limit() -> u32 {
    20
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub use admin::{delete_user, health, list_admin_courses, list_admin_users, update_user_role};
pub use courses::{
    add_answer, add_question, add_review, create_course, delete_course, edit_course, get_course,
    get_course_content, list_courses, reply_to_review,
};
pub use sessions::{activate_user, login, logout, refresh, register, social_auth};
pub use users::{get_me, update_avatar, update_me, update_password};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page() {
        let params = PaginationParams {
            limit: 2,
            offset: 1,
        };
        let (items, pagination) = params.page(vec![1, 2, 3, 4]);
        assert_eq!(items, vec![2, 3]);
        assert_eq!(pagination.total, 4);

        let params = PaginationParams {
            limit: 2,
            offset: 10,
        };
        assert!(params.page(vec![1, 2, 3]).0.is_empty());
    }

    #[test]
    fn test_validate_limit() {
        assert!(PaginationParams { limit: 0, offset: 0 }.validate().is_err());
        assert!(PaginationParams { limit: 101, offset: 0 }.validate().is_err());
        assert!(PaginationParams { limit: 20, offset: 0 }.validate().is_ok());
    }
}
