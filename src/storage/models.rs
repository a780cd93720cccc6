use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Current version of the [`Principal`] snapshot schema
pub const PRINCIPAL_SCHEMA_VERSION: u16 = 1;

/// Closed set of roles a principal can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    User,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Admin => f.write_str("admin"),
            Role::User => f.write_str("user"),
        }
    }
}

/// Reference to an asset held by the object store (avatar, thumbnail)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetRef {
    pub public_id: String,
    pub url: String,
}

/// A user account (authoritative record)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub avatar: Option<AssetRef>,
    /// Ids of purchased courses
    pub courses: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub email: String,
    pub id: String,
    pub is_verified: bool,
    pub name: String,
    /// Argon2 PHC string; absent for social-auth accounts
    pub password_hash: Option<String>,
    pub role: Role,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn principal(&self) -> Principal {
        Principal {
            v: PRINCIPAL_SCHEMA_VERSION,
            avatar: self.avatar.clone(),
            courses: self.courses.clone(),
            email: self.email.clone(),
            id: self.id.clone(),
            is_verified: self.is_verified,
            name: self.name.clone(),
            role: self.role,
        }
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            avatar: self.avatar.clone(),
            courses: self.courses.clone(),
            created_at: self.created_at,
            email: self.email.clone(),
            id: self.id.clone(),
            is_verified: self.is_verified,
            name: self.name.clone(),
            role: self.role,
        }
    }
}

/// The authenticated identity carried through a request.
///
/// Stored in the session record as a snapshot of the [`User`] at the time the
/// session was last written; it may lag the authoritative record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    #[serde(default = "principal_schema_version")]
    pub v: u16,
    pub avatar: Option<AssetRef>,
    pub courses: Vec<String>,
    pub email: String,
    pub id: String,
    pub is_verified: bool,
    pub name: String,
    pub role: Role,
}

fn principal_schema_version() -> u16 {
    PRINCIPAL_SCHEMA_VERSION
}

impl Principal {
    pub fn is_entitled_to(&self, course_id: &str) -> bool {
        self.role == Role::Admin || self.courses.iter().any(|c| c == course_id)
    }

    pub fn reviewer_ref(&self) -> ReviewerRef {
        ReviewerRef {
            avatar_url: self.avatar.as_ref().map(|a| a.url.clone()),
            name: self.name.clone(),
            user_id: self.id.clone(),
        }
    }
}

/// Cacheable public view of a [`User`] (no credentials)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub avatar: Option<AssetRef>,
    pub courses: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub email: String,
    pub id: String,
    pub is_verified: bool,
    pub name: String,
    pub role: Role,
}

/// Display-only projection of a user, computed when a review or reply is written
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewerRef {
    pub avatar_url: Option<String>,
    pub name: String,
    pub user_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewReply {
    pub comment: String,
    pub created_at: DateTime<Utc>,
    pub reviewer: ReviewerRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Review {
    pub comment: String,
    pub created_at: DateTime<Utc>,
    pub id: String,
    pub rating: u8,
    pub replies: Vec<ReviewReply>,
    pub reviewer: ReviewerRef,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub author: ReviewerRef,
    pub created_at: DateTime<Utc>,
}

/// A learner question on a lesson, visible to everyone entitled to the course
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    pub answers: Vec<Answer>,
    pub asker: ReviewerRef,
    pub created_at: DateTime<Utc>,
    pub id: String,
    pub question: String,
}

/// A lesson of a course (paid content)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lesson {
    pub description: String,
    /// Assigned on course write when empty
    #[serde(default)]
    pub id: String,
    /// Written only through the question endpoints
    #[serde(default)]
    pub questions: Vec<Question>,
    pub section: String,
    pub title: String,
    pub video_length_minutes: u32,
    pub video_url: String,
}

/// A catalog item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Course {
    pub benefits: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub demo_url: Option<String>,
    pub description: String,
    pub estimated_price: Option<f64>,
    pub id: String,
    pub lessons: Vec<Lesson>,
    pub level: String,
    pub name: String,
    pub prerequisites: Vec<String>,
    pub price: f64,
    pub purchased: u64,
    pub ratings: f64,
    pub reviews: Vec<Review>,
    pub tags: Vec<String>,
    pub thumbnail: Option<AssetRef>,
    pub updated_at: DateTime<Utc>,
}

impl Course {
    /// Public view without paid lesson content
    pub fn summary(&self) -> CourseSummary {
        CourseSummary {
            description: self.description.clone(),
            estimated_price: self.estimated_price,
            id: self.id.clone(),
            lesson_count: self.lessons.len(),
            level: self.level.clone(),
            name: self.name.clone(),
            price: self.price,
            purchased: self.purchased,
            ratings: self.ratings,
            reviews: self.reviews.clone(),
            tags: self.tags.clone(),
            thumbnail: self.thumbnail.clone(),
        }
    }

    /// Recompute the average rating from the embedded reviews
    pub fn recompute_ratings(&mut self) {
        if self.reviews.is_empty() {
            self.ratings = 0.0;
            return;
        }
        let total: u32 = self.reviews.iter().map(|r| u32::from(r.rating)).sum();
        self.ratings = f64::from(total) / self.reviews.len() as f64;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CourseSummary {
    pub description: String,
    pub estimated_price: Option<f64>,
    pub id: String,
    pub lesson_count: usize,
    pub level: String,
    pub name: String,
    pub price: f64,
    pub purchased: u64,
    pub ratings: f64,
    pub reviews: Vec<Review>,
    pub tags: Vec<String>,
    pub thumbnail: Option<AssetRef>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{make_course, make_user};

    #[test]
    fn test_principal_snapshot_carries_no_credentials() {
        let user = make_user("u1", "ada@example.com", Role::User);
        let json = serde_json::to_value(user.principal()).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["role"], "user");
        assert_eq!(json["v"], PRINCIPAL_SCHEMA_VERSION);
    }

    #[test]
    fn test_principal_without_version_defaults_to_current() {
        let json = serde_json::json!({
            "avatar": null,
            "courses": [],
            "email": "ada@example.com",
            "id": "u1",
            "is_verified": true,
            "name": "Ada",
            "role": "admin"
        });
        let principal: Principal = serde_json::from_value(json).unwrap();
        assert_eq!(principal.v, PRINCIPAL_SCHEMA_VERSION);
        assert_eq!(principal.role, Role::Admin);
    }

    #[test]
    fn test_entitlement() {
        let mut user = make_user("u1", "ada@example.com", Role::User);
        user.courses.push("c1".to_string());
        let principal = user.principal();
        assert!(principal.is_entitled_to("c1"));
        assert!(!principal.is_entitled_to("c2"));

        let admin = make_user("a1", "root@example.com", Role::Admin).principal();
        assert!(admin.is_entitled_to("c2"));
    }

    #[test]
    fn test_recompute_ratings() {
        let mut course = make_course("c1", "Rust");
        course.recompute_ratings();
        assert_eq!(course.ratings, 0.0);

        let reviewer = make_user("u1", "ada@example.com", Role::User)
            .principal()
            .reviewer_ref();
        for rating in [4, 5] {
            course.reviews.push(Review {
                comment: "good".to_string(),
                created_at: Utc::now(),
                id: format!("r{rating}"),
                rating,
                replies: vec![],
                reviewer: reviewer.clone(),
            });
        }
        course.recompute_ratings();
        assert_eq!(course.ratings, 4.5);
        assert_eq!(course.summary().lesson_count, 0);
    }
}
