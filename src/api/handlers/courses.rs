use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::{MessageResponse, PaginationParams};
use crate::api::response::{ApiError, AppJson, AppQuery, JSend, JSendPaginated};
use crate::auth::CurrentPrincipal;
use crate::cache::{CollectionKey, EntityKind};
use crate::mail::question_reply_mail;
use crate::storage::models::{
    Answer, AssetRef, Course, CourseSummary, Lesson, Question, Review, ReviewReply,
};
use crate::storage::{DatabaseError, StoreError};
use crate::tokens::generate_id;
use crate::AppState;

// ============================================================================
// Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CourseRequest {
    #[serde(default)]
    pub benefits: Vec<String>,
    #[serde(default)]
    pub demo_url: Option<String>,
    pub description: String,
    #[serde(default)]
    pub estimated_price: Option<f64>,
    #[serde(default)]
    pub lessons: Vec<Lesson>,
    pub level: String,
    pub name: String,
    #[serde(default)]
    pub prerequisites: Vec<String>,
    pub price: f64,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub thumbnail: Option<AssetRef>,
}

impl CourseRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if self.name.trim().is_empty() {
            return Err(ApiError::bad_request("Course name cannot be empty"));
        }
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(ApiError::bad_request("Price must be a non-negative number"));
        }
        if let Some(estimated) = self.estimated_price {
            if !estimated.is_finite() || estimated < 0.0 {
                return Err(ApiError::bad_request(
                    "Estimated price must be a non-negative number",
                ));
            }
        }
        Ok(())
    }

    /// Overwrite the editable fields; reviews, ratings and purchases are kept.
    /// Lesson questions follow the lesson id and are never taken from the request.
    fn apply(self, course: &mut Course) {
        let mut questions: HashMap<String, Vec<Question>> = course
            .lessons
            .drain(..)
            .map(|lesson| (lesson.id, lesson.questions))
            .collect();
        let lessons = self
            .lessons
            .into_iter()
            .map(|mut lesson| {
                if lesson.id.is_empty() {
                    lesson.id = generate_id();
                }
                lesson.questions = questions.remove(&lesson.id).unwrap_or_default();
                lesson
            })
            .collect();

        course.benefits = self.benefits;
        course.demo_url = self.demo_url;
        course.description = self.description;
        course.estimated_price = self.estimated_price;
        course.lessons = lessons;
        course.level = self.level;
        course.name = self.name.trim().to_string();
        course.prerequisites = self.prerequisites;
        course.price = self.price;
        course.tags = self.tags;
        course.thumbnail = self.thumbnail;
        course.updated_at = Utc::now();
    }
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub comment: String,
    pub rating: u8,
}

#[derive(Debug, Deserialize)]
pub struct ReplyRequest {
    pub comment: String,
}

#[derive(Debug, Deserialize)]
pub struct QuestionRequest {
    pub question: String,
}

#[derive(Debug, Deserialize)]
pub struct AnswerRequest {
    pub answer: String,
}

// ============================================================================
// Public catalog
// ============================================================================

pub async fn list_courses(
    State(state): State<Arc<AppState>>,
    AppQuery(params): AppQuery<PaginationParams>,
) -> Result<Json<JSendPaginated<CourseSummary>>, ApiError> {
    params.validate()?;

    let store = state.store.clone();
    let courses = state
        .reader
        .read_many(CollectionKey::CourseCatalog, move || async move {
            let courses = store.list_courses().await?;
            Ok::<_, StoreError>(courses.iter().map(Course::summary).collect())
        })
        .await?;

    let (items, pagination) = params.page(courses);
    Ok(JSendPaginated::success(items, pagination))
}

pub async fn get_course(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JSend<CourseSummary>>, ApiError> {
    let store = state.store.clone();
    let course = state
        .reader
        .read_one(EntityKind::Course, &id, move |id| async move {
            Ok::<_, StoreError>(store.get_course(&id).await?.map(|c| c.summary()))
        })
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Course {id} not found")))?;

    Ok(JSend::success(course))
}

/// Full course including lessons, for owners and admins. Read from the store
/// directly so entitlement changes apply at once.
pub async fn get_course_content(
    State(state): State<Arc<AppState>>,
    CurrentPrincipal(ctx): CurrentPrincipal,
    Path(id): Path<String>,
) -> Result<Json<JSend<Course>>, ApiError> {
    if !ctx.principal.is_entitled_to(&id) {
        return Err(ApiError::forbidden(
            "You are not eligible to access this course",
        ));
    }

    let course = state
        .store
        .get_course(&id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Course {id} not found")))?;

    Ok(JSend::success(course))
}

pub async fn add_review(
    State(state): State<Arc<AppState>>,
    CurrentPrincipal(ctx): CurrentPrincipal,
    Path(id): Path<String>,
    AppJson(req): AppJson<ReviewRequest>,
) -> Result<(StatusCode, Json<JSend<CourseSummary>>), ApiError> {
    if !ctx.principal.is_entitled_to(&id) {
        return Err(ApiError::forbidden(
            "You are not eligible to review this course",
        ));
    }
    if !(1..=5).contains(&req.rating) {
        return Err(ApiError::bad_request("Rating must be between 1 and 5"));
    }
    if req.comment.trim().is_empty() {
        return Err(ApiError::bad_request("Review comment cannot be empty"));
    }

    let review = Review {
        comment: req.comment,
        created_at: Utc::now(),
        id: generate_id(),
        rating: req.rating,
        replies: Vec::new(),
        reviewer: ctx.principal.reviewer_ref(),
    };
    let course = state
        .store
        .update_course(&id, move |course| {
            course.reviews.push(review);
            course.recompute_ratings();
            course.updated_at = Utc::now();
            Ok(())
        })
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Course {id} not found")))?;

    state
        .invalidator
        .entity_written(EntityKind::Course, &course.id)
        .await;
    Ok((StatusCode::CREATED, JSend::success(course.summary())))
}

pub async fn reply_to_review(
    State(state): State<Arc<AppState>>,
    CurrentPrincipal(ctx): CurrentPrincipal,
    Path((id, review_id)): Path<(String, String)>,
    AppJson(req): AppJson<ReplyRequest>,
) -> Result<(StatusCode, Json<JSend<CourseSummary>>), ApiError> {
    if req.comment.trim().is_empty() {
        return Err(ApiError::bad_request("Reply comment cannot be empty"));
    }

    let reply = ReviewReply {
        comment: req.comment,
        created_at: Utc::now(),
        reviewer: ctx.principal.reviewer_ref(),
    };
    let course = state
        .store
        .update_course(&id, move |course| {
            let review = course
                .reviews
                .iter_mut()
                .find(|r| r.id == review_id)
                .ok_or_else(|| DatabaseError::NotFound(format!("review {review_id}")))?;
            review.replies.push(reply);
            course.updated_at = Utc::now();
            Ok(())
        })
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Course {id} not found")))?;

    state
        .invalidator
        .entity_written(EntityKind::Course, &course.id)
        .await;
    Ok((StatusCode::CREATED, JSend::success(course.summary())))
}

// ============================================================================
// Lesson questions
// ============================================================================

fn find_lesson<'a>(
    course: &'a mut Course,
    lesson_id: &str,
) -> Result<&'a mut Lesson, DatabaseError> {
    course
        .lessons
        .iter_mut()
        .find(|l| l.id == lesson_id)
        .ok_or_else(|| DatabaseError::NotFound(format!("lesson {lesson_id}")))
}

pub async fn add_question(
    State(state): State<Arc<AppState>>,
    CurrentPrincipal(ctx): CurrentPrincipal,
    Path((id, lesson_id)): Path<(String, String)>,
    AppJson(req): AppJson<QuestionRequest>,
) -> Result<(StatusCode, Json<JSend<Question>>), ApiError> {
    if !ctx.principal.is_entitled_to(&id) {
        return Err(ApiError::forbidden(
            "You are not eligible to access this course",
        ));
    }
    if req.question.trim().is_empty() {
        return Err(ApiError::bad_request("Question cannot be empty"));
    }

    let question = Question {
        answers: Vec::new(),
        asker: ctx.principal.reviewer_ref(),
        created_at: Utc::now(),
        id: generate_id(),
        question: req.question,
    };
    let stored = question.clone();
    state
        .store
        .update_course(&id, move |course| {
            find_lesson(course, &lesson_id)?.questions.push(stored);
            course.updated_at = Utc::now();
            Ok(())
        })
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Course {id} not found")))?;

    state
        .invalidator
        .entity_written(EntityKind::Course, &id)
        .await;
    Ok((StatusCode::CREATED, JSend::success(question)))
}

/// Answer a lesson question. The asker is mailed unless they answered themselves.
pub async fn add_answer(
    State(state): State<Arc<AppState>>,
    CurrentPrincipal(ctx): CurrentPrincipal,
    Path((id, lesson_id, question_id)): Path<(String, String, String)>,
    AppJson(req): AppJson<AnswerRequest>,
) -> Result<(StatusCode, Json<JSend<Question>>), ApiError> {
    if !ctx.principal.is_entitled_to(&id) {
        return Err(ApiError::forbidden(
            "You are not eligible to access this course",
        ));
    }
    if req.answer.trim().is_empty() {
        return Err(ApiError::bad_request("Answer cannot be empty"));
    }

    let answer = Answer {
        answer: req.answer,
        author: ctx.principal.reviewer_ref(),
        created_at: Utc::now(),
    };
    let (qid, lid) = (question_id.clone(), lesson_id.clone());
    let course = state
        .store
        .update_course(&id, move |course| {
            let lesson = find_lesson(course, &lid)?;
            lesson
                .questions
                .iter_mut()
                .find(|q| q.id == qid)
                .ok_or_else(|| DatabaseError::NotFound(format!("question {qid}")))?
                .answers
                .push(answer);
            course.updated_at = Utc::now();
            Ok(())
        })
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Course {id} not found")))?;

    state
        .invalidator
        .entity_written(EntityKind::Course, &id)
        .await;

    let Some((lesson, question)) = course
        .lessons
        .into_iter()
        .find(|l| l.id == lesson_id)
        .and_then(|l| {
            let question = l.questions.iter().find(|q| q.id == question_id).cloned()?;
            Some((l, question))
        })
    else {
        return Err(ApiError::not_found(format!(
            "Question {question_id} not found"
        )));
    };

    if question.asker.user_id != ctx.principal.id {
        match state.store.get_user(&question.asker.user_id).await {
            Ok(Some(asker)) => state
                .mailer
                .send(question_reply_mail(&asker.email, &asker.name, &lesson.title)),
            Ok(None) => {}
            Err(e) => warn!(
                user_id = %question.asker.user_id,
                error = %e,
                "Failed to look up asker for answer notification"
            ),
        }
    }

    Ok((StatusCode::CREATED, JSend::success(question)))
}

// ============================================================================
// Admin course management
// ============================================================================

pub async fn create_course(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<CourseRequest>,
) -> Result<(StatusCode, Json<JSend<Course>>), ApiError> {
    req.validate()?;

    let now = Utc::now();
    let mut course = Course {
        benefits: Vec::new(),
        created_at: now,
        demo_url: None,
        description: String::new(),
        estimated_price: None,
        id: generate_id(),
        lessons: Vec::new(),
        level: String::new(),
        name: String::new(),
        prerequisites: Vec::new(),
        price: 0.0,
        purchased: 0,
        ratings: 0.0,
        reviews: Vec::new(),
        tags: Vec::new(),
        thumbnail: None,
        updated_at: now,
    };
    req.apply(&mut course);

    let course = state.store.put_course(course).await?;
    state
        .invalidator
        .collection_changed(EntityKind::Course)
        .await;
    info!(course_id = %course.id, "Course created");

    Ok((StatusCode::CREATED, JSend::success(course)))
}

pub async fn edit_course(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    AppJson(req): AppJson<CourseRequest>,
) -> Result<Json<JSend<Course>>, ApiError> {
    req.validate()?;

    let course = state
        .store
        .update_course(&id, move |course| {
            req.apply(course);
            Ok(())
        })
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Course {id} not found")))?;

    state
        .invalidator
        .entity_written(EntityKind::Course, &course.id)
        .await;
    Ok(JSend::success(course))
}

pub async fn delete_course(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<JSend<MessageResponse>>, ApiError> {
    if !state.store.delete_course(&id).await? {
        return Err(ApiError::not_found(format!("Course {id} not found")));
    }

    state
        .invalidator
        .entity_written(EntityKind::Course, &id)
        .await;
    info!(course_id = %id, "Course deleted");

    Ok(JSend::success(MessageResponse::new("Course deleted successfully")))
}
