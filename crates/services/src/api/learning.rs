use serde::Serialize;
use serde_json::Value;

use portal_core::model::{LearningModule, Lesson, LessonId, ProgressRecord, QuizScore};

use crate::error::ApiError;
use crate::http::{ApiClient, Endpoint};

pub const MODULES: &str = "/api/v1/learning/modules";
pub const LESSONS: &str = "/api/v1/learning/lessons";
pub const PROGRESS: &str = "/api/v1/learning/progress";
pub const QUIZ_RESULTS: &str = "/api/v1/learning/quiz-results";

fn lesson(id: &LessonId) -> Endpoint {
    Endpoint::new(LESSONS).push(id)
}

#[derive(Debug, Serialize)]
struct ProgressUpdate {
    progress: u8,
}

#[derive(Debug, Serialize)]
struct QuizSubmission<'a> {
    score: f64,
    answers: &'a [Value],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TimeReport {
    duration_secs: u64,
}

pub async fn modules(client: &ApiClient) -> Result<Vec<LearningModule>, ApiError> {
    client.get(MODULES).await
}

pub async fn lesson_detail(client: &ApiClient, id: &LessonId) -> Result<Lesson, ApiError> {
    client.get(lesson(id)).await
}

pub async fn progress(client: &ApiClient) -> Result<Vec<ProgressRecord>, ApiError> {
    client.get(PROGRESS).await
}

/// Report lesson progress. The server may echo the record it stored.
pub async fn update_progress(
    client: &ApiClient,
    id: &LessonId,
    progress: u8,
) -> Result<Option<ProgressRecord>, ApiError> {
    client
        .put(lesson(id).push("progress"), &ProgressUpdate { progress })
        .await
}

pub async fn submit_quiz(
    client: &ApiClient,
    id: &LessonId,
    score: f64,
    answers: &[Value],
) -> Result<Option<QuizScore>, ApiError> {
    client
        .post(lesson(id).push("quiz"), &QuizSubmission { score, answers })
        .await
}

pub async fn quiz_results(client: &ApiClient) -> Result<Vec<QuizScore>, ApiError> {
    client.get(QUIZ_RESULTS).await
}

pub async fn record_time(client: &ApiClient, id: &LessonId, duration_secs: u64) -> Result<(), ApiError> {
    client
        .post(lesson(id).push("time"), &TimeReport { duration_secs })
        .await
}
