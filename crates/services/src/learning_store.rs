use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use portal_core::model::{
    LearningModule, Lesson, LessonId, Percent, ProgressRecord, QuizScore, StudyEntry,
};
use storage::{Mirror, MirrorKey};

use crate::Clock;
use crate::api::learning as api;
use crate::error::{ApiError, LearningError};
use crate::http::ApiClient;
use crate::inflight::InFlight;

#[derive(Default)]
struct LearningSlice {
    modules: Vec<LearningModule>,
    current_lesson: Option<Lesson>,
    progress: BTreeMap<LessonId, ProgressRecord>,
    quiz_scores: BTreeMap<String, QuizScore>,
    study_history: Vec<StudyEntry>,
    unsynced: BTreeSet<LessonId>,
}

impl LearningSlice {
    fn completed_in(&self, module: &LearningModule) -> usize {
        module
            .lessons()
            .iter()
            .filter(|l| self.progress.get(&l.id).is_some_and(ProgressRecord::completed))
            .count()
    }

    fn recompute_modules(&mut self) {
        let counts: Vec<usize> = self.modules.iter().map(|m| self.completed_in(m)).collect();
        for (module, completed) in self.modules.iter_mut().zip(counts) {
            module.recompute(completed);
        }
    }

    fn record_mut(&mut self, lesson_id: &LessonId, clock: &Clock) -> &mut ProgressRecord {
        self.progress
            .entry(lesson_id.clone())
            .or_insert_with(|| ProgressRecord::new(None, lesson_id.clone(), clock.now()))
    }

    fn sync_current_lesson(&mut self, lesson_id: &LessonId) {
        let Some(record) = self.progress.get(lesson_id) else {
            return;
        };
        if let Some(lesson) = self.current_lesson.as_mut().filter(|l| &l.id == lesson_id) {
            lesson.progress = record.progress();
            lesson.completed = record.completed();
        }
    }
}

/// Which slices a call to [`LearningStore::initialize`] refreshed from the
/// server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningSync {
    pub modules: bool,
    pub progress: bool,
    pub quiz_results: bool,
}

/// Aggregate figures derived from the current slices.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LearningStats {
    /// Completed modules over all modules.
    pub overall_progress: Percent,
    pub completed_lessons: usize,
    pub total_study_secs: u64,
    pub average_quiz_score: f64,
}

/// Modules, lessons, per-lesson progress, quiz scores and study time.
///
/// Progress is offline-first: a report always lands locally, and the server's
/// answer only refines it.
pub struct LearningStore {
    client: Arc<ApiClient>,
    mirror: Mirror,
    clock: Clock,
    inflight: InFlight,
    state: Mutex<LearningSlice>,
}

impl LearningStore {
    #[must_use]
    pub fn new(client: Arc<ApiClient>, mirror: Mirror, clock: Clock, inflight: InFlight) -> Self {
        Self {
            client,
            mirror,
            clock,
            inflight,
            state: Mutex::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LearningSlice> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    //
    // ─── READS ────────────────────────────────────────────────────────────
    //

    #[must_use]
    pub fn modules(&self) -> Vec<LearningModule> {
        self.lock().modules.clone()
    }

    #[must_use]
    pub fn current_lesson(&self) -> Option<Lesson> {
        self.lock().current_lesson.clone()
    }

    #[must_use]
    pub fn progress_for(&self, lesson_id: &LessonId) -> Option<ProgressRecord> {
        self.lock().progress.get(lesson_id).cloned()
    }

    #[must_use]
    pub fn progress_records(&self) -> Vec<ProgressRecord> {
        self.lock().progress.values().cloned().collect()
    }

    #[must_use]
    pub fn quiz_score(&self, lesson_id: &LessonId) -> Option<QuizScore> {
        self.lock()
            .quiz_scores
            .get(&QuizScore::quiz_id_for(lesson_id))
            .cloned()
    }

    #[must_use]
    pub fn study_history(&self) -> Vec<StudyEntry> {
        self.lock().study_history.clone()
    }

    /// Lessons whose last progress report the server has not confirmed.
    #[must_use]
    pub fn unsynced_lessons(&self) -> Vec<LessonId> {
        self.lock().unsynced.iter().cloned().collect()
    }

    #[must_use]
    pub fn stats(&self) -> LearningStats {
        let slice = self.lock();
        let completed_modules = slice.modules.iter().filter(|m| m.completed()).count();
        let scores: Vec<f64> = slice.quiz_scores.values().map(|q| q.score).collect();
        #[allow(clippy::cast_precision_loss)]
        let average_quiz_score = if scores.is_empty() {
            0.0
        } else {
            scores.iter().sum::<f64>() / scores.len() as f64
        };
        LearningStats {
            overall_progress: Percent::ratio(completed_modules, slice.modules.len()),
            completed_lessons: slice.progress.values().filter(|r| r.completed()).count(),
            total_study_secs: slice.progress.values().map(|r| r.time_spent).sum(),
            average_quiz_score,
        }
    }

    pub fn cancel_pending(&self) {
        self.inflight.cancel_pending();
    }

    //
    // ─── CATALOG ──────────────────────────────────────────────────────────
    //

    /// Fetch the module catalog. Module progress is recomputed from local
    /// records; on failure the previous catalog stays.
    ///
    /// # Errors
    ///
    /// Returns `LearningError::Api` if the catalog cannot be fetched.
    pub async fn load_modules(&self) -> Result<Vec<LearningModule>, LearningError> {
        let modules = self
            .inflight
            .run("modules", api::modules(&self.client))
            .await?;
        let mut slice = self.lock();
        slice.modules = modules;
        slice.recompute_modules();
        Ok(slice.modules.clone())
    }

    /// Fetch one lesson and make it current. Loading another lesson before
    /// this one arrives discards this one.
    ///
    /// # Errors
    ///
    /// Returns `LearningError::Api` if the lesson cannot be fetched or the
    /// load was superseded.
    pub async fn load_lesson(&self, lesson_id: &LessonId) -> Result<Lesson, LearningError> {
        let mut lesson = self
            .inflight
            .run("lesson", api::lesson_detail(&self.client, lesson_id))
            .await?;
        let mut slice = self.lock();
        if let Some(record) = slice.progress.get(&lesson.id) {
            lesson.progress = record.progress();
            lesson.completed = record.completed();
        }
        slice.current_lesson = Some(lesson.clone());
        Ok(lesson)
    }

    //
    // ─── PROGRESS ─────────────────────────────────────────────────────────
    //

    /// Report progress on a lesson. `percent` is clamped to `0..=100`.
    ///
    /// The server is asked first; whatever it answers, the local record is
    /// updated (or created). A server-confirmed record refines the local one.
    /// A failed report keeps the local value and marks the lesson unsynced.
    ///
    /// # Errors
    ///
    /// Returns `LearningError::Api(ApiError::Cancelled)` if the report was
    /// superseded by a newer one for the same lesson or cancelled; nothing is
    /// applied in that case.
    pub async fn update_progress(
        &self,
        lesson_id: &LessonId,
        percent: f64,
    ) -> Result<ProgressRecord, LearningError> {
        let percent = Percent::clamped(percent);
        let confirmed = self
            .inflight
            .run(
                format!("progress:{lesson_id}"),
                api::update_progress(&self.client, lesson_id, percent.value()),
            )
            .await;

        if let Err(ApiError::Cancelled) = confirmed {
            return Err(ApiError::Cancelled.into());
        }

        let now = self.clock.now();
        let mut slice = self.lock();
        let record = slice.record_mut(lesson_id, &self.clock);
        record.report(percent, now);
        match confirmed {
            Ok(Some(server)) => {
                let server = server.normalized();
                if &server.lesson_id == lesson_id {
                    record.report(server.progress(), now);
                    record.time_spent = record.time_spent.max(server.time_spent);
                    if server.user_id.is_some() {
                        record.user_id = server.user_id;
                    }
                }
                slice.unsynced.remove(lesson_id);
            }
            Ok(None) => {
                slice.unsynced.remove(lesson_id);
            }
            Err(err) => {
                warn!(
                    lesson = %lesson_id,
                    progress = percent.value(),
                    error = %err,
                    "progress not confirmed by server; keeping local value"
                );
                slice.unsynced.insert(lesson_id.clone());
            }
        }

        let updated = slice.record_mut(lesson_id, &self.clock).clone();
        slice.recompute_modules();
        slice.sync_current_lesson(lesson_id);
        self.mirror.save(MirrorKey::LearningProgress, &slice.progress);
        Ok(updated)
    }

    /// Record a quiz result and complete its lesson.
    ///
    /// # Errors
    ///
    /// Returns `LearningError::Validation` for a negative or non-finite
    /// score, or a cancellation error from the submission or the follow-up
    /// progress report.
    pub async fn submit_quiz(
        &self,
        lesson_id: &LessonId,
        score: f64,
        answers: Vec<Value>,
    ) -> Result<QuizScore, LearningError> {
        if !score.is_finite() || score < 0.0 {
            return Err(LearningError::Validation("quiz score must be a non-negative number"));
        }

        let confirmed = self
            .inflight
            .run(
                format!("quiz:{lesson_id}"),
                api::submit_quiz(&self.client, lesson_id, score, &answers),
            )
            .await;

        let quiz = match confirmed {
            Ok(Some(server)) => server,
            Ok(None) => self.local_quiz(lesson_id, score, answers),
            Err(ApiError::Cancelled) => return Err(ApiError::Cancelled.into()),
            Err(err) => {
                warn!(lesson = %lesson_id, error = %err, "quiz not confirmed by server; keeping local result");
                self.local_quiz(lesson_id, score, answers)
            }
        };

        {
            let mut slice = self.lock();
            slice.quiz_scores.insert(quiz.quiz_id.clone(), quiz.clone());
            self.mirror.save(MirrorKey::QuizScores, &slice.quiz_scores);
        }

        self.update_progress(lesson_id, 100.0).await?;
        Ok(quiz)
    }

    fn local_quiz(&self, lesson_id: &LessonId, score: f64, answers: Vec<Value>) -> QuizScore {
        QuizScore {
            quiz_id: QuizScore::quiz_id_for(lesson_id),
            lesson_id: lesson_id.clone(),
            score,
            total: None,
            answers,
            completed_at: self.clock.now(),
        }
    }

    /// Add study time to a lesson and log the interval. The server is told
    /// afterwards; a failed report is only logged. Overlapping reports are
    /// all delivered.
    pub async fn record_time(&self, lesson_id: &LessonId, duration: Duration) -> ProgressRecord {
        let secs = duration.as_secs();
        let now = self.clock.now();
        let record = {
            let mut slice = self.lock();
            let record = slice.record_mut(lesson_id, &self.clock);
            record.add_time(secs, now);
            let record = record.clone();
            slice.study_history.push(StudyEntry {
                lesson_id: lesson_id.clone(),
                duration_secs: secs,
                studied_at: now,
            });
            self.mirror.save(MirrorKey::LearningProgress, &slice.progress);
            self.mirror.save(MirrorKey::StudyHistory, &slice.study_history);
            record
        };

        if let Err(err) = self
            .inflight
            .run_alongside(
                &format!("time:{lesson_id}"),
                api::record_time(&self.client, lesson_id, secs),
            )
            .await
        {
            debug!(lesson = %lesson_id, error = %err, "study time not reported to server");
        }
        record
    }

    /// Forget all progress, quiz scores and study history, locally and in
    /// the mirror.
    pub fn clear_progress_history(&self) {
        let mut slice = self.lock();
        slice.progress.clear();
        slice.quiz_scores.clear();
        slice.study_history.clear();
        slice.unsynced.clear();
        slice.recompute_modules();
        if let Some(lesson) = slice.current_lesson.as_mut() {
            lesson.progress = Percent::ZERO;
            lesson.completed = false;
        }
        self.mirror.remove_all(&[
            MirrorKey::LearningProgress,
            MirrorKey::QuizScores,
            MirrorKey::StudyHistory,
        ]);
    }

    //
    // ─── STARTUP ──────────────────────────────────────────────────────────
    //

    /// Load the persisted progress, quiz and study slices.
    pub fn restore(&self) {
        let progress: BTreeMap<LessonId, ProgressRecord> =
            self.mirror.load(MirrorKey::LearningProgress).unwrap_or_default();
        let quiz_scores: BTreeMap<String, QuizScore> =
            self.mirror.load(MirrorKey::QuizScores).unwrap_or_default();
        let study_history: Vec<StudyEntry> =
            self.mirror.load(MirrorKey::StudyHistory).unwrap_or_default();

        let mut slice = self.lock();
        slice.progress = progress
            .into_iter()
            .map(|(id, record)| (id, record.normalized()))
            .collect();
        slice.quiz_scores = quiz_scores;
        slice.study_history = study_history;
        slice.recompute_modules();
    }

    /// Restore persisted slices, then fetch modules, progress and quiz
    /// results in turn. Each fetch may fail on its own; a failed slice keeps
    /// its previous value.
    pub async fn initialize(&self) -> LearningSync {
        self.restore();
        let mut sync = LearningSync::default();

        match self.load_modules().await {
            Ok(_) => sync.modules = true,
            Err(err) => warn!(error = %err, "could not load modules"),
        }

        match self
            .inflight
            .run("progress", api::progress(&self.client))
            .await
        {
            Ok(records) => {
                self.merge_server_progress(records);
                sync.progress = true;
            }
            Err(err) => warn!(error = %err, "could not load progress"),
        }

        match self
            .inflight
            .run("quiz-results", api::quiz_results(&self.client))
            .await
        {
            Ok(results) => {
                let mut slice = self.lock();
                for quiz in results {
                    slice.quiz_scores.insert(quiz.quiz_id.clone(), quiz);
                }
                self.mirror.save(MirrorKey::QuizScores, &slice.quiz_scores);
                sync.quiz_results = true;
            }
            Err(err) => warn!(error = %err, "could not load quiz results"),
        }

        sync
    }

    /// Server records replace local ones, except for lessons with a local
    /// report the server has not confirmed yet.
    fn merge_server_progress(&self, records: Vec<ProgressRecord>) {
        let mut slice = self.lock();
        for record in records {
            let record = record.normalized();
            if slice.unsynced.contains(&record.lesson_id) {
                continue;
            }
            let lesson_id = record.lesson_id.clone();
            slice.progress.insert(lesson_id.clone(), record);
            slice.sync_current_lesson(&lesson_id);
        }
        slice.recompute_modules();
        self.mirror.save(MirrorKey::LearningProgress, &slice.progress);
    }
}
