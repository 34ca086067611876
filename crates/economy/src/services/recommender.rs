//! Adaptive difficulty.
//!
//! The recommendation is a pure function of the most recent task results of
//! a (child, subject) pair: the success rate in the window is compared with
//! the target band `target ± tolerance` and the difficulty moves by at most
//! one step. Rates are compared as exact fractions against thresholds in
//! basis points, so a rate sitting on a band edge always holds.

use std::{fmt::Debug, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
    Clock, EconomyError, ResultEconomy, TaskResult,
    settings::RecommenderSettings,
    store::EconomyStore,
    task_results::{MAX_DIFFICULTY, MIN_DIFFICULTY},
    util::normalize_child_id,
};

/// Results considered by [`PerformanceStats`].
pub const STATS_HISTORY_LIMIT: u64 = 1_000;

/// Below this many results predictions fall back to a fixed baseline.
pub const MIN_TASKS_FOR_ANALYSIS: usize = 5;

const BASIS_POINTS: i64 = 10_000;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DifficultyRecommendation {
    pub child_id: String,
    pub subject: String,
    pub current_difficulty: u8,
    pub recommended_difficulty: u8,
    pub reason: String,
    pub confidence: f64,
    /// Results actually analyzed.
    pub analysis_window: usize,
    pub success_rate_in_window: f64,
    pub timestamp: DateTime<Utc>,
}

impl DifficultyRecommendation {
    pub fn is_change(&self) -> bool {
        self.current_difficulty != self.recommended_difficulty
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PerformanceStats {
    pub child_id: String,
    pub subject: String,
    pub success_rate: f64,
    pub average_difficulty: f64,
    pub tasks_completed: usize,
    pub tasks_succeeded: usize,
    pub tasks_failed: usize,
    /// Successes at the end of the history.
    pub current_streak: usize,
    pub best_streak: usize,
}

impl PerformanceStats {
    /// `results` must be oldest first.
    pub fn from_results(child_id: &str, subject: &str, results: &[TaskResult]) -> Self {
        let tasks_completed = results.len();
        let tasks_succeeded = results.iter().filter(|r| r.success).count();
        let (success_rate, average_difficulty) = if tasks_completed == 0 {
            (0.0, 0.0)
        } else {
            let difficulty_sum: u64 = results.iter().map(|r| u64::from(r.difficulty)).sum();
            (
                tasks_succeeded as f64 / tasks_completed as f64,
                difficulty_sum as f64 / tasks_completed as f64,
            )
        };

        let current_streak = results.iter().rev().take_while(|r| r.success).count();
        let mut best_streak = 0;
        let mut run = 0;
        for result in results {
            if result.success {
                run += 1;
                best_streak = best_streak.max(run);
            } else {
                run = 0;
            }
        }

        Self {
            child_id: child_id.to_string(),
            subject: subject.to_string(),
            success_rate,
            average_difficulty,
            tasks_completed,
            tasks_succeeded,
            tasks_failed: tasks_completed - tasks_succeeded,
            current_streak,
            best_streak,
        }
    }
}

/// Confidence in a recommendation drawn from `samples` results.
pub fn confidence_for(samples: usize) -> f64 {
    match samples {
        0..=4 => 0.2,
        5..=9 => 0.6,
        10..=19 => 0.8,
        _ => 1.0,
    }
}

fn to_basis_points(rate: f64) -> i64 {
    (rate * BASIS_POINTS as f64).round() as i64
}

fn percent(rate_bp: i64) -> i64 {
    rate_bp / 100
}

/// Recommend a difficulty from `window`, the most recent results of one
/// subject (any order).
pub fn recommend_from_window(
    child_id: &str,
    subject: &str,
    window: &[TaskResult],
    settings: &RecommenderSettings,
    now: DateTime<Utc>,
) -> DifficultyRecommendation {
    let samples = window.len();
    let confidence = confidence_for(samples);
    if samples == 0 {
        let difficulty = settings.default_difficulty;
        return DifficultyRecommendation {
            child_id: child_id.to_string(),
            subject: subject.to_string(),
            current_difficulty: difficulty,
            recommended_difficulty: difficulty,
            reason: format!("No {subject} results yet, starting at difficulty {difficulty}"),
            confidence,
            analysis_window: 0,
            success_rate_in_window: 0.0,
            timestamp: now,
        };
    }

    let n = samples as i64;
    let successes = window.iter().filter(|r| r.success).count() as i64;
    let difficulty_sum: i64 = window.iter().map(|r| i64::from(r.difficulty)).sum();
    let current = u8::try_from(difficulty_sum / n)
        .unwrap_or(MAX_DIFFICULTY)
        .clamp(MIN_DIFFICULTY, MAX_DIFFICULTY);

    let upper_bp = to_basis_points(settings.target_success_rate + settings.tolerance);
    let lower_bp = to_basis_points(settings.target_success_rate - settings.tolerance).max(0);
    // successes / n compared with bp / 10_000 without division.
    let scaled = successes * BASIS_POINTS;
    let rate_bp = scaled / n;

    let (recommended, reason) = if scaled > upper_bp * n {
        if current < MAX_DIFFICULTY {
            (
                current + 1,
                format!(
                    "Success rate {}% is above {}%, raising the challenge",
                    percent(rate_bp),
                    percent(upper_bp)
                ),
            )
        } else {
            (
                current,
                format!(
                    "Success rate {}% is high but difficulty is already at the maximum",
                    percent(rate_bp)
                ),
            )
        }
    } else if scaled < lower_bp * n {
        if current > MIN_DIFFICULTY {
            (
                current - 1,
                format!(
                    "Success rate {}% is below {}%, easing off to build confidence",
                    percent(rate_bp),
                    percent(lower_bp)
                ),
            )
        } else {
            (
                current,
                format!(
                    "Success rate {}% is low but difficulty is already at the minimum",
                    percent(rate_bp)
                ),
            )
        }
    } else {
        (
            current,
            format!(
                "Success rate {}% is within the target band, keeping difficulty",
                percent(rate_bp)
            ),
        )
    };

    DifficultyRecommendation {
        child_id: child_id.to_string(),
        subject: subject.to_string(),
        current_difficulty: current,
        recommended_difficulty: recommended,
        reason,
        confidence,
        analysis_window: samples,
        success_rate_in_window: successes as f64 / samples as f64,
        timestamp: now,
    }
}

/// Estimated probability of succeeding at `difficulty`.
pub fn predict_from_stats(stats: &PerformanceStats, difficulty: u8) -> f64 {
    if stats.tasks_completed < MIN_TASKS_FOR_ANALYSIS {
        return match difficulty {
            1 => 0.95,
            2 => 0.90,
            3 => 0.80,
            4 => 0.65,
            _ => 0.50,
        };
    }
    let delta = f64::from(difficulty) - stats.average_difficulty;
    (stats.success_rate * (1.0 - delta * 0.15)).clamp(0.1, 0.95)
}

#[async_trait]
pub trait DifficultyRecommender: Send + Sync + Debug {
    async fn recommend(&self, child_id: &str, subject: &str)
    -> ResultEconomy<DifficultyRecommendation>;

    async fn performance_stats(
        &self,
        child_id: &str,
        subject: &str,
    ) -> ResultEconomy<PerformanceStats>;

    async fn predict_success(
        &self,
        child_id: &str,
        subject: &str,
        difficulty: u8,
    ) -> ResultEconomy<f64>;
}

/// Reads task results from the store; holds no state of its own.
#[derive(Debug, Clone)]
pub struct LocalRecommender {
    store: Arc<dyn EconomyStore>,
    clock: Arc<dyn Clock>,
    settings: RecommenderSettings,
}

impl LocalRecommender {
    pub fn new(
        store: Arc<dyn EconomyStore>,
        clock: Arc<dyn Clock>,
        settings: RecommenderSettings,
    ) -> Self {
        Self {
            store,
            clock,
            settings,
        }
    }
}

pub(crate) fn normalize_subject(subject: &str) -> ResultEconomy<String> {
    let subject = subject.trim().to_lowercase();
    if subject.is_empty() {
        return Err(EconomyError::Validation(
            "subject must not be empty".to_string(),
        ));
    }
    Ok(subject)
}

#[async_trait]
impl DifficultyRecommender for LocalRecommender {
    async fn recommend(
        &self,
        child_id: &str,
        subject: &str,
    ) -> ResultEconomy<DifficultyRecommendation> {
        let child_id = normalize_child_id(child_id)?;
        let subject = normalize_subject(subject)?;
        let window = self
            .store
            .recent_task_results(&child_id, Some(&subject), self.settings.window_size as u64)
            .await?;
        Ok(recommend_from_window(
            &child_id,
            &subject,
            &window,
            &self.settings,
            self.clock.now(),
        ))
    }

    async fn performance_stats(
        &self,
        child_id: &str,
        subject: &str,
    ) -> ResultEconomy<PerformanceStats> {
        let child_id = normalize_child_id(child_id)?;
        let subject = normalize_subject(subject)?;
        let history = self
            .store
            .recent_task_results(&child_id, Some(&subject), STATS_HISTORY_LIMIT)
            .await?;
        Ok(PerformanceStats::from_results(&child_id, &subject, &history))
    }

    async fn predict_success(
        &self,
        child_id: &str,
        subject: &str,
        difficulty: u8,
    ) -> ResultEconomy<f64> {
        if !(MIN_DIFFICULTY..=MAX_DIFFICULTY).contains(&difficulty) {
            return Err(EconomyError::Validation(format!(
                "difficulty must be in {MIN_DIFFICULTY}..={MAX_DIFFICULTY}, got {difficulty}"
            )));
        }
        let stats = self.performance_stats(child_id, subject).await?;
        Ok(predict_from_stats(&stats, difficulty))
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use uuid::Uuid;

    use super::*;

    fn window(outcomes: &[(u8, bool)]) -> Vec<TaskResult> {
        let start = Utc.with_ymd_and_hms(2026, 6, 1, 15, 0, 0).unwrap();
        outcomes
            .iter()
            .enumerate()
            .map(|(i, &(difficulty, success))| TaskResult {
                id: Uuid::new_v4(),
                child_id: "ada".to_string(),
                subject: "math".to_string(),
                difficulty,
                success,
                grade: if success { 90 } else { 40 },
                time_spent_secs: 60,
                hints_used: 0,
                attempts_to_solve: 1,
                timestamp: start + chrono::Duration::minutes(i as i64),
            })
            .collect()
    }

    fn recommend(outcomes: &[(u8, bool)]) -> DifficultyRecommendation {
        recommend_from_window(
            "ada",
            "math",
            &window(outcomes),
            &RecommenderSettings::default(),
            Utc::now(),
        )
    }

    #[test]
    fn nine_of_ten_holds() {
        let mut outcomes = vec![(3, true); 9];
        outcomes.push((3, false));
        let rec = recommend(&outcomes);
        assert_eq!(rec.current_difficulty, 3);
        assert_eq!(rec.recommended_difficulty, 3);
        assert_eq!(rec.confidence, 0.8);
        assert_eq!(rec.analysis_window, 10);
        assert!((rec.success_rate_in_window - 0.9).abs() < 1e-9);
    }

    #[test]
    fn seven_of_ten_holds() {
        let mut outcomes = vec![(3, true); 7];
        outcomes.extend([(3, false); 3]);
        assert_eq!(recommend(&outcomes).recommended_difficulty, 3);
    }

    #[test]
    fn perfect_window_raises() {
        let rec = recommend(&[(2, true); 10]);
        assert_eq!(rec.recommended_difficulty, 3);
        assert!(rec.is_change());
    }

    #[test]
    fn poor_window_lowers() {
        let mut outcomes = vec![(4, true); 6];
        outcomes.extend([(4, false); 4]);
        assert_eq!(recommend(&outcomes).recommended_difficulty, 3);
    }

    #[test]
    fn bounds_are_respected() {
        assert_eq!(recommend(&[(5, true); 10]).recommended_difficulty, 5);
        assert_eq!(recommend(&[(1, false); 10]).recommended_difficulty, 1);
    }

    #[test]
    fn current_difficulty_is_truncated_average() {
        let rec = recommend(&[(3, true), (4, true), (4, false)]);
        assert_eq!(rec.current_difficulty, 3);
        assert_eq!(rec.confidence, 0.2);
    }

    #[test]
    fn empty_window_uses_default() {
        let rec = recommend(&[]);
        assert_eq!(rec.current_difficulty, 3);
        assert_eq!(rec.recommended_difficulty, 3);
        assert_eq!(rec.analysis_window, 0);
    }

    #[test]
    fn confidence_steps() {
        assert_eq!(confidence_for(4), 0.2);
        assert_eq!(confidence_for(5), 0.6);
        assert_eq!(confidence_for(19), 0.8);
        assert_eq!(confidence_for(20), 1.0);
    }

    #[test]
    fn streaks_are_counted() {
        let results = window(&[(2, true), (2, true), (2, true), (2, false), (2, true)]);
        let stats = PerformanceStats::from_results("ada", "math", &results);
        assert_eq!(stats.best_streak, 3);
        assert_eq!(stats.current_streak, 1);
        assert_eq!(stats.tasks_failed, 1);
    }

    #[test]
    fn prediction_uses_baseline_then_history() {
        let few = PerformanceStats::from_results("ada", "math", &window(&[(3, true)]));
        assert_eq!(predict_from_stats(&few, 4), 0.65);

        let many = PerformanceStats::from_results("ada", "math", &window(&[(3, true); 10]));
        assert!((predict_from_stats(&many, 3) - 0.95).abs() < 1e-9);
        assert!((predict_from_stats(&many, 4) - 0.85).abs() < 1e-9);
    }
}
