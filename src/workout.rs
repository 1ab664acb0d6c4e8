//! Workout logging: the exercise catalogue and entry submission.
//!
//! The entry form holds raw text the way the user typed it. [`WorkoutForm::to_request`]
//! applies the client-side rules before anything is sent; the server computes
//! the score and the personal-record flag.

use serde::{Deserialize, Serialize};
use time::macros::format_description;
use time::{Date, OffsetDateTime};

use crate::error::SessionError;
use crate::net::api::ApiClient;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exercise {
    pub id: u64,
    pub ticker: String,
    pub name: String,
    #[serde(default)]
    pub category: String,
}

#[derive(Deserialize)]
struct ExerciseList {
    #[serde(default)]
    exercises: Vec<Exercise>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkoutEntryRequest {
    pub exercise_id: u64,
    pub weight: f64,
    pub reps: u32,
    pub sets: u32,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub notes: String,
    /// `YYYY-MM-DD`.
    pub date: String,
}

/// An entry as recorded by the server.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WorkoutEntry {
    #[serde(default)]
    pub id: u64,
    pub exercise_id: u64,
    pub weight: f64,
    pub reps: u32,
    pub sets: u32,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub is_pr: bool,
}

#[derive(Deserialize)]
struct EntryEnvelope {
    entry: WorkoutEntry,
}

/// Unvalidated form fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkoutForm {
    pub exercise_id: Option<u64>,
    pub weight: String,
    pub reps: String,
    pub sets: String,
    pub notes: String,
    /// Empty means today.
    pub date: String,
}

impl WorkoutForm {
    /// Whether the submit control should be enabled.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.exercise_id.is_some()
            && !self.weight.trim().is_empty()
            && !self.reps.trim().is_empty()
            && !self.sets.trim().is_empty()
    }

    /// Validate and convert into the wire request.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Validation`] naming the first offending field.
    pub fn to_request(&self) -> Result<WorkoutEntryRequest, SessionError> {
        let exercise_id = self.exercise_id.ok_or_else(|| invalid("Select an exercise"))?;
        let weight = self
            .weight
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|w| w.is_finite() && *w >= 0.0)
            .ok_or_else(|| invalid("Weight must be a number of zero or more"))?;
        let reps = parse_count(&self.reps).ok_or_else(|| invalid("Reps must be at least 1"))?;
        let sets = parse_count(&self.sets).ok_or_else(|| invalid("Sets must be at least 1"))?;

        let date = match self.date.trim() {
            "" => OffsetDateTime::now_utc().date(),
            raw => Date::parse(raw, format_description!("[year]-[month]-[day]"))
                .map_err(|_| invalid("Date must be YYYY-MM-DD"))?,
        };

        Ok(WorkoutEntryRequest {
            exercise_id,
            weight,
            reps,
            sets,
            notes: self.notes.trim().to_owned(),
            date: date.to_string(),
        })
    }
}

fn parse_count(raw: &str) -> Option<u32> {
    raw.trim().parse::<u32>().ok().filter(|n| *n >= 1)
}

fn invalid(message: &str) -> SessionError {
    SessionError::Validation(message.to_owned())
}

/// `GET /exercises`.
///
/// # Errors
///
/// Propagates [`ApiClient`] failures.
pub async fn list_exercises(api: &ApiClient) -> Result<Vec<Exercise>, SessionError> {
    let list: ExerciseList = api.get("/exercises").await?;
    Ok(list.exercises)
}

/// `POST /entries`.
///
/// # Errors
///
/// Propagates [`ApiClient`] failures.
pub async fn submit_entry(api: &ApiClient, request: &WorkoutEntryRequest) -> Result<WorkoutEntry, SessionError> {
    let envelope: EntryEnvelope = api.post("/entries", request).await?;
    Ok(envelope.entry)
}

#[cfg(test)]
#[path = "workout_test.rs"]
mod tests;
