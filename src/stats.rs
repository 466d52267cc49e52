use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::{ClimbingSession, Grade};

/// Time window keyword accepted by the stats endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Period {
    #[default]
    All,
    Today,
    Week,
    Month,
}

impl Period {
    /// Unknown keywords mean no date restriction.
    pub fn from_keyword(keyword: Option<&str>) -> Self {
        match keyword.map(|k| k.trim().to_ascii_lowercase()).as_deref() {
            Some("today") => Period::Today,
            Some("week") => Period::Week,
            Some("month") => Period::Month,
            _ => Period::All,
        }
    }

    /// Inclusive lower bound on session dates.
    pub fn start_date(&self, today: NaiveDate) -> Option<NaiveDate> {
        match self {
            Period::All => None,
            Period::Today => Some(today),
            Period::Week => today.checked_sub_days(Days::new(7)),
            Period::Month => today.checked_sub_days(Days::new(30)),
        }
    }

    /// Inclusive upper bound. Only `Today` has one; the rolling windows stay open-ended.
    pub fn end_date(&self, today: NaiveDate) -> Option<NaiveDate> {
        match self {
            Period::Today => Some(today),
            Period::All | Period::Week | Period::Month => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressPoint {
    pub date: NaiveDate,
    pub grade: Grade,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationStats {
    pub total_climbs: i64,
    pub grade_distribution: BTreeMap<Grade, i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationActivity {
    pub location_id: i64,
    pub name: String,
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub total_climbs: i64,
    pub by_location: Vec<LocationActivity>,
    pub grade_distribution: BTreeMap<Grade, i64>,
}

/// One point per send, in session date order. Sends on the same date keep fetch order.
pub fn progress_series(sessions: &[ClimbingSession]) -> Vec<ProgressPoint> {
    let mut points: Vec<ProgressPoint> = sessions
        .iter()
        .flat_map(|session| {
            session.problems.iter().flat_map(move |problem| {
                let sends = usize::try_from(problem.sends).unwrap_or(0);
                std::iter::repeat_n(
                    ProgressPoint {
                        date: session.date,
                        grade: problem.grade,
                    },
                    sends,
                )
            })
        })
        .collect();

    // stable
    points.sort_by_key(|point| point.date);
    points
}

pub fn grade_distribution(sessions: &[ClimbingSession]) -> BTreeMap<Grade, i64> {
    let mut distribution = BTreeMap::new();

    for problem in sessions.iter().flat_map(|session| &session.problems) {
        if problem.sends > 0 {
            let count = distribution.entry(problem.grade).or_insert(0i64);
            *count = count.saturating_add(problem.sends);
        }
    }

    distribution
}

pub fn total_attempts(sessions: &[ClimbingSession]) -> i64 {
    sessions
        .iter()
        .flat_map(|session| &session.problems)
        .fold(0i64, |total, problem| total.saturating_add(problem.attempts))
}

pub fn location_stats(sessions: &[ClimbingSession]) -> LocationStats {
    LocationStats {
        total_climbs: total_attempts(sessions),
        grade_distribution: grade_distribution(sessions),
    }
}

/// Session counts are per location and ordered by location id.
pub fn aggregate_stats(sessions: &[ClimbingSession]) -> AggregateStats {
    let mut by_location: BTreeMap<i64, LocationActivity> = BTreeMap::new();

    for session in sessions {
        by_location
            .entry(session.location_id)
            .or_insert_with(|| LocationActivity {
                location_id: session.location_id,
                name: session.location_name.clone(),
                count: 0,
            })
            .count += 1;
    }

    AggregateStats {
        total_climbs: total_attempts(sessions),
        by_location: by_location.into_values().collect(),
        grade_distribution: grade_distribution(sessions),
    }
}
