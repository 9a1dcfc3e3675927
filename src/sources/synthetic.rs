use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::{json, Value};

use crate::record::{CachedPayload, DataSource, Timeframe};
use super::adapt;
use super::traits::{SourceError, SourceQuery};

/// Canned leaderboard roster: (id, username, all-time points).
const ROSTER: &[(&str, &str, u64)] = &[
    ("synthetic-01", "EcoEmma", 4820),
    ("synthetic-02", "GreenGuru", 4415),
    ("synthetic-03", "RecycleRay", 3980),
    ("synthetic-04", "CompostCarla", 3640),
    ("synthetic-05", "BinWizard", 3275),
    ("synthetic-06", "SortMaster", 2910),
    ("synthetic-07", "ZeroWasteZoe", 2540),
    ("synthetic-08", "TidyTerra", 2185),
    ("synthetic-09", "LoopLena", 1820),
    ("synthetic-10", "ReuseRiver", 1455),
    ("synthetic-11", "CircularSam", 1090),
    ("synthetic-12", "GreenhornGus", 620),
];

/// Canned achievements: (id, title, points, progress when not yet earned).
const ACHIEVEMENTS: &[(&str, &str, u64, Option<f64>)] = &[
    ("ach-first-sort", "first_sort", 10, None),
    ("ach-ten-items", "ten_items_sorted", 50, None),
    ("ach-co2-kilo", "first_kilo_co2", 75, None),
    ("ach-streak-week", "seven_day_streak", 100, Some(0.55)),
    ("ach-hundred-items", "hundred_items_sorted", 200, Some(0.32)),
    ("ach-plastic-pro", "plastic_specialist", 150, Some(0.7)),
    ("ach-streak-month", "thirty_day_streak", 400, Some(0.2)),
    ("ach-co2-ton", "co2_heavyweight", 1000, Some(0.05)),
];

/// Canned challenges: (id, title, reward points, featured, difficulty).
const CHALLENGES: &[(&str, &str, u64, bool, &str)] = &[
    ("ch-plastic-week", "Plastic-Free Week", 250, true, "medium"),
    ("ch-sort-sprint", "Weekend Sorting Sprint", 100, true, "easy"),
    ("ch-compost-start", "Start Composting", 150, false, "easy"),
    ("ch-zero-waste", "Zero Waste Month", 500, true, "hard"),
    ("ch-glass-drive", "Glass Collection Drive", 200, false, "medium"),
    ("ch-ewaste-hunt", "E-Waste Hunt", 300, false, "hard"),
];

/// The synthetic data source.
///
/// Returns a fixed, deterministic dataset shaped like the backend's mock
/// generator. Near-instant, and it never errors while reachable; tests and
/// operators can flip availability to exercise total-failure paths.
pub struct SyntheticSource {
    available: AtomicBool,
}

impl SyntheticSource {
    #[must_use]
    pub fn new() -> Self {
        Self {
            available: AtomicBool::new(true),
        }
    }

    /// Mark the source reachable or unreachable.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Release);
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::Acquire)
    }

    /// Raw rows for a query, in the synthetic naming convention.
    pub fn rows_for(&self, query: &SourceQuery) -> Result<Vec<Value>, SourceError> {
        self.check_available()?;
        let rows = match query {
            SourceQuery::Leaderboard { limit, timeframe, .. } => self.leaderboard(*limit, *timeframe),
            SourceQuery::Achievements { .. } => self.achievements(),
            SourceQuery::Challenges { featured_only, .. } => self.challenges(*featured_only),
            SourceQuery::UserStats { user_id } => vec![self.stats(user_id)],
        };
        Ok(rows)
    }

    /// A single stats row for a user.
    pub fn stats_for(&self, user_id: &str) -> Result<Value, SourceError> {
        self.check_available()?;
        Ok(self.stats(user_id))
    }

    /// A ready-made payload for a query, used by the fallback chain.
    pub fn payload_for(&self, query: &SourceQuery) -> Result<CachedPayload, SourceError> {
        let rows = self.rows_for(query)?;
        match query {
            SourceQuery::Leaderboard { limit, .. } => {
                let mut records =
                    adapt::adapt_rows(DataSource::Synthetic, &rows, adapt::leaderboard_row)?;
                records.truncate(*limit);
                for (i, record) in records.iter_mut().enumerate() {
                    record.rank = Some((i + 1) as u32);
                }
                Ok(CachedPayload::Records(records))
            }
            SourceQuery::Achievements { .. } => {
                let records =
                    adapt::adapt_rows(DataSource::Synthetic, &rows, adapt::achievement_row)?;
                Ok(CachedPayload::Records(records))
            }
            SourceQuery::Challenges { .. } => {
                let records = adapt::adapt_rows(DataSource::Synthetic, &rows, adapt::challenge_row)?;
                Ok(CachedPayload::Records(records))
            }
            SourceQuery::UserStats { user_id } => {
                let snapshot = adapt::stats_row(&self.stats(user_id)).ok_or_else(|| {
                    SourceError::Malformed("synthetic stats row was unusable".into())
                })?;
                Ok(CachedPayload::Stats {
                    snapshot,
                    is_real_user: false,
                    data_source: DataSource::Synthetic,
                })
            }
        }
    }

    fn check_available(&self) -> Result<(), SourceError> {
        if self.is_available() {
            Ok(())
        } else {
            Err(SourceError::Backend("synthetic source unavailable".into()))
        }
    }

    fn leaderboard(&self, limit: usize, timeframe: Timeframe) -> Vec<Value> {
        let factor = timeframe_factor(timeframe);
        ROSTER
            .iter()
            .take(limit)
            .enumerate()
            .map(|(i, (id, username, points))| {
                json!({
                    "id": id,
                    "username": username,
                    "points": (*points as f64 * factor) as u64,
                    "rank": i + 1,
                })
            })
            .collect()
    }

    fn achievements(&self) -> Vec<Value> {
        ACHIEVEMENTS
            .iter()
            .map(|(id, title, points, progress)| match progress {
                None => json!({
                    "id": id,
                    "title": title,
                    "points": points,
                    "unlocked": true,
                }),
                Some(p) => json!({
                    "id": id,
                    "title": title,
                    "points": points,
                    "unlocked": false,
                    "progress": p,
                }),
            })
            .collect()
    }

    fn challenges(&self, featured_only: bool) -> Vec<Value> {
        CHALLENGES
            .iter()
            .filter(|(_, _, _, featured, _)| !featured_only || *featured)
            .map(|(id, title, reward, featured, difficulty)| {
                json!({
                    "id": id,
                    "title": title,
                    "reward_points": reward,
                    "is_featured": featured,
                    "difficulty_level": difficulty,
                    "active": true,
                })
            })
            .collect()
    }

    fn stats(&self, user_id: &str) -> Value {
        // Deterministic per user: spread mid-roster values by a cheap hash of the id.
        let seed = user_id.bytes().fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u64));
        let points = 400 + seed % 1200;
        json!({
            "user_id": user_id,
            "points": points,
            "items_sorted": points / 8,
            "co2_saved": (points as f64) * 0.012,
            "streak": seed % 14,
            "rank": 4 + seed % 8,
        })
    }
}

impl Default for SyntheticSource {
    fn default() -> Self {
        Self::new()
    }
}

fn timeframe_factor(timeframe: Timeframe) -> f64 {
    match timeframe {
        Timeframe::Day => 0.05,
        Timeframe::Week => 0.25,
        Timeframe::Month => 0.6,
        Timeframe::AllTime => 1.0,
    }
}
