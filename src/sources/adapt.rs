//! Adapters from raw source rows to canonical records.
//!
//! The two sources disagree on field names (`user_id` vs `id`,
//! `total_points` vs `points`, `full_name` vs `username`). That flexibility
//! lives here, at the boundary, as one explicit adapter per record shape;
//! the merge logic only ever sees [`MergedRecord`].
//!
//! A row without an identity is malformed and skipped. A nonempty response
//! in which every row is malformed is reported as [`SourceError::Malformed`]
//! so the fallback chain can recover with a default state.

use serde_json::Value;
use tracing::warn;

use crate::record::{epoch_ms, DataSource, MergedRecord, UserStatsSnapshot};
use super::traits::SourceError;

/// Adapter signature shared by the record-shaped queries.
pub type RowAdapter = fn(DataSource, &Value) -> Option<MergedRecord>;

/// Normalize a leaderboard row.
pub fn leaderboard_row(source: DataSource, row: &Value) -> Option<MergedRecord> {
    let id = str_field(row, &["user_id", "id"])?;
    let name = str_field(row, &["full_name", "username", "display_name", "name"])
        .unwrap_or_else(|| "Anonymous".to_string());
    let score = num_field(row, &["total_points", "points", "score"]).unwrap_or(0.0);

    let mut record = MergedRecord::new(id, name, score, source);
    record.rank = uint_field(row, &["rank_position", "rank"]).map(|r| r as u32);
    record.last_updated = int_field(row, &["last_updated", "updated_at"]).unwrap_or(epoch_ms() as i64);
    Some(record)
}

/// Normalize an achievement row.
pub fn achievement_row(source: DataSource, row: &Value) -> Option<MergedRecord> {
    let id = str_field(row, &["id", "achievement_id"])?;
    let name = str_field(row, &["achievement_type", "title", "name"])
        .unwrap_or_else(|| "Achievement".to_string());
    let score = num_field(row, &["points", "reward_points", "score"]).unwrap_or(0.0);

    let mut record = MergedRecord::new(id, name, score, source);
    record.unlocked = row.get("earned_at").map_or(false, |v| !v.is_null())
        || bool_field(row, &["unlocked", "earned"]).unwrap_or(false);
    record.progress = num_field(row, &["progress"])
        .map(|p| p.clamp(0.0, 1.0))
        .unwrap_or(if record.unlocked { 1.0 } else { 0.0 });
    Some(record)
}

/// Normalize a challenge row.
pub fn challenge_row(source: DataSource, row: &Value) -> Option<MergedRecord> {
    let id = str_field(row, &["id", "challenge_id"])?;
    let name = str_field(row, &["title", "challenge_type", "name"])
        .unwrap_or_else(|| "Challenge".to_string());
    let score = num_field(row, &["reward_points", "points", "score"]).unwrap_or(0.0);

    let mut record = MergedRecord::new(id, name, score, source);
    record.unlocked = bool_field(row, &["is_active", "active"]).unwrap_or(true);
    record.progress = num_field(row, &["progress"]).map(|p| p.clamp(0.0, 1.0)).unwrap_or(0.0);
    Some(record)
}

/// Normalize a user-stats row.
pub fn stats_row(row: &Value) -> Option<UserStatsSnapshot> {
    if !row.is_object() {
        return None;
    }
    Some(UserStatsSnapshot {
        total_items_sorted: uint_field(row, &["total_items_sorted", "items_sorted"]).unwrap_or(0),
        total_co2_saved: num_field(row, &["total_co2_saved", "co2_saved"]).unwrap_or(0.0),
        total_points: uint_field(row, &["total_points", "points"]).unwrap_or(0),
        rank_position: uint_field(row, &["rank_position", "rank"]).map(|r| r as u32),
        streak_days: uint_field(row, &["streak_days", "streak"]).unwrap_or(0) as u32,
        achievement_count: uint_field(row, &["achievement_count", "achievements"]).unwrap_or(0) as u32,
    })
}

/// Run `adapter` over a full response, skipping malformed rows.
///
/// A nonempty response that yields zero records is an error: the source
/// answered, but with nothing this layer can use.
pub fn adapt_rows(
    source: DataSource,
    rows: &[Value],
    adapter: RowAdapter,
) -> Result<Vec<MergedRecord>, SourceError> {
    let mut records = Vec::with_capacity(rows.len());
    let mut skipped = 0usize;

    for row in rows {
        match adapter(source, row) {
            Some(record) => records.push(record),
            None => skipped += 1,
        }
    }

    if skipped > 0 {
        warn!(source = %source, skipped, total = rows.len(), "Skipped rows without an identity field");
    }

    if records.is_empty() && !rows.is_empty() {
        return Err(SourceError::Malformed(format!(
            "all {} rows from {} source were unusable",
            rows.len(),
            source
        )));
    }

    Ok(records)
}

fn lookup<'a>(row: &'a Value, names: &[&str]) -> Option<&'a Value> {
    names.iter().find_map(|name| {
        let v = row.get(name)?;
        if v.is_null() { None } else { Some(v) }
    })
}

fn str_field(row: &Value, names: &[&str]) -> Option<String> {
    let v = lookup(row, names)?;
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn num_field(row: &Value, names: &[&str]) -> Option<f64> {
    lookup(row, names)?.as_f64()
}

fn uint_field(row: &Value, names: &[&str]) -> Option<u64> {
    let v = lookup(row, names)?;
    v.as_u64().or_else(|| v.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
}

fn int_field(row: &Value, names: &[&str]) -> Option<i64> {
    lookup(row, names)?.as_i64()
}

fn bool_field(row: &Value, names: &[&str]) -> Option<bool> {
    lookup(row, names)?.as_bool()
}
