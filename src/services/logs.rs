//! Weekly logs: creation, edits and the per-team uniqueness rules.
//!
//! Within one team a week number is used at most once and no two logs cover
//! overlapping date ranges (bounds inclusive). Creation and edits run their
//! checks and the write in one store transaction.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::dates;
use crate::error::{AppError, AppResult};
use crate::models::{Activity, Log, LogStatus, Team, User};
use crate::services::with_retry;
use crate::store::{Store, StoreTx};

#[derive(Debug, Clone)]
pub struct NewActivity {
    pub date: NaiveDate,
    pub hours: f64,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct NewLog {
    pub team_id: String,
    pub week_number: u32,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub activities: Vec<NewActivity>,
    pub created_by: String,
    pub created_by_name: String,
}

/// Fields an edit may change. The author is not among them.
#[derive(Debug, Clone, Default)]
pub struct LogPatch {
    pub week_number: Option<u32>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub activities: Option<Vec<NewActivity>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamSummary {
    pub team_id: String,
    pub total_logs: usize,
    pub by_status: BTreeMap<LogStatus, usize>,
    pub total_hours: f64,
    pub latest_week: Option<u32>,
}

/// Inclusive interval overlap: `[start1, end1]` and `[start2, end2]` share at
/// least one instant.
pub fn ranges_overlap<T: PartialOrd>(start1: T, end1: T, start2: T, end2: T) -> bool {
    start1 <= end2 && start2 <= end1
}

fn is_excluded(log: &Log, exclude_id: Option<&str>) -> bool {
    exclude_id.is_some_and(|id| id == log.id)
}

fn week_taken(logs: &[Log], week_number: u32, exclude_id: Option<&str>) -> bool {
    logs.iter()
        .any(|log| !is_excluded(log, exclude_id) && log.week_number == week_number)
}

fn range_taken(
    logs: &[Log],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    exclude_id: Option<&str>,
) -> bool {
    logs.iter().any(|log| {
        !is_excluded(log, exclude_id) && ranges_overlap(start, end, log.start_date, log.end_date)
    })
}

fn validate_range(week_number: u32, start: DateTime<Utc>, end: DateTime<Utc>) -> AppResult<()> {
    if week_number == 0 {
        return Err(AppError::Validation("weekNumber must be positive".to_string()));
    }
    if start > end {
        return Err(AppError::Validation(
            "startDate must not be after endDate".to_string(),
        ));
    }
    Ok(())
}

fn check_activity(activity: &Activity, start: DateTime<Utc>, end: DateTime<Utc>) -> AppResult<()> {
    if !activity.hours.is_finite() || activity.hours < 0.0 {
        return Err(AppError::Validation(
            "activity hours must be zero or more".to_string(),
        ));
    }
    if activity.date < start || activity.date > end {
        return Err(AppError::ActivityOutOfRange {
            date: dates::from_storage_instant(activity.date).to_string(),
        });
    }
    Ok(())
}

fn build_activities(
    input: &[NewActivity],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> AppResult<Vec<Activity>> {
    input
        .iter()
        .map(|a| {
            let activity = Activity {
                date: dates::to_storage_instant(a.date),
                hours: a.hours,
                description: a.description.trim().to_string(),
            };
            check_activity(&activity, start, end)?;
            Ok(activity)
        })
        .collect()
}

async fn ensure_unique(
    tx: &mut StoreTx,
    team_id: &str,
    week_number: Option<u32>,
    range: Option<(DateTime<Utc>, DateTime<Utc>)>,
    exclude_id: Option<&str>,
) -> AppResult<()> {
    let logs: Vec<Log> = tx.find_by("teamId", team_id).await?;
    if let Some(week) = week_number {
        if week_taken(&logs, week, exclude_id) {
            return Err(AppError::DuplicateWeek { week });
        }
    }
    if let Some((start, end)) = range {
        if range_taken(&logs, start, end, exclude_id) {
            return Err(AppError::OverlappingRange);
        }
    }
    Ok(())
}

pub struct LogService;

impl LogService {
    pub async fn is_week_number_exists(
        store: &Store,
        week_number: u32,
        team_id: &str,
        exclude_id: Option<&str>,
    ) -> AppResult<bool> {
        let logs: Vec<Log> = store.find_by("teamId", team_id).await?;
        Ok(week_taken(&logs, week_number, exclude_id))
    }

    pub async fn is_date_range_overlapping(
        store: &Store,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        team_id: &str,
        exclude_id: Option<&str>,
    ) -> AppResult<bool> {
        let logs: Vec<Log> = store.find_by("teamId", team_id).await?;
        Ok(range_taken(&logs, start, end, exclude_id))
    }

    pub async fn create_log(store: &Store, candidate: NewLog) -> AppResult<Log> {
        let start = dates::to_storage_instant(candidate.start_date);
        let end = dates::to_storage_instant(candidate.end_date);
        validate_range(candidate.week_number, start, end)?;
        let activities = build_activities(&candidate.activities, start, end)?;

        let now = Utc::now();
        let log = Log {
            id: Uuid::new_v4().to_string(),
            team_id: candidate.team_id,
            week_number: candidate.week_number,
            start_date: start,
            end_date: end,
            activities,
            status: LogStatus::Draft,
            created_by: candidate.created_by,
            created_by_name: candidate.created_by_name,
            comments: Vec::new(),
            created_at: now,
            updated_at: now,
        };

        with_retry(store, "create_log", || Self::insert_checked(store, &log)).await?;

        tracing::info!(
            log_id = %log.id,
            team_id = %log.team_id,
            week = log.week_number,
            "log created"
        );
        Ok(log)
    }

    async fn insert_checked(store: &Store, log: &Log) -> AppResult<()> {
        let mut tx = store.begin().await?;
        if tx.get::<Team>(&log.team_id).await?.is_none() {
            return Err(AppError::not_found("team"));
        }
        ensure_unique(
            &mut tx,
            &log.team_id,
            Some(log.week_number),
            Some((log.start_date, log.end_date)),
            None,
        )
        .await?;
        tx.insert(log).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Apply `patch` on behalf of `actor`. Edit rights are judged on the copy
    /// read inside the transaction, so a concurrent submit wins.
    pub async fn update_log(store: &Store, id: &str, actor: &User, patch: LogPatch) -> AppResult<Log> {
        let log = with_retry(store, "update_log", || {
            Self::apply_patch(store, id, actor, &patch)
        })
        .await?;
        tracing::info!(log_id = %log.id, actor = %actor.id, "log updated");
        Ok(log)
    }

    async fn apply_patch(store: &Store, id: &str, actor: &User, patch: &LogPatch) -> AppResult<Log> {
        let mut tx = store.begin().await?;
        let mut log: Log = tx
            .get(id)
            .await?
            .ok_or_else(|| AppError::not_found("log"))?;
        Self::ensure_can_edit(&log, actor)?;

        let week_number = patch.week_number.unwrap_or(log.week_number);
        let start = patch
            .start_date
            .map(dates::to_storage_instant)
            .unwrap_or(log.start_date);
        let end = patch
            .end_date
            .map(dates::to_storage_instant)
            .unwrap_or(log.end_date);
        validate_range(week_number, start, end)?;

        let week_changed = week_number != log.week_number;
        let range_changed = start != log.start_date || end != log.end_date;

        let activities = match &patch.activities {
            Some(input) => build_activities(input, start, end)?,
            None => {
                for activity in &log.activities {
                    check_activity(activity, start, end)?;
                }
                std::mem::take(&mut log.activities)
            }
        };

        if week_changed || range_changed {
            ensure_unique(
                &mut tx,
                &log.team_id,
                week_changed.then_some(week_number),
                range_changed.then_some((start, end)),
                Some(&log.id),
            )
            .await?;
        }

        log.week_number = week_number;
        log.start_date = start;
        log.end_date = end;
        log.activities = activities;
        log.updated_at = Utc::now();

        tx.put(&log).await?;
        tx.commit().await?;
        Ok(log)
    }

    pub async fn get_log(store: &Store, id: &str) -> AppResult<Log> {
        store
            .get(id)
            .await?
            .ok_or_else(|| AppError::not_found("log"))
    }

    pub async fn delete_log(store: &Store, id: &str) -> AppResult<()> {
        if !store.delete::<Log>(id).await? {
            return Err(AppError::not_found("log"));
        }
        tracing::info!(log_id = id, "log deleted");
        Ok(())
    }

    /// Ordered by week.
    pub async fn list_team_logs(store: &Store, team_id: &str) -> AppResult<Vec<Log>> {
        let mut logs: Vec<Log> = store.find_by("teamId", team_id).await?;
        logs.sort_by_key(|log| log.week_number);
        Ok(logs)
    }

    pub async fn list_author_logs(store: &Store, user_id: &str) -> AppResult<Vec<Log>> {
        let mut logs: Vec<Log> = store.find_by("createdBy", user_id).await?;
        logs.sort_by(|a, b| a.start_date.cmp(&b.start_date));
        Ok(logs)
    }

    pub async fn team_summary(store: &Store, team_id: &str) -> AppResult<TeamSummary> {
        let logs = Self::list_team_logs(store, team_id).await?;

        let mut by_status = BTreeMap::new();
        for log in &logs {
            *by_status.entry(log.status).or_insert(0) += 1;
        }

        Ok(TeamSummary {
            team_id: team_id.to_string(),
            total_logs: logs.len(),
            by_status,
            total_hours: logs.iter().map(Log::total_hours).sum(),
            latest_week: logs.iter().map(|log| log.week_number).max(),
        })
    }

    /// Leaders and members write logs for their team.
    pub fn ensure_can_author(team: &Team, actor: &User) -> AppResult<()> {
        let member = team.leader_id == actor.id || team.member_ids.contains(&actor.id);
        if member || actor.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden("only team members can write logs".to_string()))
        }
    }

    pub fn ensure_can_view(team: &Team, actor: &User) -> AppResult<()> {
        if team.is_participant(&actor.id) || actor.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden("not a participant of this team".to_string()))
        }
    }

    /// Authors edit while the log is a draft or sent back; admins at any time.
    pub fn ensure_can_edit(log: &Log, actor: &User) -> AppResult<()> {
        if actor.is_admin() {
            return Ok(());
        }
        if log.created_by != actor.id {
            return Err(AppError::Forbidden("only the author can edit a log".to_string()));
        }
        match log.status {
            LogStatus::Draft | LogStatus::NeedsRevision => Ok(()),
            status => Err(AppError::Forbidden(format!(
                "a {status} log cannot be edited"
            ))),
        }
    }

    pub fn ensure_can_delete(team: &Team, actor: &User) -> AppResult<()> {
        if team.leader_id == actor.id || actor.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "only the team lead can delete logs".to_string(),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        dates::storage_instant_from_ymd(y, m, d).unwrap()
    }

    #[test]
    fn shared_boundary_day_overlaps() {
        assert!(ranges_overlap(
            day(2025, 1, 1),
            day(2025, 1, 7),
            day(2025, 1, 7),
            day(2025, 1, 14)
        ));
    }

    #[test]
    fn adjacent_ranges_do_not_overlap() {
        assert!(!ranges_overlap(
            day(2025, 1, 1),
            day(2025, 1, 5),
            day(2025, 1, 6),
            day(2025, 1, 10)
        ));
    }

    #[test]
    fn overlap_is_symmetric_and_covers_containment() {
        let cases = [
            ((1, 10), (3, 4), true),
            ((3, 4), (1, 10), true),
            ((1, 2), (5, 6), false),
            ((5, 6), (1, 2), false),
            ((1, 1), (1, 1), true),
        ];
        for ((a, b), (c, d), expected) in cases {
            assert_eq!(ranges_overlap(a, b, c, d), expected);
            assert_eq!(ranges_overlap(c, d, a, b), expected);
        }
    }

    #[test]
    fn activity_after_end_is_out_of_range() {
        let input = [NewActivity {
            date: NaiveDate::from_ymd_opt(2025, 1, 8).unwrap(),
            hours: 2.0,
            description: "late".into(),
        }];
        let err = build_activities(&input, day(2025, 1, 1), day(2025, 1, 7)).unwrap_err();
        assert!(matches!(err, AppError::ActivityOutOfRange { ref date } if date == "2025-01-08"));
    }

    #[test]
    fn activity_on_boundaries_is_accepted() {
        let input = [
            NewActivity {
                date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
                hours: 0.0,
                description: "kickoff".into(),
            },
            NewActivity {
                date: NaiveDate::from_ymd_opt(2025, 1, 7).unwrap(),
                hours: 4.5,
                description: "wrap-up".into(),
            },
        ];
        let activities = build_activities(&input, day(2025, 1, 1), day(2025, 1, 7)).unwrap();
        assert_eq!(activities.len(), 2);
    }

    #[test]
    fn negative_or_nan_hours_are_rejected() {
        for hours in [-1.0, f64::NAN, f64::INFINITY] {
            let input = [NewActivity {
                date: NaiveDate::from_ymd_opt(2025, 1, 2).unwrap(),
                hours,
                description: String::new(),
            }];
            assert!(matches!(
                build_activities(&input, day(2025, 1, 1), day(2025, 1, 7)),
                Err(AppError::Validation(_))
            ));
        }
    }

    #[test]
    fn week_zero_and_inverted_ranges_are_rejected() {
        assert!(validate_range(0, day(2025, 1, 1), day(2025, 1, 7)).is_err());
        assert!(validate_range(1, day(2025, 1, 8), day(2025, 1, 7)).is_err());
        assert!(validate_range(1, day(2025, 1, 7), day(2025, 1, 7)).is_ok());
    }
}
