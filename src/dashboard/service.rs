use std::collections::HashSet;

use time::{Date, Duration, OffsetDateTime};
use uuid::Uuid;

use crate::dashboard::dto::{DashboardStats, RecentSetDto, WeeklyCount};
use crate::dashboard::repo::{SetOverviewRow, StreakRow};

const WEEK_DAYS: [&str; 7] = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"];

/// A study session with its results, as the aggregator consumes them.
#[derive(Debug, Clone)]
pub struct SessionData {
    pub flashcard_set_id: Uuid,
    pub created_at: OffsetDateTime,
    pub completed_at: Option<OffsetDateTime>,
    pub results: Vec<ResultData>,
}

/// Results are kept newest-first within a session.
#[derive(Debug, Clone)]
pub struct ResultData {
    pub flashcard_id: Uuid,
    pub is_correct: bool,
    pub answered_at: OffsetDateTime,
}

/// Sessions abandoned mid-run never got a completion stamp; infer one from
/// the newest answer so they still count.
pub fn backfill_completion(sessions: &mut [SessionData]) {
    for session in sessions {
        if session.completed_at.is_none() {
            session.completed_at = session.results.iter().map(|r| r.answered_at).max();
        }
    }
}

fn session_duration_ms(session: &SessionData) -> i64 {
    session
        .completed_at
        .map(|done| (done - session.created_at).whole_milliseconds() as i64)
        .unwrap_or(0)
}

pub fn compute_stats(
    sets: &[SetOverviewRow],
    sessions: &[SessionData],
    now: OffsetDateTime,
    streak_days: u32,
    longest_streak: u32,
) -> DashboardStats {
    let total_sets = sets.len();
    let total_flashcards = sets.iter().map(|s| s.card_count).sum();

    let sets_studied_this_week = sessions
        .iter()
        .map(|s| s.flashcard_set_id)
        .collect::<HashSet<_>>()
        .len();

    let total_study_time = sessions.iter().map(session_duration_ms).sum();

    let total_cards_studied: usize = sessions.iter().map(|s| s.results.len()).sum();
    let total_correct: usize = sessions
        .iter()
        .map(|s| s.results.iter().filter(|r| r.is_correct).count())
        .sum();
    let average_retention_rate = if total_cards_studied > 0 {
        ((total_correct as f64 / total_cards_studied as f64) * 100.0).round() as i64
    } else {
        0
    };

    let midnight = now.date().midnight().assume_utc();
    let completed_today = sessions
        .iter()
        .filter(|s| s.completed_at.is_some_and(|done| done >= midnight))
        .map(|s| s.results.len())
        .sum();

    DashboardStats {
        total_sets,
        sets_studied_this_week,
        total_study_time,
        average_retention_rate,
        streak_days,
        total_flashcards,
        completed_today,
        longest_streak,
    }
}

pub fn format_time_ago(then: OffsetDateTime, now: OffsetDateTime) -> String {
    let hours = (now - then).whole_hours();
    let days = hours / 24;
    if days > 0 {
        format!("{} day{} ago", days, if days > 1 { "s" } else { "" })
    } else if hours > 0 {
        format!("{} hour{} ago", hours, if hours > 1 { "s" } else { "" })
    } else {
        "Just now".to_string()
    }
}

/// The first five sets of the owned++studying list, annotated with recency
/// and how much of the set the recent sessions covered.
pub fn recent_sets(
    sets: &[SetOverviewRow],
    sessions: &[SessionData],
    now: OffsetDateTime,
) -> Vec<RecentSetDto> {
    sets.iter()
        .take(5)
        .map(|set| {
            let set_sessions: Vec<&SessionData> = sessions
                .iter()
                .filter(|s| s.flashcard_set_id == set.id)
                .collect();

            let studied_cards = set_sessions
                .iter()
                .flat_map(|s| s.results.iter().map(|r| r.flashcard_id))
                .collect::<HashSet<_>>()
                .len();

            let progress = if set.card_count > 0 {
                let pct = ((studied_cards as f64 / set.card_count as f64) * 100.0).round() as i64;
                pct.min(100)
            } else {
                0
            };

            let last_studied = set_sessions
                .first()
                .and_then(|s| s.results.first())
                .map(|r| format_time_ago(r.answered_at, now))
                .unwrap_or_else(|| "Never".to_string());

            RecentSetDto {
                id: set.id,
                title: set.title.clone(),
                last_studied,
                progress,
                total_cards: set.card_count,
                studied_cards,
            }
        })
        .collect()
}

/// Answer counts per calendar day of the current Monday-based week.
pub fn weekly_data(sessions: &[SessionData], today: Date) -> Vec<WeeklyCount> {
    let mut counts = [0usize; 7];
    let start_of_week = today - Duration::days(today.weekday().number_days_from_monday() as i64);
    let week_start = start_of_week.midnight().assume_utc();

    for session in sessions {
        let Some(done) = session.completed_at else {
            continue;
        };
        if done >= week_start {
            let index = done.date().weekday().number_days_from_monday() as usize;
            counts[index] += session.results.len();
        }
    }

    WEEK_DAYS
        .iter()
        .copied()
        .zip(counts)
        .map(|(day, count)| WeeklyCount { day, count })
        .collect()
}

/// Distinct calendar dates on which the user studied, judged by completion,
/// else the newest answer, else session creation.
pub fn study_dates(rows: &[StreakRow]) -> HashSet<Date> {
    rows.iter()
        .map(|row| {
            row.completed_at
                .or(row.last_answered)
                .unwrap_or(row.created_at)
                .date()
        })
        .collect()
}

/// Consecutive study days ending today.
pub fn current_streak(dates: &HashSet<Date>, today: Date) -> u32 {
    let mut streak = 0;
    let mut day = today;
    while dates.contains(&day) {
        streak += 1;
        match day.previous_day() {
            Some(prev) => day = prev,
            None => break,
        }
    }
    streak
}

/// Longest run of consecutive study days anywhere in the history.
pub fn longest_streak(dates: &HashSet<Date>) -> u32 {
    let mut sorted: Vec<Date> = dates.iter().copied().collect();
    sorted.sort_unstable();

    let mut longest = 0u32;
    let mut run = 0u32;
    let mut previous: Option<Date> = None;
    for date in sorted {
        run = match previous {
            Some(prev) if prev.next_day() == Some(date) => run + 1,
            _ => 1,
        };
        longest = longest.max(run);
        previous = Some(date);
    }
    longest
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    fn session(
        set_id: Uuid,
        created_at: OffsetDateTime,
        completed_at: Option<OffsetDateTime>,
        results: Vec<ResultData>,
    ) -> SessionData {
        SessionData {
            flashcard_set_id: set_id,
            created_at,
            completed_at,
            results,
        }
    }

    fn result(is_correct: bool, answered_at: OffsetDateTime) -> ResultData {
        ResultData {
            flashcard_id: Uuid::new_v4(),
            is_correct,
            answered_at,
        }
    }

    fn overview(card_count: i64) -> SetOverviewRow {
        SetOverviewRow {
            id: Uuid::new_v4(),
            title: "Capitals".into(),
            card_count,
        }
    }

    fn streak_row(at: OffsetDateTime) -> StreakRow {
        StreakRow {
            created_at: at,
            completed_at: Some(at),
            last_answered: None,
        }
    }

    #[test]
    fn backfill_uses_the_newest_answer() {
        let created = datetime!(2026-08-03 10:00 UTC);
        let mut sessions = vec![session(
            Uuid::new_v4(),
            created,
            None,
            vec![
                result(true, datetime!(2026-08-03 10:05 UTC)),
                result(true, datetime!(2026-08-03 10:12 UTC)),
            ],
        )];
        backfill_completion(&mut sessions);
        assert_eq!(
            sessions[0].completed_at,
            Some(datetime!(2026-08-03 10:12 UTC))
        );
    }

    #[test]
    fn backfill_leaves_resultless_sessions_open() {
        let mut sessions = vec![session(
            Uuid::new_v4(),
            datetime!(2026-08-03 10:00 UTC),
            None,
            vec![],
        )];
        backfill_completion(&mut sessions);
        assert!(sessions[0].completed_at.is_none());
    }

    #[test]
    fn retention_rate_rounds_and_handles_zero() {
        let now = datetime!(2026-08-06 12:00 UTC);
        let set_id = Uuid::new_v4();
        let results: Vec<ResultData> = (0..10)
            .map(|i| result(i < 8, datetime!(2026-08-06 09:00 UTC)))
            .collect();
        let sessions = vec![session(
            set_id,
            datetime!(2026-08-06 09:00 UTC),
            Some(datetime!(2026-08-06 09:30 UTC)),
            results,
        )];

        let stats = compute_stats(&[], &sessions, now, 0, 0);
        assert_eq!(stats.average_retention_rate, 80);

        let empty = compute_stats(&[], &[], now, 0, 0);
        assert_eq!(empty.average_retention_rate, 0);
    }

    #[test]
    fn study_time_is_summed_in_milliseconds() {
        let now = datetime!(2026-08-06 12:00 UTC);
        let sessions = vec![
            session(
                Uuid::new_v4(),
                datetime!(2026-08-06 09:00 UTC),
                Some(datetime!(2026-08-06 09:30 UTC)),
                vec![],
            ),
            // no completion stamp: contributes nothing
            session(Uuid::new_v4(), datetime!(2026-08-06 10:00 UTC), None, vec![]),
        ];
        let stats = compute_stats(&[], &sessions, now, 0, 0);
        assert_eq!(stats.total_study_time, 30 * 60 * 1000);
    }

    #[test]
    fn set_totals_count_the_concatenated_list() {
        let now = datetime!(2026-08-06 12:00 UTC);
        let stats = compute_stats(&[overview(3), overview(4)], &[], now, 0, 0);
        assert_eq!(stats.total_sets, 2);
        assert_eq!(stats.total_flashcards, 7);
    }

    #[test]
    fn completed_today_counts_answers_since_midnight() {
        let now = datetime!(2026-08-06 18:00 UTC);
        let sessions = vec![
            session(
                Uuid::new_v4(),
                datetime!(2026-08-06 08:00 UTC),
                Some(datetime!(2026-08-06 08:30 UTC)),
                vec![result(true, datetime!(2026-08-06 08:10 UTC)); 3],
            ),
            session(
                Uuid::new_v4(),
                datetime!(2026-08-05 08:00 UTC),
                Some(datetime!(2026-08-05 08:30 UTC)),
                vec![result(true, datetime!(2026-08-05 08:10 UTC)); 5],
            ),
        ];
        let stats = compute_stats(&[], &sessions, now, 0, 0);
        assert_eq!(stats.completed_today, 3);
    }

    #[test]
    fn current_streak_counts_back_from_today() {
        let today = date!(2026 - 08 - 06);
        let dates: HashSet<Date> = [
            date!(2026 - 08 - 06),
            date!(2026 - 08 - 05),
            date!(2026 - 08 - 04),
        ]
        .into_iter()
        .collect();
        assert_eq!(current_streak(&dates, today), 3);
    }

    #[test]
    fn a_gap_resets_the_current_streak() {
        let today = date!(2026 - 08 - 06);
        let dates: HashSet<Date> = [date!(2026 - 08 - 06), date!(2026 - 08 - 03)]
            .into_iter()
            .collect();
        assert_eq!(current_streak(&dates, today), 1);
    }

    #[test]
    fn no_study_today_means_zero_streak() {
        let today = date!(2026 - 08 - 06);
        let dates: HashSet<Date> = [date!(2026 - 08 - 05)].into_iter().collect();
        assert_eq!(current_streak(&dates, today), 0);
        assert_eq!(current_streak(&HashSet::new(), today), 0);
    }

    #[test]
    fn longest_streak_scans_the_whole_history() {
        let dates: HashSet<Date> = [
            date!(2026 - 08 - 06),
            date!(2026 - 08 - 05),
            // gap
            date!(2026 - 07 - 30),
            date!(2026 - 07 - 29),
            date!(2026 - 07 - 28),
        ]
        .into_iter()
        .collect();
        assert_eq!(longest_streak(&dates), 3);
        assert_eq!(current_streak(&dates, date!(2026 - 08 - 06)), 2);
    }

    #[test]
    fn study_dates_prefer_completion_then_answers_then_creation() {
        let rows = vec![
            StreakRow {
                created_at: datetime!(2026-08-01 23:00 UTC),
                completed_at: Some(datetime!(2026-08-02 00:10 UTC)),
                last_answered: Some(datetime!(2026-08-01 23:50 UTC)),
            },
            StreakRow {
                created_at: datetime!(2026-08-03 10:00 UTC),
                completed_at: None,
                last_answered: Some(datetime!(2026-08-04 00:01 UTC)),
            },
            StreakRow {
                created_at: datetime!(2026-08-05 10:00 UTC),
                completed_at: None,
                last_answered: None,
            },
        ];
        let dates = study_dates(&rows);
        assert!(dates.contains(&date!(2026 - 08 - 02)));
        assert!(dates.contains(&date!(2026 - 08 - 04)));
        assert!(dates.contains(&date!(2026 - 08 - 05)));
        assert_eq!(dates.len(), 3);
    }

    #[test]
    fn weekly_buckets_start_on_monday() {
        // 2026-08-03 is a Monday, 2026-08-06 a Thursday.
        let today = date!(2026 - 08 - 06);
        let sessions = vec![
            session(
                Uuid::new_v4(),
                datetime!(2026-08-03 09:00 UTC),
                Some(datetime!(2026-08-03 09:30 UTC)),
                vec![result(true, datetime!(2026-08-03 09:10 UTC)); 2],
            ),
            session(
                Uuid::new_v4(),
                datetime!(2026-08-05 09:00 UTC),
                Some(datetime!(2026-08-05 09:30 UTC)),
                vec![result(false, datetime!(2026-08-05 09:10 UTC)); 4],
            ),
            // previous week: ignored
            session(
                Uuid::new_v4(),
                datetime!(2026-07-30 09:00 UTC),
                Some(datetime!(2026-07-30 09:30 UTC)),
                vec![result(true, datetime!(2026-07-30 09:10 UTC)); 9],
            ),
        ];
        let data = weekly_data(&sessions, today);
        assert_eq!(data[0].day, "Mon");
        assert_eq!(data[0].count, 2);
        assert_eq!(data[2].day, "Wed");
        assert_eq!(data[2].count, 4);
        assert_eq!(data.iter().map(|d| d.count).sum::<usize>(), 6);
    }

    #[test]
    fn recent_sets_report_progress_and_recency() {
        let now = datetime!(2026-08-06 12:00 UTC);
        let set = overview(4);
        let card_a = Uuid::new_v4();
        let card_b = Uuid::new_v4();
        let sessions = vec![session(
            set.id,
            datetime!(2026-08-04 09:00 UTC),
            Some(datetime!(2026-08-04 09:30 UTC)),
            vec![
                ResultData {
                    flashcard_id: card_a,
                    is_correct: true,
                    answered_at: datetime!(2026-08-04 09:20 UTC),
                },
                ResultData {
                    flashcard_id: card_b,
                    is_correct: false,
                    answered_at: datetime!(2026-08-04 09:10 UTC),
                },
                // repeat of card_a does not inflate coverage
                ResultData {
                    flashcard_id: card_a,
                    is_correct: true,
                    answered_at: datetime!(2026-08-04 09:05 UTC),
                },
            ],
        )];

        let recents = recent_sets(&[set], &sessions, now);
        assert_eq!(recents.len(), 1);
        assert_eq!(recents[0].studied_cards, 2);
        assert_eq!(recents[0].progress, 50);
        assert_eq!(recents[0].last_studied, "2 days ago");
    }

    #[test]
    fn recent_sets_cap_progress_and_handle_empty_sets() {
        let now = datetime!(2026-08-06 12:00 UTC);
        let set = overview(1);
        let sessions = vec![session(
            set.id,
            datetime!(2026-08-06 11:30 UTC),
            Some(datetime!(2026-08-06 11:40 UTC)),
            vec![
                result(true, datetime!(2026-08-06 11:35 UTC)),
                result(true, datetime!(2026-08-06 11:36 UTC)),
            ],
        )];
        let recents = recent_sets(&[set, overview(0)], &sessions, now);
        assert_eq!(recents[0].progress, 100);
        assert_eq!(recents[0].last_studied, "Just now");
        assert_eq!(recents[1].progress, 0);
        assert_eq!(recents[1].last_studied, "Never");
    }

    #[test]
    fn time_ago_buckets() {
        let now = datetime!(2026-08-06 12:00 UTC);
        assert_eq!(format_time_ago(datetime!(2026-08-06 11:59 UTC), now), "Just now");
        assert_eq!(format_time_ago(datetime!(2026-08-06 09:00 UTC), now), "3 hours ago");
        assert_eq!(format_time_ago(datetime!(2026-08-05 11:00 UTC), now), "1 day ago");
        assert_eq!(format_time_ago(datetime!(2026-08-01 12:00 UTC), now), "5 days ago");
    }

    #[test]
    fn streak_rows_feed_both_streak_shapes() {
        // {today, yesterday, day-before} -> 3
        let rows: Vec<StreakRow> = [
            datetime!(2026-08-06 10:00 UTC),
            datetime!(2026-08-05 10:00 UTC),
            datetime!(2026-08-04 10:00 UTC),
        ]
        .into_iter()
        .map(streak_row)
        .collect();
        let dates = study_dates(&rows);
        assert_eq!(current_streak(&dates, date!(2026 - 08 - 06)), 3);

        // {today, 3-days-ago} -> 1
        let rows: Vec<StreakRow> = [
            datetime!(2026-08-06 10:00 UTC),
            datetime!(2026-08-03 10:00 UTC),
        ]
        .into_iter()
        .map(streak_row)
        .collect();
        let dates = study_dates(&rows);
        assert_eq!(current_streak(&dates, date!(2026 - 08 - 06)), 1);
    }
}
