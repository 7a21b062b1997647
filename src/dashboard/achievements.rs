use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

use crate::auth::repo::User;

/// Stat snapshot the badge rules are evaluated against. Study time arrives
/// here already converted to minutes.
#[derive(Debug, Clone, Copy)]
pub struct StatsSnapshot {
    pub total_sets: usize,
    pub streak_days: u32,
    pub total_study_time_minutes: i64,
    pub average_retention_rate: i64,
}

pub struct AchievementRule {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
    pub icon: &'static str,
    pub color: &'static str,
    pub trigger: fn(&StatsSnapshot) -> bool,
}

pub static ACHIEVEMENTS: &[AchievementRule] = &[
    AchievementRule {
        id: "first-set",
        title: "First Set",
        description: "Create your first flashcard set",
        icon: "BookOpen",
        color: "blue",
        trigger: |s| s.total_sets == 1,
    },
    AchievementRule {
        id: "streak-1",
        title: "First Day",
        description: "Complete your first day of studying",
        icon: "Flame",
        color: "green",
        trigger: |s| s.streak_days >= 1,
    },
    AchievementRule {
        id: "streak-3",
        title: "3-Day Streak",
        description: "Study for 3 consecutive days",
        icon: "Flame",
        color: "orange",
        trigger: |s| s.streak_days >= 3,
    },
    AchievementRule {
        id: "streak-7",
        title: "Week Warrior",
        description: "Study for 7 consecutive days",
        icon: "Flame",
        color: "red",
        trigger: |s| s.streak_days >= 7,
    },
    AchievementRule {
        id: "streak-30",
        title: "Monthly Master",
        description: "Study for 30 consecutive days",
        icon: "Flame",
        color: "purple",
        trigger: |s| s.streak_days >= 30,
    },
    AchievementRule {
        id: "sets-5",
        title: "Set Collector",
        description: "Create 5 flashcard sets",
        icon: "BookOpen",
        color: "blue",
        trigger: |s| s.total_sets >= 5,
    },
    AchievementRule {
        id: "sets-10",
        title: "Set Master",
        description: "Create 10 flashcard sets",
        icon: "BookOpen",
        color: "blue",
        trigger: |s| s.total_sets >= 10,
    },
    AchievementRule {
        id: "time-60",
        title: "Hour Learner",
        description: "Study for 1 hour total",
        icon: "Target",
        color: "green",
        trigger: |s| s.total_study_time_minutes >= 60,
    },
    AchievementRule {
        id: "time-300",
        title: "Dedicated Student",
        description: "Study for 5 hours total",
        icon: "Target",
        color: "orange",
        trigger: |s| s.total_study_time_minutes >= 300,
    },
    AchievementRule {
        id: "retention-80",
        title: "High Retention",
        description: "Achieve 80%+ retention rate",
        icon: "Star",
        color: "yellow",
        trigger: |s| s.average_retention_rate >= 80,
    },
    AchievementRule {
        id: "retention-90",
        title: "Memory Master",
        description: "Achieve 90%+ retention rate",
        icon: "Star",
        color: "yellow",
        trigger: |s| s.average_retention_rate >= 90,
    },
];

/// What actually gets persisted on the user row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantedAchievement {
    pub id: String,
    pub title: String,
    pub description: String,
    pub icon: String,
    pub color: String,
}

impl From<&AchievementRule> for GrantedAchievement {
    fn from(rule: &AchievementRule) -> Self {
        Self {
            id: rule.id.into(),
            title: rule.title.into(),
            description: rule.description.into(),
            icon: rule.icon.into(),
            color: rule.color.into(),
        }
    }
}

/// Rules not yet granted whose predicate holds for this snapshot. Granted
/// badges are never re-evaluated, so the grant is a one-way ratchet.
pub fn evaluate<'a>(
    granted: &HashSet<String>,
    snapshot: &StatsSnapshot,
) -> Vec<&'a AchievementRule> {
    ACHIEVEMENTS
        .iter()
        .filter(|rule| !granted.contains(rule.id))
        .filter(|rule| (rule.trigger)(snapshot))
        .collect()
}

/// Load the user's badge list, append what the snapshot newly satisfies,
/// persist the union in one update.
pub async fn check_for_achievements(
    db: &PgPool,
    user_id: Uuid,
    snapshot: &StatsSnapshot,
) -> anyhow::Result<()> {
    let stored = User::achievements(db, user_id)
        .await?
        .ok_or_else(|| anyhow::anyhow!("user not found"))?;

    let mut granted: Vec<GrantedAchievement> =
        serde_json::from_value(stored).unwrap_or_default();
    let granted_ids: HashSet<String> = granted.iter().map(|a| a.id.clone()).collect();

    let new_rules = evaluate(&granted_ids, snapshot);
    if new_rules.is_empty() {
        debug!(%user_id, "no new achievements");
        return Ok(());
    }

    info!(%user_id, count = new_rules.len(), "granting achievements");
    granted.extend(new_rules.into_iter().map(GrantedAchievement::from));
    User::set_achievements(db, user_id, &serde_json::to_value(&granted)?).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(
        total_sets: usize,
        streak_days: u32,
        minutes: i64,
        retention: i64,
    ) -> StatsSnapshot {
        StatsSnapshot {
            total_sets,
            streak_days,
            total_study_time_minutes: minutes,
            average_retention_rate: retention,
        }
    }

    fn ids(rules: &[&AchievementRule]) -> Vec<&'static str> {
        rules.iter().map(|r| r.id).collect()
    }

    #[test]
    fn fresh_user_with_one_set_gets_first_set() {
        let new = evaluate(&HashSet::new(), &snapshot(1, 0, 0, 0));
        assert_eq!(ids(&new), vec!["first-set"]);
    }

    #[test]
    fn thresholds_are_inclusive() {
        let new = evaluate(&HashSet::new(), &snapshot(5, 7, 60, 80));
        let ids = ids(&new);
        assert!(ids.contains(&"sets-5"));
        assert!(ids.contains(&"streak-7"));
        assert!(ids.contains(&"streak-3"));
        assert!(ids.contains(&"time-60"));
        assert!(ids.contains(&"retention-80"));
        assert!(!ids.contains(&"retention-90"));
        assert!(!ids.contains(&"sets-10"));
    }

    #[test]
    fn granted_badges_are_never_reconsidered() {
        let granted: HashSet<String> = ["sets-5".to_string()].into_iter().collect();
        // totalSets dropped below the threshold after deletions
        let new = evaluate(&granted, &snapshot(2, 0, 0, 0));
        assert!(!ids(&new).contains(&"sets-5"));
    }

    #[test]
    fn nothing_fires_on_an_empty_snapshot() {
        assert!(evaluate(&HashSet::new(), &snapshot(0, 0, 0, 0)).is_empty());
    }

    #[test]
    fn granted_records_carry_display_fields() {
        let rule = ACHIEVEMENTS.iter().find(|r| r.id == "streak-7").unwrap();
        let granted = GrantedAchievement::from(rule);
        let json = serde_json::to_value(&granted).unwrap();
        assert_eq!(json["title"], "Week Warrior");
        assert_eq!(json["icon"], "Flame");
        assert_eq!(json["color"], "red");
    }
}
