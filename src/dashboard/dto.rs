use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_sets: usize,
    pub sets_studied_this_week: usize,
    /// Summed session durations, in milliseconds.
    pub total_study_time: i64,
    pub average_retention_rate: i64,
    pub streak_days: u32,
    pub total_flashcards: i64,
    pub completed_today: usize,
    pub longest_streak: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentSetDto {
    pub id: Uuid,
    pub title: String,
    pub last_studied: String,
    pub progress: i64,
    pub total_cards: i64,
    pub studied_cards: usize,
}

#[derive(Debug, Serialize)]
pub struct WeeklyCount {
    pub day: &'static str,
    pub count: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardResponse {
    pub stats: DashboardStats,
    pub recent_sets: Vec<RecentSetDto>,
    pub weekly_data: Vec<WeeklyCount>,
}
