use std::collections::HashMap;

use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde::Serialize;
use tracing::instrument;

use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/tags/trending", get(trending))
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct TagCount {
    pub tag: String,
    pub count: usize,
}

/// Labels are stored as one comma-joined string per set; tally them across
/// all labeled sets and keep the ten most used.
pub fn count_tags<I: IntoIterator<Item = String>>(labels: I, limit: usize) -> Vec<TagCount> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for label in labels {
        for tag in label.split(',') {
            let tag = tag.trim().to_lowercase();
            if !tag.is_empty() {
                *counts.entry(tag).or_default() += 1;
            }
        }
    }

    let mut tags: Vec<TagCount> = counts
        .into_iter()
        .map(|(tag, count)| TagCount { tag, count })
        .collect();
    // count first, then alphabetically so ties are stable
    tags.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.tag.cmp(&b.tag)));
    tags.truncate(limit);
    tags
}

#[instrument(skip(state))]
pub async fn trending(
    State(state): State<AppState>,
) -> Result<Json<Vec<TagCount>>, (StatusCode, String)> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT labels FROM flashcard_sets WHERE labels IS NOT NULL")
            .fetch_all(&state.db)
            .await
            .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(count_tags(rows.into_iter().map(|(l,)| l), 10)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_trimmed_lowercased_and_counted() {
        let labels = vec![
            "Biology, cells".to_string(),
            "biology,  DNA ".to_string(),
            "chemistry".to_string(),
        ];
        let tags = count_tags(labels, 10);
        assert_eq!(tags[0].tag, "biology");
        assert_eq!(tags[0].count, 2);
        assert!(tags.iter().any(|t| t.tag == "dna" && t.count == 1));
    }

    #[test]
    fn empty_fragments_are_skipped() {
        let labels = vec![" , ,math,".to_string()];
        let tags = count_tags(labels, 10);
        assert_eq!(tags.len(), 1);
        assert_eq!(tags[0].tag, "math");
    }

    #[test]
    fn only_the_top_n_survive() {
        let labels: Vec<String> = (0..15usize)
            .flat_map(|i| std::iter::repeat(format!("tag{i}")).take(i + 1))
            .collect();
        let tags = count_tags(labels, 10);
        assert_eq!(tags.len(), 10);
        assert_eq!(tags[0].tag, "tag14");
        assert_eq!(tags[0].count, 15);
    }
}
