use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::sets::repo::Flashcard;

/// Which side of the card is shown as the prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StudyMode {
    Term,
    Definition,
    Both,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StudyStyle {
    MultipleChoice,
    Typed,
    Both,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudyOptions {
    pub count: usize,
    pub mode: StudyMode,
    pub shuffle: bool,
    pub repeat: bool,
    pub study_style: StudyStyle,
}

/// One question in a planned study run. The prompt side is shown to the
/// student; grading happens against the opposite side.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedCard {
    pub flashcard_id: Uuid,
    pub prompt: String,
    pub test_term: bool,
    pub is_multiple_choice: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
}

/// Only cards with both sides filled in can be asked.
pub fn eligible_cards(cards: &[Flashcard]) -> Vec<&Flashcard> {
    cards
        .iter()
        .filter(|c| !c.term.is_empty() && !c.definition.is_empty())
        .collect()
}

pub fn asked_side(card: &Flashcard, test_term: bool) -> &str {
    if test_term {
        &card.term
    } else {
        &card.definition
    }
}

pub fn answer_side(card: &Flashcard, test_term: bool) -> &str {
    if test_term {
        &card.definition
    } else {
        &card.term
    }
}

/// Build the question sequence for one run: pick cards, then decide per card
/// how it is asked. Returns an empty plan when no card is eligible.
pub fn plan<R: Rng>(cards: &[Flashcard], options: &StudyOptions, rng: &mut R) -> Vec<PlannedCard> {
    let mut selected = eligible_cards(cards);
    if options.shuffle {
        selected.shuffle(rng);
    }
    selected.truncate(options.count);

    selected
        .iter()
        .map(|card| {
            let is_multiple_choice = match options.study_style {
                StudyStyle::MultipleChoice => true,
                StudyStyle::Typed => false,
                StudyStyle::Both => rng.gen_bool(0.5),
            };
            let test_term = match options.mode {
                StudyMode::Term => true,
                StudyMode::Definition => false,
                StudyMode::Both => rng.gen_bool(0.5),
            };

            let choices = is_multiple_choice.then(|| {
                let pool: Vec<&str> = cards
                    .iter()
                    .map(|other| answer_side(other, test_term))
                    .filter(|v| !v.is_empty())
                    .collect();
                multiple_choice_options(answer_side(card, test_term), &pool, rng)
            });

            PlannedCard {
                flashcard_id: card.id,
                prompt: asked_side(card, test_term).to_string(),
                test_term,
                is_multiple_choice,
                options: choices,
            }
        })
        .collect()
}

/// The correct value plus up to 3 distinct wrong ones from the rest of the
/// deck, in shuffled order. Small decks simply produce fewer options.
pub fn multiple_choice_options<R: Rng>(correct: &str, pool: &[&str], rng: &mut R) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut distractors: Vec<&str> = pool
        .iter()
        .copied()
        .filter(|v| *v != correct && seen.insert(*v))
        .collect();
    distractors.shuffle(rng);
    distractors.truncate(3);

    let mut options: Vec<String> = distractors.into_iter().map(String::from).collect();
    options.push(correct.to_string());
    options.shuffle(rng);
    options
}

pub fn normalize_answer(answer: &str) -> String {
    answer.trim().to_lowercase()
}

/// Exact match after trimming and lowercasing. No fuzz, no partial credit.
pub fn grade(submitted: &str, target: &str) -> bool {
    normalize_answer(submitted) == normalize_answer(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};
    use time::OffsetDateTime;

    fn card(term: &str, definition: &str) -> Flashcard {
        Flashcard {
            id: Uuid::new_v4(),
            term: term.into(),
            definition: definition.into(),
            flashcard_set_id: Uuid::new_v4(),
            created_at: OffsetDateTime::now_utc(),
        }
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(7)
    }

    fn options(style: StudyStyle, mode: StudyMode) -> StudyOptions {
        StudyOptions {
            count: 10,
            mode,
            shuffle: false,
            repeat: false,
            study_style: style,
        }
    }

    #[test]
    fn incomplete_cards_are_not_asked() {
        let cards = vec![card("France", "Paris"), card("", "Rome"), card("Spain", "")];
        assert_eq!(eligible_cards(&cards).len(), 1);
    }

    #[test]
    fn plan_is_empty_for_an_empty_deck() {
        let cards = vec![card("", "Rome")];
        let planned = plan(&cards, &options(StudyStyle::Typed, StudyMode::Term), &mut rng());
        assert!(planned.is_empty());
    }

    #[test]
    fn plan_respects_count_and_order_without_shuffle() {
        let cards = vec![card("a", "1"), card("b", "2"), card("c", "3")];
        let mut opts = options(StudyStyle::Typed, StudyMode::Term);
        opts.count = 2;
        let planned = plan(&cards, &opts, &mut rng());
        assert_eq!(planned.len(), 2);
        assert_eq!(planned[0].prompt, "a");
        assert_eq!(planned[1].prompt, "b");
    }

    #[test]
    fn study_style_forces_question_kind() {
        let cards = vec![card("a", "1"), card("b", "2")];
        let typed = plan(&cards, &options(StudyStyle::Typed, StudyMode::Term), &mut rng());
        assert!(typed.iter().all(|c| !c.is_multiple_choice && c.options.is_none()));

        let mc = plan(
            &cards,
            &options(StudyStyle::MultipleChoice, StudyMode::Term),
            &mut rng(),
        );
        assert!(mc.iter().all(|c| c.is_multiple_choice && c.options.is_some()));
    }

    #[test]
    fn mode_fixes_the_asked_side() {
        let cards = vec![card("France", "Paris")];
        let by_term = plan(&cards, &options(StudyStyle::Typed, StudyMode::Term), &mut rng());
        assert!(by_term[0].test_term);
        assert_eq!(by_term[0].prompt, "France");

        let by_def = plan(
            &cards,
            &options(StudyStyle::Typed, StudyMode::Definition),
            &mut rng(),
        );
        assert!(!by_def[0].test_term);
        assert_eq!(by_def[0].prompt, "Paris");
    }

    #[test]
    fn four_card_decks_always_yield_four_distinct_choices() {
        let cards = vec![
            card("France", "Paris"),
            card("Italy", "Rome"),
            card("Spain", "Madrid"),
            card("Germany", "Berlin"),
            card("Poland", "Warsaw"),
        ];
        for _ in 0..20 {
            let planned = plan(
                &cards,
                &options(StudyStyle::MultipleChoice, StudyMode::Term),
                &mut rand::thread_rng(),
            );
            for question in planned {
                let choices = question.options.expect("multiple choice");
                assert_eq!(choices.len(), 4);
                let distinct: HashSet<&String> = choices.iter().collect();
                assert_eq!(distinct.len(), 4);
                let correct = cards
                    .iter()
                    .find(|c| c.id == question.flashcard_id)
                    .map(|c| answer_side(c, question.test_term))
                    .unwrap();
                assert_eq!(choices.iter().filter(|o| *o == correct).count(), 1);
            }
        }
    }

    #[test]
    fn small_decks_yield_fewer_choices() {
        let cards = vec![card("France", "Paris"), card("Italy", "Rome")];
        let planned = plan(
            &cards,
            &options(StudyStyle::MultipleChoice, StudyMode::Term),
            &mut rng(),
        );
        let choices = planned[0].options.clone().expect("multiple choice");
        assert_eq!(choices.len(), 2);
    }

    #[test]
    fn grading_trims_and_ignores_case() {
        assert!(grade(" Paris ", "paris"));
        assert!(grade("PARIS", "Paris"));
        assert!(!grade("Pariss", "Paris"));
        assert!(!grade("", "Paris"));
    }

    #[test]
    fn study_options_parse_the_wire_shape() {
        let raw = r#"{"count":5,"mode":"both","shuffle":true,"repeat":false,"studyStyle":"multipleChoice"}"#;
        let opts: StudyOptions = serde_json::from_str(raw).unwrap();
        assert_eq!(opts.count, 5);
        assert_eq!(opts.mode, StudyMode::Both);
        assert_eq!(opts.study_style, StudyStyle::MultipleChoice);
    }
}
