use crate::domain::models::{Question, QuestionType, SurveyResponse};
use serde::Serialize;
use std::collections::HashMap;

pub const UNKNOWN_QUESTION: &str = "Unknown Question";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AnswerCount {
    pub answer: String,
    pub count: u64,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionSummary {
    pub question_id: String,
    pub question: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub total_answers: u64,
    pub distribution: Vec<AnswerCount>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SurveySummary {
    pub total_responses: u64,
    pub questions_answered: usize,
    pub questions: Vec<QuestionSummary>,
}

/// An answer joined with the question it belongs to, for display.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct AnnotatedAnswer {
    pub question_id: String,
    pub question: String,
    #[serde(rename = "type")]
    pub question_type: QuestionType,
    pub answer: String,
}

#[derive(Default)]
struct Tally<'a> {
    first_seen: Vec<&'a str>,
    counts: HashMap<&'a str, u64>,
    total: u64,
}

impl<'a> Tally<'a> {
    fn add(&mut self, answer: &'a str) {
        let count = self.counts.entry(answer).or_insert(0);
        if *count == 0 {
            self.first_seen.push(answer);
        }
        *count += 1;
        self.total += 1;
    }

    fn distribution(&self) -> Vec<AnswerCount> {
        self.first_seen
            .iter()
            .map(|answer| {
                let count = self.counts[answer];
                AnswerCount {
                    answer: answer.to_string(),
                    count,
                    percentage: count as f64 / self.total as f64 * 100.0,
                }
            })
            .collect()
    }
}

/// Builds the answer distribution of every answered question.
///
/// Questions appear in survey order; answers to ids the survey no longer has
/// come last, in the order they were first seen. Values are compared
/// exactly, case included.
pub fn summarize(questions: &[Question], responses: &[SurveyResponse]) -> SurveySummary {
    let mut group_order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, Tally> = HashMap::new();

    for response in responses {
        for answer in &response.answers {
            let tally = groups.entry(answer.question_id.as_str()).or_insert_with(|| {
                group_order.push(answer.question_id.as_str());
                Tally::default()
            });
            tally.add(answer.answer.as_str());
        }
    }

    let mut ordered: Vec<&Question> = questions.iter().collect();
    ordered.sort_by_key(|q| q.order);

    let mut summaries: Vec<QuestionSummary> = ordered
        .iter()
        .filter_map(|q| {
            groups.get(q.id.as_str()).map(|tally| QuestionSummary {
                question_id: q.id.clone(),
                question: q.text.clone(),
                question_type: q.question_type,
                total_answers: tally.total,
                distribution: tally.distribution(),
            })
        })
        .collect();

    summaries.extend(
        group_order
            .iter()
            .filter(|id| !questions.iter().any(|q| q.id == **id))
            .map(|id| {
                let tally = &groups[id];
                QuestionSummary {
                    question_id: id.to_string(),
                    question: UNKNOWN_QUESTION.to_string(),
                    question_type: QuestionType::Text,
                    total_answers: tally.total,
                    distribution: tally.distribution(),
                }
            }),
    );

    SurveySummary {
        total_responses: responses.len() as u64,
        questions_answered: groups.len(),
        questions: summaries,
    }
}

pub fn annotate(questions: &[Question], response: &SurveyResponse) -> Vec<AnnotatedAnswer> {
    response
        .answers
        .iter()
        .map(|answer| {
            let question = questions.iter().find(|q| q.id == answer.question_id);
            AnnotatedAnswer {
                question_id: answer.question_id.clone(),
                question: question
                    .map(|q| q.text.clone())
                    .unwrap_or_else(|| UNKNOWN_QUESTION.to_string()),
                question_type: question.map(|q| q.question_type).unwrap_or(QuestionType::Text),
                answer: answer.answer.clone(),
            }
        })
        .collect()
}
