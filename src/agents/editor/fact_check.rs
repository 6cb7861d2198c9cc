//! Claim extraction and cross-referencing against the dataset
//!
//! A claim is any sentence carrying a date, a scoreline or a number. Each
//! figure is looked up among the values the dataset actually holds, leaving
//! out identifiers and bookkeeping fields (ids, seasons, timestamps). Scorelines
//! are compared with the fixture's final score when there is one, which is the
//! only way a claim can be contradicted rather than merely unconfirmed.

use regex::Regex;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::LazyLock;

use super::style::sentences;
use crate::types::{ClaimCheck, GameDataset, Verdict};

#[allow(clippy::expect_used)]
static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{4}-\d{2}-\d{2}\b").expect("valid date pattern")
});
#[allow(clippy::expect_used)]
static SCORE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d{1,2})\s?[-–]\s?(\d{1,2})\b").expect("valid score pattern")
});
#[allow(clippy::expect_used)]
static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\d+(?:\.\d+)?%?").expect("valid number pattern")
});

/// Keys whose numbers identify records rather than describe the match
const NON_FACT_KEYS: &[&str] = &["id", "season", "timestamp", "timezone", "periods"];

/// Figures the dataset holds, as they would appear in prose
#[derive(Debug, Default)]
struct Facts {
    numbers: HashSet<String>,
    dates: HashSet<String>,
}

impl Facts {
    fn from_dataset(dataset: &GameDataset) -> Self {
        let mut facts = Facts::default();
        for value in dataset.fields().values() {
            facts.absorb(value);
        }
        facts
    }

    fn absorb(&mut self, value: &Value) {
        match value {
            Value::Number(n) => {
                self.numbers.insert(n.to_string());
            }
            Value::String(s) => {
                let s = s.trim();
                if let Some(date) = DATE_RE.find(s).filter(|m| m.start() == 0) {
                    self.dates.insert(date.as_str().to_string());
                } else if let Some(number) = s.strip_suffix('%') {
                    if number.parse::<f64>().is_ok() {
                        self.numbers.insert(s.to_string());
                        self.numbers.insert(number.to_string());
                    }
                } else if s.parse::<f64>().is_ok() {
                    self.numbers.insert(s.to_string());
                }
            }
            Value::Array(items) => items.iter().for_each(|v| self.absorb(v)),
            Value::Object(map) => map
                .iter()
                .filter(|(key, _)| !NON_FACT_KEYS.contains(&key.as_str()))
                .for_each(|(_, v)| self.absorb(v)),
            Value::Bool(_) | Value::Null => {}
        }
    }

    fn has_number(&self, figure: &str) -> bool {
        self.numbers.contains(figure)
            || figure
                .strip_suffix('%')
                .is_some_and(|n| self.numbers.contains(n))
    }
}

fn combine(verdicts: impl IntoIterator<Item = Verdict>) -> Verdict {
    let mut all_confirmed = true;
    for verdict in verdicts {
        match verdict {
            Verdict::Contradicted => return Verdict::Contradicted,
            Verdict::Unconfirmed => all_confirmed = false,
            Verdict::Confirmed => {}
        }
    }
    if all_confirmed {
        Verdict::Confirmed
    } else {
        Verdict::Unconfirmed
    }
}

fn check_sentence(
    sentence: &str,
    facts: &Facts,
    score: Option<(u64, u64)>,
) -> Option<ClaimCheck> {
    let mut figures = Vec::new();
    let mut verdicts = Vec::new();

    for date in DATE_RE.find_iter(sentence) {
        figures.push(date.as_str().to_string());
        verdicts.push(if facts.dates.contains(date.as_str()) {
            Verdict::Confirmed
        } else {
            Verdict::Unconfirmed
        });
    }
    let rest = DATE_RE.replace_all(sentence, " ");

    for caps in SCORE_RE.captures_iter(&rest) {
        let (Ok(x), Ok(y)) = (caps[1].parse::<u64>(), caps[2].parse::<u64>()) else {
            continue;
        };
        figures.push(format!("{x}-{y}"));
        verdicts.push(match score {
            Some(final_score) if final_score == (x, y) || final_score == (y, x) => {
                Verdict::Confirmed
            }
            Some(_) => Verdict::Contradicted,
            None if facts.has_number(&x.to_string()) && facts.has_number(&y.to_string()) => {
                Verdict::Confirmed
            }
            None => Verdict::Unconfirmed,
        });
    }
    let rest = SCORE_RE.replace_all(&rest, " ");

    for number in NUMBER_RE.find_iter(&rest) {
        figures.push(number.as_str().to_string());
        verdicts.push(if facts.has_number(number.as_str()) {
            Verdict::Confirmed
        } else {
            Verdict::Unconfirmed
        });
    }

    if figures.is_empty() {
        return None;
    }
    Some(ClaimCheck {
        span: sentence.to_string(),
        figures,
        verdict: combine(verdicts),
    })
}

/// Check every figure-bearing sentence of `body` against `dataset`
pub fn fact_check(body: &str, dataset: &GameDataset) -> Vec<ClaimCheck> {
    let facts = Facts::from_dataset(dataset);
    let score = dataset.final_score();
    sentences(body)
        .into_iter()
        .filter_map(|sentence| check_sentence(sentence, &facts, score))
        .collect()
}
