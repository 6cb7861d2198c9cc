//! Review and rewrite.
//!
//! The editor runs two local checks, then asks the generation capability for
//! a rewrite informed by both:
//! - [`fact_check`] - figures in the body against the dataset
//! - [`style_check`] - sentence lengths and banned phrases
//!
//! When no claim can be confirmed or contradicted the review is incomplete.
//! That is reported as [`Error::ReviewIncomplete`] carrying the rewrite and
//! feedback, so the pipeline can keep the partial result.

mod fact_check;
mod style;

pub use fact_check::fact_check;
pub use style::{sentences, style_check};

use async_trait::async_trait;
use std::sync::Arc;

use super::EditStage;
use super::writer::split_title;
use crate::config::EditingConfig;
use crate::error::{Error, Result};
use crate::generation::{Generator, Prompt};
use crate::types::{Article, ClaimCheck, GameDataset, ReviewFeedback, StyleReport, Verdict};

const SYSTEM_PROMPT: &str = "You are a sub-editor on a football desk. Rewrite the article: \
fix figures marked as contradicted using the supplied data, hedge or remove unverified figures, \
shorten long sentences and drop banned phrases. Start with a headline line beginning with \"# \".";

/// Editing stage
#[derive(Clone)]
pub struct Editor {
    generator: Arc<dyn Generator>,
    config: EditingConfig,
}

fn review_notes(claims: &[ClaimCheck], style: &StyleReport) -> Vec<String> {
    let mut notes = Vec::new();
    for claim in claims {
        match claim.verdict {
            Verdict::Contradicted => {
                notes.push(format!("Contradicted by the data: {}", claim.span))
            }
            Verdict::Unconfirmed => notes.push(format!("Unverified figures: {}", claim.span)),
            Verdict::Confirmed => {}
        }
    }
    for sentence in &style.long_sentences {
        notes.push(format!("Shorten: {sentence}"));
    }
    for phrase in &style.banned_phrases {
        notes.push(format!("Remove phrase: {phrase}"));
    }
    notes
}

fn rewrite_prompt(article: &Article, dataset: &GameDataset, notes: &[String]) -> Prompt {
    let mut user = format!("# {}\n\n{}\n\nReview notes:\n", article.title, article.body);
    if notes.is_empty() {
        user.push_str("- none, polish only\n");
    }
    for note in notes {
        user.push_str(&format!("- {note}\n"));
    }
    if let Some((home, away)) = dataset.final_score() {
        user.push_str(&format!(
            "\nFinal score per the data: {} {home}-{away}.\n",
            dataset.headline()
        ));
    }
    user.push_str(&format!(
        "Keep it close to {} words.\n",
        article.metadata.target_length
    ));

    Prompt {
        system: SYSTEM_PROMPT.to_string(),
        user,
    }
}

impl Editor {
    /// Edit through `generator` with the configured style rules
    pub fn new(generator: Arc<dyn Generator>, config: EditingConfig) -> Self {
        Self { generator, config }
    }

    async fn rewrite(
        &self,
        article: &Article,
        dataset: &GameDataset,
        notes: &[String],
    ) -> Result<Article> {
        let prompt = rewrite_prompt(article, dataset, notes);
        let text = self.generator.generate(&prompt).await.map_err(|e| match e {
            Error::GenerationFailed(_) => e,
            other => Error::GenerationFailed(other.to_string()),
        })?;
        if text.trim().is_empty() {
            return Err(Error::GenerationFailed("empty rewrite".to_string()));
        }

        let (title, body) = split_title(&text, article.title.clone());
        if body.is_empty() {
            return Err(Error::GenerationFailed(
                "rewrite has a title but no body".to_string(),
            ));
        }
        Ok(article.revise(title, body))
    }
}

#[async_trait]
impl EditStage for Editor {
    async fn review(
        &self,
        article: &Article,
        dataset: &GameDataset,
    ) -> Result<(Article, ReviewFeedback)> {
        let claims = fact_check(&article.body, dataset);
        let style = style_check(&article.body, &self.config);
        let mut notes = review_notes(&claims, &style);

        let edited = self.rewrite(article, dataset, &notes).await?;

        let resolved = claims
            .iter()
            .filter(|c| c.verdict != Verdict::Unconfirmed)
            .count();
        let incomplete = !claims.is_empty() && resolved == 0;

        let subject = &dataset.subject().id;
        tracing::info!(
            %subject,
            claims = claims.len(),
            resolved,
            revision = edited.revision,
            "review finished"
        );

        if incomplete {
            let reason = format!(
                "none of {} claims could be checked against the dataset",
                claims.len()
            );
            notes.push(reason.clone());
            let feedback = ReviewFeedback {
                claims,
                style,
                notes,
                partial: true,
            };
            return Err(Error::ReviewIncomplete {
                reason,
                partial: Some(Box::new((edited, feedback))),
            });
        }

        Ok((
            edited,
            ReviewFeedback {
                claims,
                style,
                notes,
                partial: false,
            },
        ))
    }
}
