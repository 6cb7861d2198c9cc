//! Article drafting

use async_trait::async_trait;
use std::sync::Arc;

use super::WriteStage;
use crate::config::WritingConfig;
use crate::error::{Error, Result};
use crate::generation::{Generator, Prompt};
use crate::types::{Article, GameDataset, ResearchNotes, SubjectKind};

const SYSTEM_PROMPT: &str = "You are a football journalist writing match and feature coverage. \
Use only the facts supplied. \
Start with a headline line beginning with \"# \", then the article body.";

/// What kind of piece a dataset calls for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArticleKind {
    /// A played fixture with a final score
    MatchReport,
    /// A fixture that has not been played yet
    Preview,
    /// Team or player coverage
    Feature,
}

impl ArticleKind {
    /// Pick the article kind from the subject and whether a final score exists
    pub fn for_dataset(dataset: &GameDataset) -> Self {
        match dataset.subject().kind {
            SubjectKind::Game if dataset.final_score().is_some() => ArticleKind::MatchReport,
            SubjectKind::Game => ArticleKind::Preview,
            SubjectKind::Team | SubjectKind::Player => ArticleKind::Feature,
        }
    }

    fn brief(self) -> &'static str {
        match self {
            ArticleKind::MatchReport => "match report",
            ArticleKind::Preview => {
                "match preview (the game has not been played; do not invent a result)"
            }
            ArticleKind::Feature => "feature article",
        }
    }
}

/// Build the drafting prompt
///
/// Pure function of its inputs: the same dataset, notes and length always give
/// the same prompt.
pub fn build_prompt(dataset: &GameDataset, notes: &ResearchNotes, target_length: usize) -> Prompt {
    let kind = ArticleKind::for_dataset(dataset);
    let mut user = format!(
        "Write a {target_length}-word {} about {}.\n",
        kind.brief(),
        dataset.headline()
    );

    if let Some((home, away)) = dataset.final_score() {
        user.push_str(&format!("Final score: {home}-{away}.\n"));
    }

    user.push_str("\nData:\n");
    for (field, value) in dataset.fields() {
        user.push_str(&format!("- {field}: {value}\n"));
    }

    if !notes.is_empty() {
        user.push_str("\nBackground:\n");
        for (topic, entry) in &notes.entries {
            user.push_str(&format!(
                "- {topic} (confidence {:.1}, {}): {}\n",
                entry.confidence, entry.source, entry.text
            ));
        }
    }

    Prompt {
        system: SYSTEM_PROMPT.to_string(),
        user,
    }
}

/// Split generated text into (title, body), falling back to `default_title`
pub(crate) fn split_title(text: &str, default_title: String) -> (String, String) {
    let text = text.trim();
    let (first, rest) = text.split_once('\n').unwrap_or((text, ""));
    let first = first.trim();

    let title = first
        .strip_prefix("# ")
        .or_else(|| first.strip_prefix("Title:"))
        .map(str::trim);

    match title {
        Some(title) if !title.is_empty() => (title.to_string(), rest.trim().to_string()),
        _ => (default_title, text.to_string()),
    }
}

/// Drafting stage
#[derive(Clone)]
pub struct Writer {
    generator: Arc<dyn Generator>,
    target_length: usize,
}

impl Writer {
    /// Draft through `generator`
    pub fn new(generator: Arc<dyn Generator>, config: &WritingConfig) -> Self {
        Self {
            generator,
            target_length: config.target_length,
        }
    }

    async fn generate(&self, prompt: &Prompt) -> Result<String> {
        self.generator.generate(prompt).await.map_err(|e| match e {
            Error::GenerationFailed(_) => e,
            other => Error::GenerationFailed(other.to_string()),
        })
    }
}

#[async_trait]
impl WriteStage for Writer {
    async fn draft(&self, dataset: &GameDataset, notes: &ResearchNotes) -> Result<Article> {
        let prompt = build_prompt(dataset, notes, self.target_length);
        let subject = &dataset.subject().id;

        let mut text = self.generate(&prompt).await?;
        if text.trim().is_empty() {
            tracing::warn!(%subject, "generation returned empty draft, retrying once");
            text = self.generate(&prompt).await?;
        }
        if text.trim().is_empty() {
            return Err(Error::GenerationFailed(
                "empty draft after retry".to_string(),
            ));
        }

        let (title, body) = split_title(&text, dataset.headline());
        if body.is_empty() {
            return Err(Error::GenerationFailed(
                "draft has a title but no body".to_string(),
            ));
        }

        let article = Article::new(title, body, self.target_length, subject.clone());
        tracing::info!(%subject, words = article.metadata.word_count, "draft written");
        Ok(article)
    }
}

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use crate::sports_data::Endpoint;
    use crate::test_helpers::{ScriptedGenerator, fixture_item, sample_dataset};
    use crate::types::{DatasetField, ResearchEntry, Subject};

    fn writer(generator: Arc<ScriptedGenerator>) -> Writer {
        Writer::new(generator, &WritingConfig { target_length: 400 })
    }

    fn notes() -> ResearchNotes {
        let mut notes = ResearchNotes::default();
        notes.insert(
            "head_to_head",
            ResearchEntry {
                text: "Arsenal unbeaten in five.".to_string(),
                confidence: 0.8,
                source: "archive".to_string(),
            },
        );
        notes
    }

    #[test]
    fn prompt_is_deterministic_and_carries_context() {
        let dataset = sample_dataset();
        let a = build_prompt(&dataset, &notes(), 400);
        let b = build_prompt(&dataset, &notes(), 400);

        assert_eq!(a, b);
        assert!(
            a.user
                .starts_with("Write a 400-word match report about Arsenal vs Chelsea.")
        );
        assert!(a.user.contains("Final score: 2-1."));
        assert!(a.user.contains("- statistics:"));
        assert!(a.user.contains("Arsenal unbeaten in five."));
    }

    #[tokio::test]
    async fn draft_is_revision_zero_with_parsed_title() {
        let generator = Arc::new(ScriptedGenerator::new(vec![Ok(
            "# Arsenal edge Chelsea\nArsenal beat Chelsea 2-1 at the Emirates.".to_string(),
        )]));
        let article = writer(generator.clone())
            .draft(&sample_dataset(), &notes())
            .await
            .unwrap();

        assert_eq!(article.revision, 0);
        assert_eq!(article.title, "Arsenal edge Chelsea");
        assert_eq!(article.body, "Arsenal beat Chelsea 2-1 at the Emirates.");
        assert_eq!(article.metadata.target_length, 400);
        assert_eq!(article.metadata.dataset_id, "fixture-123");
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn empty_content_is_retried_exactly_once() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Ok("  ".to_string()),
            Ok("Arsenal won.".to_string()),
        ]));
        let article = writer(generator.clone())
            .draft(&sample_dataset(), &ResearchNotes::default())
            .await
            .unwrap();

        assert_eq!(generator.calls(), 2);
        assert_eq!(article.title, "Arsenal vs Chelsea");
        assert_eq!(article.body, "Arsenal won.");
    }

    #[tokio::test]
    async fn two_empty_drafts_fail() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Ok(String::new()),
            Ok(String::new()),
            Ok("never reached".to_string()),
        ]));
        let err = writer(generator.clone())
            .draft(&sample_dataset(), &ResearchNotes::default())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::GenerationFailed(_)));
        assert_eq!(generator.calls(), 2);
    }

    #[tokio::test]
    async fn generator_errors_are_not_retried() {
        let generator = Arc::new(ScriptedGenerator::new(vec![
            Err(Error::GenerationFailed("overloaded".to_string())),
            Ok("never reached".to_string()),
        ]));
        let err = writer(generator.clone())
            .draft(&sample_dataset(), &ResearchNotes::default())
            .await
            .unwrap_err();

        assert!(matches!(err, Error::GenerationFailed(msg) if msg == "overloaded"));
        assert_eq!(generator.calls(), 1);
    }

    #[test]
    fn split_title_accepts_title_prefix() {
        let (title, body) =
            split_title("Title: Late drama\n\nBody text.", "fallback".to_string());
        assert_eq!(title, "Late drama");
        assert_eq!(body, "Body text.");
    }

    #[test]
    fn unplayed_fixture_gets_a_preview_prompt() {
        let mut fixture = fixture_item(321, 0, 0);
        fixture["goals"] = serde_json::json!({ "home": null, "away": null });
        let subject = Subject::parse("fixture-321", SubjectKind::Game).unwrap();
        let mut builder = GameDataset::builder(subject);
        builder.collected(DatasetField::Fixture, Endpoint::Fixtures, fixture);
        let dataset = builder.build();

        assert_eq!(ArticleKind::for_dataset(&dataset), ArticleKind::Preview);
        let prompt = build_prompt(&dataset, &ResearchNotes::default(), 300);
        assert!(prompt.user.contains("300-word match preview"));
        assert!(!prompt.user.contains("Final score"));
    }

    #[test]
    fn team_subject_gets_a_feature() {
        let subject = Subject::parse("team-42", SubjectKind::Team).unwrap();
        let dataset = GameDataset::builder(subject).build();
        assert_eq!(ArticleKind::for_dataset(&dataset), ArticleKind::Feature);
    }
}
