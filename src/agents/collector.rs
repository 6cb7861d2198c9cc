//! Data collection: one provider session per subject, fields fetched
//! concurrently where they do not depend on each other.

use async_trait::async_trait;
use serde_json::Value;

use super::CollectStage;
use crate::config::CollectionConfig;
use crate::error::{Error, Result};
use crate::leagues::LeagueTable;
use crate::sports_data::{Endpoint, Session, SportsDataClient};
use crate::types::{DatasetBuilder, DatasetField, GameDataset, Subject, SubjectKind};

/// Assembles a [`GameDataset`] for a game, team or player
#[derive(Clone, Debug)]
pub struct DataCollector {
    client: SportsDataClient,
    config: CollectionConfig,
    leagues: LeagueTable,
}

/// League and season a fixture or player record belongs to
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Competition {
    league: u32,
    season: u32,
}

impl Competition {
    fn from_record(record: &Value, prefix: &str) -> Option<Self> {
        let league = record.pointer(&format!("{prefix}/id"))?.as_u64()?;
        let season = record.pointer(&format!("{prefix}/season"))?.as_u64()?;
        Some(Self {
            league: u32::try_from(league).ok()?,
            season: u32::try_from(season).ok()?,
        })
    }
}

impl DataCollector {
    /// Create a collector sharing `client` with the rest of the pipeline
    pub fn new(client: SportsDataClient, config: CollectionConfig, leagues: LeagueTable) -> Self {
        Self {
            client,
            config,
            leagues,
        }
    }

    /// Parse `subject_id` and collect a dataset for it
    pub async fn collect_by_id(&self, subject_id: &str, kind: SubjectKind) -> Result<GameDataset> {
        let subject = Subject::parse(subject_id, kind)?;
        self.collect_subject(&subject).await
    }

    /// Collect a fixture: record, statistics, league table and both squads
    pub async fn collect_game_data(&self, fixture_id: u64) -> Result<GameDataset> {
        self.collect_by_id(&format!("fixture-{fixture_id}"), SubjectKind::Game)
            .await
    }

    /// Collect a club: profile, season fixtures, squad and league table
    pub async fn collect_team_data(&self, team_id: u64) -> Result<GameDataset> {
        self.collect_by_id(&format!("team-{team_id}"), SubjectKind::Team)
            .await
    }

    /// Collect a player: profile with season statistics and league table
    pub async fn collect_player_data(&self, player_id: u64) -> Result<GameDataset> {
        self.collect_by_id(&format!("player-{player_id}"), SubjectKind::Player)
            .await
    }

    async fn collect_subject(&self, subject: &Subject) -> Result<GameDataset> {
        // The session is released when it goes out of scope, on error paths too
        let session = self.client.session();
        let mut builder = GameDataset::builder(subject.clone());

        match subject.kind {
            SubjectKind::Game => self.collect_game(&session, subject, &mut builder).await?,
            SubjectKind::Team => self.collect_team(&session, subject, &mut builder).await?,
            SubjectKind::Player => self.collect_player(&session, subject, &mut builder).await?,
        }

        let dataset = builder.build();
        let unavailable = dataset
            .provenance_map()
            .values()
            .filter(|p| !p.is_collected())
            .count();
        tracing::info!(
            subject = %subject.id,
            fields = dataset.fields().len(),
            unavailable,
            "dataset collected"
        );
        Ok(dataset)
    }

    async fn collect_game(
        &self,
        session: &Session,
        subject: &Subject,
        builder: &mut DatasetBuilder,
    ) -> Result<()> {
        let id = subject.provider_id;
        let (fixture, statistics) = tokio::join!(
            session.get_fixture(id),
            session.get_match_statistics(id)
        );
        let fixture = self.record(
            builder,
            subject,
            DatasetField::Fixture,
            Endpoint::Fixtures,
            fixture,
        )?;
        self.record(
            builder,
            subject,
            DatasetField::Statistics,
            Endpoint::MatchStatistics,
            statistics.map(non_empty),
        )?;

        let Some(fixture) = fixture else {
            for (field, endpoint) in [
                (DatasetField::Standings, Endpoint::Standings),
                (DatasetField::HomeRoster, Endpoint::Players),
                (DatasetField::AwayRoster, Endpoint::Players),
            ] {
                self.record(builder, subject, field, endpoint, Ok(None))?;
            }
            return Ok(());
        };

        let competition = Competition::from_record(&fixture, "/league");
        let home = fixture.pointer("/teams/home/id").and_then(Value::as_u64);
        let away = fixture.pointer("/teams/away/id").and_then(Value::as_u64);

        let (standings, home_roster, away_roster) = tokio::join!(
            async {
                match competition {
                    Some(c) => session.get_league_standings(c.league, c.season).await,
                    None => Ok(None),
                }
            },
            async {
                match (home, competition) {
                    (Some(team), Some(c)) => {
                        session.get_players(team, c.season).await.map(non_empty)
                    }
                    _ => Ok(None),
                }
            },
            async {
                match (away, competition) {
                    (Some(team), Some(c)) => {
                        session.get_players(team, c.season).await.map(non_empty)
                    }
                    _ => Ok(None),
                }
            }
        );
        self.record(
            builder,
            subject,
            DatasetField::Standings,
            Endpoint::Standings,
            standings,
        )?;
        self.record(
            builder,
            subject,
            DatasetField::HomeRoster,
            Endpoint::Players,
            home_roster,
        )?;
        self.record(
            builder,
            subject,
            DatasetField::AwayRoster,
            Endpoint::Players,
            away_roster,
        )?;
        Ok(())
    }

    async fn collect_team(
        &self,
        session: &Session,
        subject: &Subject,
        builder: &mut DatasetBuilder,
    ) -> Result<()> {
        let id = subject.provider_id;
        let season = self.config.default_season;
        let league = self.leagues.resolve(&self.config.default_league);

        let (profile, fixtures, roster, standings) = tokio::join!(
            session.get_team(id),
            session.get_team_fixtures(id, season),
            session.get_players(id, season),
            async {
                match league {
                    Some(league) => session.get_league_standings(league, season).await,
                    None => {
                        tracing::warn!(
                            league = %self.config.default_league,
                            "unknown default league"
                        );
                        Ok(None)
                    }
                }
            }
        );

        self.record(
            builder,
            subject,
            DatasetField::TeamProfile,
            Endpoint::Teams,
            profile,
        )?;
        self.record(
            builder,
            subject,
            DatasetField::TeamFixtures,
            Endpoint::Fixtures,
            fixtures.map(non_empty),
        )?;
        self.record(
            builder,
            subject,
            DatasetField::Roster,
            Endpoint::Players,
            roster.map(non_empty),
        )?;
        self.record(
            builder,
            subject,
            DatasetField::Standings,
            Endpoint::Standings,
            standings,
        )?;
        Ok(())
    }

    async fn collect_player(
        &self,
        session: &Session,
        subject: &Subject,
        builder: &mut DatasetBuilder,
    ) -> Result<()> {
        let profile = session
            .get_player(subject.provider_id, self.config.default_season)
            .await;
        let profile = self.record(
            builder,
            subject,
            DatasetField::PlayerProfile,
            Endpoint::Players,
            profile,
        )?;

        let competition = profile
            .as_ref()
            .and_then(|p| Competition::from_record(p, "/statistics/0/league"));
        let standings = match competition {
            Some(c) => session.get_league_standings(c.league, c.season).await,
            None => Ok(None),
        };
        self.record(
            builder,
            subject,
            DatasetField::Standings,
            Endpoint::Standings,
            standings,
        )?;
        Ok(())
    }

    /// Fold one field outcome into the builder
    ///
    /// Missing essential fields abort collection with
    /// [`Error::IncompleteDataset`]; missing optional fields are flagged
    /// unavailable in provenance. Returns the collected value, if any.
    fn record(
        &self,
        builder: &mut DatasetBuilder,
        subject: &Subject,
        field: DatasetField,
        endpoint: Endpoint,
        outcome: Result<Option<Value>>,
    ) -> Result<Option<Value>> {
        let (reason, cause) = match outcome {
            Ok(Some(value)) => {
                builder.collected(field, endpoint, value.clone());
                return Ok(Some(value));
            }
            Ok(None) => ("no data returned".to_string(), None),
            Err(e) => (e.to_string(), Some(e.kind())),
        };

        if self.config.is_essential(subject.kind, field) {
            tracing::error!(subject = %subject.id, %field, %reason, "essential field unavailable");
            return Err(Error::IncompleteDataset {
                subject: subject.id.clone(),
                field,
                reason,
                cause,
            });
        }

        tracing::warn!(subject = %subject.id, %field, %reason, "optional field unavailable");
        builder.unavailable(field, endpoint, reason);
        Ok(None)
    }
}

#[async_trait]
impl CollectStage for DataCollector {
    async fn collect(&self, subject: &Subject) -> Result<GameDataset> {
        self.collect_subject(subject).await
    }
}

fn non_empty(items: Vec<Value>) -> Option<Value> {
    if items.is_empty() {
        None
    } else {
        Some(Value::Array(items))
    }
}
