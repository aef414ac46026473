//! # Team Skill
//!
//! Collaborative analysis: a fixed roster of roles discusses one level in
//! strict round-robin order, then a scribe consolidates the full transcript
//! into the level's analysis.
//!
//! ## Protocol
//!
//! ```text
//! turns = 0
//! loop:
//!   if turns / roster_len >= max_rounds  -> consolidate (once), done
//!   else roster[turns % roster_len] speaks, turns += 1
//! ```
//!
//! Each team is built fresh per (level, target) and only the consolidated
//! text leaves it; the transcript stays internal.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::personas::{Role, Roster};
use super::prompts::{REPORT_GENERATOR, TEAM_MEMBER};
use super::{StageContext, StageOutcome};
use crate::backend::{GenerationBackend, Prompt};
use crate::error::{C4Error, Result};
use crate::state::model::{Field, Level, ModelUpdate};

/// What the team does next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TeamAction {
    /// The roster member at this position takes a turn
    Speak(usize),
    Consolidate,
}

/// Termination rule: consolidate once `turns / roster_len` completed rounds
/// reach `max_rounds`, otherwise hand the turn to the next roster position.
pub fn next_action(turns: usize, roster_len: usize, max_rounds: u32) -> TeamAction {
    if roster_len == 0 || turns / roster_len >= max_rounds as usize {
        TeamAction::Consolidate
    } else {
        TeamAction::Speak(turns % roster_len)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Speaker {
    /// The opening task statement
    Facilitator,
    Member(Role),
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::Facilitator => f.write_str("Facilitator"),
            Speaker::Member(role) => write!(f, "{}", role),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMessage {
    pub speaker: Speaker,
    pub content: String,
}

/// Result of one team discussion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamOutcome {
    /// The consolidated report
    pub analysis: String,
    /// Who spoke, in order
    pub speakers: Vec<Role>,
    /// Completed rounds
    pub rounds: u32,
}

impl TeamOutcome {
    pub fn turns(&self) -> usize {
        self.speakers.len()
    }
}

/// A roster with a round budget
#[derive(Debug, Clone)]
pub struct RefinementTeam {
    roster: Roster,
    max_rounds: u32,
}

impl RefinementTeam {
    pub fn new(roster: Roster, max_rounds: u32) -> Result<Self> {
        if roster.is_empty() {
            return Err(C4Error::InvalidConfig("team roster is empty".to_string()));
        }
        if max_rounds == 0 {
            return Err(C4Error::InvalidConfig(
                "collaboration rounds must be at least 1".to_string(),
            ));
        }
        Ok(Self { roster, max_rounds })
    }

    pub fn for_level(level: Level, max_rounds: u32) -> Result<Self> {
        Self::new(Roster::for_level(level), max_rounds)
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Run the discussion to completion.
    ///
    /// `level_description` names what is being analysed (e.g. `component 'API'`),
    /// `parent_context` is the parent level's analysis.
    pub async fn run(
        &self,
        backend: &dyn GenerationBackend,
        brief: &str,
        level_description: &str,
        parent_context: &str,
    ) -> anyhow::Result<TeamOutcome> {
        let mut transcript = vec![TeamMessage {
            speaker: Speaker::Facilitator,
            content: format!(
                "System brief:\n{}\n\nDiscuss and agree the {} level of the C4 model.",
                brief, level_description
            ),
        }];
        let mut speakers = Vec::new();

        loop {
            match next_action(speakers.len(), self.roster.len(), self.max_rounds) {
                TeamAction::Speak(position) => {
                    let Some(role) = self.roster.get(position) else {
                        anyhow::bail!("no roster member at position {}", position);
                    };

                    let prompt = Prompt::new(TEAM_MEMBER)
                        .bind("level_description", level_description)
                        .bind("context", parent_context)
                        .bind("role", role.display_name())
                        .bind("persona", role.persona())
                        .bind("transcript", render_transcript(&transcript));

                    let content = backend.generate(&prompt).await?.into_text()?;
                    tracing::debug!(role = %role, turn = speakers.len() + 1, "Team turn");

                    transcript.push(TeamMessage {
                        speaker: Speaker::Member(role),
                        content: content.trim().to_string(),
                    });
                    speakers.push(role);
                }
                TeamAction::Consolidate => {
                    let prompt = Prompt::new(REPORT_GENERATOR)
                        .bind("system_brief", brief)
                        .bind("level_description", level_description)
                        .bind("transcript", render_transcript(&transcript));

                    let analysis = backend.generate(&prompt).await?.into_text()?;
                    let rounds = (speakers.len() / self.roster.len()) as u32;
                    tracing::info!(
                        level = level_description,
                        turns = speakers.len(),
                        rounds,
                        "Team discussion consolidated"
                    );

                    return Ok(TeamOutcome {
                        analysis: analysis.trim().to_string(),
                        speakers,
                        rounds,
                    });
                }
            }
        }
    }
}

fn render_transcript(messages: &[TeamMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("**{}:**\n{}", m.speaker, m.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Analysis stage backed by a [`RefinementTeam`]
#[derive(Debug, Clone, Copy)]
pub struct CollaborativeAnalysisSkill {
    pub max_rounds: u32,
}

impl CollaborativeAnalysisSkill {
    pub fn new(max_rounds: u32) -> Self {
        Self { max_rounds }
    }

    pub async fn run(&self, ctx: &StageContext<'_>) -> Result<StageOutcome> {
        let Some(slot) = ctx.hole_for(Field::Analysis) else {
            return Ok(StageOutcome::noop());
        };

        tracing::info!(slot = %slot, rounds = self.max_rounds, "Running collaborative analysis");
        let team = RefinementTeam::for_level(slot.level, self.max_rounds)?;
        let outcome = team
            .run(
                ctx.backend,
                ctx.brief,
                &slot.describe_level(),
                &ctx.parent_field(&slot, Field::Analysis),
            )
            .await
            .map_err(|e| C4Error::generation(&slot, e))?;

        Ok(StageOutcome {
            update: Some(ModelUpdate::new(slot, outcome.analysis.clone())),
            team: Some(outcome),
        })
    }
}
