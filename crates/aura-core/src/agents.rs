//! Agent and user profiles.
//!
//! An agent is the persona the remote model plays: a name, a personality
//! prompt, a body colour for the avatar and a synthetic voice. The
//! [`AgentRoster`] keeps the built-in presets plus any personal agents the
//! user created in memory; persisting personal agents is left to the
//! application shell.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Palette used for newly created personal agents.
pub const AGENT_COLORS: [&str; 8] = [
    "#4285f4", "#ea4335", "#fbbc04", "#34a853", "#fa7b17", "#f538a0", "#a142f4", "#24c1e0",
];

/// Synthetic voices offered by the remote conversation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgentVoice {
    Aoede,
    Charon,
    Fenrir,
    Kore,
    Leda,
    Orus,
    Puck,
    Zephyr,
}

impl AgentVoice {
    /// Every available voice, in display order.
    pub const ALL: [Self; 8] = [
        Self::Aoede,
        Self::Charon,
        Self::Fenrir,
        Self::Kore,
        Self::Leda,
        Self::Orus,
        Self::Puck,
        Self::Zephyr,
    ];

    /// Voice name as the remote service expects it.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Aoede => "Aoede",
            Self::Charon => "Charon",
            Self::Fenrir => "Fenrir",
            Self::Kore => "Kore",
            Self::Leda => "Leda",
            Self::Orus => "Orus",
            Self::Puck => "Puck",
            Self::Zephyr => "Zephyr",
        }
    }
}

impl fmt::Display for AgentVoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AgentVoice {
    type Err = AgentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|v| v.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| AgentError::UnknownVoice(s.to_string()))
    }
}

/// Errors raised by roster operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AgentError {
    #[error("Agent not found: {0}")]
    NotFound(String),

    #[error("Unknown voice '{0}'")]
    UnknownVoice(String),
}

/// Persona played by the remote model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentProfile {
    pub id: String,
    pub name: String,
    pub personality: String,
    pub body_color: String,
    pub voice: AgentVoice,
}

/// Who the agent is talking to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub name: Option<String>,
    pub info: Option<String>,
}

/// Partial update for an [`AgentProfile`]; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentUpdate {
    pub name: Option<String>,
    pub personality: Option<String>,
    pub body_color: Option<String>,
    pub voice: Option<AgentVoice>,
}

impl AgentProfile {
    /// Create an empty personal agent with a fresh id, a palette colour and
    /// one of the two default voices.
    #[must_use]
    pub fn new_personal() -> Self {
        let id = uuid::Uuid::new_v4();
        let bytes = id.as_bytes();
        let color = AGENT_COLORS[usize::from(bytes[0]) % AGENT_COLORS.len()];
        let voice = if bytes[1] & 1 == 0 {
            AgentVoice::Charon
        } else {
            AgentVoice::Aoede
        };

        Self {
            id: id.simple().to_string()[..13].to_string(),
            name: String::new(),
            personality: String::new(),
            body_color: color.to_string(),
            voice,
        }
    }

    /// Apply a partial update in place.
    pub fn apply(&mut self, update: &AgentUpdate) {
        if let Some(ref name) = update.name {
            self.name.clone_from(name);
        }
        if let Some(ref personality) = update.personality {
            self.personality.clone_from(personality);
        }
        if let Some(ref color) = update.body_color {
            self.body_color.clone_from(color);
        }
        if let Some(voice) = update.voice {
            self.voice = voice;
        }
    }

    /// Build the system instruction sent to the remote model when a
    /// conversation starts.
    #[must_use]
    pub fn system_instruction(&self, user: &UserProfile) -> String {
        let mut prompt = format!(
            "Your name is {}. {}\n\nKeep replies short and conversational; you are speaking out loud.",
            self.name.trim(),
            self.personality.trim()
        );

        let name = user.name.as_deref().map(str::trim).filter(|n| !n.is_empty());
        let info = user.info.as_deref().map(str::trim).filter(|i| !i.is_empty());
        if name.is_some() || info.is_some() {
            prompt.push_str("\n\nAbout the person you are talking to:");
            if let Some(name) = name {
                prompt.push_str(&format!("\nName: {name}"));
            }
            if let Some(info) = info {
                prompt.push_str(&format!("\nInfo: {info}"));
            }
        }

        prompt
    }
}

fn preset(id: &str, name: &str, personality: &str, color: &str, voice: AgentVoice) -> AgentProfile {
    AgentProfile {
        id: id.to_string(),
        name: name.to_string(),
        personality: personality.to_string(),
        body_color: color.to_string(),
        voice,
    }
}

/// The built-in agents, default first.
#[must_use]
pub fn preset_agents() -> Vec<AgentProfile> {
    vec![
        preset(
            "proper-paul",
            "Proper Paul",
            "You are an elderly etiquette expert with a dry, sarcastic wit who is perpetually \
             exasperated by the decline of modern manners. You sound out of breath and tend to \
             yell. Keep every remark under 30 words.",
            "#ea4335",
            AgentVoice::Fenrir,
        ),
        preset(
            "chic-charlotte",
            "Chic Charlotte",
            "You are an impeccably dressed fashion expert with an air of effortless superiority. \
             You prefer timeless elegance to trends, drop French phrases and pronounce designer \
             names with exaggerated precision. Keep every remark under 30 words.",
            "#a142f4",
            AgentVoice::Aoede,
        ),
        preset(
            "chef-shane",
            "Chef Shane",
            "You are a culinary expert who knows every obscure dish. You speak in a rapid, \
             energetic, relentlessly optimistic style and every topic reminds you of something \
             you once cooked.",
            "#fbbc04",
            AgentVoice::Charon,
        ),
        preset(
            "passport-penny",
            "Passport Penny",
            "You are an extremely well-travelled, mellow globetrotter who talks in a laid-back \
             style and keeps bringing up oddly specific situations from your travels.",
            "#34a853",
            AgentVoice::Leda,
        ),
        preset(
            "questing-quinn",
            "Questing Quinn",
            "You are a friendly, curious thinker who enjoys the big questions about life, with a \
             playful side and a sharp sarcastic wit. Match the user's energy, moving between deep \
             conversation and light banter.",
            "#fa7b17",
            AgentVoice::Orus,
        ),
    ]
}

/// In-memory collection of preset and personal agents.
#[derive(Debug, Clone)]
pub struct AgentRoster {
    current: AgentProfile,
    presets: Vec<AgentProfile>,
    personal: Vec<AgentProfile>,
}

impl Default for AgentRoster {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentRoster {
    /// Roster with the built-in presets and the first preset selected.
    #[must_use]
    pub fn new() -> Self {
        Self::with_personal(Vec::new())
    }

    /// Roster seeded with previously saved personal agents.
    #[must_use]
    pub fn with_personal(personal: Vec<AgentProfile>) -> Self {
        let presets = preset_agents();
        let current = presets[0].clone();
        Self {
            current,
            presets,
            personal,
        }
    }

    /// The selected agent.
    #[must_use]
    pub const fn current(&self) -> &AgentProfile {
        &self.current
    }

    /// Built-in agents.
    #[must_use]
    pub fn presets(&self) -> &[AgentProfile] {
        &self.presets
    }

    /// User-created agents.
    #[must_use]
    pub fn personal(&self) -> &[AgentProfile] {
        &self.personal
    }

    /// Look up an agent by id, personal agents first.
    #[must_use]
    pub fn find(&self, id: &str) -> Option<&AgentProfile> {
        self.personal
            .iter()
            .chain(self.presets.iter())
            .find(|a| a.id == id)
    }

    /// Select an agent by id.
    pub fn set_current(&mut self, id: &str) -> Result<&AgentProfile, AgentError> {
        let Some(agent) = self.find(id).cloned() else {
            tracing::warn!(agent_id = id, "Agent not found");
            return Err(AgentError::NotFound(id.to_string()));
        };
        self.current = agent;
        Ok(&self.current)
    }

    /// Add a personal agent and select it.
    pub fn add(&mut self, agent: AgentProfile) {
        self.current = agent.clone();
        self.personal.push(agent);
    }

    /// Update an agent wherever it lives, including the current selection.
    pub fn update(&mut self, id: &str, update: &AgentUpdate) -> Result<&AgentProfile, AgentError> {
        let mut found = false;
        for agent in self
            .presets
            .iter_mut()
            .chain(self.personal.iter_mut())
            .filter(|a| a.id == id)
        {
            agent.apply(update);
            found = true;
        }

        if !found {
            return Err(AgentError::NotFound(id.to_string()));
        }
        if self.current.id == id {
            self.current.apply(update);
        }
        self.find(id).ok_or_else(|| AgentError::NotFound(id.to_string()))
    }
}
