use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::color::Color;
use crate::error::{ConfigError, Result};

/// Default tolerance for key color matching
pub const DEFAULT_TOLERANCE: f32 = 60.0;

/// An edit applied to every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EditMode {
    Recolor,
    #[serde(rename = "remove-bg")]
    RemoveBackground,
}

impl EditMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            EditMode::Recolor => "recolor",
            EditMode::RemoveBackground => "remove-bg",
        }
    }
}

impl fmt::Display for EditMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EditMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "recolor" => Ok(EditMode::Recolor),
            "remove-bg" | "remove_bg" | "removebg" => Ok(EditMode::RemoveBackground),
            other => Err(ConfigError::InvalidValue {
                key: "mode".to_string(),
                value: other.to_string(),
            }),
        }
    }
}

/// The set of active edit modes
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ModeSet(BTreeSet<EditMode>);

impl ModeSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, mode: EditMode) -> Self {
        self.0.insert(mode);
        self
    }

    pub fn insert(&mut self, mode: EditMode) {
        self.0.insert(mode);
    }

    pub fn contains(&self, mode: EditMode) -> bool {
        self.0.contains(&mode)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = EditMode> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<EditMode> for ModeSet {
    fn from_iter<I: IntoIterator<Item = EditMode>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Replace one color family with another
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecolorRule {
    pub source: Color,
    pub target: Color,

    /// What the colored object is, e.g. "the jacket". Only the remote path reads it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl RecolorRule {
    pub fn new(source: Color, target: Color) -> Self {
        Self {
            source,
            target,
            description: None,
        }
    }

    pub fn described(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

impl FromStr for RecolorRule {
    type Err = ConfigError;

    /// `SOURCE:TARGET[:description]`, colors as hex
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        let source = parts.next().unwrap_or_default().parse::<Color>()?;
        let target = parts
            .next()
            .ok_or_else(|| ConfigError::InvalidValue {
                key: "recolor".to_string(),
                value: s.to_string(),
            })?
            .parse::<Color>()?;

        let rule = RecolorRule::new(source, target);
        Ok(match parts.next().map(str::trim).filter(|d| !d.is_empty()) {
            Some(description) => rule.described(description),
            None => rule,
        })
    }
}

/// How to treat pixels near the key color
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovalSpec {
    pub key_color: Color,

    #[serde(default = "default_tolerance")]
    pub tolerance: f32,

    /// Solid fill for matched pixels; transparent when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement: Option<Color>,
}

fn default_tolerance() -> f32 {
    DEFAULT_TOLERANCE
}

impl RemovalSpec {
    pub fn transparent(key_color: Color) -> Self {
        Self {
            key_color,
            tolerance: DEFAULT_TOLERANCE,
            replacement: None,
        }
    }

    pub fn solid(key_color: Color, replacement: Color) -> Self {
        Self {
            key_color,
            tolerance: DEFAULT_TOLERANCE,
            replacement: Some(replacement),
        }
    }

    pub fn with_tolerance(mut self, tolerance: f32) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn is_transparent(&self) -> bool {
        self.replacement.is_none()
    }
}

impl Default for RemovalSpec {
    fn default() -> Self {
        Self::transparent(crate::color::CHROMA_KEY)
    }
}

/// Everything that describes how one project's frames are edited
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EditSettings {
    pub modes: ModeSet,

    #[serde(default)]
    pub rules: Vec<RecolorRule>,

    #[serde(default)]
    pub removal: RemovalSpec,

    /// Extra free-text instruction for the remote service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

impl EditSettings {
    pub fn recolor(rules: Vec<RecolorRule>) -> Self {
        Self {
            modes: ModeSet::new().with(EditMode::Recolor),
            rules,
            ..Self::default()
        }
    }

    pub fn remove_background(removal: RemovalSpec) -> Self {
        Self {
            modes: ModeSet::new().with(EditMode::RemoveBackground),
            removal,
            ..Self::default()
        }
    }

    pub fn is_active(&self, mode: EditMode) -> bool {
        self.modes.contains(mode)
    }

    /// Background removal active with a solid replacement
    pub fn wants_solid_background(&self) -> bool {
        self.is_active(EditMode::RemoveBackground) && self.removal.replacement.is_some()
    }

    /// Background removal active with a transparent result
    pub fn wants_transparency(&self) -> bool {
        self.is_active(EditMode::RemoveBackground) && self.removal.is_transparent()
    }

    pub fn validate(&self) -> Result<()> {
        if self.modes.is_empty() {
            return Err(ConfigError::NoModeSelected.into());
        }

        if self.removal.tolerance < 0.0 {
            return Err(ConfigError::InvalidValue {
                key: "removal.tolerance".to_string(),
                value: self.removal.tolerance.to_string(),
            }
            .into());
        }

        Ok(())
    }

    /// The caller-side part of the remote instruction
    ///
    /// Mode-specific background wording is appended by the remote client.
    pub fn instruction(&self) -> String {
        let mut sentences = Vec::new();

        if self.is_active(EditMode::Recolor) {
            for rule in &self.rules {
                let subject = rule.description.as_deref().unwrap_or("the objects");
                sentences.push(format!(
                    "Recolor {} that are {} to {}, keeping their shading and texture.",
                    subject, rule.source, rule.target
                ));
            }
        }

        if let Some(prompt) = self.prompt.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
            sentences.push(prompt.to_string());
        }

        if sentences.is_empty() {
            sentences.push("Keep the subject exactly as it is.".to_string());
        }

        sentences.join(" ")
    }
}
