//! Subscription tiers and their daily ceilings.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Subscription level.
///
/// Stored as a plain string. Anything unrecognized reads back as `Free`,
/// so a typo in the database never blocks a user entirely.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Tier {
    #[default]
    Free,
    Pro,
    Team,
}

impl Tier {
    pub const ALL: [Tier; 3] = [Tier::Free, Tier::Pro, Tier::Team];

    /// Lenient parse: unknown values become `Free`.
    pub fn from_str_lossy(raw: &str) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "PRO" => Tier::Pro,
            "TEAM" => Tier::Team,
            _ => Tier::Free,
        }
    }

    /// Strict parse for admin input.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_uppercase().as_str() {
            "FREE" => Some(Tier::Free),
            "PRO" => Some(Tier::Pro),
            "TEAM" => Some(Tier::Team),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Free => "FREE",
            Tier::Pro => "PRO",
            Tier::Team => "TEAM",
        }
    }

    /// Resolve the tier actually in force at `now`.
    ///
    /// A paid tier whose expiry has passed counts as `Free`.
    pub fn effective(self, expires_at: Option<DateTime<Utc>>, now: DateTime<Utc>) -> Self {
        match expires_at {
            Some(expiry) if expiry <= now => Tier::Free,
            _ => self,
        }
    }
}

impl From<String> for Tier {
    fn from(raw: String) -> Self {
        Tier::from_str_lossy(&raw)
    }
}

impl From<Tier> for String {
    fn from(tier: Tier) -> Self {
        tier.as_str().to_string()
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of quota-consuming action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageKind {
    Message,
    Image,
    VoiceMinute,
}

impl UsageKind {
    pub const ALL: [UsageKind; 3] = [UsageKind::Message, UsageKind::Image, UsageKind::VoiceMinute];

    /// Field name of this counter in the stored user document.
    pub fn field(&self) -> &'static str {
        match self {
            UsageKind::Message => "messages",
            UsageKind::Image => "images",
            UsageKind::VoiceMinute => "voice_minutes",
        }
    }

    /// Translation key suffix under `kinds.`.
    pub fn key(&self) -> &'static str {
        match self {
            UsageKind::Message => "message",
            UsageKind::Image => "image",
            UsageKind::VoiceMinute => "voice_minute",
        }
    }
}

impl fmt::Display for UsageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            UsageKind::Message => "message",
            UsageKind::Image => "image",
            UsageKind::VoiceMinute => "voice-minute",
        })
    }
}

/// Daily ceilings of one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanLimits {
    pub messages: u32,
    pub images: u32,
    pub voice_minutes: u32,
}

impl PlanLimits {
    pub fn get(&self, kind: UsageKind) -> u32 {
        match kind {
            UsageKind::Message => self.messages,
            UsageKind::Image => self.images,
            UsageKind::VoiceMinute => self.voice_minutes,
        }
    }
}

/// Three tiers by three kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlanTable {
    pub free: PlanLimits,
    pub pro: PlanLimits,
    pub team: PlanLimits,
}

impl Default for PlanTable {
    fn default() -> Self {
        Self {
            free: PlanLimits {
                messages: 20,
                images: 5,
                voice_minutes: 10,
            },
            pro: PlanLimits {
                messages: 200,
                images: 50,
                voice_minutes: 100,
            },
            team: PlanLimits {
                messages: 1000,
                images: 200,
                voice_minutes: 500,
            },
        }
    }
}

impl PlanTable {
    pub fn limits(&self, tier: Tier) -> &PlanLimits {
        match tier {
            Tier::Free => &self.free,
            Tier::Pro => &self.pro,
            Tier::Team => &self.team,
        }
    }

    /// Ceiling for `kind` on `tier`.
    pub fn limit_for(&self, tier: Tier, kind: UsageKind) -> u32 {
        self.limits(tier).get(kind)
    }

    /// Ceiling for a raw stored plan name. Never fails.
    pub fn limit_for_plan(&self, plan: &str, kind: UsageKind) -> u32 {
        self.limit_for(Tier::from_str_lossy(plan), kind)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn test_limit_lookup() {
        let table = PlanTable::default();
        assert_eq!(table.limit_for(Tier::Free, UsageKind::Message), 20);
        assert_eq!(table.limit_for(Tier::Pro, UsageKind::Image), 50);
        assert_eq!(table.limit_for(Tier::Team, UsageKind::VoiceMinute), 500);
    }

    #[test]
    fn test_unknown_plan_falls_back_to_free() {
        let table = PlanTable::default();
        for plan in ["", "premium", "gold", "ПРО", "🚀"] {
            for kind in UsageKind::ALL {
                assert_eq!(
                    table.limit_for_plan(plan, kind),
                    table.limit_for(Tier::Free, kind)
                );
            }
        }
        assert_eq!(table.limit_for_plan(" pro ", UsageKind::Message), 200);
    }

    #[test]
    fn test_tier_serde_is_lenient() {
        let tier: Tier = serde_json::from_str("\"TEAM\"").unwrap();
        assert_eq!(tier, Tier::Team);
        let tier: Tier = serde_json::from_str("\"platinum\"").unwrap();
        assert_eq!(tier, Tier::Free);
        assert_eq!(serde_json::to_string(&Tier::Pro).unwrap(), "\"PRO\"");
    }

    #[test]
    fn test_expired_tier_is_free() {
        let now = Utc::now();
        assert_eq!(Tier::Pro.effective(None, now), Tier::Pro);
        assert_eq!(Tier::Pro.effective(Some(now + Duration::days(3)), now), Tier::Pro);
        assert_eq!(Tier::Team.effective(Some(now - Duration::seconds(1)), now), Tier::Free);
    }

    #[test]
    fn test_strict_parse() {
        assert_eq!(Tier::parse("team"), Some(Tier::Team));
        assert_eq!(Tier::parse("vip"), None);
    }
}
