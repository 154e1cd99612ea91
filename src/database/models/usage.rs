//! Daily usage counters embedded in the user profile.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::limits::UsageKind;

/// Per-kind counters for one UTC calendar day.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageCounters {
    /// UTC date the counters belong to. None until first use.
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub messages: u32,
    #[serde(default)]
    pub images: u32,
    #[serde(default)]
    pub voice_minutes: u32,
}

impl UsageCounters {
    /// Zero the counters if they belong to another day.
    ///
    /// Returns true if a reset happened.
    pub fn roll_over(&mut self, today: NaiveDate) -> bool {
        if self.date == Some(today) {
            return false;
        }
        *self = Self {
            date: Some(today),
            ..Self::default()
        };
        true
    }

    pub fn get(&self, kind: UsageKind) -> u32 {
        match kind {
            UsageKind::Message => self.messages,
            UsageKind::Image => self.images,
            UsageKind::VoiceMinute => self.voice_minutes,
        }
    }

    pub fn add(&mut self, kind: UsageKind, amount: u32) {
        let slot = match kind {
            UsageKind::Message => &mut self.messages,
            UsageKind::Image => &mut self.images,
            UsageKind::VoiceMinute => &mut self.voice_minutes,
        };
        *slot = slot.saturating_add(amount);
    }

    /// Counters as seen on `today` without mutating the stored ones.
    pub fn as_of(&self, today: NaiveDate) -> Self {
        let mut view = self.clone();
        view.roll_over(today);
        view
    }
}
