//! Platform-wide totals shown to owners.

use chrono::{DateTime, Utc};

use super::usage::UsageCounters;
use super::user::UserProfile;
use crate::limits::{Tier, UsageKind};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PlatformStats {
    pub users: u64,
    /// Users with any usage on the current UTC day.
    pub active_today: u64,
    pub free: u64,
    pub pro: u64,
    pub team: u64,
    /// Today's counters summed over all users.
    pub usage: UsageCounters,
}

impl PlatformStats {
    /// Fold one profile in. Tiers are counted as in force at `now`, and
    /// counters dated another day are ignored.
    pub fn count(&mut self, profile: &UserProfile, now: DateTime<Utc>) {
        self.users += 1;
        match profile.effective_tier(now) {
            Tier::Free => self.free += 1,
            Tier::Pro => self.pro += 1,
            Tier::Team => self.team += 1,
        }

        let today = now.date_naive();
        self.usage.date = Some(today);
        if profile.usage.date != Some(today) {
            return;
        }
        if UsageKind::ALL.iter().any(|kind| profile.usage.get(*kind) > 0) {
            self.active_today += 1;
        }
        for kind in UsageKind::ALL {
            self.usage.add(kind, profile.usage.get(kind));
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    #[test]
    fn test_count_folds_today_only() {
        let now = Utc::now();
        let mut stats = PlatformStats::default();

        let mut active = UserProfile::new(1);
        active.usage.roll_over(now.date_naive());
        active.usage.add(UsageKind::Message, 3);
        active.usage.add(UsageKind::VoiceMinute, 2);
        stats.count(&active, now);

        let mut stale = UserProfile::new(2);
        stale.plan = Tier::Pro;
        stale.usage.roll_over((now - Duration::days(1)).date_naive());
        stale.usage.add(UsageKind::Message, 50);
        stats.count(&stale, now);

        let mut lapsed = UserProfile::new(3);
        lapsed.plan = Tier::Team;
        lapsed.plan_expires_at = Some((now - Duration::hours(1)).timestamp());
        stats.count(&lapsed, now);

        assert_eq!(stats.users, 3);
        assert_eq!(stats.active_today, 1);
        assert_eq!((stats.free, stats.pro, stats.team), (2, 1, 0));
        assert_eq!(stats.usage.messages, 3);
        assert_eq!(stats.usage.voice_minutes, 2);
        assert_eq!(stats.usage.images, 0);
    }
}
