//! Per-user schedule, suppression and affirmation preferences.
//!
//! Every field has a serde default so that a partially written row (or no
//! row at all) still yields a complete policy.

use chrono::{DateTime, NaiveTime, Utc, Weekday};
use serde::{Deserialize, Serialize};

use crate::affirmation::AffirmationCategory;
use crate::bundle::BundleFormat;
use crate::reminder::NotificationMethod;
use crate::suppression::TimeWindow;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnoozePreferences {
    pub working_hours_start: NaiveTime,
    pub working_hours_end: NaiveTime,
    /// Weekdays (Mon–Fri) on which reminders may fire. Saturday and Sunday
    /// are governed by `allow_weekends` instead.
    pub working_days: Vec<Weekday>,
    pub quiet_hours_start: Option<NaiveTime>,
    pub quiet_hours_end: Option<NaiveTime>,
    pub allow_weekends: bool,
    pub max_reminders_per_day: u32,
    /// Minimum gap between two deliveries; 0 disables the check.
    pub cooldown_minutes: i64,
    pub bundle_enabled: bool,
    pub bundle_window_minutes: i64,
    pub bundle_format: BundleFormat,
    pub smart_suggestions_enabled: bool,
    /// Do-not-disturb until this instant.
    pub dnd_until: Option<DateTime<Utc>>,
    /// Notification methods the user has switched off.
    pub muted_methods: Vec<NotificationMethod>,
}

impl Default for SnoozePreferences {
    fn default() -> Self {
        Self {
            working_hours_start: hm(9, 0),
            working_hours_end: hm(17, 0),
            working_days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
            quiet_hours_start: None,
            quiet_hours_end: None,
            allow_weekends: false,
            max_reminders_per_day: 10,
            cooldown_minutes: 0,
            bundle_enabled: true,
            bundle_window_minutes: 15,
            bundle_format: BundleFormat::List,
            smart_suggestions_enabled: true,
            dnd_until: None,
            muted_methods: Vec::new(),
        }
    }
}

impl SnoozePreferences {
    pub fn working_window(&self) -> TimeWindow {
        TimeWindow::new(self.working_hours_start, self.working_hours_end)
    }

    /// Quiet hours are only active when both ends are configured.
    pub fn quiet_window(&self) -> Option<TimeWindow> {
        match (self.quiet_hours_start, self.quiet_hours_end) {
            (Some(start), Some(end)) if start != end => Some(TimeWindow::new(start, end)),
            _ => None,
        }
    }

    /// Whether reminders may fire at all on `day`.
    pub fn day_allowed(&self, day: Weekday) -> bool {
        match day {
            Weekday::Sat | Weekday::Sun => self.allow_weekends,
            _ => self.working_days.contains(&day),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AffirmationPreferences {
    pub enabled: bool,
    pub categories: Vec<AffirmationCategory>,
    /// Minimum gap between two affirmations.
    pub cooldown_minutes: i64,
    pub daily_cap: u32,
}

impl Default for AffirmationPreferences {
    fn default() -> Self {
        Self {
            enabled: true,
            categories: AffirmationCategory::ALL.to_vec(),
            cooldown_minutes: 60,
            daily_cap: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserPreferences {
    pub user_id: String,
    /// IANA timezone name; `None` uses the configured default.
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub schedule: SnoozePreferences,
    #[serde(default)]
    pub affirmations: AffirmationPreferences,
}

impl UserPreferences {
    pub fn defaults_for(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            timezone: None,
            schedule: SnoozePreferences::default(),
            affirmations: AffirmationPreferences::default(),
        }
    }
}

fn hm(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap_or(NaiveTime::MIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documented_defaults() {
        let p = UserPreferences::defaults_for("u1");
        assert_eq!(p.schedule.max_reminders_per_day, 10);
        assert!(p.schedule.quiet_window().is_none());
        assert!(p.schedule.bundle_enabled);
        assert_eq!(p.affirmations.daily_cap, 5);
        assert_eq!(p.affirmations.categories.len(), 6);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let p: UserPreferences = serde_json::from_str(
            r#"{"user_id":"u1","schedule":{"quiet_hours_start":"22:00:00","quiet_hours_end":"07:00:00"}}"#,
        )
        .unwrap();
        assert_eq!(p.schedule.working_hours_start, hm(9, 0));
        let quiet = p.schedule.quiet_window().unwrap();
        assert!(quiet.contains(hm(23, 30)));
        assert!(quiet.contains(hm(6, 59)));
        assert!(!quiet.contains(hm(7, 0)));
    }

    #[test]
    fn weekend_days_follow_allow_weekends() {
        let mut s = SnoozePreferences::default();
        assert!(!s.day_allowed(Weekday::Sat));
        assert!(s.day_allowed(Weekday::Wed));
        s.allow_weekends = true;
        assert!(s.day_allowed(Weekday::Sun));
        s.working_days.retain(|d| *d != Weekday::Wed);
        assert!(!s.day_allowed(Weekday::Wed));
    }
}
