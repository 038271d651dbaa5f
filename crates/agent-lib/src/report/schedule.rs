//! Wall-clock report schedule
//!
//! Checked about once a minute from the collection loop. Each period fires
//! at most once per calendar slot, at the first check at or after the
//! configured time within the configured hour.

use super::ReportPeriod;
use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportSchedule {
    pub daily: bool,
    pub weekly: bool,
    pub monthly: bool,
    /// Local time of day reports are sent
    pub time: NaiveTime,
    /// 0 = Sunday
    pub weekly_day: u32,
    /// 1..=28
    pub monthly_day: u32,
}

impl Default for ReportSchedule {
    fn default() -> Self {
        Self {
            daily: true,
            weekly: true,
            monthly: true,
            time: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default(),
            weekly_day: 0,
            monthly_day: 1,
        }
    }
}

/// Remembers what has already fired so each slot fires once
#[derive(Debug, Clone)]
pub struct ScheduleTracker {
    schedule: ReportSchedule,
    last_daily: Option<NaiveDate>,
    last_weekly: Option<NaiveDate>,
    last_monthly: Option<(i32, u32)>,
}

impl ScheduleTracker {
    pub fn new(schedule: ReportSchedule) -> Self {
        Self {
            schedule,
            last_daily: None,
            last_weekly: None,
            last_monthly: None,
        }
    }

    pub fn schedule(&self) -> &ReportSchedule {
        &self.schedule
    }

    /// Periods due at `now`, marking them as fired
    pub fn due(&mut self, now: NaiveDateTime) -> Vec<ReportPeriod> {
        let s = &self.schedule;
        let in_window = now.hour() == s.time.hour() && now.minute() >= s.time.minute();
        if !in_window {
            return Vec::new();
        }

        let date = now.date();
        let mut due = Vec::new();

        if s.daily && self.last_daily != Some(date) {
            self.last_daily = Some(date);
            due.push(ReportPeriod::Daily);
        }

        if s.weekly
            && date.weekday().num_days_from_sunday() == s.weekly_day
            && self.last_weekly != Some(date)
        {
            self.last_weekly = Some(date);
            due.push(ReportPeriod::Weekly);
        }

        let month = (date.year(), date.month());
        if s.monthly && date.day() == s.monthly_day && self.last_monthly != Some(month) {
            self.last_monthly = Some(month);
            due.push(ReportPeriod::Monthly);
        }

        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(y, m, d)
            .unwrap()
            .and_hms_opt(h, min, 0)
            .unwrap()
    }

    #[test]
    fn test_daily_fires_once_per_day() {
        let mut tracker = ScheduleTracker::new(ReportSchedule {
            weekly: false,
            monthly: false,
            ..Default::default()
        });

        assert!(tracker.due(at(2024, 6, 4, 8, 59)).is_empty());
        assert_eq!(tracker.due(at(2024, 6, 4, 9, 0)), vec![ReportPeriod::Daily]);
        assert!(tracker.due(at(2024, 6, 4, 9, 1)).is_empty());
        assert!(tracker.due(at(2024, 6, 4, 10, 0)).is_empty());
        assert_eq!(tracker.due(at(2024, 6, 5, 9, 3)), vec![ReportPeriod::Daily]);
    }

    #[test]
    fn test_weekly_on_configured_day() {
        let mut tracker = ScheduleTracker::new(ReportSchedule {
            daily: false,
            monthly: false,
            weekly_day: 0,
            ..Default::default()
        });

        // 2024-06-08 is a Saturday, 2024-06-09 a Sunday
        assert!(tracker.due(at(2024, 6, 8, 9, 0)).is_empty());
        assert_eq!(tracker.due(at(2024, 6, 9, 9, 0)), vec![ReportPeriod::Weekly]);
        assert!(tracker.due(at(2024, 6, 9, 9, 30)).is_empty());
        assert_eq!(tracker.due(at(2024, 6, 16, 9, 0)), vec![ReportPeriod::Weekly]);
    }

    #[test]
    fn test_monthly_once_per_month() {
        let mut tracker = ScheduleTracker::new(ReportSchedule {
            daily: false,
            weekly: false,
            monthly_day: 1,
            ..Default::default()
        });

        assert_eq!(tracker.due(at(2024, 7, 1, 9, 0)), vec![ReportPeriod::Monthly]);
        assert!(tracker.due(at(2024, 7, 1, 9, 5)).is_empty());
        assert!(tracker.due(at(2024, 7, 2, 9, 0)).is_empty());
        assert_eq!(tracker.due(at(2024, 8, 1, 9, 0)), vec![ReportPeriod::Monthly]);
    }

    #[test]
    fn test_all_due_together() {
        let mut tracker = ScheduleTracker::new(ReportSchedule::default());
        // Sunday 2024-09-01
        let due = tracker.due(at(2024, 9, 1, 9, 0));
        assert_eq!(
            due,
            vec![ReportPeriod::Daily, ReportPeriod::Weekly, ReportPeriod::Monthly]
        );
    }
}
