//! Activity reports over the audit log

use chrono::{DateTime, Duration, Months, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::entry::{AuditAction, AuditEntry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportPeriod {
    Daily,
    Weekly,
    Monthly,
}

impl ReportPeriod {
    /// Start of the window ending at `now`
    pub fn start_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            ReportPeriod::Daily => now - Duration::days(1),
            ReportPeriod::Weekly => now - Duration::days(7),
            ReportPeriod::Monthly => now
                .checked_sub_months(Months::new(1))
                .unwrap_or(now - Duration::days(30)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserActivity {
    pub user_id: String,
    pub name: String,
    pub role: String,
    pub count: usize,
    pub last_activity: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HourBucket {
    pub hour: u32,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    pub period: ReportPeriod,
    pub since: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
    pub total: usize,
    pub by_action: BTreeMap<AuditAction, usize>,
    /// Most active first
    pub users: Vec<UserActivity>,
    /// 24 buckets, one per UTC hour of day
    pub timeline: Vec<HourBucket>,
}

impl AuditReport {
    pub(crate) fn build(
        period: ReportPeriod,
        since: DateTime<Utc>,
        generated_at: DateTime<Utc>,
        entries: &[AuditEntry],
    ) -> Self {
        let mut by_action = BTreeMap::new();
        let mut users: BTreeMap<&str, UserActivity> = BTreeMap::new();
        let mut timeline: Vec<HourBucket> =
            (0..24).map(|hour| HourBucket { hour, count: 0 }).collect();

        for entry in entries {
            *by_action.entry(entry.action).or_insert(0) += 1;

            users
                .entry(entry.actor.id.as_str())
                .and_modify(|activity| {
                    activity.count += 1;
                    if entry.timestamp > activity.last_activity {
                        activity.last_activity = entry.timestamp;
                    }
                })
                .or_insert_with(|| UserActivity {
                    user_id: entry.actor.id.clone(),
                    name: entry.actor.name.clone(),
                    role: entry.actor.role.clone(),
                    count: 1,
                    last_activity: entry.timestamp,
                });

            timeline[entry.timestamp.hour() as usize].count += 1;
        }

        let mut users: Vec<UserActivity> = users.into_values().collect();
        users.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.user_id.cmp(&b.user_id)));

        Self {
            period,
            since,
            generated_at,
            total: entries.len(),
            by_action,
            users,
            timeline,
        }
    }

    pub fn count(&self, action: AuditAction) -> usize {
        self.by_action.get(&action).copied().unwrap_or(0)
    }
}
