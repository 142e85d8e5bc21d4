//! # Schedule Types
//!
//! The four background jobs and the cadence arithmetic that decides when
//! each runs next. The scheduler loop itself lives in ironmart-sync; this
//! module only answers "given now, when is the next tick?".
//!
//! ## Default Cadence Table
//! ```text
//! ┌──────────────────────────┬──────────────────────────────────────────┐
//! │ Job                      │ Cadence                                  │
//! ├──────────────────────────┼──────────────────────────────────────────┤
//! │ voucher_pull             │ every 10 minutes                         │
//! │ full_stock_reset         │ daily at 02:00 (store time zone)         │
//! │ health_check             │ hourly at minute 0 (store time zone)     │
//! │ abandoned_order_cleanup  │ every 30 minutes                         │
//! └──────────────────────────┴──────────────────────────────────────────┘
//! ```
//!
//! Wall-clock cadences are evaluated in the store's time zone. For zones with
//! half-hour offsets (Asia/Kolkata is UTC+05:30) "hourly at minute 0" is
//! minute 30 in UTC.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, NaiveDateTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::error::{CoreError, CoreResult};

// =============================================================================
// Job Kind
// =============================================================================

/// Identifies a scheduled background job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// Incremental inbound pull of modified Tally vouchers.
    VoucherPull,
    /// Absolute reset of stock to Tally closing balances.
    FullStockReset,
    /// Probe, drain the outbound queue if online, record a snapshot.
    HealthCheck,
    /// Cancel unpaid online orders and release their stock.
    AbandonedOrderCleanup,
}

impl JobKind {
    pub const ALL: [JobKind; 4] = [
        JobKind::VoucherPull,
        JobKind::FullStockReset,
        JobKind::HealthCheck,
        JobKind::AbandonedOrderCleanup,
    ];

    pub const fn as_str(&self) -> &'static str {
        match self {
            JobKind::VoucherPull => "voucher_pull",
            JobKind::FullStockReset => "full_stock_reset",
            JobKind::HealthCheck => "health_check",
            JobKind::AbandonedOrderCleanup => "abandoned_order_cleanup",
        }
    }

    /// Jobs that talk to Tally and honour the `tally_sync_enabled` flag.
    pub const fn requires_tally(&self) -> bool {
        !matches!(self, JobKind::AbandonedOrderCleanup)
    }

    /// The production cadence for this job.
    pub const fn default_cadence(&self) -> Cadence {
        match self {
            JobKind::VoucherPull => Cadence::Every(Duration::from_secs(10 * 60)),
            JobKind::FullStockReset => Cadence::DailyAt { hour: 2, minute: 0 },
            JobKind::HealthCheck => Cadence::HourlyAt { minute: 0 },
            JobKind::AbandonedOrderCleanup => Cadence::Every(Duration::from_secs(30 * 60)),
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JobKind::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| CoreError::UnknownJob(s.to_string()))
    }
}

// =============================================================================
// Cadence
// =============================================================================

/// When a job fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cadence {
    /// Fixed interval.
    Every(Duration),
    /// Once an hour at the given minute, in the store time zone.
    HourlyAt { minute: u32 },
    /// Once a day at the given local time.
    DailyAt { hour: u32, minute: u32 },
}

impl Cadence {
    /// Rejects cadences that can never fire.
    pub fn validate(&self) -> CoreResult<()> {
        match *self {
            Cadence::Every(d) if d.is_zero() => Err(CoreError::InvalidCadence {
                reason: "interval must be greater than zero".to_string(),
            }),
            Cadence::HourlyAt { minute } | Cadence::DailyAt { minute, .. } if minute > 59 => {
                Err(CoreError::InvalidCadence {
                    reason: format!("minute {} must be below 60", minute),
                })
            }
            Cadence::DailyAt { hour, .. } if hour > 23 => Err(CoreError::InvalidCadence {
                reason: format!("hour {} must be below 24", hour),
            }),
            _ => Ok(()),
        }
    }

    /// The first tick strictly after `now`.
    ///
    /// Local times that do not exist (DST spring-forward gap) are skipped to
    /// the next period.
    pub fn next_after(&self, now: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
        match *self {
            Cadence::Every(d) => {
                let step = ChronoDuration::from_std(d).unwrap_or(ChronoDuration::minutes(1));
                now + step
            }
            Cadence::HourlyAt { minute } => {
                let local = now.with_timezone(&tz).naive_local();
                let start = local
                    .date()
                    .and_hms_opt(local.hour(), minute, 0)
                    .unwrap_or(local);
                first_after(now, tz, start, ChronoDuration::hours(1), 48)
                    .unwrap_or(now + ChronoDuration::hours(1))
            }
            Cadence::DailyAt { hour, minute } => {
                let local = now.with_timezone(&tz).naive_local();
                let start = local.date().and_hms_opt(hour, minute, 0).unwrap_or(local);
                first_after(now, tz, start, ChronoDuration::days(1), 4)
                    .unwrap_or(now + ChronoDuration::days(1))
            }
        }
    }

    /// How long to sleep from `now` until the next tick.
    pub fn delay_until_next(&self, now: DateTime<Utc>, tz: Tz) -> Duration {
        (self.next_after(now, tz) - now)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

/// Walks local candidates `start, start + step, ...` and returns the first
/// that exists in `tz` and lies after `now`.
fn first_after(
    now: DateTime<Utc>,
    tz: Tz,
    start: NaiveDateTime,
    step: ChronoDuration,
    max_steps: usize,
) -> Option<DateTime<Utc>> {
    let mut candidate = start;
    for _ in 0..max_steps {
        if let Some(at) = tz.from_local_datetime(&candidate).earliest() {
            let at = at.with_timezone(&Utc);
            if at > now {
                return Some(at);
            }
        }
        candidate += step;
    }
    None
}

impl fmt::Display for Cadence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cadence::Every(d) => write!(f, "every {}s", d.as_secs()),
            Cadence::HourlyAt { minute } => write!(f, "hourly at :{:02}", minute),
            Cadence::DailyAt { hour, minute } => write!(f, "daily at {:02}:{:02}", hour, minute),
        }
    }
}

/// Parses an IANA time zone name such as `Asia/Kolkata`.
pub fn parse_time_zone(name: &str) -> CoreResult<Tz> {
    name.parse::<Tz>()
        .map_err(|_| CoreError::UnknownTimeZone(name.to_string()))
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn utc(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn test_default_cadence_table() {
        assert_eq!(
            JobKind::VoucherPull.default_cadence(),
            Cadence::Every(Duration::from_secs(600))
        );
        assert_eq!(
            JobKind::FullStockReset.default_cadence(),
            Cadence::DailyAt { hour: 2, minute: 0 }
        );
        assert_eq!(
            JobKind::HealthCheck.default_cadence(),
            Cadence::HourlyAt { minute: 0 }
        );
        assert_eq!(
            JobKind::AbandonedOrderCleanup.default_cadence(),
            Cadence::Every(Duration::from_secs(1800))
        );
    }

    #[test]
    fn test_job_kind_parse() {
        for kind in JobKind::ALL {
            assert_eq!(kind.as_str().parse::<JobKind>().unwrap(), kind);
        }
        assert!("reindex".parse::<JobKind>().is_err());
        assert!(!JobKind::AbandonedOrderCleanup.requires_tally());
        assert!(JobKind::HealthCheck.requires_tally());
    }

    #[test]
    fn test_every_adds_interval() {
        let now = utc("2024-01-01T10:10:00Z");
        let next = Cadence::Every(Duration::from_secs(600)).next_after(now, Tz::UTC);
        assert_eq!(next, utc("2024-01-01T10:20:00Z"));
    }

    #[test]
    fn test_hourly_in_half_hour_offset_zone() {
        // 15:40 IST -> 16:00 IST
        let now = utc("2024-01-01T10:10:00Z");
        let next = Cadence::HourlyAt { minute: 0 }.next_after(now, chrono_tz::Asia::Kolkata);
        assert_eq!(next, utc("2024-01-01T10:30:00Z"));
    }

    #[test]
    fn test_hourly_on_the_boundary_moves_to_next_hour() {
        let now = utc("2024-01-01T10:30:00Z");
        let next = Cadence::HourlyAt { minute: 0 }.next_after(now, chrono_tz::Asia::Kolkata);
        assert_eq!(next, utc("2024-01-01T11:30:00Z"));
    }

    #[test]
    fn test_daily_rolls_to_tomorrow() {
        // 15:40 IST on Jan 1 -> 02:00 IST on Jan 2
        let now = utc("2024-01-01T10:10:00Z");
        let next = Cadence::DailyAt { hour: 2, minute: 0 }.next_after(now, chrono_tz::Asia::Kolkata);
        assert_eq!(next, utc("2024-01-01T20:30:00Z"));
    }

    #[test]
    fn test_daily_skips_nonexistent_local_time() {
        // 02:30 does not exist in New York on 2024-03-10
        let now = utc("2024-03-10T05:00:00Z");
        let next = Cadence::DailyAt { hour: 2, minute: 30 }
            .next_after(now, chrono_tz::America::New_York);
        assert_eq!(next, utc("2024-03-11T06:30:00Z"));
    }

    #[test]
    fn test_validate() {
        assert!(Cadence::Every(Duration::ZERO).validate().is_err());
        assert!(Cadence::HourlyAt { minute: 60 }.validate().is_err());
        assert!(Cadence::DailyAt { hour: 24, minute: 0 }.validate().is_err());
        assert!(Cadence::DailyAt { hour: 23, minute: 59 }.validate().is_ok());
    }

    #[test]
    fn test_parse_time_zone() {
        assert_eq!(parse_time_zone("Asia/Kolkata").unwrap(), chrono_tz::Asia::Kolkata);
        assert!(parse_time_zone("Mars/Olympus").is_err());
    }
}
