use anyhow::Context;
use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveTime, Utc};
use std::collections::HashSet;

const IST_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

// NSE cash session, IST.
const SESSION_OPEN: (u32, u32) = (9, 15);
const SESSION_CLOSE: (u32, u32) = (15, 30);

/// Trading calendar for the Indian cash market: weekdays minus configured holidays.
#[derive(Debug, Clone, Default)]
pub struct MarketCalendar {
    holidays: HashSet<NaiveDate>,
}

impl MarketCalendar {
    pub fn new(holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            holidays: holidays.into_iter().collect(),
        }
    }

    /// Fixed-date national holidays plus `NSE_MARKET_HOLIDAYS="YYYY-MM-DD,YYYY-MM-DD"`.
    pub fn from_env() -> Self {
        let mut out = Self::new(fixed_holidays());
        if let Ok(s) = std::env::var("NSE_MARKET_HOLIDAYS") {
            out.holidays.extend(parse_holidays(&s));
        }
        out
    }

    pub fn is_trading_day(&self, date: NaiveDate) -> bool {
        !is_weekend(date) && !self.holidays.contains(&date)
    }

    /// True between the session open (inclusive) and close (exclusive) on a trading day.
    pub fn is_trading_session(&self, now_utc: DateTime<Utc>) -> anyhow::Result<bool> {
        let now_ist = now_utc.with_timezone(&ist()?);
        if !self.is_trading_day(now_ist.date_naive()) {
            return Ok(false);
        }
        let t = now_ist.time();
        Ok(t >= hm(SESSION_OPEN)? && t < hm(SESSION_CLOSE)?)
    }

    /// Market date the latest daily bar belongs to: today once the session has opened on a trading
    /// day, otherwise the previous trading day.
    pub fn resolve_as_of_date(
        &self,
        as_of_date_arg: Option<&str>,
        now_utc: DateTime<Utc>,
    ) -> anyhow::Result<NaiveDate> {
        if let Some(s) = as_of_date_arg {
            return NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .with_context(|| format!("invalid as-of date: {s}"));
        }

        let now_ist = now_utc.with_timezone(&ist()?);
        let mut date = now_ist.date_naive();
        if now_ist.time() < hm(SESSION_OPEN)? {
            date -= Duration::days(1);
        }

        // Bounded: at most a few weeks of consecutive closures in practice.
        for _ in 0..366 {
            if self.is_trading_day(date) {
                return Ok(date);
            }
            date -= Duration::days(1);
        }
        anyhow::bail!("no trading day found in the year before {}", now_ist.date_naive())
    }
}

fn ist() -> anyhow::Result<FixedOffset> {
    FixedOffset::east_opt(IST_OFFSET_SECS).context("invalid IST offset")
}

fn hm((h, m): (u32, u32)) -> anyhow::Result<NaiveTime> {
    NaiveTime::from_hms_opt(h, m, 0).with_context(|| format!("invalid time {h}:{m}"))
}

fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), chrono::Weekday::Sat | chrono::Weekday::Sun)
}

fn fixed_holidays() -> Vec<NaiveDate> {
    // Republic Day, Independence Day, Gandhi Jayanti, Christmas.
    let mut out = Vec::new();
    for y in 2024..=2030 {
        for (m, d) in [(1, 26), (8, 15), (10, 2), (12, 25)] {
            if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
                out.push(date);
            }
        }
    }
    out
}

fn parse_holidays(s: &str) -> Vec<NaiveDate> {
    s.split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .filter_map(|p| match NaiveDate::parse_from_str(p, "%Y-%m-%d") {
            Ok(d) => Some(d),
            Err(_) => {
                tracing::warn!(value = p, "ignoring malformed NSE_MARKET_HOLIDAYS entry");
                None
            }
        })
        .collect()
}
