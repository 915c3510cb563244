//! Canonical member identifiers: `SFA-` + `MM` + `YY` + first two digits of
//! the phone + last two digits of the phone, optionally suffixed `-N`.

use chrono::{Datelike, NaiveDate, Utc};

use crate::member::MemberId;

pub const CANONICAL_PREFIX: &str = "SFA-";

/// Upper bound on candidate ids tried before giving up with
/// [`crate::Error::CollisionExhausted`].
pub const MAX_COLLISION_ATTEMPTS: u32 = 50;

/// Source of the calendar date embedded in generated identifiers.
pub trait Clock: Send + Sync {
  fn today(&self) -> NaiveDate;
}

/// The UTC calendar date of the host clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn today(&self) -> NaiveDate { Utc::now().date_naive() }
}

/// Always reports the same date.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
  fn today(&self) -> NaiveDate { self.0 }
}

/// Build the base canonical id for `phone` in the month of `on`.
///
/// Phones shorter than two digits are left-padded with `0` on each side.
pub fn canonical_id(phone: &str, on: NaiveDate) -> MemberId {
  let chars: Vec<char> = phone.chars().collect();
  let first: String = chars.iter().take(2).collect();
  let last: String = chars[chars.len().saturating_sub(2)..].iter().collect();
  MemberId::new(format!(
    "{CANONICAL_PREFIX}{:02}{:02}{first:0>2}{last:0>2}",
    on.month(),
    on.year().rem_euclid(100),
  ))
}

/// The `n`th collision alternative of `base`; `n == 0` is `base` itself.
pub fn with_suffix(base: &MemberId, n: u32) -> MemberId {
  if n == 0 {
    base.clone()
  } else {
    MemberId::new(format!("{base}-{n}"))
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn jan_2025() -> NaiveDate { NaiveDate::from_ymd_opt(2025, 1, 20).unwrap() }

  #[test]
  fn formats_month_year_and_phone_edges() {
    assert_eq!(canonical_id("9876543210", jan_2025()).as_str(), "SFA-01259810");
  }

  #[test]
  fn same_month_is_deterministic() {
    let later = NaiveDate::from_ymd_opt(2025, 1, 31).unwrap();
    assert_eq!(canonical_id("9123456789", jan_2025()), canonical_id("9123456789", later));
  }

  #[test]
  fn different_month_changes_the_id() {
    let feb = NaiveDate::from_ymd_opt(2025, 2, 1).unwrap();
    assert_ne!(canonical_id("9123456789", jan_2025()), canonical_id("9123456789", feb));
  }

  #[test]
  fn short_phones_are_zero_padded() {
    assert_eq!(canonical_id("7", jan_2025()).as_str(), "SFA-01250707");
    assert_eq!(canonical_id("", jan_2025()).as_str(), "SFA-01250000");
    assert_eq!(canonical_id("123", jan_2025()).as_str(), "SFA-01251223");
  }

  #[test]
  fn suffixes() {
    let base = canonical_id("9876543210", jan_2025());
    assert_eq!(with_suffix(&base, 0), base);
    assert_eq!(with_suffix(&base, 2).as_str(), "SFA-01259810-2");
    assert!(with_suffix(&base, 2).is_canonical());
  }
}
