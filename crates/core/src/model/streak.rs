use chrono::{Days, NaiveDate};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StreakError {
    #[error("longest streak ({longest}) is less than current streak ({current})")]
    LongestBelowCurrent { current: u32, longest: u32 },
}

/// Consecutive-calendar-day study streak bookkeeping.
///
/// A streak counts *engagement days*: a day with any number of
/// step-completion events counts exactly once. Time logging and
/// annotations never move it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Streak {
    current: u32,
    longest: u32,
    last_study_date: Option<NaiveDate>,
}

impl Streak {
    /// A streak with no recorded study days.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rehydrates a streak from persisted storage.
    ///
    /// # Errors
    ///
    /// Returns `StreakError::LongestBelowCurrent` if the stored longest
    /// streak is smaller than the current one.
    pub fn from_persisted(
        current: u32,
        longest: u32,
        last_study_date: Option<NaiveDate>,
    ) -> Result<Self, StreakError> {
        if longest < current {
            return Err(StreakError::LongestBelowCurrent { current, longest });
        }
        Ok(Self {
            current,
            longest,
            last_study_date,
        })
    }

    /// Records a study event on the given calendar day.
    ///
    /// - Same day as the last recorded one: no change, so repeated
    ///   completions within a day count once.
    /// - Last recorded day was yesterday: the streak extends.
    /// - Anything else (no history, a gap, or a last date in the
    ///   future): the streak restarts at 1.
    pub fn record(&mut self, today: NaiveDate) {
        if self.last_study_date == Some(today) {
            return;
        }

        let yesterday = today.checked_sub_days(Days::new(1));
        if self.last_study_date.is_some() && self.last_study_date == yesterday {
            self.current += 1;
        } else {
            self.current = 1;
        }

        self.longest = self.longest.max(self.current);
        self.last_study_date = Some(today);
    }

    #[must_use]
    pub fn current(&self) -> u32 {
        self.current
    }

    #[must_use]
    pub fn longest(&self) -> u32 {
        self.longest
    }

    #[must_use]
    pub fn last_study_date(&self) -> Option<NaiveDate> {
        self.last_study_date
    }
}
