//! Membership term arithmetic.
//!
//! A term is a season and a four digit year written as `f2006` (fall 2006). Terms are counted
//! from [`EPOCH`] so offsets and distances are plain integer arithmetic:
//! winter covers January to April, spring May to August and fall September to December.

use crate::error::{Error, Result};
use chrono::{Datelike, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Year terms are counted from.
pub const EPOCH: i32 = 1970;

const SEASONS_PER_YEAR: i64 = 3;
const MAX_YEAR: i32 = 9999;

/// A season of the academic year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Season {
    /// January to April.
    Winter,
    /// May to August.
    Spring,
    /// September to December.
    Fall,
}

impl Season {
    const ALL: [Self; 3] = [Self::Winter, Self::Spring, Self::Fall];

    /// Single-letter prefix used in term strings.
    #[must_use]
    pub const fn letter(self) -> char {
        match self {
            Self::Winter => 'w',
            Self::Spring => 's',
            Self::Fall => 'f',
        }
    }

    fn from_letter(letter: char) -> Option<Self> {
        Self::ALL.into_iter().find(|season| season.letter() == letter)
    }

    const fn index(self) -> i64 {
        match self {
            Self::Winter => 0,
            Self::Spring => 1,
            Self::Fall => 2,
        }
    }

    /// Season containing the given month (1-12).
    #[must_use]
    pub const fn from_month(month: u32) -> Self {
        match month {
            1..=4 => Self::Winter,
            5..=8 => Self::Spring,
            _ => Self::Fall,
        }
    }
}

/// A membership term.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Term {
    // Terms since the winter of `EPOCH`.
    index: i64,
}

impl Term {
    /// Creates a term from its parts.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTerm`] if the year does not have four digits.
    pub fn new(season: Season, year: i32) -> Result<Self> {
        if !(0..=MAX_YEAR).contains(&year) {
            return Err(Error::InvalidTerm(format!("{}{year}", season.letter())));
        }
        Ok(Self {
            index: i64::from(year - EPOCH) * SEASONS_PER_YEAR + season.index(),
        })
    }

    /// Parses a term string such as `f2006`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTerm`] unless the input is a season letter followed by exactly
    /// four digits.
    pub fn parse(input: &str) -> Result<Self> {
        let invalid = || Error::InvalidTerm(input.to_string());

        let mut chars = input.chars();
        let season = chars
            .next()
            .and_then(Season::from_letter)
            .ok_or_else(invalid)?;
        let digits = chars.as_str();
        if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(invalid());
        }
        let year = digits.parse::<i32>().map_err(|_| invalid())?;
        Self::new(season, year)
    }

    /// Term containing the given date.
    #[must_use]
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            index: i64::from(date.year() - EPOCH) * SEASONS_PER_YEAR
                + Season::from_month(date.month()).index(),
        }
    }

    /// The current term according to the local calendar.
    #[must_use]
    pub fn current() -> Self {
        Self::from_date(Local::now().date_naive())
    }

    /// Season of this term.
    #[must_use]
    pub fn season(self) -> Season {
        // rem_euclid keeps the index in 0..3 for pre-epoch years.
        match self.index.rem_euclid(SEASONS_PER_YEAR) {
            0 => Season::Winter,
            1 => Season::Spring,
            _ => Season::Fall,
        }
    }

    /// Four digit year of this term.
    #[must_use]
    pub fn year(self) -> i32 {
        let years = self.index.div_euclid(SEASONS_PER_YEAR);
        EPOCH + i32::try_from(years).unwrap_or(i32::MAX - EPOCH)
    }

    /// Term `offset` terms after this one (negative offsets go back).
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTerm`] if the result leaves the four digit year range.
    pub fn add(self, offset: i64) -> Result<Self> {
        let index = self
            .index
            .checked_add(offset)
            .ok_or_else(|| Error::InvalidTerm(format!("{self} + {offset}")))?;
        let candidate = Self { index };
        if !(0..=MAX_YEAR).contains(&candidate.year()) {
            return Err(Error::InvalidTerm(format!("{self} + {offset}")));
        }
        Ok(candidate)
    }

    /// The following term.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTerm`] past fall 9999.
    pub fn next(self) -> Result<Self> {
        self.add(1)
    }

    /// The preceding term.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidTerm`] before winter 0000.
    pub fn previous(self) -> Result<Self> {
        self.add(-1)
    }

    /// Number of terms from `self` to `other`.
    #[must_use]
    pub const fn delta(self, other: Self) -> i64 {
        other.index - self.index
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:04}", self.season().letter(), self.year())
    }
}

impl FromStr for Term {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Term {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Term> for String {
    fn from(term: Term) -> Self {
        term.to_string()
    }
}

/// Returns true if the string is a well-formed term.
#[must_use]
pub fn validate(term: &str) -> bool {
    Term::parse(term).is_ok()
}

/// The term after `term`.
///
/// # Errors
///
/// Returns [`Error::InvalidTerm`] on a malformed term.
pub fn next(term: &str) -> Result<String> {
    Ok(Term::parse(term)?.next()?.to_string())
}

/// The term before `term`.
///
/// # Errors
///
/// Returns [`Error::InvalidTerm`] on a malformed term.
pub fn previous(term: &str) -> Result<String> {
    Ok(Term::parse(term)?.previous()?.to_string())
}

/// The term `offset` terms after `term`.
///
/// # Errors
///
/// Returns [`Error::InvalidTerm`] on a malformed term or an out-of-range result.
pub fn add(term: &str, offset: i64) -> Result<String> {
    Ok(Term::parse(term)?.add(offset)?.to_string())
}

/// Distance from `initial` to `last`, so that `add(initial, delta(initial, last)) == last`.
///
/// # Errors
///
/// Returns [`Error::InvalidTerm`] if either term is malformed.
pub fn delta(initial: &str, last: &str) -> Result<i64> {
    Ok(Term::parse(initial)?.delta(Term::parse(last)?))
}

/// Chronological comparison; `Greater` means `first` is later than `second`.
///
/// # Errors
///
/// Returns [`Error::InvalidTerm`] if either term is malformed.
pub fn compare(first: &str, second: &str) -> Result<Ordering> {
    Ok(delta(second, first)?.cmp(&0))
}

/// `count` consecutive terms starting at `base`.
///
/// # Errors
///
/// Returns [`Error::InvalidTerm`] on a malformed base or if the interval leaves the year range.
pub fn interval(base: &str, count: usize) -> Result<Vec<String>> {
    let base = Term::parse(base)?;
    (0..count)
        .map(|offset| {
            let offset = i64::try_from(offset)
                .map_err(|_| Error::InvalidTerm(format!("{base} + {offset}")))?;
            Ok(base.add(offset)?.to_string())
        })
        .collect()
}

/// The current term as a string.
#[must_use]
pub fn current() -> String {
    Term::current().to_string()
}

/// The earliest term at or after the current one that is not already registered.
///
/// # Errors
///
/// Returns [`Error::InvalidTerm`] if any registered term is malformed.
pub fn next_unregistered<S: AsRef<str>>(registered: &[S]) -> Result<String> {
    next_unregistered_from(Term::current(), registered)
}

/// Like [`next_unregistered`] with an explicit current term.
///
/// # Errors
///
/// Returns [`Error::InvalidTerm`] if any registered term is malformed.
pub fn next_unregistered_from<S: AsRef<str>>(now: Term, registered: &[S]) -> Result<String> {
    let registered = registered
        .iter()
        .map(|term| Term::parse(term.as_ref()))
        .collect::<Result<std::collections::BTreeSet<_>>>()?;

    let mut candidate = now;
    while registered.contains(&candidate) {
        candidate = candidate.next()?;
    }
    Ok(candidate.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn october_2006() -> Term {
        Term::from_date(NaiveDate::from_ymd_opt(2006, 10, 15).unwrap())
    }

    #[test]
    fn parse_and_display() {
        let term = Term::parse("f2006").unwrap();
        assert_eq!(term.season(), Season::Fall);
        assert_eq!(term.year(), 2006);
        assert_eq!(term.to_string(), "f2006");
        assert_eq!(Term::parse("w0001").unwrap().to_string(), "w0001");
    }

    #[test]
    fn malformed_terms_are_rejected() {
        for bad in ["", "f206", "x2006", "F2006", "f20066", "f20a6", "2006f", "f-206"] {
            assert!(
                matches!(Term::parse(bad), Err(Error::InvalidTerm(_))),
                "{bad} should be rejected"
            );
            assert!(!validate(bad));
        }
    }

    #[test]
    fn neighbours() {
        assert_eq!(next("f2006").unwrap(), "w2007");
        assert_eq!(previous("f2006").unwrap(), "s2006");
        assert_eq!(previous("w2007").unwrap(), "f2006");
        assert!(next("f9999").is_err());
        assert!(previous("w0000").is_err());
    }

    #[test]
    fn delta_and_compare() {
        assert_eq!(delta("f2006", "w2007").unwrap(), 1);
        assert_eq!(compare("f2006", "w2007").unwrap(), Ordering::Less);
        assert_eq!(compare("w2007", "f2006").unwrap(), Ordering::Greater);
        assert_eq!(compare("s2001", "s2001").unwrap(), Ordering::Equal);
        assert_eq!(add("f2006", delta("f2006", "w2010").unwrap()).unwrap(), "w2010");
        assert!(compare("f2006", "bogus").is_err());
    }

    #[test]
    fn interval_lists_consecutive_terms() {
        assert_eq!(
            interval("f2006", 3).unwrap(),
            vec!["f2006", "w2007", "s2007"]
        );
        assert!(interval("f2006", 0).unwrap().is_empty());
    }

    #[test]
    fn month_to_season_mapping() {
        let term_for = |month| {
            Term::from_date(NaiveDate::from_ymd_opt(2006, month, 1).unwrap()).to_string()
        };
        assert_eq!(term_for(1), "w2006");
        assert_eq!(term_for(4), "w2006");
        assert_eq!(term_for(5), "s2006");
        assert_eq!(term_for(8), "s2006");
        assert_eq!(term_for(9), "f2006");
        assert_eq!(term_for(10), "f2006");
        assert_eq!(term_for(12), "f2006");
    }

    #[test]
    fn next_unregistered_in_october_2006() {
        let now = october_2006();
        assert_eq!(now.to_string(), "f2006");
        assert_eq!(next_unregistered_from::<&str>(now, &[]).unwrap(), "f2006");
        assert_eq!(next_unregistered_from(now, &["f2006"]).unwrap(), "w2007");
        assert_eq!(
            next_unregistered_from(now, &["f2006", "w2007", "f2007"]).unwrap(),
            "s2007"
        );
        assert_eq!(next_unregistered_from(now, &["s2006"]).unwrap(), "f2006");
        assert!(next_unregistered_from(now, &["f06"]).is_err());
    }

    #[test]
    fn next_unregistered_uses_today() {
        let now = current();
        assert_eq!(next_unregistered::<&str>(&[]).unwrap(), now);
        assert_eq!(next_unregistered(&[now.as_str()]).unwrap(), next(&now).unwrap());
    }

    #[test]
    fn serde_uses_term_strings() {
        let term = Term::parse("s2007").unwrap();
        assert_eq!(serde_json::to_string(&term).unwrap(), "\"s2007\"");
        let parsed: Term = serde_json::from_str("\"w2010\"").unwrap();
        assert_eq!(parsed.to_string(), "w2010");
        assert!(serde_json::from_str::<Term>("\"q2010\"").is_err());
    }

    fn term_strategy() -> impl Strategy<Value = Term> {
        (
            prop_oneof![Just(Season::Winter), Just(Season::Spring), Just(Season::Fall)],
            1000..=3000i32,
        )
            .prop_map(|(season, year)| Term::new(season, year).unwrap())
    }

    proptest! {
        #[test]
        fn add_delta_round_trip(a in term_strategy(), b in term_strategy()) {
            let (a, b) = (a.to_string(), b.to_string());
            prop_assert_eq!(add(&a, delta(&a, &b).unwrap()).unwrap(), b);
        }

        #[test]
        fn next_previous_round_trip(t in term_strategy()) {
            let t = t.to_string();
            prop_assert_eq!(next(&previous(&t).unwrap()).unwrap(), t.clone());
            prop_assert_eq!(previous(&next(&t).unwrap()).unwrap(), t);
        }

        #[test]
        fn compare_agrees_with_delta(a in term_strategy(), b in term_strategy()) {
            let (a, b) = (a.to_string(), b.to_string());
            let ordering = compare(&a, &b).unwrap();
            prop_assert_eq!(ordering == Ordering::Greater, delta(&b, &a).unwrap() > 0);
            prop_assert_eq!(ordering, compare(&b, &a).unwrap().reverse());
        }
    }
}
