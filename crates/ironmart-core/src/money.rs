//! # Money Module
//!
//! Provides the `Money` type for monetary values exchanged with Tally.
//!
//! ## Why Integer Paise?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  Tally compares voucher totals to the paisa. A float rounding error     │
//! │  on one line makes the whole voucher unbalanced and Tally rejects it:   │
//! │    0.1 + 0.2 = 0.30000000000000004  ❌                                   │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Paise                                            │
//! │    ₹1,234.50 is stored as 123450 and rendered as "1234.50" only at      │
//! │    the XML boundary                                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! use ironmart_core::money::Money;
//!
//! let unit = Money::from_paise(49_900); // ₹499.00
//! let line = unit * 3;
//! assert_eq!(line.to_tally_amount(), "1497.00");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Neg, Sub};
use ts_rs::TS;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in paise (1/100 rupee).
///
/// Signed so that Tally's debit/credit convention (negative amounts on the
/// deemed-positive side) can be expressed without a separate flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from paise.
    ///
    /// ```rust,ignore
    /// use ironmart_core::money::Money;
    ///
    /// assert_eq!(Money::from_paise(1099).paise(), 1099);
    /// ```
    #[inline]
    pub const fn from_paise(paise: i64) -> Self {
        Money(paise)
    }

    /// Returns the value in paise.
    #[inline]
    pub const fn paise(&self) -> i64 {
        self.0
    }

    /// Whole rupees, truncated toward zero.
    #[inline]
    pub const fn rupees(&self) -> i64 {
        self.0 / 100
    }

    /// The paise part, always 0-99.
    #[inline]
    pub const fn paise_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Renders the amount the way Tally expects it inside `<AMOUNT>`.
    ///
    /// No currency symbol, no thousands separator, always two decimals.
    ///
    /// ```rust,ignore
    /// use ironmart_core::money::Money;
    ///
    /// assert_eq!(Money::from_paise(123_450).to_tally_amount(), "1234.50");
    /// assert_eq!(Money::from_paise(-5).to_tally_amount(), "-0.05");
    /// ```
    pub fn to_tally_amount(&self) -> String {
        let sign = if self.0 < 0 { "-" } else { "" };
        format!("{}{}.{:02}", sign, self.rupees().abs(), self.paise_part())
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Human-readable rupee format for logs.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(f, "{}₹{}.{:02}", sign, self.rupees().abs(), self.paise_part())
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0 + other.0)
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 += other.0;
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0 - other.0)
    }
}

impl Neg for Money {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

/// Multiplication by a line quantity.
impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        Money(self.0 * qty)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), |acc, m| acc + m)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
