// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Feedback containers
//!
//! Backward propagation carries an accumulating feedback object instead of a
//! numeric gradient. Any payload works as long as it implements [`Feedback`]:
//! a commutative, associative [`Feedback::combine`] used wherever feedback
//! from multiple consumers meets at one node.
//!
//! [`Summed`] is the scalar container used by
//! [`SumRule`](crate::propagate::SumRule): it tracks the user-originated
//! critique alongside the running sum, so that two distinct critiques meeting
//! at one node fail instead of silently blending.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// An accumulating critique propagated from an output toward its inputs.
///
/// `combine` must be commutative and associative over the visited-set part of
/// the payload; implementations fail on conflicting user-originated values
/// rather than merging them.
pub trait Feedback: Clone + std::fmt::Debug {
    /// Merge two feedback objects arriving at the same node.
    ///
    /// # Errors
    ///
    /// - [`Error::MissingUserFeedback`] if both operands lack a user component
    /// - [`Error::ConflictingUserFeedback`] if both carry distinct user values
    /// - [`Error::HeterogeneousFeedback`] if payload kinds differ
    fn combine(self, other: Self) -> Result<Self>;
}

/// A raw user-supplied critique: text or a number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FeedbackValue {
    /// Numeric feedback, summed on fan-in
    Number(f64),
    /// Textual feedback, concatenated on fan-in
    Text(String),
}

impl FeedbackValue {
    /// Kind name used in heterogeneity errors.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            FeedbackValue::Number(_) => "number",
            FeedbackValue::Text(_) => "text",
        }
    }

    /// Add two values of the same kind: numbers sum, text concatenates.
    pub(crate) fn add(self, other: FeedbackValue) -> Result<FeedbackValue> {
        match (self, other) {
            (FeedbackValue::Number(a), FeedbackValue::Number(b)) => {
                Ok(FeedbackValue::Number(a + b))
            }
            (FeedbackValue::Text(mut a), FeedbackValue::Text(b)) => {
                a.push_str(&b);
                Ok(FeedbackValue::Text(a))
            }
            (a, b) => Err(Error::HeterogeneousFeedback {
                left: a.kind(),
                right: b.kind(),
            }),
        }
    }
}

impl From<&str> for FeedbackValue {
    fn from(s: &str) -> Self {
        FeedbackValue::Text(s.to_owned())
    }
}

impl From<String> for FeedbackValue {
    fn from(s: String) -> Self {
        FeedbackValue::Text(s)
    }
}

impl From<f64> for FeedbackValue {
    fn from(n: f64) -> Self {
        FeedbackValue::Number(n)
    }
}

impl std::fmt::Display for FeedbackValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FeedbackValue::Number(n) => write!(f, "{n}"),
            FeedbackValue::Text(s) => f.write_str(s),
        }
    }
}

/// Scalar feedback with broadcast/sum semantics.
///
/// `value` is the running reduction: numbers sum, text concatenates. `user`
/// remembers the original critique that seeded the traversal; when two paths
/// carrying different critiques meet, combination fails.
///
/// # Example
///
/// ```rust
/// use dashtrace::{Feedback, FeedbackValue, Summed};
///
/// let a = Summed::user(FeedbackValue::from("A"));
/// let b = Summed::user(FeedbackValue::from("A"));
/// let merged = a.combine(b).unwrap();
/// assert_eq!(merged.value, FeedbackValue::from("AA"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summed {
    /// The running sum/concatenation of contributions
    pub value: FeedbackValue,
    /// The user critique this feedback originated from, if any
    pub user: Option<FeedbackValue>,
}

impl Summed {
    /// Feedback seeded directly by the user at the traversal terminal.
    #[must_use]
    pub fn user(value: impl Into<FeedbackValue>) -> Self {
        let value = value.into();
        Summed {
            user: Some(value.clone()),
            value,
        }
    }

    /// An intermediate contribution with no user component of its own.
    #[must_use]
    pub fn partial(value: impl Into<FeedbackValue>) -> Self {
        Summed {
            value: value.into(),
            user: None,
        }
    }
}

impl Feedback for Summed {
    fn combine(self, other: Self) -> Result<Self> {
        // Kind mismatch is reported before user-value conflicts.
        let value = self.value.add(other.value)?;
        let user = merge_user(self.user, other.user)?;
        Ok(Summed { value, user })
    }
}

/// Shared user-component rule: at least one side must carry one, and two
/// present values must agree.
pub(crate) fn merge_user(
    left: Option<FeedbackValue>,
    right: Option<FeedbackValue>,
) -> Result<Option<FeedbackValue>> {
    match (left, right) {
        (None, None) => Err(Error::MissingUserFeedback),
        (Some(u), None) | (None, Some(u)) => Ok(Some(u)),
        (Some(a), Some(b)) => {
            if a == b {
                Ok(Some(a))
            } else {
                Err(Error::ConflictingUserFeedback {
                    left: a.to_string(),
                    right: b.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_sum_on_combine() {
        let merged = Summed::user(2.0).combine(Summed::user(2.0)).unwrap();
        assert_eq!(merged.value, FeedbackValue::Number(4.0));
        assert_eq!(merged.user, Some(FeedbackValue::Number(2.0)));
    }

    #[test]
    fn text_concatenates_on_combine() {
        let merged = Summed::user("A").combine(Summed::user("A")).unwrap();
        assert_eq!(merged.value, FeedbackValue::from("AA"));
    }

    #[test]
    fn conflicting_user_values_fail() {
        let err = Summed::user("A").combine(Summed::user("B")).unwrap_err();
        assert!(matches!(err, Error::ConflictingUserFeedback { .. }));
    }

    #[test]
    fn both_missing_user_components_fail() {
        let err = Summed::partial(1.0).combine(Summed::partial(2.0)).unwrap_err();
        assert!(matches!(err, Error::MissingUserFeedback));
    }

    #[test]
    fn heterogeneous_kinds_fail() {
        let err = Summed::user("A").combine(Summed::user(1.0)).unwrap_err();
        assert!(matches!(
            err,
            Error::HeterogeneousFeedback {
                left: "text",
                right: "number"
            }
        ));
    }

    #[test]
    fn one_sided_user_component_survives() {
        let merged = Summed::user(3.0).combine(Summed::partial(4.0)).unwrap();
        assert_eq!(merged.value, FeedbackValue::Number(7.0));
        assert_eq!(merged.user, Some(FeedbackValue::Number(3.0)));
    }
}
