//! Identifier type for provisioned instances.

use super::InstanceDomainError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Positive integer identifying one provisioned instance.
///
/// The identifier drives every derived value of an instance: its ports,
/// container network, database name, and compose project name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "u32")]
pub struct InstanceId(u32);

impl InstanceId {
    /// Creates a validated instance identifier.
    ///
    /// # Errors
    ///
    /// Returns [`InstanceDomainError::InvalidInstanceId`] when `value` is zero,
    /// negative, or does not fit in 32 bits.
    pub fn new(value: i64) -> Result<Self, InstanceDomainError> {
        if value <= 0 {
            return Err(InstanceDomainError::InvalidInstanceId {
                value,
                reason: "instance ids must be positive".to_owned(),
            });
        }

        u32::try_from(value)
            .map(Self)
            .map_err(|_| InstanceDomainError::InvalidInstanceId {
                value,
                reason: "instance id is too large".to_owned(),
            })
    }

    /// Returns the wrapped integer.
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Returns the smallest positive identifier not present in `taken`.
    #[must_use]
    pub fn next_free(taken: impl IntoIterator<Item = Self>) -> Self {
        let mut used: Vec<u32> = taken.into_iter().map(Self::get).collect();
        used.sort_unstable();
        used.dedup();

        let mut candidate = 1;
        for value in used {
            if value != candidate {
                break;
            }
            candidate += 1;
        }
        Self(candidate)
    }
}

impl TryFrom<i64> for InstanceId {
    type Error = InstanceDomainError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<InstanceId> for u32 {
    fn from(value: InstanceId) -> Self {
        value.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(0)]
    #[case(-1)]
    #[case(-4_096)]
    #[case(i64::from(u32::MAX) + 1)]
    fn rejects_out_of_range_values(#[case] value: i64) {
        let result = InstanceId::new(value);

        assert!(matches!(
            result,
            Err(InstanceDomainError::InvalidInstanceId { value: rejected, .. }) if rejected == value
        ));
    }

    #[rstest]
    #[case(&[], 1)]
    #[case(&[1, 2, 3], 4)]
    #[case(&[2, 3], 1)]
    #[case(&[1, 3, 4], 2)]
    #[case(&[3, 1, 1], 2)]
    fn next_free_fills_the_lowest_gap(#[case] taken: &[i64], #[case] expected: u32) {
        let ids = taken
            .iter()
            .map(|value| InstanceId::new(*value).expect("valid test id"));

        assert_eq!(InstanceId::next_free(ids).get(), expected);
    }

    #[test]
    fn deserialization_rejects_zero() {
        let result = serde_json::from_str::<InstanceId>("0");

        assert!(result.is_err());
    }
}
