//! Temperature categories shared by orders and shelves.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Orders carry one of the regular categories; the overflow category exists
/// only as a shelf.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Temperature {
    Hot,
    Cold,
    Frozen,
    Overflow,
}

impl Temperature {
    pub const ALL: [Temperature; 4] = [
        Temperature::Hot,
        Temperature::Cold,
        Temperature::Frozen,
        Temperature::Overflow,
    ];

    /// The categories an order can natively belong to.
    pub const REGULAR: [Temperature; 3] =
        [Temperature::Hot, Temperature::Cold, Temperature::Frozen];

    pub fn is_regular(self) -> bool {
        !matches!(self, Temperature::Overflow)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Temperature::Hot => "hot",
            Temperature::Cold => "cold",
            Temperature::Frozen => "frozen",
            Temperature::Overflow => "overflow",
        }
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_is_not_regular() {
        assert!(Temperature::Hot.is_regular());
        assert!(Temperature::Cold.is_regular());
        assert!(Temperature::Frozen.is_regular());
        assert!(!Temperature::Overflow.is_regular());
        assert!(!Temperature::REGULAR.contains(&Temperature::Overflow));
    }

    #[test]
    fn deserializes_lowercase_names() {
        let temp: Temperature = serde_json::from_str("\"frozen\"").unwrap();
        assert_eq!(temp, Temperature::Frozen);
    }
}
