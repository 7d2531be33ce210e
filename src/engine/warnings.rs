use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Data-quality warnings attached to a disposal. None of these abort a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Warning {
    /// Disposal exceeded every matchable acquisition.
    /// The `unmatched` quantity was given a cost basis of zero.
    OverDisposal {
        required: Decimal,
        unmatched: Decimal,
    },
    /// The price source reported a zero unit price for the disposal day.
    ZeroPrice { day: NaiveDate },
}

impl Warning {
    pub fn name(&self) -> &'static str {
        match self {
            Warning::OverDisposal { .. } => "OverDisposal",
            Warning::ZeroPrice { .. } => "ZeroPrice",
        }
    }

    pub fn message(&self) -> String {
        match self {
            Warning::OverDisposal {
                required,
                unmatched,
            } if unmatched == required => {
                format!("No acquisitions available for {} units - cost basis is 0", required.normalize())
            }
            Warning::OverDisposal {
                required,
                unmatched,
            } => format!(
                "Only {} of {} units matched - remaining {} carry no cost basis",
                (*required - *unmatched).normalize(),
                required.normalize(),
                unmatched.normalize()
            ),
            Warning::ZeroPrice { day } => format!("Unit price on {} is zero - proceeds are 0", day),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn over_disposal_messages() {
        let none = Warning::OverDisposal {
            required: dec!(5),
            unmatched: dec!(5),
        };
        assert_eq!(none.message(), "No acquisitions available for 5 units - cost basis is 0");

        let partial = Warning::OverDisposal {
            required: dec!(5),
            unmatched: dec!(1.5),
        };
        assert_eq!(
            partial.message(),
            "Only 3.5 of 5 units matched - remaining 1.5 carry no cost basis"
        );
    }

    #[test]
    fn serializes_with_type_tag() {
        let warning = Warning::ZeroPrice {
            day: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
        };
        let json = serde_json::to_string(&warning).unwrap();
        assert_eq!(json, r#"{"type":"ZeroPrice","day":"2025-03-01"}"#);
    }
}
