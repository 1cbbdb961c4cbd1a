//! Typed reads from a strategy parameter bag
//!
//! A [`ParamReader`] remembers which keys were consumed so that
//! [`ParamReader::finish`] can reject keys the variant does not understand.

use crate::error::ParamError;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use torq_types::{ParamValue, ParameterBag};

pub struct ParamReader<'a> {
    strategy_type: &'static str,
    bag: &'a ParameterBag,
    consumed: BTreeSet<&'a str>,
}

impl<'a> ParamReader<'a> {
    pub fn new(strategy_type: &'static str, bag: &'a ParameterBag) -> Self {
        Self {
            strategy_type,
            bag,
            consumed: BTreeSet::new(),
        }
    }

    fn take(&mut self, name: &str) -> Option<&'a ParamValue> {
        let (key, value) = self.bag.get_key_value(name)?;
        self.consumed.insert(key.as_str());
        Some(value)
    }

    fn wrong_type(name: &str, expected: &'static str, value: &ParamValue) -> ParamError {
        ParamError::WrongType {
            name: name.to_string(),
            expected,
            found: value.kind(),
        }
    }

    /// Positive integer, e.g. an indicator period
    pub fn period(&mut self, name: &str, default: usize) -> Result<usize, ParamError> {
        let Some(value) = self.take(name) else {
            return Ok(default);
        };
        let raw = value
            .as_i64()
            .ok_or_else(|| Self::wrong_type(name, "integer", value))?;
        if raw < 1 {
            return Err(ParamError::Invalid {
                name: name.to_string(),
                reason: format!("must be >= 1, got {raw}"),
            });
        }
        Ok(raw as usize)
    }

    /// Non-negative integer count
    pub fn count(&mut self, name: &str, default: u64) -> Result<u64, ParamError> {
        let Some(value) = self.take(name) else {
            return Ok(default);
        };
        let raw = value
            .as_i64()
            .ok_or_else(|| Self::wrong_type(name, "integer", value))?;
        u64::try_from(raw).map_err(|_| ParamError::Invalid {
            name: name.to_string(),
            reason: format!("must be >= 0, got {raw}"),
        })
    }

    /// Finite number as `Decimal`; integers are accepted
    pub fn decimal(&mut self, name: &str, default: Decimal) -> Result<Decimal, ParamError> {
        let Some(value) = self.take(name) else {
            return Ok(default);
        };
        let raw = value
            .as_f64()
            .ok_or_else(|| Self::wrong_type(name, "number", value))?;
        Decimal::from_f64(raw).ok_or_else(|| ParamError::Invalid {
            name: name.to_string(),
            reason: format!("{raw} is not a finite number"),
        })
    }

    /// One of a fixed set of lowercase words
    pub fn choice(
        &mut self,
        name: &str,
        allowed: &[&'static str],
        default: &'static str,
    ) -> Result<&'static str, ParamError> {
        let Some(value) = self.take(name) else {
            return Ok(default);
        };
        let text = value
            .as_str()
            .ok_or_else(|| Self::wrong_type(name, "string", value))?;
        allowed
            .iter()
            .copied()
            .find(|a| a.eq_ignore_ascii_case(text))
            .ok_or_else(|| ParamError::Invalid {
                name: name.to_string(),
                reason: format!("'{text}' is not one of {}", allowed.join(", ")),
            })
    }

    /// Reject any key that no getter consumed
    pub fn finish(self) -> Result<(), ParamError> {
        let unknown: Vec<&str> = self
            .bag
            .keys()
            .map(String::as_str)
            .filter(|k| !self.consumed.contains(k))
            .collect();
        if unknown.is_empty() {
            Ok(())
        } else {
            Err(ParamError::Unknown {
                strategy_type: self.strategy_type,
                names: unknown.join(", "),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn bag(entries: &[(&str, ParamValue)]) -> ParameterBag {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_defaults_when_absent() {
        let bag = bag(&[]);
        let mut reader = ParamReader::new("test", &bag);
        assert_eq!(reader.period("fast", 5).unwrap(), 5);
        assert_eq!(reader.decimal("qty", dec!(1)).unwrap(), dec!(1));
        assert!(reader.finish().is_ok());
    }

    #[test]
    fn test_integer_accepted_as_decimal() {
        let bag = bag(&[("qty", ParamValue::Int(3))]);
        let mut reader = ParamReader::new("test", &bag);
        assert_eq!(reader.decimal("qty", dec!(1)).unwrap(), dec!(3));
    }

    #[test]
    fn test_wrong_type_reported() {
        let bag = bag(&[("fast", ParamValue::Text("five".into()))]);
        let mut reader = ParamReader::new("test", &bag);
        assert_eq!(
            reader.period("fast", 5).unwrap_err(),
            ParamError::WrongType {
                name: "fast".into(),
                expected: "integer",
                found: "string"
            }
        );
    }

    #[test]
    fn test_zero_period_rejected() {
        let bag = bag(&[("fast", ParamValue::Int(0))]);
        let mut reader = ParamReader::new("test", &bag);
        assert!(matches!(
            reader.period("fast", 5),
            Err(ParamError::Invalid { .. })
        ));
    }

    #[test]
    fn test_unknown_keys_rejected() {
        let bag = bag(&[("fast", ParamValue::Int(2)), ("typo", ParamValue::Bool(true))]);
        let mut reader = ParamReader::new("test", &bag);
        reader.period("fast", 5).unwrap();
        assert_eq!(
            reader.finish().unwrap_err(),
            ParamError::Unknown {
                strategy_type: "test",
                names: "typo".into()
            }
        );
    }

    #[test]
    fn test_choice_is_case_insensitive() {
        let bag = bag(&[("policy", ParamValue::Text("FATAL".into()))]);
        let mut reader = ParamReader::new("test", &bag);
        assert_eq!(
            reader.choice("policy", &["skip", "fatal"], "skip").unwrap(),
            "fatal"
        );
    }
}
