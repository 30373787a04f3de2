//! Parameter strings for eviction policies.
//!
//! Every policy is configured with a string of comma-separated `key=value`
//! tokens, e.g. `"n-bit-counter=2"` or `"split-point=0.4,miss-diff=0.001"`.
//! Keys are matched case-insensitively. A value containing `.` is a float,
//! anything else an integer. The reserved key `print` stops parsing and asks
//! the caller to show the effective parameters.
//!
//! Each policy describes its record with [`PolicyParams`]: `Default` gives the
//! documented defaults, [`PolicyParams::apply`] handles one key and `Display`
//! renders the "current parameters" string, which parses back to an equal
//! record.
//!
//! ```
//! use cachesim::params::{parse_pairs, Numeric};
//!
//! let pairs = parse_pairs(" Scaler=1.5 , k=3");
//! assert_eq!(pairs[0].key, "scaler");
//! assert_eq!(pairs[0].numeric("x").unwrap(), Numeric::Float(1.5));
//! assert_eq!(pairs[1].numeric("x").unwrap(), Numeric::Int(3));
//! ```

use std::fmt;

use crate::error::ConfigError;

/// One `key=value` token. `key` is lower-cased, `raw` is trimmed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub key: String,
    pub raw: String,
}

/// A parsed numeric literal; the presence of `.` selects `Float`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Numeric {
    Int(i64),
    Float(f64),
}

impl Param {
    fn malformed(&self, policy: &'static str) -> ConfigError {
        ConfigError::MalformedValue {
            policy,
            key: self.key.clone(),
            value: self.raw.clone(),
        }
    }

    /// Parses the value as an integer or float depending on whether it
    /// contains a `.`.
    pub fn numeric(&self, policy: &'static str) -> Result<Numeric, ConfigError> {
        if self.raw.contains('.') {
            self.raw
                .parse::<f64>()
                .map(Numeric::Float)
                .map_err(|_| self.malformed(policy))
        } else {
            self.raw
                .parse::<i64>()
                .map(Numeric::Int)
                .map_err(|_| self.malformed(policy))
        }
    }

    /// Parses an integer value; floats are rejected.
    pub fn int(&self, policy: &'static str) -> Result<i64, ConfigError> {
        match self.numeric(policy)? {
            Numeric::Int(v) => Ok(v),
            Numeric::Float(_) => Err(self.malformed(policy)),
        }
    }

    /// Parses a non-negative integer value.
    pub fn uint(&self, policy: &'static str) -> Result<u64, ConfigError> {
        u64::try_from(self.int(policy)?).map_err(|_| self.malformed(policy))
    }

    /// Parses a float value; integer literals are widened.
    pub fn float(&self, policy: &'static str) -> Result<f64, ConfigError> {
        match self.numeric(policy)? {
            Numeric::Int(v) => Ok(v as f64),
            Numeric::Float(v) if v.is_finite() => Ok(v),
            Numeric::Float(_) => Err(self.malformed(policy)),
        }
    }

    /// Returns the value as text, lower-cased.
    pub fn text(&self) -> String {
        self.raw.to_ascii_lowercase()
    }
}

/// Splits a parameter string into tokens. Empty tokens are skipped; a token
/// without `=` yields an empty value.
pub fn parse_pairs(input: &str) -> Vec<Param> {
    input
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(|token| {
            let (key, raw) = token.split_once('=').unwrap_or((token, ""));
            Param {
                key: key.trim().to_ascii_lowercase(),
                raw: raw.trim().to_string(),
            }
        })
        .collect()
}

/// Typed parameter record of one policy.
pub trait PolicyParams: Default + fmt::Display + Sized {
    /// Policy name used in error messages.
    const POLICY: &'static str;

    /// The default parameter string, equal to `Self::default().to_string()`.
    const DEFAULTS: &'static str;

    /// Applies one token; unknown keys must return [`PolicyParams::unknown`].
    fn apply(&mut self, param: &Param) -> Result<(), ConfigError>;

    /// Builds the record from the defaults and an optional user string.
    fn parse(input: Option<&str>) -> Result<Self, ConfigError> {
        let mut params = Self::default();
        if let Some(input) = input {
            for param in parse_pairs(input) {
                if param.key == "print" {
                    return Err(ConfigError::PrintRequested {
                        policy: Self::POLICY,
                        params: params.to_string(),
                    });
                }
                params.apply(&param)?;
            }
        }
        Ok(params)
    }

    /// Error for a key this policy does not know.
    fn unknown(&self, param: &Param) -> ConfigError {
        ConfigError::UnknownParam {
            policy: Self::POLICY,
            key: param.key.clone(),
            example: self.to_string(),
        }
    }
}

/// Validates the parameter string of a policy that takes no parameters.
pub fn expect_no_params(policy: &'static str, input: Option<&str>) -> Result<(), ConfigError> {
    match input.map(parse_pairs).unwrap_or_default().first() {
        None => Ok(()),
        Some(param) if param.key == "print" => Err(ConfigError::PrintRequested {
            policy,
            params: String::new(),
        }),
        Some(param) => Err(ConfigError::UnknownParam {
            policy,
            key: param.key.clone(),
            example: String::new(),
        }),
    }
}

/// Formats a float so that it always contains a `.` and never uses
/// exponent notation, keeping it a float when parsed back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Float(pub f64);

impl fmt::Display for Float {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.0.to_string();
        if s.contains('.') || !self.0.is_finite() {
            f.write_str(&s)
        } else {
            write!(f, "{s}.0")
        }
    }
}

/// A size given either as a fraction of the cache capacity (float literal)
/// or as an absolute count (integer literal).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Amount {
    Ratio(f64),
    Count(u64),
}

impl Amount {
    pub fn from_param(param: &Param, policy: &'static str) -> Result<Self, ConfigError> {
        match param.numeric(policy)? {
            Numeric::Float(v) if v.is_finite() && v >= 0.0 => Ok(Self::Ratio(v)),
            Numeric::Int(v) if v >= 0 => Ok(Self::Count(v as u64)),
            _ => Err(ConfigError::MalformedValue {
                policy,
                key: param.key.clone(),
                value: param.raw.clone(),
            }),
        }
    }

    /// Absolute value for a cache of `capacity` units (truncating).
    #[inline]
    pub fn resolve(self, capacity: u64) -> u64 {
        match self {
            Self::Ratio(r) => (r * capacity as f64) as u64,
            Self::Count(n) => n,
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ratio(r) => write!(f, "{}", Float(*r)),
            Self::Count(n) => write!(f, "{n}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Demo {
        scaler: f64,
        k: u64,
    }

    impl Default for Demo {
        fn default() -> Self {
            Self { scaler: 1.5, k: 1 }
        }
    }

    impl fmt::Display for Demo {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "scaler={},k={}", Float(self.scaler), self.k)
        }
    }

    impl PolicyParams for Demo {
        const POLICY: &'static str = "Demo";
        const DEFAULTS: &'static str = "scaler=1.5,k=1";

        fn apply(&mut self, param: &Param) -> Result<(), ConfigError> {
            match param.key.as_str() {
                "scaler" => self.scaler = param.float(Self::POLICY)?,
                "k" => self.k = param.uint(Self::POLICY)?,
                _ => return Err(self.unknown(param)),
            }
            Ok(())
        }
    }

    mod basic_operations {
        use super::*;

        #[test]
        fn pairs_are_trimmed_and_lowercased() {
            let pairs = parse_pairs("  N-Bit-Counter = 2 ,, Mode=3 ");
            assert_eq!(pairs.len(), 2);
            assert_eq!(pairs[0].key, "n-bit-counter");
            assert_eq!(pairs[0].raw, "2");
            assert_eq!(pairs[1].key, "mode");
        }

        #[test]
        fn defaults_match_display() {
            assert_eq!(Demo::default().to_string(), Demo::DEFAULTS);
            assert_eq!(Demo::parse(None).unwrap(), Demo::default());
        }

        #[test]
        fn parse_overrides_defaults() {
            let demo = Demo::parse(Some("K=4")).unwrap();
            assert_eq!(demo, Demo { scaler: 1.5, k: 4 });
        }

        #[test]
        fn display_round_trips() {
            let demo = Demo::parse(Some("scaler=0.00001,k=9")).unwrap();
            let again = Demo::parse(Some(&demo.to_string())).unwrap();
            assert_eq!(demo, again);
        }

        #[test]
        fn amount_ratio_and_count() {
            let ratio = Amount::from_param(&parse_pairs("b=0.25")[0], "x").unwrap();
            let count = Amount::from_param(&parse_pairs("b=7")[0], "x").unwrap();
            assert_eq!(ratio.resolve(100), 25);
            assert_eq!(count.resolve(100), 7);
            assert_eq!(ratio.to_string(), "0.25");
            assert_eq!(count.to_string(), "7");
        }
    }

    mod edge_cases {
        use super::*;

        #[test]
        fn unknown_key_reports_example() {
            let err = Demo::parse(Some("nope=1")).unwrap_err();
            match err {
                ConfigError::UnknownParam { key, example, .. } => {
                    assert_eq!(key, "nope");
                    assert_eq!(example, Demo::DEFAULTS);
                }
                other => panic!("unexpected error {other:?}"),
            }
        }

        #[test]
        fn malformed_numbers_are_rejected() {
            assert!(matches!(
                Demo::parse(Some("k=abc")),
                Err(ConfigError::MalformedValue { .. })
            ));
            assert!(matches!(
                Demo::parse(Some("k=1.5")),
                Err(ConfigError::MalformedValue { .. })
            ));
            assert!(matches!(
                Demo::parse(Some("k=-1")),
                Err(ConfigError::MalformedValue { .. })
            ));
        }

        #[test]
        fn print_stops_with_current_params() {
            let err = Demo::parse(Some("k=3,print,scaler=9.0")).unwrap_err();
            assert_eq!(
                err,
                ConfigError::PrintRequested {
                    policy: "Demo",
                    params: "scaler=1.5,k=3".into()
                }
            );
        }

        #[test]
        fn float_display_keeps_dot() {
            assert_eq!(Float(1.0).to_string(), "1.0");
            assert_eq!(Float(0.0001).to_string(), "0.0001");
            assert_eq!(Float(f64::INFINITY).to_string(), "inf");
        }

        #[test]
        fn missing_value_is_malformed() {
            assert!(matches!(
                Demo::parse(Some("k")),
                Err(ConfigError::MalformedValue { .. })
            ));
        }
    }
}
