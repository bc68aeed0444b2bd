//! Link functions mapping a linear score to a prediction.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    /// Logistic regression.
    Sigmoid,
    /// Plain linear score.
    Identity,
    /// Log-linear (Poisson-style) model.
    Exponential,
}

impl Activation {
    pub const VARIANTS: &'static [&'static str] = &["sigmoid", "identity", "exponential"];

    pub fn apply(self, score: f64) -> f64 {
        match self {
            Activation::Sigmoid => sigmoid(score),
            Activation::Identity => score,
            Activation::Exponential => score.exp(),
        }
    }

    /// One-letter code: `b`inomial, `g`aussian or `p`oisson.
    pub fn code(self) -> char {
        match self {
            Activation::Sigmoid => 'b',
            Activation::Identity => 'g',
            Activation::Exponential => 'p',
        }
    }
}

impl Default for Activation {
    fn default() -> Self {
        Activation::Sigmoid
    }
}

impl FromStr for Activation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.to_ascii_lowercase().as_str() {
            "sigmoid" | "b" => Ok(Activation::Sigmoid),
            "identity" | "g" => Ok(Activation::Identity),
            "exponential" | "exp" | "p" => Ok(Activation::Exponential),
            _ => Err(Error::config(format!(
                "unknown activation {:?}, expected one of {:?} (or b, g, p)",
                s,
                Self::VARIANTS
            ))),
        }
    }
}

impl fmt::Display for Activation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Activation::Sigmoid => "sigmoid",
            Activation::Identity => "identity",
            Activation::Exponential => "exponential",
        };
        f.write_str(name)
    }
}

/// Logistic function, evaluated so that `exp` never overflows.
pub fn sigmoid(x: f64) -> f64 {
    if x >= 0.0 {
        1.0 / (1.0 + (-x).exp())
    } else {
        let e = x.exp();
        e / (1.0 + e)
    }
}
