use std::fmt;

use crate::error::{Error, Result};
use crate::link::Activation;

/// FTRL-Proximal hyperparameters. Immutable once a model is built.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Params {
    /// Per-coordinate learning rate scale.
    pub alpha: f64,
    /// Learning rate smoothing.
    pub beta: f64,
    /// L1 strength; weights with `|z| <= lambda1` are exactly zero.
    pub lambda1: f64,
    pub lambda2: f64,
    /// Bound on the absolute sample gradient.
    pub grad_clip: f64,
    /// Accepted for compatibility, never applied.
    pub dropout: f64,
    /// Accepted for compatibility; training always runs every epoch.
    pub tol: f64,
    pub epochs: usize,
    pub activation: Activation,
}

impl Default for Params {
    fn default() -> Self {
        Params {
            alpha: 0.15,
            beta: 1.0,
            lambda1: 0.5,
            lambda2: 1.0,
            grad_clip: 1000.0,
            dropout: 0.0,
            tol: 1e-4,
            epochs: 10,
            activation: Activation::Sigmoid,
        }
    }
}

impl Params {
    pub fn validate(&self) -> Result<()> {
        let finite = [
            ("alpha", self.alpha),
            ("beta", self.beta),
            ("l1", self.lambda1),
            ("l2", self.lambda2),
            ("clip", self.grad_clip),
        ];
        for &(name, v) in &finite {
            if !v.is_finite() {
                return Err(Error::config(format!("{} must be finite, got {}", name, v)));
            }
        }
        if self.alpha <= 0.0 {
            return Err(Error::config(format!("alpha must be positive, got {}", self.alpha)));
        }
        for &(name, v) in &finite[1..] {
            if v < 0.0 {
                return Err(Error::config(format!(
                    "{} must be non-negative, got {}",
                    name, v
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Display for Params {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "FTRL{{Alpha:{}, Beta:{}, L1:{}, L2:{}, max_iter:{}, activation:{:?}}}",
            self.alpha,
            self.beta,
            self.lambda1,
            self.lambda2,
            self.epochs,
            self.activation.code()
        )
    }
}
