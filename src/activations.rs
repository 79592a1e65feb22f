use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// A scalar activation function and its derivative with respect to the
/// pre-activation input. Any parameters live on the implementing value.
pub trait ActivationFunction: fmt::Debug + Send + Sync {
    fn activate(&self, x: f64) -> f64;
    fn derivative(&self, x: f64) -> f64;
}

/// Logistic function with steepness `alpha`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sigmoid {
    pub alpha: f64,
}

impl Default for Sigmoid {
    fn default() -> Self {
        Sigmoid { alpha: 1.0 }
    }
}

impl ActivationFunction for Sigmoid {
    fn activate(&self, x: f64) -> f64 {
        1.0 / (1.0 + (-self.alpha * x).exp())
    }

    fn derivative(&self, x: f64) -> f64 {
        let y = self.activate(x);
        self.alpha * y * (1.0 - y)
    }
}

/// Logistic function rescaled to (-1, 1)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BipolarSigmoid {
    pub alpha: f64,
}

impl Default for BipolarSigmoid {
    fn default() -> Self {
        BipolarSigmoid { alpha: 2.0 }
    }
}

impl ActivationFunction for BipolarSigmoid {
    fn activate(&self, x: f64) -> f64 {
        2.0 / (1.0 + (-self.alpha * x).exp()) - 1.0
    }

    fn derivative(&self, x: f64) -> f64 {
        let y = self.activate(x);
        self.alpha * (1.0 - y * y) / 2.0
    }
}

/// Unnormalized sinc, sin(x) / x, continuous at zero
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Sinc;

impl Sinc {
    const EPS: f64 = 1e-8;
}

impl ActivationFunction for Sinc {
    fn activate(&self, x: f64) -> f64 {
        if x.abs() < Self::EPS {
            1.0
        } else {
            x.sin() / x
        }
    }

    fn derivative(&self, x: f64) -> f64 {
        // taylor expansion around zero avoids the cancellation in the closed form
        if x.abs() < Self::EPS {
            -x / 3.0
        } else {
            (x * x.cos() - x.sin()) / (x * x)
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Relu;

impl ActivationFunction for Relu {
    fn activate(&self, x: f64) -> f64 {
        x.max(0.0)
    }

    fn derivative(&self, x: f64) -> f64 {
        if x > 0.0 {
            1.0
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Linear {
    pub slope: f64,
}

impl Default for Linear {
    fn default() -> Self {
        Linear { slope: 1.0 }
    }
}

impl ActivationFunction for Linear {
    fn activate(&self, x: f64) -> f64 {
        self.slope * x
    }

    fn derivative(&self, _x: f64) -> f64 {
        self.slope
    }
}

/// A function bundled with its parameters, so a configuration can never pair
/// one function with another's settings. `Custom` is the extension point for
/// user-defined scalar functions and is not persisted.
#[derive(Debug, Clone, Serialize, Deserialize, strum::Display)]
pub enum Activation {
    Sigmoid(Sigmoid),
    BipolarSigmoid(BipolarSigmoid),
    Sinc(Sinc),
    Relu(Relu),
    Linear(Linear),
    #[serde(skip)]
    Custom(Arc<dyn ActivationFunction>),
}

impl Activation {
    pub fn custom<F: ActivationFunction + 'static>(f: F) -> Self {
        Activation::Custom(Arc::new(f))
    }

    /// The built in functions with their default parameters
    pub fn builtins() -> Vec<Activation> {
        vec![
            Activation::Sigmoid(Sigmoid::default()),
            Activation::BipolarSigmoid(BipolarSigmoid::default()),
            Activation::Sinc(Sinc),
            Activation::Relu(Relu),
            Activation::Linear(Linear::default()),
        ]
    }

    fn inner(&self) -> &dyn ActivationFunction {
        match self {
            Activation::Sigmoid(f) => f,
            Activation::BipolarSigmoid(f) => f,
            Activation::Sinc(f) => f,
            Activation::Relu(f) => f,
            Activation::Linear(f) => f,
            Activation::Custom(f) => f.as_ref(),
        }
    }
}

impl Default for Activation {
    fn default() -> Self {
        Activation::Sigmoid(Sigmoid::default())
    }
}

impl ActivationFunction for Activation {
    fn activate(&self, x: f64) -> f64 {
        self.inner().activate(x)
    }

    fn derivative(&self, x: f64) -> f64 {
        self.inner().derivative(x)
    }
}
