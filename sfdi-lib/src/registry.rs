// SPDX-License-Identifier: MPL-2.0

//! Strategies looked up by name.
//!
//! A calibration artifact only stores [`StrategySpec`]s,
//! the registry turns them back into runnable strategies.

use crate::error::{Error, Result};
use crate::phase::{ItohUnwrap, NStepPhaseShift, PhaseShift, PhaseUnwrap, ReliabilityUnwrap};
use crate::profilometry::{
    ClassicProfilometry, LinearInverseProfilometry, PolynomialProfilometry, Profilometry,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Value of a strategy option.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionValue {
    Bool(bool),
    Int(i64),
    Float(f64),
}

impl From<bool> for OptionValue {
    fn from(b: bool) -> Self {
        OptionValue::Bool(b)
    }
}

impl From<i64> for OptionValue {
    fn from(i: i64) -> Self {
        OptionValue::Int(i)
    }
}

impl From<usize> for OptionValue {
    fn from(i: usize) -> Self {
        OptionValue::Int(i as i64)
    }
}

impl From<f32> for OptionValue {
    fn from(x: f32) -> Self {
        OptionValue::Float(x as f64)
    }
}

impl From<f64> for OptionValue {
    fn from(x: f64) -> Self {
        OptionValue::Float(x)
    }
}

/// Name of a strategy and its options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategySpec {
    pub name: String,
    #[serde(default)]
    pub options: BTreeMap<String, OptionValue>,
}

impl StrategySpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            options: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<OptionValue>) -> Self {
        self.options.insert(key.to_string(), value.into());
        self
    }

    pub fn bool(&self, key: &str, default: bool) -> Result<bool> {
        match self.options.get(key) {
            None => Ok(default),
            Some(OptionValue::Bool(b)) => Ok(*b),
            Some(v) => Err(self.invalid(key, "a boolean", v)),
        }
    }

    pub fn usize(&self, key: &str, default: usize) -> Result<usize> {
        match self.options.get(key) {
            None => Ok(default),
            Some(OptionValue::Int(i)) if *i >= 0 => Ok(*i as usize),
            Some(OptionValue::Float(x)) if *x >= 0.0 && x.fract() == 0.0 => Ok(*x as usize),
            Some(v) => Err(self.invalid(key, "a non-negative integer", v)),
        }
    }

    pub fn f32(&self, key: &str, default: f32) -> Result<f32> {
        match self.options.get(key) {
            None => Ok(default),
            Some(OptionValue::Int(i)) => Ok(*i as f32),
            Some(OptionValue::Float(x)) if x.is_finite() => Ok(*x as f32),
            Some(v) => Err(self.invalid(key, "a finite number", v)),
        }
    }

    fn invalid(&self, key: &str, expected: &str, found: &OptionValue) -> Error {
        Error::InvalidOption(format!(
            "{}.{} must be {}, got {:?}",
            self.name, key, expected, found
        ))
    }
}

pub type PhaseShiftFactory = fn(&StrategySpec) -> Result<Box<dyn PhaseShift>>;
pub type PhaseUnwrapFactory = fn(&StrategySpec) -> Result<Box<dyn PhaseUnwrap>>;
pub type ProfilometryFactory = fn(&StrategySpec) -> Result<Box<dyn Profilometry>>;

/// Strategy factories, keyed by strategy name.
pub struct Registry {
    phase_shifts: BTreeMap<String, PhaseShiftFactory>,
    phase_unwraps: BTreeMap<String, PhaseUnwrapFactory>,
    profilometries: BTreeMap<String, ProfilometryFactory>,
}

impl Default for Registry {
    /// Registry with every built-in strategy.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register_phase_shift(NStepPhaseShift::NAME, |spec| {
            Ok(Box::new(NStepPhaseShift::from_spec(spec)?))
        });
        registry.register_phase_unwrap(ReliabilityUnwrap::NAME, |spec| {
            Ok(Box::new(ReliabilityUnwrap::from_spec(spec)?))
        });
        registry.register_phase_unwrap(ItohUnwrap::NAME, |_| Ok(Box::new(ItohUnwrap)));
        registry.register_profilometry(ClassicProfilometry::NAME, |spec| {
            Ok(Box::new(ClassicProfilometry::from_spec(spec)?))
        });
        registry.register_profilometry(LinearInverseProfilometry::NAME, |_| {
            Ok(Box::new(LinearInverseProfilometry))
        });
        registry.register_profilometry(PolynomialProfilometry::NAME, |spec| {
            Ok(Box::new(PolynomialProfilometry::from_spec(spec)?))
        });
        registry
    }
}

impl Registry {
    pub fn empty() -> Self {
        Self {
            phase_shifts: BTreeMap::new(),
            phase_unwraps: BTreeMap::new(),
            profilometries: BTreeMap::new(),
        }
    }

    /// Register a phase shift strategy, replacing any previous one of that name.
    pub fn register_phase_shift(&mut self, name: &str, factory: PhaseShiftFactory) {
        self.phase_shifts.insert(name.to_string(), factory);
    }

    pub fn register_phase_unwrap(&mut self, name: &str, factory: PhaseUnwrapFactory) {
        self.phase_unwraps.insert(name.to_string(), factory);
    }

    pub fn register_profilometry(&mut self, name: &str, factory: ProfilometryFactory) {
        self.profilometries.insert(name.to_string(), factory);
    }

    pub fn phase_shift(&self, spec: &StrategySpec) -> Result<Box<dyn PhaseShift>> {
        lookup(&self.phase_shifts, "phase shift", spec)
    }

    pub fn phase_unwrap(&self, spec: &StrategySpec) -> Result<Box<dyn PhaseUnwrap>> {
        lookup(&self.phase_unwraps, "phase unwrap", spec)
    }

    pub fn profilometry(&self, spec: &StrategySpec) -> Result<Box<dyn Profilometry>> {
        lookup(&self.profilometries, "profilometry", spec)
    }

    pub fn phase_shift_names(&self) -> impl Iterator<Item = &str> {
        self.phase_shifts.keys().map(|k| k.as_str())
    }

    pub fn phase_unwrap_names(&self) -> impl Iterator<Item = &str> {
        self.phase_unwraps.keys().map(|k| k.as_str())
    }

    pub fn profilometry_names(&self) -> impl Iterator<Item = &str> {
        self.profilometries.keys().map(|k| k.as_str())
    }
}

fn lookup<T: ?Sized>(
    factories: &BTreeMap<String, fn(&StrategySpec) -> Result<Box<T>>>,
    kind: &'static str,
    spec: &StrategySpec,
) -> Result<Box<T>> {
    let factory = factories
        .get(&spec.name)
        .ok_or_else(|| Error::UnknownStrategy {
            kind,
            name: spec.name.clone(),
        })?;
    factory(spec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_strategies_round_trip_through_their_spec() {
        let registry = Registry::default();
        let shift = registry
            .phase_shift(&StrategySpec::new("n-step").with("phase_count", 4_usize))
            .unwrap();
        assert_eq!(shift.phase_count(), 4);
        assert_eq!(registry.phase_shift(&shift.spec()).unwrap().spec(), shift.spec());

        let unwrap = registry
            .phase_unwrap(&StrategySpec::new("reliability").with("wrap_around", true))
            .unwrap();
        assert_eq!(unwrap.spec().bool("wrap_around", false).unwrap(), true);

        let prof = registry
            .profilometry(&StrategySpec::new("polynomial").with("degree", 2_usize))
            .unwrap();
        assert!(prof.needs_motor_stage());
        assert_eq!(prof.spec().usize("degree", 0).unwrap(), 2);
        assert_eq!(
            registry.profilometry_names().collect::<Vec<_>>(),
            vec!["classic", "linear-inverse", "polynomial"]
        );
    }

    #[test]
    fn unknown_names_and_bad_options_are_errors() {
        let registry = Registry::default();
        assert!(matches!(
            registry.phase_unwrap(&StrategySpec::new("magic")),
            Err(Error::UnknownStrategy {
                kind: "phase unwrap",
                ..
            })
        ));
        let spec = StrategySpec::new("n-step").with("phase_count", true);
        assert!(matches!(
            registry.phase_shift(&spec),
            Err(Error::InvalidOption(_))
        ));
    }

    #[test]
    fn options_deserialize_from_plain_json() {
        let spec: StrategySpec =
            serde_json::from_str(r#"{"name": "classic", "options": {"spatial_frequency": 2, "projector_distance": 0.5}}"#)
                .unwrap();
        assert_eq!(spec.f32("spatial_frequency", 0.0).unwrap(), 2.0);
        assert_eq!(spec.f32("projector_distance", 0.0).unwrap(), 0.5);
        assert_eq!(spec.f32("reference_distance", 1.5).unwrap(), 1.5);
        let bare: StrategySpec = serde_json::from_str(r#"{"name": "itoh"}"#).unwrap();
        assert!(bare.options.is_empty());
    }
}
