//! Built-in plugins for exercising the pipeline without real hardware.

mod detectors;
mod samplers;
mod sonifiers;

use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tonefield_engine::{PluginRegistry, RegistryError};
use tonefield_plugin_api::{Detector, PluginDefinition, PluginError, Sampler, Sonifier};

pub use sonifiers::ToneAnalyser;

use self::detectors::{MotionDetector, Pattern};
use self::samplers::{CheckerSampler, GradientSampler};
use self::sonifiers::{SilentSonifier, ToneLogSonifier};

pub fn registry() -> Result<PluginRegistry, RegistryError> {
    let mut registry = PluginRegistry::new();

    registry.register_detector(PluginDefinition::from_fn(
        "orbit",
        json!({ "interval_ms": 40, "points": 3, "width": 640.0, "height": 480.0 }),
        |config, _ctx| async move {
            MotionDetector::create(Pattern::Orbit, config).map(|d| Box::new(d) as Box<dyn Detector>)
        },
    ))?;
    registry.register_detector(PluginDefinition::from_fn(
        "scan",
        json!({ "interval_ms": 40, "points": 5, "width": 640.0, "height": 480.0 }),
        |config, _ctx| async move {
            MotionDetector::create(Pattern::Scan, config).map(|d| Box::new(d) as Box<dyn Detector>)
        },
    ))?;

    registry.register_sampler(PluginDefinition::from_fn(
        "gradient",
        json!({}),
        |_config, _ctx| async move { Ok(Box::new(GradientSampler::default()) as Box<dyn Sampler>) },
    ))?;
    registry.register_sampler(PluginDefinition::from_fn(
        "checker",
        json!({ "cells": 8 }),
        |config, _ctx| async move {
            CheckerSampler::create(config).map(|s| Box::new(s) as Box<dyn Sampler>)
        },
    ))?;

    registry.register_sonifier(PluginDefinition::from_fn(
        "tone-log",
        json!({ "min_hz": 220.0, "max_hz": 880.0 }),
        |config, ctx| async move {
            ToneLogSonifier::create(config, &ctx).map(|s| Box::new(s) as Box<dyn Sonifier>)
        },
    ))?;
    registry.register_sonifier(PluginDefinition::from_fn(
        "silent",
        json!({}),
        |_config, _ctx| async move { Ok(Box::new(SilentSonifier) as Box<dyn Sonifier>) },
    ))?;

    Ok(registry)
}

fn parse_config<T: DeserializeOwned>(plugin: &str, value: Value) -> Result<T, PluginError> {
    serde_json::from_value(value)
        .map_err(|err| PluginError::InvalidConfig(format!("{plugin}: {err}")))
}
