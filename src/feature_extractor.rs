//! Tabular feature assembly for fusion model inference.
//!
//! Turns a loosely-typed feature map into the fixed-order vector the
//! feature scaler and the regression head were fit against.

use crate::error::PredictionError;
use serde_json::{Map, Value};
use std::fmt;
use std::ops::Index;
use std::str::FromStr;

/// Number of tabular features consumed by the model.
pub const FEATURE_COUNT: usize = 6;

/// One of the geospatial features describing a tile.
///
/// Declaration order is the model's input order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TabularFeature {
    Elevation,
    LandCoverClass,
    MeanDistanceToWater,
    MeanNdvi,
    NighttimeLight,
    Slope,
}

impl TabularFeature {
    /// All features in canonical order
    pub const ALL: [TabularFeature; FEATURE_COUNT] = [
        TabularFeature::Elevation,
        TabularFeature::LandCoverClass,
        TabularFeature::MeanDistanceToWater,
        TabularFeature::MeanNdvi,
        TabularFeature::NighttimeLight,
        TabularFeature::Slope,
    ];

    /// Name used in request payloads and scaler artifacts
    pub fn name(self) -> &'static str {
        match self {
            TabularFeature::Elevation => "elevation",
            TabularFeature::LandCoverClass => "land_cover_class",
            TabularFeature::MeanDistanceToWater => "mean_distance_to_water",
            TabularFeature::MeanNdvi => "mean_ndvi",
            TabularFeature::NighttimeLight => "nighttime_light",
            TabularFeature::Slope => "slope",
        }
    }

    /// Position in the model input vector
    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for TabularFeature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TabularFeature {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TabularFeature::ALL
            .into_iter()
            .find(|feature| feature.name() == s)
            .ok_or_else(|| format!("unknown tabular feature '{}'", s))
    }
}

/// Raw (unscaled) feature values in canonical order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TabularVector([f32; FEATURE_COUNT]);

impl TabularVector {
    pub fn new(values: [f32; FEATURE_COUNT]) -> Self {
        Self(values)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.0
    }
}

impl Index<TabularFeature> for TabularVector {
    type Output = f32;

    fn index(&self, feature: TabularFeature) -> &f32 {
        &self.0[feature.index()]
    }
}

/// Feature payload as received from a caller: name to value, any key order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureMap(Map<String, Value>);

impl FeatureMap {
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Parse a serialized feature payload. It must be a JSON object.
    pub fn from_json(text: &str) -> Result<Self, PredictionError> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| PredictionError::BadRequest(format!("features is not valid JSON: {}", e)))?;

        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(PredictionError::BadRequest(format!(
                "features must be a JSON object, got {}",
                json_type_name(&other)
            ))),
        }
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>> FromIterator<(K, f64)> for FeatureMap {
    fn from_iter<I: IntoIterator<Item = (K, f64)>>(iter: I) -> Self {
        let mut map = FeatureMap::new();
        for (name, value) in iter {
            map.insert(name, value);
        }
        map
    }
}

/// Assembles feature maps into model input vectors.
///
/// No imputation and no clipping: values pass through as given, and a
/// missing feature is an error rather than a default.
pub struct FeatureExtractor;

impl FeatureExtractor {
    /// Create a new feature extractor.
    pub fn new() -> Self {
        Self
    }

    /// Extract the canonical feature vector from a feature map.
    ///
    /// Fails on the first absent feature in canonical order. Unknown keys
    /// are ignored.
    pub fn extract(&self, features: &FeatureMap) -> Result<TabularVector, PredictionError> {
        let mut values = [0.0_f32; FEATURE_COUNT];

        for feature in TabularFeature::ALL {
            let raw = features
                .get(feature.name())
                .ok_or(PredictionError::MissingFeature(feature.name()))?;
            values[feature.index()] = coerce(feature, raw)?;
        }

        Ok(TabularVector(values))
    }

    /// Get the number of features produced.
    pub fn feature_count(&self) -> usize {
        FEATURE_COUNT
    }

    /// Get feature names in model input order.
    pub fn feature_names(&self) -> Vec<&'static str> {
        TabularFeature::ALL.iter().map(|f| f.name()).collect()
    }
}

impl Default for FeatureExtractor {
    fn default() -> Self {
        Self::new()
    }
}

/// Numbers pass through; numeric strings are parsed the way a float32 array
/// cast would accept them. Everything else is rejected.
fn coerce(feature: TabularFeature, raw: &Value) -> Result<f32, PredictionError> {
    let invalid = |reason: String| PredictionError::InvalidFeature {
        name: feature.name(),
        reason,
    };

    let value = match raw {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| invalid(format!("{} is not representable as a float", n)))?,
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| invalid(format!("'{}' is not a number", s)))?,
        other => return Err(invalid(format!("expected a number, got {}", json_type_name(other)))),
    };

    let value = value as f32;
    if !value.is_finite() {
        return Err(invalid("value is not finite".to_string()));
    }
    Ok(value)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
