// crates/navslam-core/src/core/params.rs
// ============================================================================
// Module: Engine Parameter Sets
// Description: Ordered engine parameters and their delimiter encoding.
// Purpose: Carry tuning keys into the map database and engine arguments.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! A [`ParameterSet`] is an insertion-ordered map of `Group/Name` keys to
//! opaque string values, serialized as `"K1:V1;K2:V2;"`. Keys and values
//! containing `:` or `;` are rejected on insert so the encoding always
//! round-trips.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;

use crate::core::errors::CodecError;

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Default engine tuning table, in serialization order.
pub const DEFAULT_ENGINE_PARAMETERS: &[(&str, &str)] = &[
    ("Mem/IncrementalMemory", "true"),
    ("Mem/InitWMWithAllNodes", "false"),
    ("Mem/DepthAsMask", "false"),
    ("Kp/DetectorStrategy", "6"),
    ("Vis/FeatureType", "6"),
    ("BRIEF/Bytes", "64"),
    ("Kp/MaxFeatures", "1000"),
    ("Vis/MinInliers", "3"),
    ("Vis/DepthAsMask", "false"),
    ("Vis/MaxDepth", "4.0"),
    ("Vis/MinDepth", "0.3"),
    ("OdomF2M/ValidDepthRatio", "0.1"),
    ("Rtabmap/LoopThr", "0.01"),
    ("Rtabmap/LoopRatio", "0"),
    ("Rtabmap/ImagesAlreadyRectified", "true"),
    ("RGBD/LinearUpdate", "0.02"),
    ("RGBD/AngularUpdate", "0.03"),
    ("RGBD/OptimizeFromGraphEnd", "false"),
    ("Optimizer/Strategy", "1"),
    ("Grid/3D", "true"),
    ("Grid/RayTracing", "true"),
    ("Grid/CellSize", "0.05"),
    ("Grid/RangeMax", "4.0"),
    ("Grid/RangeMin", "0.3"),
    ("Grid/DepthDecimation", "4"),
    ("Grid/NoiseFilteringRadius", "0.05"),
    ("Grid/NoiseFilteringMinNeighbors", "5"),
    ("Grid/MinClusterSize", "10"),
    ("Grid/PreVoxelFiltering", "true"),
];

/// Separator between a key and its value.
const KEY_VALUE_SEPARATOR: char = ':';
/// Terminator after each entry.
const ENTRY_TERMINATOR: char = ';';

// ============================================================================
// SECTION: Parameter Set
// ============================================================================

/// Insertion-ordered engine parameters.
///
/// # Invariants
/// - Keys are unique; re-inserting a key replaces its value in place.
/// - No key or value contains `:` or `;`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParameterSet {
    /// Entries in insertion order.
    entries: Vec<(String, String)>,
}

impl ParameterSet {
    /// Creates an empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Returns the default engine tuning table.
    #[must_use]
    pub fn defaults() -> Self {
        let entries = DEFAULT_ENGINE_PARAMETERS
            .iter()
            .map(|(key, value)| ((*key).to_string(), (*value).to_string()))
            .collect();
        Self {
            entries,
        }
    }

    /// Inserts or replaces a parameter.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidParameter`] when the key is empty or either
    /// side contains a delimiter.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Result<(), CodecError> {
        let key = key.into();
        let value = value.into();
        let has_delimiter =
            |s: &str| s.contains(KEY_VALUE_SEPARATOR) || s.contains(ENTRY_TERMINATOR);
        if key.is_empty() || has_delimiter(&key) || has_delimiter(&value) {
            return Err(CodecError::InvalidParameter(format!("{key}={value}")));
        }
        match self.entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
        Ok(())
    }

    /// Returns the value for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    /// Overlays `other` onto this set, keeping existing positions.
    pub fn merge(&mut self, other: &Self) {
        for (key, value) in &other.entries {
            match self.entries.iter_mut().find(|(existing, _)| existing == key) {
                Some(entry) => entry.1.clone_from(value),
                None => self.entries.push((key.clone(), value.clone())),
            }
        }
    }

    /// Iterates entries in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of entries.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when the set has no entries.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serializes to `"K1:V1;K2:V2;"`; an empty set encodes to `""`.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.entries {
            out.push_str(key);
            out.push(KEY_VALUE_SEPARATOR);
            out.push_str(value);
            out.push(ENTRY_TERMINATOR);
        }
        out
    }

    /// Parses the delimiter format. Empty segments are ignored and the first
    /// `:` splits key from value.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidParameter`] for a segment without `:` or
    /// with an empty key.
    pub fn decode(text: &str) -> Result<Self, CodecError> {
        let mut set = Self::new();
        for segment in text.split(ENTRY_TERMINATOR).filter(|s| !s.is_empty()) {
            let Some((key, value)) = segment.split_once(KEY_VALUE_SEPARATOR) else {
                return Err(CodecError::InvalidParameter(segment.to_string()));
            };
            set.insert(key, value)?;
        }
        Ok(set)
    }

    /// Renders engine command-line arguments (`-param K V` per entry).
    #[must_use]
    pub fn to_cli_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.entries.len() * 3);
        for (key, value) in &self.entries {
            args.push("-param".to_string());
            args.push(key.clone());
            args.push(value.clone());
        }
        args
    }
}
