//! Acoustic material definitions.
//!
//! Materials are looked up by name. Each one carries per-band coefficients:
//! center frequencies with matching absorption values and, optionally,
//! diffusion values. The library is loaded from a JSON file of the form
//!
//! ```json
//! {
//!   "Brick": {
//!     "frequencies": [125, 250, 500, 1000, 2000, 4000],
//!     "absorption": [0.03, 0.03, 0.03, 0.04, 0.05, 0.07],
//!     "diffusion": [0.1, 0.1, 0.2, 0.2, 0.3, 0.3]
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Name of a material, as referenced by room object material slots.
pub type MaterialName = String;

/// Frequency-dependent coefficients of one material.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AcousticMaterial {
    /// Band center frequencies in Hz.
    pub frequencies: Vec<f32>,
    /// Absorption coefficient per band.
    #[serde(alias = "absorptions")]
    pub absorption: Vec<f32>,
    /// Diffusion coefficient per band.
    #[serde(default, alias = "diffusions", skip_serializing_if = "Option::is_none")]
    pub diffusion: Option<Vec<f32>>,
}

impl AcousticMaterial {
    pub fn new(frequencies: Vec<f32>, absorption: Vec<f32>) -> Self {
        Self {
            frequencies,
            absorption,
            diffusion: None,
        }
    }

    /// Builder: attach diffusion coefficients.
    pub fn with_diffusion(mut self, diffusion: Vec<f32>) -> Self {
        self.diffusion = Some(diffusion);
        self
    }

    /// Check the band invariants, naming the material in the error.
    pub fn validate(&self, name: &str) -> Result<()> {
        let invalid = |reason: String| Error::InvalidMaterial {
            name: name.to_string(),
            reason,
        };

        if self.frequencies.is_empty() {
            return Err(invalid("no frequency bands".to_string()));
        }
        if self.frequencies.len() != self.absorption.len() {
            return Err(invalid(format!(
                "{} frequencies but {} absorption coefficients",
                self.frequencies.len(),
                self.absorption.len()
            )));
        }
        if let Some(diffusion) = &self.diffusion {
            if diffusion.len() != self.frequencies.len() {
                return Err(invalid(format!(
                    "{} frequencies but {} diffusion coefficients",
                    self.frequencies.len(),
                    diffusion.len()
                )));
            }
        }

        let all_values = self
            .frequencies
            .iter()
            .chain(&self.absorption)
            .chain(self.diffusion.iter().flatten());
        if all_values.into_iter().any(|v| !v.is_finite()) {
            return Err(invalid("non-finite coefficient".to_string()));
        }
        Ok(())
    }

    /// Number of frequency bands.
    pub fn band_count(&self) -> usize {
        self.frequencies.len()
    }
}

/// Validated set of materials keyed by name.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MaterialLibrary {
    materials: BTreeMap<MaterialName, AcousticMaterial>,
}

impl MaterialLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a library from JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        let materials: BTreeMap<MaterialName, AcousticMaterial> =
            serde_json::from_str(json).map_err(|e| Error::MaterialFile {
                path: None,
                reason: e.to_string(),
            })?;
        Self::from_map(materials)
    }

    /// Load a library file from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let as_file_error = |reason: String| Error::MaterialFile {
            path: Some(path.to_path_buf()),
            reason,
        };

        let contents = std::fs::read_to_string(path).map_err(|e| as_file_error(e.to_string()))?;
        let library = Self::from_json(&contents).map_err(|e| match e {
            Error::MaterialFile { reason, .. } => as_file_error(reason),
            other => other,
        })?;
        log::info!("loaded {} materials from {}", library.len(), path.display());
        Ok(library)
    }

    fn from_map(materials: BTreeMap<MaterialName, AcousticMaterial>) -> Result<Self> {
        for (name, material) in &materials {
            material.validate(name)?;
        }
        Ok(Self { materials })
    }

    /// Add or replace a material after validating it.
    pub fn insert(&mut self, name: impl Into<MaterialName>, material: AcousticMaterial) -> Result<()> {
        let name = name.into();
        material.validate(&name)?;
        self.materials.insert(name, material);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&AcousticMaterial> {
        self.materials.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.materials.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.materials.keys().map(|s| s.as_str())
    }

    pub fn len(&self) -> usize {
        self.materials.len()
    }

    pub fn is_empty(&self) -> bool {
        self.materials.is_empty()
    }
}
