use log::{info, warn};
use serde::{Deserialize, Serialize};

/// Runtime configuration for a crowd. Loaded from JSON with per-field
/// defaults; anything missing or malformed falls back rather than aborting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrowdSettings {
    #[serde(default = "CrowdSettings::default_instance_capacity")]
    pub instance_capacity: u32,
    /// Axis-aligned (min, max) world bounds. A producer contract: instance
    /// translations are expected to stay within them, the renderer itself
    /// does not enforce it. Each axis must satisfy min < max.
    #[serde(default = "CrowdSettings::default_world_bounds")]
    pub world_bounds: ([f32; 3], [f32; 3]),
    #[serde(default = "CrowdSettings::default_true")]
    pub animation_enabled: bool,
    #[serde(default = "CrowdSettings::default_true")]
    pub culling_enabled: bool,
    #[serde(default = "CrowdSettings::default_bounding_sphere_radius")]
    pub bounding_sphere_radius: f32,
    /// Maximum render distance; zero or negative disables the distance cull.
    #[serde(default)]
    pub max_render_distance: f32,
    #[serde(default = "CrowdSettings::default_samples_per_second")]
    pub vat_samples_per_second: f32,
}

impl Default for CrowdSettings {
    fn default() -> Self {
        Self {
            instance_capacity: Self::default_instance_capacity(),
            world_bounds: Self::default_world_bounds(),
            animation_enabled: true,
            culling_enabled: true,
            bounding_sphere_radius: Self::default_bounding_sphere_radius(),
            max_render_distance: 0.0,
            vat_samples_per_second: Self::default_samples_per_second(),
        }
    }
}

impl CrowdSettings {
    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Self {
        use std::fs;

        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<CrowdSettings>(&contents) {
                Ok(settings) => {
                    info!("Loaded crowd settings from {:?}", path);
                    settings.validate()
                }
                Err(err) => {
                    warn!(
                        "Failed to parse {:?} ({}). Falling back to default crowd settings.",
                        path, err
                    );
                    CrowdSettings::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!("No settings file at {:?}, using defaults", path);
                CrowdSettings::default()
            }
            Err(err) => {
                warn!(
                    "Failed to read {:?} ({}). Falling back to default crowd settings.",
                    path, err
                );
                CrowdSettings::default()
            }
        }
    }

    pub fn validate(mut self) -> Self {
        if self.instance_capacity == 0 {
            warn!("instance_capacity of 0 is not usable, clamping to 1");
            self.instance_capacity = 1;
        }
        if self.bounding_sphere_radius <= 0.0 {
            warn!(
                "bounding_sphere_radius {} is not positive, using default",
                self.bounding_sphere_radius
            );
            self.bounding_sphere_radius = Self::default_bounding_sphere_radius();
        }
        let (min, max) = self.world_bounds;
        if min.iter().zip(max.iter()).any(|(lo, hi)| lo >= hi) {
            warn!(
                "world_bounds {:?} has a non-positive extent on some axis, using default",
                self.world_bounds
            );
            self.world_bounds = Self::default_world_bounds();
        }
        if self.vat_samples_per_second <= 0.0 {
            warn!(
                "vat_samples_per_second {} is not positive, using default",
                self.vat_samples_per_second
            );
            self.vat_samples_per_second = Self::default_samples_per_second();
        }
        self
    }

    fn default_instance_capacity() -> u32 {
        65536
    }

    fn default_world_bounds() -> ([f32; 3], [f32; 3]) {
        ([-1000.0, -100.0, -1000.0], [1000.0, 100.0, 1000.0])
    }

    fn default_true() -> bool {
        true
    }

    fn default_bounding_sphere_radius() -> f32 {
        1.5
    }

    fn default_samples_per_second() -> f32 {
        30.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let settings: CrowdSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.instance_capacity, 65536);
        assert!(settings.culling_enabled);
        assert_eq!(settings.max_render_distance, 0.0);
    }

    #[test]
    fn validate_clamps_degenerate_values() {
        let settings = CrowdSettings {
            instance_capacity: 0,
            bounding_sphere_radius: -2.0,
            vat_samples_per_second: 0.0,
            ..Default::default()
        }
        .validate();
        assert_eq!(settings.instance_capacity, 1);
        assert!(settings.bounding_sphere_radius > 0.0);
        assert!(settings.vat_samples_per_second > 0.0);
    }

    #[test]
    fn validate_resets_inverted_world_bounds() {
        let settings = CrowdSettings {
            world_bounds: ([10.0, 0.0, -5.0], [-10.0, 1.0, 5.0]),
            ..Default::default()
        }
        .validate();
        assert_eq!(settings.world_bounds, CrowdSettings::default_world_bounds());

        let kept = CrowdSettings {
            world_bounds: ([-1.0, -1.0, -1.0], [1.0, 1.0, 1.0]),
            ..Default::default()
        }
        .validate();
        assert_eq!(kept.world_bounds, ([-1.0, -1.0, -1.0], [1.0, 1.0, 1.0]));
    }

    #[test]
    fn partial_json_only_overrides_named_fields() {
        let settings: CrowdSettings =
            serde_json::from_str(r#"{"instance_capacity": 1000, "culling_enabled": false}"#)
                .unwrap();
        assert_eq!(settings.instance_capacity, 1000);
        assert!(!settings.culling_enabled);
        assert!(settings.animation_enabled);
    }
}
