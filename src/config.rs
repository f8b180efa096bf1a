use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TelemetryError};
use crate::orientation::OrientationConfig;
use crate::rate_limiter::RateLimitScope;
use crate::types::{nicla_sense_me_channels, Channel, MAX_POINTS, UPDATE_INTERVAL_MS};

/// Configuración completa del pipeline.
/// Los valores por defecto corresponden al Nicla Sense ME.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub channels: Vec<Channel>,
    /// Puntos por serie (200; 100 en la versión antigua)
    pub capacity: usize,
    pub update_interval_ms: u64,
    pub rate_limit_scope: RateLimitScope,
    /// `None` desactiva la estimación de orientación
    pub orientation: Option<OrientationConfig>,
    /// Característica a la que se escribe el código de calibración
    pub calibration_uuid: Option<String>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            channels: nicla_sense_me_channels(),
            capacity: MAX_POINTS,
            update_interval_ms: UPDATE_INTERVAL_MS,
            rate_limit_scope: RateLimitScope::Global,
            orientation: Some(OrientationConfig::default()),
            calibration_uuid: None,
        }
    }
}

impl PipelineConfig {
    /// Carga la configuración desde un JSON; los campos ausentes toman el valor por defecto
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn channel(&self, id: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.id == id)
    }

    pub fn validate(&self) -> Result<()> {
        if self.channels.is_empty() {
            return Err(invalid("no hay canales definidos"));
        }
        if self.capacity == 0 {
            return Err(invalid("la capacidad debe ser mayor que 0"));
        }

        for (i, channel) in self.channels.iter().enumerate() {
            if channel.fields.is_empty() {
                return Err(invalid(&format!("el canal '{}' no tiene campos", channel.id)));
            }
            if self.channels[..i].iter().any(|c| c.id == channel.id) {
                return Err(invalid(&format!("canal duplicado '{}'", channel.id)));
            }
        }

        if let Some(orientation) = &self.orientation {
            let channel = self.channel(&orientation.channel).ok_or_else(|| {
                invalid(&format!(
                    "la orientación usa el canal inexistente '{}'",
                    orientation.channel
                ))
            })?;

            for field in orientation.required_fields() {
                if channel.field_index(field).is_none() {
                    return Err(invalid(&format!(
                        "el canal '{}' no tiene el campo '{}'",
                        channel.id, field
                    )));
                }
            }

            if !(orientation.smoothing > 0.0 && orientation.smoothing <= 1.0) {
                return Err(invalid("el suavizado debe estar en (0, 1]"));
            }
            if !(orientation.reference_scale.is_finite() && orientation.reference_scale > 0.0) {
                return Err(invalid("la escala de referencia debe ser positiva"));
            }
            if !(orientation.elbow_ratio.is_finite() && orientation.elbow_ratio != 0.0) {
                return Err(invalid("elbow_ratio no puede ser 0"));
            }
        }

        Ok(())
    }
}

fn invalid(msg: &str) -> TelemetryError {
    TelemetryError::InvalidConfig(msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orientation::EstimatorMode;
    use crate::types::LEGACY_MAX_POINTS;

    #[test]
    fn test_default_is_valid() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.capacity, 200);
        assert_eq!(config.update_interval_ms, 50);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "capacity": 100, "orientation": { "mode": "tilt" } }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.capacity, LEGACY_MAX_POINTS);
        assert_eq!(config.channels.len(), 2);
        let orientation = config.orientation.as_ref().unwrap();
        assert_eq!(orientation.mode, EstimatorMode::Tilt);
        assert_eq!(orientation.swing_field, "Az");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_custom_pitch_channel() {
        let json = r#"{
            "channels": [ { "id": "pitch", "fields": ["pitch"] } ],
            "rate_limit_scope": "per_channel",
            "orientation": {
                "mode": "two_joint",
                "channel": "pitch",
                "swing_field": "pitch",
                "reference_scale": 90.0
            }
        }"#;
        let config: PipelineConfig = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.rate_limit_scope, RateLimitScope::PerChannel);
        assert_eq!(config.channel("pitch").unwrap().payload_len(), 4);
    }

    #[test]
    fn test_orientation_field_must_exist() {
        let mut config = PipelineConfig::default();
        if let Some(o) = config.orientation.as_mut() {
            o.channel = "gyroscope".to_string();
        }
        assert!(matches!(
            config.validate(),
            Err(TelemetryError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rejects_bad_values() {
        let config = PipelineConfig {
            capacity: 0,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        config.channels.push(config.channels[0].clone());
        assert!(config.validate().is_err());

        let mut config = PipelineConfig::default();
        if let Some(o) = config.orientation.as_mut() {
            o.smoothing = 0.0;
        }
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let path = std::env::temp_dir().join("brazoscopio_config_test.json");
        fs::write(&path, r#"{ "update_interval_ms": 20 }"#).unwrap();
        let config = PipelineConfig::from_file(&path).unwrap();
        assert_eq!(config.update_interval_ms, 20);
        let _ = fs::remove_file(&path);

        assert!(PipelineConfig::from_file("/nonexistent/brazoscopio.json").is_err());
    }
}
