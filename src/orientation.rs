use std::f32::consts::FRAC_PI_4;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TelemetryError};
use crate::quaternion::Quaternion;
use crate::types::{Sample, GRAVITY, SMOOTHING};

/// Algoritmo de estimación
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimatorMode {
    /// Pitch y roll a partir del vector de aceleración normalizado, sin suavizado
    Tilt,
    /// Ángulo de balanceo suavizado a partir de un solo eje
    #[default]
    Swing,
    /// Hombro y codo derivados del mismo escalar suavizado
    TwoJoint,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrientationConfig {
    pub mode: EstimatorMode,
    /// Canal que alimenta la estimación
    pub channel: String,
    /// Campos (x, y, z) para el modo Tilt
    pub tilt_fields: [String; 3],
    /// Campo que mueve el balanceo en los modos Swing y TwoJoint
    pub swing_field: String,
    /// 9.81 para aceleración, 90 para un pitch en grados
    pub reference_scale: f32,
    pub smoothing: f32,
    /// Ángulo máximo del hombro (rad)
    pub shoulder_span: f32,
    /// codo = hombro / elbow_ratio
    pub elbow_ratio: f32,
}

impl Default for OrientationConfig {
    fn default() -> Self {
        Self {
            mode: EstimatorMode::default(),
            channel: "accelerometer".to_string(),
            tilt_fields: ["Ax".to_string(), "Ay".to_string(), "Az".to_string()],
            swing_field: "Az".to_string(),
            reference_scale: GRAVITY,
            smoothing: SMOOTHING,
            shoulder_span: FRAC_PI_4,
            elbow_ratio: 1.5,
        }
    }
}

impl OrientationConfig {
    /// Campos que debe tener el canal según el modo
    pub fn required_fields(&self) -> Vec<&str> {
        match self.mode {
            EstimatorMode::Tilt => self.tilt_fields.iter().map(|f| f.as_str()).collect(),
            EstimatorMode::Swing | EstimatorMode::TwoJoint => vec![self.swing_field.as_str()],
        }
    }
}

/// Ángulos estimados, en radianes
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Orientation {
    Tilt { pitch: f32, roll: f32 },
    Swing { angle: f32 },
    TwoJoint { shoulder: f32, elbow: f32 },
}

/// Rotaciones de las articulaciones del avatar
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct JointRotations {
    pub shoulder: Quaternion,
    pub elbow: Quaternion,
}

impl Orientation {
    pub fn joint_rotations(&self) -> JointRotations {
        match *self {
            Orientation::Tilt { pitch, roll } => JointRotations {
                shoulder: Quaternion::about_x(pitch).mul(Quaternion::about_y(roll)),
                elbow: Quaternion::about_z(roll),
            },
            Orientation::Swing { angle } => {
                let swing = Quaternion::about_z(angle);
                JointRotations {
                    shoulder: swing,
                    elbow: swing,
                }
            }
            Orientation::TwoJoint { shoulder, elbow } => JointRotations {
                shoulder: Quaternion::about_z(shoulder),
                elbow: Quaternion::about_z(elbow),
            },
        }
    }
}

/// Estimador de orientación del brazo.
///
/// Mantiene el ángulo suavizado entre muestras; una entrada degenerada
/// deja el estado como estaba.
pub struct OrientationEstimator {
    config: OrientationConfig,
    smoothed: f32,
    last: Option<Orientation>,
}

impl OrientationEstimator {
    pub fn new(config: OrientationConfig) -> Self {
        Self {
            config,
            smoothed: 0.0,
            last: None,
        }
    }

    pub fn config(&self) -> &OrientationConfig {
        &self.config
    }

    /// Ángulo suavizado actual (rad)
    pub fn smoothed(&self) -> f32 {
        self.smoothed
    }

    /// Última orientación emitida
    pub fn current(&self) -> Option<Orientation> {
        self.last
    }

    pub fn reset(&mut self) {
        self.smoothed = 0.0;
        self.last = None;
    }

    /// Pitch y roll a partir de la aceleración (modo Tilt)
    pub fn estimate_tilt(&self, ax: f32, ay: f32, az: f32) -> Result<Orientation> {
        // hypot evita overflow/underflow de los cuadrados en f32
        let magnitude = ax.hypot(ay).hypot(az);
        if !magnitude.is_finite() || magnitude == 0.0 {
            return Err(TelemetryError::DegenerateInput("vector de aceleración nulo"));
        }

        let nx = ax / magnitude;
        let ny = ay / magnitude;
        let nz = az / magnitude;

        let pitch = ny.atan2(nz);
        let roll = (-nx).atan2((ny * ny + nz * nz).sqrt());
        Ok(Orientation::Tilt { pitch, roll })
    }

    /// Avanza el filtro exponencial y retorna el ángulo de balanceo
    pub fn estimate_swing(&mut self, value: f32) -> Result<f32> {
        if !value.is_finite() {
            return Err(TelemetryError::DegenerateInput("valor de balanceo no finito"));
        }

        let normalized = (value / self.config.reference_scale).clamp(-1.0, 1.0);
        let target = normalized * self.config.shoulder_span;
        let alpha = self.config.smoothing;
        self.smoothed = self.smoothed * (1.0 - alpha) + target * alpha;
        Ok(self.smoothed)
    }

    /// Hombro y codo a partir del mismo escalar suavizado
    pub fn estimate_joints(&mut self, value: f32) -> Result<(f32, f32)> {
        let shoulder = self.estimate_swing(value)?;
        Ok((shoulder, shoulder / self.config.elbow_ratio))
    }

    /// Estima a partir de una muestra del canal configurado
    pub fn update(&mut self, sample: &Sample) -> Result<Orientation> {
        let orientation = match self.config.mode {
            EstimatorMode::Tilt => {
                let [fx, fy, fz] = &self.config.tilt_fields;
                let ax = self.field(sample, fx)?;
                let ay = self.field(sample, fy)?;
                let az = self.field(sample, fz)?;
                self.estimate_tilt(ax, ay, az)?
            }
            EstimatorMode::Swing => {
                let value = self.field(sample, &self.config.swing_field)?;
                Orientation::Swing {
                    angle: self.estimate_swing(value)?,
                }
            }
            EstimatorMode::TwoJoint => {
                let value = self.field(sample, &self.config.swing_field)?;
                let (shoulder, elbow) = self.estimate_joints(value)?;
                Orientation::TwoJoint { shoulder, elbow }
            }
        };

        self.last = Some(orientation);
        Ok(orientation)
    }

    fn field(&self, sample: &Sample, name: &str) -> Result<f32> {
        sample.get(name).ok_or_else(|| {
            TelemetryError::InvalidConfig(format!(
                "el canal '{}' no tiene el campo '{}'",
                sample.channel, name
            ))
        })
    }
}
