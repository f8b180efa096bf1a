use serde::{Deserialize, Serialize};

/// Paso de calibración, avanzado por el usuario.
///
/// Ciclo: Reset → Idle → FrontSwing → BackSwing → Reset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationStep {
    /// Sin calibrar; también el estado tras completar el ciclo
    #[default]
    Reset,
    Idle,
    FrontSwing,
    BackSwing,
}

impl CalibrationStep {
    pub fn next(self) -> Self {
        match self {
            CalibrationStep::Reset => CalibrationStep::Idle,
            CalibrationStep::Idle => CalibrationStep::FrontSwing,
            CalibrationStep::FrontSwing => CalibrationStep::BackSwing,
            CalibrationStep::BackSwing => CalibrationStep::Reset,
        }
    }

    /// Byte que se reenvía al dispositivo; Reset no envía nada
    pub fn device_code(self) -> Option<u8> {
        match self {
            CalibrationStep::Reset => None,
            CalibrationStep::Idle => Some(1),
            CalibrationStep::FrontSwing => Some(2),
            CalibrationStep::BackSwing => Some(3),
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CalibrationStep::Reset => "CALIBRATE",
            CalibrationStep::Idle => "CALIBRATE IDLE",
            CalibrationStep::FrontSwing => "CALIBRATE FRONT SWING",
            CalibrationStep::BackSwing => "CALIBRATE BACK SWING",
        }
    }
}

/// Estado de calibración, con el mismo ciclo de vida que el pipeline
#[derive(Debug, Clone, Default)]
pub struct Calibration {
    step: CalibrationStep,
}

impl Calibration {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(&self) -> CalibrationStep {
        self.step
    }

    /// Fija el paso y retorna el código a enviar, si lo hay
    pub fn set_step(&mut self, step: CalibrationStep) -> Option<u8> {
        self.step = step;
        step.device_code()
    }

    /// Avanza al siguiente paso del ciclo
    pub fn advance(&mut self) -> Option<u8> {
        self.set_step(self.step.next())
    }

    pub fn reset(&mut self) {
        self.step = CalibrationStep::Reset;
    }
}
