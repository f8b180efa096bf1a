use std::collections::HashMap;

use crossbeam_channel::Sender;
use serde::Serialize;

use crate::calibration::{Calibration, CalibrationStep};
use crate::config::PipelineConfig;
use crate::decoder;
use crate::error::{Result, TelemetryError};
use crate::orientation::{JointRotations, Orientation, OrientationEstimator};
use crate::rate_limiter::ScopedRateLimiter;
use crate::types::{Channel, ChannelState, Notification};
use crate::window_buffer::{ChannelSnapshot, WindowedBuffer};

/// Evento emitido por cada muestra aceptada
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SampleReady {
    pub channel: String,
    pub snapshot: ChannelSnapshot,
    /// Solo en el canal de orientación y si la entrada no fue degenerada
    pub orientation: Option<Orientation>,
    pub joints: Option<JointRotations>,
}

/// Resultado de procesar una notificación
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Emitted,
    /// Descartada por el limitador
    Throttled,
    /// El pipeline está cerrado
    Closed,
}

/// Orquestador: limitador → decodificador → ventanas → estimador → evento.
///
/// Procesa cada notificación de principio a fin antes de la siguiente;
/// los eventos salen en el mismo orden en que se aceptaron las muestras.
pub struct TelemetryPipeline {
    config: PipelineConfig,
    limiter: ScopedRateLimiter,
    buffer: WindowedBuffer,
    estimator: Option<OrientationEstimator>,
    states: HashMap<String, ChannelState>,
    calibration: Calibration,
    events: Sender<SampleReady>,
    open: bool,
}

impl TelemetryPipeline {
    pub fn new(config: PipelineConfig, events: Sender<SampleReady>) -> Result<Self> {
        config.validate()?;

        let limiter = ScopedRateLimiter::new(config.rate_limit_scope, config.update_interval_ms);
        let buffer = WindowedBuffer::new(&config.channels, config.capacity);
        let estimator = config.orientation.clone().map(OrientationEstimator::new);
        let states = idle_states(&config.channels);

        Ok(Self {
            config,
            limiter,
            buffer,
            estimator,
            states,
            calibration: Calibration::new(),
            events,
            open: true,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// El transporte confirmó la suscripción del canal
    pub fn mark_subscribed(&mut self, channel: &str) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        let state = self
            .states
            .get_mut(channel)
            .ok_or_else(|| TelemetryError::UnknownChannel(channel.to_string()))?;
        if *state == ChannelState::Idle {
            *state = ChannelState::Subscribed;
            log::info!("Canal '{}' suscrito", channel);
        }
        Ok(())
    }

    /// Procesa una notificación completa.
    ///
    /// Un payload malformado se reporta como error y no toca las ventanas.
    pub fn handle(&mut self, notification: &Notification) -> Result<Outcome> {
        if !self.open {
            return Ok(Outcome::Closed);
        }

        let channel = self
            .config
            .channel(&notification.channel)
            .ok_or_else(|| TelemetryError::UnknownChannel(notification.channel.clone()))?;

        if !self.limiter.admit(&channel.id, notification.received_ms) {
            return Ok(Outcome::Throttled);
        }

        let sample = match decoder::decode(
            channel,
            &notification.payload,
            notification.timestamp_secs(),
        ) {
            Ok(sample) => sample,
            Err(e) => {
                log::warn!("{}", e);
                return Err(e);
            }
        };

        self.buffer.append(&sample)?;

        let mut orientation = None;
        if let Some(estimator) = self.estimator.as_mut() {
            if estimator.config().channel == sample.channel {
                match estimator.update(&sample) {
                    Ok(o) => orientation = Some(o),
                    Err(TelemetryError::DegenerateInput(reason)) => {
                        log::warn!("Orientación sin actualizar en t={:.3}: {}", sample.timestamp, reason);
                    }
                    Err(e) => return Err(e),
                }
            }
        }

        if let Some(state) = self.states.get_mut(&sample.channel) {
            if *state != ChannelState::Receiving {
                log::info!("Canal '{}' recibiendo datos", sample.channel);
                *state = ChannelState::Receiving;
            }
        }

        let snapshot = self
            .buffer
            .snapshot(&sample.channel)
            .ok_or_else(|| TelemetryError::UnknownChannel(sample.channel.clone()))?;

        log::debug!(
            "Muestra '{}' t={:.3} ({} puntos)",
            sample.channel,
            sample.timestamp,
            snapshot.len()
        );

        let event = SampleReady {
            channel: sample.channel,
            snapshot,
            orientation,
            joints: orientation.map(|o| o.joint_rotations()),
        };

        if self.events.send(event).is_err() {
            log::warn!("Nadie escucha los eventos del pipeline");
        }

        Ok(Outcome::Emitted)
    }

    pub fn channel_state(&self, channel: &str) -> Option<ChannelState> {
        self.states.get(channel).copied()
    }

    pub fn snapshot(&self, channel: &str) -> Option<ChannelSnapshot> {
        self.buffer.snapshot(channel)
    }

    /// Última orientación estimada
    pub fn orientation(&self) -> Option<Orientation> {
        self.estimator.as_ref().and_then(|e| e.current())
    }

    pub fn calibration_step(&self) -> CalibrationStep {
        self.calibration.step()
    }

    /// Fija el paso de calibración; retorna el byte para el dispositivo
    pub fn set_calibration_step(&mut self, step: CalibrationStep) -> Option<u8> {
        log::info!("Calibración: {}", step.label());
        self.calibration.set_step(step)
    }

    pub fn advance_calibration(&mut self) -> Option<u8> {
        let code = self.calibration.advance();
        log::info!("Calibración: {}", self.calibration.step().label());
        code
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Deja de aceptar notificaciones y libera las ventanas. Idempotente.
    pub fn teardown(&mut self) {
        if !self.open {
            return;
        }
        self.open = false;
        self.buffer.clear();
        for state in self.states.values_mut() {
            *state = ChannelState::Idle;
        }
        log::info!("Pipeline cerrado");
    }

    /// Vuelve al estado inicial, incluida la orientación
    pub fn reinitialize(&mut self) {
        self.teardown();
        self.limiter.reset();
        if let Some(estimator) = self.estimator.as_mut() {
            estimator.reset();
        }
        self.calibration.reset();
        self.open = true;
        log::info!("Pipeline reiniciado");
    }
}

fn idle_states(channels: &[Channel]) -> HashMap<String, ChannelState> {
    channels
        .iter()
        .map(|c| (c.id.clone(), ChannelState::Idle))
        .collect()
}
