use serde::{Deserialize, Serialize};

/// Capacidad canónica de cada serie (~10 s de datos a 20 Hz)
pub const MAX_POINTS: usize = 200;
/// Capacidad de la primera versión del visor
pub const LEGACY_MAX_POINTS: usize = 100;
/// Intervalo mínimo entre notificaciones procesadas (ms)
pub const UPDATE_INTERVAL_MS: u64 = 50;
/// Factor de suavizado exponencial
pub const SMOOTHING: f32 = 0.1;
/// Gravedad, escala de referencia para aceleración
pub const GRAVITY: f32 = 9.81;
/// Escala de referencia para un pitch ya calculado en grados
pub const PITCH_SCALE_DEG: f32 = 90.0;
/// Bytes por campo: float32 little-endian
pub const FIELD_BYTES: usize = 4;

/// Fuente de telemetría con layout binario fijo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Channel {
    /// Identificador lógico, p.ej. "accelerometer"
    pub id: String,
    /// UUID de la característica GATT (solo lo usa el transporte)
    #[serde(default)]
    pub uuid: String,
    /// Campos en orden de aparición en el payload
    pub fields: Vec<String>,
}

impl Channel {
    pub fn new(id: &str, uuid: &str, fields: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            uuid: uuid.to_string(),
            fields: fields.iter().map(|f| f.to_string()).collect(),
        }
    }

    /// Longitud mínima del payload: 4 bytes por campo
    pub fn payload_len(&self) -> usize {
        self.fields.len() * FIELD_BYTES
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f == name)
    }
}

/// Una lectura decodificada. Inmutable una vez creada.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub channel: String,
    /// Segundos del reloj monotónico en el momento de la recepción
    pub timestamp: f64,
    /// (campo, valor) en el orden declarado por el canal
    pub fields: Vec<(String, f32)>,
}

impl Sample {
    pub fn get(&self, name: &str) -> Option<f32> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| *value)
    }

    pub fn values(&self) -> impl Iterator<Item = f32> + '_ {
        self.fields.iter().map(|(_, value)| *value)
    }
}

/// Notificación cruda tal como la entrega el transporte
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub channel: String,
    pub payload: Vec<u8>,
    /// Milisegundos del reloj monotónico al recibir
    pub received_ms: u64,
}

impl Notification {
    pub fn new(channel: &str, payload: Vec<u8>, received_ms: u64) -> Self {
        Self {
            channel: channel.to_string(),
            payload,
            received_ms,
        }
    }

    pub fn timestamp_secs(&self) -> f64 {
        self.received_ms as f64 / 1000.0
    }
}

/// Estado de la suscripción de un canal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChannelState {
    Idle,
    Subscribed,
    Receiving,
}

/// Canales del Nicla Sense ME
pub fn nicla_sense_me_channels() -> Vec<Channel> {
    vec![
        Channel::new(
            "accelerometer",
            "19b10000-5001-537e-4f6c-d104768a1214",
            &["Ax", "Ay", "Az"],
        ),
        Channel::new(
            "gyroscope",
            "19b10000-6001-537e-4f6c-d104768a1214",
            &["x", "y", "z"],
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_len_follows_fields() {
        let channels = nicla_sense_me_channels();
        assert_eq!(channels[0].payload_len(), 12);
        assert_eq!(channels[0].field_index("Az"), Some(2));
        assert_eq!(channels[1].field_index("Az"), None);
    }

    #[test]
    fn test_sample_lookup_by_name() {
        let sample = Sample {
            channel: "gyroscope".to_string(),
            timestamp: 1.5,
            fields: vec![("x".into(), 1.0), ("y".into(), -2.0), ("z".into(), 3.0)],
        };
        assert_eq!(sample.get("y"), Some(-2.0));
        assert_eq!(sample.get("w"), None);
        assert_eq!(sample.values().collect::<Vec<_>>(), vec![1.0, -2.0, 3.0]);
    }
}
