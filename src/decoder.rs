use crate::error::{Result, TelemetryError};
use crate::types::{Channel, Sample, FIELD_BYTES};

/// Decodifica un payload BLE según el layout del canal.
///
/// Cada campo ocupa 4 bytes float32 little-endian en `índice * 4`.
/// Los bytes sobrantes al final se ignoran; un payload corto se rechaza.
pub fn decode(channel: &Channel, value: &[u8], timestamp: f64) -> Result<Sample> {
    let expected = channel.payload_len();
    if value.len() < expected {
        return Err(TelemetryError::MalformedPayload {
            channel: channel.id.clone(),
            expected,
            actual: value.len(),
        });
    }

    let fields = channel
        .fields
        .iter()
        .zip(value.chunks_exact(FIELD_BYTES))
        .map(|(name, bytes)| {
            let v = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            (name.clone(), v)
        })
        .collect();

    Ok(Sample {
        channel: channel.id.clone(),
        timestamp,
        fields,
    })
}

/// Codifica valores en el mismo layout que envía el dispositivo
pub fn encode(values: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * FIELD_BYTES);
    for v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}
