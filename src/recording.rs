use std::fs::File;
use std::path::Path;

use anyhow::{bail, ensure, Context, Result};
use csv::{ReaderBuilder, Writer, WriterBuilder};

use crate::decoder::encode;
use crate::types::{Notification, FIELD_BYTES};

/// Carga una sesión grabada en formato received_ms,channel,v0,v1,...
///
/// Cada fila se convierte en la notificación que habría llegado por BLE.
/// Una fila sin valores es un payload vacío, que el pipeline rechaza como
/// malformado igual que en vivo.
pub fn load_notifications_from_csv(path: impl AsRef<Path>) -> Result<Vec<Notification>> {
    let path = path.as_ref();
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("No se pudo abrir el CSV {:?}", path))?;

    let mut notifications = Vec::new();
    let mut last_ms = 0u64;

    for (row_idx, result) in reader.records().enumerate() {
        let record = result.with_context(|| format!("Fila {} inválida en {:?}", row_idx + 1, path))?;
        if record.len() < 2 {
            bail!("La fila {} necesita al menos received_ms y channel", row_idx + 1);
        }

        let received_ms: u64 = record[0]
            .trim()
            .parse()
            .with_context(|| format!("received_ms inválido en fila {}", row_idx + 1))?;
        ensure!(
            received_ms >= last_ms,
            "Los tiempos deben ser crecientes (fila {})",
            row_idx + 1
        );
        last_ms = received_ms;

        let channel = record[1].trim();
        let values = record
            .iter()
            .skip(2)
            .map(|v| v.trim().parse::<f32>())
            .collect::<std::result::Result<Vec<f32>, _>>()
            .with_context(|| format!("Valor inválido en fila {}", row_idx + 1))?;

        notifications.push(Notification::new(channel, encode(&values), received_ms));
    }

    Ok(notifications)
}

/// Graba notificaciones en el formato que lee `load_notifications_from_csv`
pub struct SessionRecorder {
    writer: Writer<File>,
}

impl SessionRecorder {
    pub fn create(path: impl AsRef<Path>, max_fields: usize) -> Result<Self> {
        let path = path.as_ref();
        let mut writer = WriterBuilder::new()
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("No se pudo crear {:?}", path))?;

        let mut header = vec!["received_ms".to_string(), "channel".to_string()];
        header.extend((0..max_fields).map(|i| format!("v{}", i)));
        writer.write_record(&header)?;
        Ok(Self { writer })
    }

    /// Escribe los floats completos del payload; los bytes sobrantes se ignoran.
    /// Un payload de menos de 4 bytes queda como fila sin valores.
    pub fn record(&mut self, notification: &Notification) -> Result<()> {
        let mut row = vec![notification.received_ms.to_string(), notification.channel.clone()];
        row.extend(notification.payload.chunks_exact(FIELD_BYTES).map(|b| {
            f32::from_le_bytes([b[0], b[1], b[2], b[3]]).to_string()
        }));
        self.writer.write_record(&row)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::decode;
    use crate::error::TelemetryError;
    use crate::types::nicla_sense_me_channels;
    use std::fs;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("brazoscopio_{}_{}.csv", name, std::process::id()))
    }

    #[test]
    fn test_load_session() {
        let path = temp_path("load");
        fs::write(
            &path,
            "received_ms,channel,v0,v1,v2\n0,accelerometer,1,0,0\n60,gyroscope,0.5,-0.5,2\n",
        )
        .unwrap();

        let notifications = load_notifications_from_csv(&path).unwrap();
        assert_eq!(notifications.len(), 2);
        assert_eq!(notifications[1].channel, "gyroscope");
        assert_eq!(notifications[1].received_ms, 60);
        assert_eq!(notifications[1].payload, encode(&[0.5, -0.5, 2.0]));
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_rejects_decreasing_time() {
        let path = temp_path("decreasing");
        fs::write(&path, "received_ms,channel,v0\n100,pitch,1\n50,pitch,2\n").unwrap();
        assert!(load_notifications_from_csv(&path).is_err());
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_recorder_output_loads_back() {
        let path = temp_path("recorder");
        let original = vec![
            Notification::new("accelerometer", encode(&[0.0, 0.0, 9.81]), 10),
            Notification::new("pitch", encode(&[45.0]), 70),
        ];
        {
            let mut recorder = SessionRecorder::create(&path, 3).unwrap();
            for n in &original {
                recorder.record(n).unwrap();
            }
            recorder.flush().unwrap();
        }
        let loaded = load_notifications_from_csv(&path).unwrap();
        assert_eq!(loaded, original);
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_short_payload_survives_recording() {
        let path = temp_path("short");
        let session = vec![
            Notification::new("accelerometer", encode(&[0.0, 0.0, 9.81]), 0),
            Notification::new("accelerometer", vec![0x01, 0x02], 60),
            Notification::new("accelerometer", encode(&[0.0, 9.81, 0.0]), 120),
        ];
        {
            let mut recorder = SessionRecorder::create(&path, 3).unwrap();
            for n in &session {
                recorder.record(n).unwrap();
            }
            recorder.flush().unwrap();
        }

        let loaded = load_notifications_from_csv(&path).unwrap();
        assert_eq!(loaded.len(), 3);
        assert!(loaded[1].payload.is_empty());
        assert_eq!(loaded[2], session[2]);

        // La fila corta sigue siendo malformada al reproducirla
        let channel = &nicla_sense_me_channels()[0];
        assert!(matches!(
            decode(channel, &loaded[1].payload, loaded[1].timestamp_secs()),
            Err(TelemetryError::MalformedPayload { actual: 0, .. })
        ));
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_row_without_channel_rejected() {
        let path = temp_path("no_channel");
        fs::write(&path, "received_ms,channel,v0\n100\n").unwrap();
        assert!(load_notifications_from_csv(&path).is_err());
        let _ = fs::remove_file(&path);
    }
}
