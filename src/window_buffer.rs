use std::collections::{HashMap, VecDeque};
use std::io;

use serde::Serialize;

use crate::error::{Result, TelemetryError};
use crate::types::{Channel, Sample};

/// Serie de un campo: pares (timestamp, valor) en orden cronológico
#[derive(Debug, Clone)]
pub struct WindowedSeries {
    points: VecDeque<(f64, f32)>,
    capacity: usize,
}

impl WindowedSeries {
    pub fn new(capacity: usize) -> Self {
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Añade al final; si se supera la capacidad descarta el más antiguo
    pub fn append(&mut self, timestamp: f64, value: f32) {
        self.points.push_back((timestamp, value));
        if self.points.len() > self.capacity {
            self.points.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last(&self) -> Option<(f64, f32)> {
        self.points.back().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(f64, f32)> {
        self.points.iter()
    }

    /// Vacía la serie y devuelve su memoria
    pub fn clear(&mut self) {
        self.points = VecDeque::new();
    }
}

/// Series de un canal, todas con la misma longitud y alineadas por índice
#[derive(Debug, Clone)]
struct ChannelWindow {
    fields: Vec<(String, WindowedSeries)>,
}

impl ChannelWindow {
    fn new(channel: &Channel, capacity: usize) -> Self {
        Self {
            fields: channel
                .fields
                .iter()
                .map(|name| (name.clone(), WindowedSeries::new(capacity)))
                .collect(),
        }
    }

    fn len(&self) -> usize {
        self.fields.first().map(|(_, s)| s.len()).unwrap_or(0)
    }
}

/// Copia de solo lectura de la ventana de un canal
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChannelSnapshot {
    pub channel: String,
    pub timestamps: Vec<f64>,
    /// (campo, valores) en el orden del canal, paralelos a `timestamps`
    pub series: Vec<(String, Vec<f32>)>,
}

impl ChannelSnapshot {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    pub fn field(&self, name: &str) -> Option<&[f32]> {
        self.series
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, values)| values.as_slice())
    }

    /// Tiempos relativos al primer punto, como el eje X de la gráfica
    pub fn relative_timestamps(&self) -> Vec<f64> {
        let start = self.timestamps.first().copied().unwrap_or(0.0);
        self.timestamps.iter().map(|t| t - start).collect()
    }

    /// Exporta la ventana a CSV con formato: t,<campo>,<campo>,...
    pub fn to_csv(&self) -> Result<String> {
        let mut writer = csv::Writer::from_writer(Vec::new());

        let mut header = vec!["t".to_string()];
        header.extend(self.series.iter().map(|(name, _)| name.clone()));
        writer.write_record(&header)?;

        for (idx, t) in self.relative_timestamps().iter().enumerate() {
            let mut row = vec![format!("{:.3}", t)];
            row.extend(self.series.iter().map(|(_, values)| values[idx].to_string()));
            writer.write_record(&row)?;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| TelemetryError::Io(e.into_error()))?;
        String::from_utf8(bytes)
            .map_err(|e| TelemetryError::Io(io::Error::new(io::ErrorKind::InvalidData, e)))
    }
}

/// Buffer de ventanas por canal con descarte FIFO
pub struct WindowedBuffer {
    windows: HashMap<String, ChannelWindow>,
    capacity: usize,
}

impl WindowedBuffer {
    pub fn new(channels: &[Channel], capacity: usize) -> Self {
        let windows = channels
            .iter()
            .map(|c| (c.id.clone(), ChannelWindow::new(c, capacity)))
            .collect();
        Self { windows, capacity }
    }

    /// Añade todos los campos de la muestra en una sola operación
    pub fn append(&mut self, sample: &Sample) -> Result<()> {
        let window = self
            .windows
            .get_mut(&sample.channel)
            .ok_or_else(|| TelemetryError::UnknownChannel(sample.channel.clone()))?;

        if sample.fields.len() != window.fields.len() {
            return Err(TelemetryError::MalformedPayload {
                channel: sample.channel.clone(),
                expected: window.fields.len(),
                actual: sample.fields.len(),
            });
        }

        for ((_, series), value) in window.fields.iter_mut().zip(sample.values()) {
            series.append(sample.timestamp, value);
        }
        Ok(())
    }

    pub fn snapshot(&self, channel: &str) -> Option<ChannelSnapshot> {
        let window = self.windows.get(channel)?;
        let timestamps = window
            .fields
            .first()
            .map(|(_, s)| s.iter().map(|(t, _)| *t).collect())
            .unwrap_or_default();
        let series = window
            .fields
            .iter()
            .map(|(name, s)| (name.clone(), s.iter().map(|(_, v)| *v).collect()))
            .collect();

        Some(ChannelSnapshot {
            channel: channel.to_string(),
            timestamps,
            series,
        })
    }

    /// Número de puntos del canal
    pub fn len(&self, channel: &str) -> usize {
        self.windows.get(channel).map(|w| w.len()).unwrap_or(0)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Vacía todas las series y libera su memoria
    pub fn clear(&mut self) {
        for window in self.windows.values_mut() {
            for (_, series) in window.fields.iter_mut() {
                series.clear();
            }
        }
    }

    /// Total de puntos reservados entre todas las series
    #[cfg(test)]
    pub(crate) fn allocated_points(&self) -> usize {
        self.windows
            .values()
            .flat_map(|w| w.fields.iter())
            .map(|(_, series)| series.points.capacity())
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{nicla_sense_me_channels, MAX_POINTS};

    fn sample(channel: &str, t: f64, values: [f32; 3]) -> Sample {
        let names: [&str; 3] = if channel == "accelerometer" {
            ["Ax", "Ay", "Az"]
        } else {
            ["x", "y", "z"]
        };
        Sample {
            channel: channel.to_string(),
            timestamp: t,
            fields: names
                .iter()
                .zip(values.iter())
                .map(|(n, v)| (n.to_string(), *v))
                .collect(),
        }
    }

    #[test]
    fn test_series_evicts_oldest() {
        let mut series = WindowedSeries::new(3);
        for i in 0..5 {
            series.append(i as f64, i as f32);
        }
        let values: Vec<f32> = series.iter().map(|(_, v)| *v).collect();
        assert_eq!(values, vec![2.0, 3.0, 4.0]);
        assert_eq!(series.last(), Some((4.0, 4.0)));
    }

    #[test]
    fn test_length_is_min_of_appends_and_capacity() {
        let channels = nicla_sense_me_channels();
        for n in [0usize, 1, 199, 200, 201, 450] {
            let mut buffer = WindowedBuffer::new(&channels, MAX_POINTS);
            for i in 0..n {
                buffer
                    .append(&sample("accelerometer", i as f64, [i as f32, 0.0, 0.0]))
                    .unwrap();
            }
            assert_eq!(buffer.len("accelerometer"), n.min(MAX_POINTS));

            let snap = buffer.snapshot("accelerometer").unwrap();
            if n > 0 {
                assert_eq!(*snap.field("Ax").unwrap().last().unwrap(), (n - 1) as f32);
                // Lo más antiguo que queda es exactamente n - capacidad
                let first_kept = n.saturating_sub(MAX_POINTS) as f32;
                assert_eq!(snap.field("Ax").unwrap()[0], first_kept);
            }
        }
    }

    #[test]
    fn test_fields_stay_aligned() {
        let channels = nicla_sense_me_channels();
        let mut buffer = WindowedBuffer::new(&channels, 4);
        for i in 0..10 {
            let v = i as f32;
            buffer
                .append(&sample("gyroscope", i as f64 * 0.05, [v, v * 10.0, v * 100.0]))
                .unwrap();
        }
        let snap = buffer.snapshot("gyroscope").unwrap();
        assert_eq!(snap.len(), 4);
        for (_, values) in &snap.series {
            assert_eq!(values.len(), snap.timestamps.len());
        }
        assert_eq!(snap.field("x").unwrap(), &[6.0, 7.0, 8.0, 9.0]);
        assert_eq!(snap.field("z").unwrap(), &[600.0, 700.0, 800.0, 900.0]);
        assert!(snap.timestamps.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_channels_are_independent() {
        let channels = nicla_sense_me_channels();
        let mut buffer = WindowedBuffer::new(&channels, MAX_POINTS);
        buffer.append(&sample("accelerometer", 0.0, [1.0, 2.0, 3.0])).unwrap();
        assert_eq!(buffer.len("accelerometer"), 1);
        assert_eq!(buffer.len("gyroscope"), 0);
    }

    #[test]
    fn test_unknown_channel_rejected() {
        let mut buffer = WindowedBuffer::new(&nicla_sense_me_channels(), MAX_POINTS);
        let err = buffer.append(&sample("magnetometer", 0.0, [0.0; 3]));
        assert!(matches!(err, Err(TelemetryError::UnknownChannel(_))));
        assert!(buffer.snapshot("magnetometer").is_none());
    }

    #[test]
    fn test_clear_empties_every_channel() {
        let mut buffer = WindowedBuffer::new(&nicla_sense_me_channels(), MAX_POINTS);
        buffer.append(&sample("accelerometer", 0.0, [1.0, 2.0, 3.0])).unwrap();
        buffer.append(&sample("gyroscope", 0.0, [1.0, 2.0, 3.0])).unwrap();
        buffer.clear();
        assert_eq!(buffer.len("accelerometer"), 0);
        assert!(buffer.snapshot("gyroscope").unwrap().is_empty());
    }

    #[test]
    fn test_clear_frees_memory() {
        let mut buffer = WindowedBuffer::new(&nicla_sense_me_channels(), MAX_POINTS);
        for i in 0..50 {
            buffer.append(&sample("accelerometer", i as f64, [1.0, 2.0, 3.0])).unwrap();
        }
        assert!(buffer.allocated_points() >= 3 * MAX_POINTS);

        buffer.clear();
        assert_eq!(buffer.len("accelerometer"), 0);
        assert_eq!(buffer.allocated_points(), 0);

        // Sigue aceptando muestras después de limpiar
        buffer.append(&sample("accelerometer", 60.0, [4.0, 5.0, 6.0])).unwrap();
        assert_eq!(buffer.len("accelerometer"), 1);
    }

    #[test]
    fn test_snapshot_csv_uses_relative_time() {
        let mut buffer = WindowedBuffer::new(&nicla_sense_me_channels(), MAX_POINTS);
        buffer.append(&sample("accelerometer", 10.0, [1.0, 2.0, 3.0])).unwrap();
        buffer.append(&sample("accelerometer", 10.5, [4.0, 5.0, 6.0])).unwrap();

        let csv = buffer.snapshot("accelerometer").unwrap().to_csv().unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], "t,Ax,Ay,Az");
        assert_eq!(lines[1], "0.000,1,2,3");
        assert_eq!(lines[2], "0.500,4,5,6");
    }
}
