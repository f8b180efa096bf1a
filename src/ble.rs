use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use crossbeam_channel::{Receiver, Sender, TryRecvError};
use dbus::arg::{PropMap, RefArg, Variant};
use dbus::blocking::Connection;

use crate::types::{Channel, Notification};

const GATT_CHARACTERISTIC: &str = "org.bluez.GattCharacteristic1";

/// Lo que el transporte entrega al pipeline
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Notificaciones activadas en el canal
    Subscribed(String),
    Notification(Notification),
}

/// Parámetros de conexión
#[derive(Debug, Clone)]
pub struct BleTarget {
    pub mac: String,
    pub adapter: String,
    pub channels: Vec<Channel>,
    pub calibration_uuid: Option<String>,
}

impl BleTarget {
    pub fn new(mac: &str, channels: Vec<Channel>, calibration_uuid: Option<String>) -> Self {
        Self {
            mac: mac.to_string(),
            adapter: "hci0".to_string(),
            channels,
            calibration_uuid,
        }
    }

    pub fn device_path(&self) -> String {
        format!(
            "/org/bluez/{}/dev_{}",
            self.adapter,
            self.mac.to_uppercase().replace(':', "_")
        )
    }
}

/// Conecta al dispositivo por BlueZ y reenvía cada notificación por `tx`.
///
/// Los códigos de calibración que lleguen por `calibration_rx` se escriben
/// en la característica configurada. Termina cuando se cierra `calibration_rx`.
pub fn start_ble_receiver(
    target: &BleTarget,
    tx: Sender<TransportEvent>,
    calibration_rx: Receiver<u8>,
) -> Result<()> {
    let conn = Connection::new_system().context("No se pudo abrir el D-Bus del sistema")?;
    log::info!("Conectado a D-Bus del sistema");

    let adapter_path = format!("/org/bluez/{}", target.adapter);
    let adapter_proxy = conn.with_proxy("org.bluez", &adapter_path, Duration::from_secs(5));

    let _: () = adapter_proxy
        .method_call(
            "org.freedesktop.DBus.Properties",
            "Set",
            ("org.bluez.Adapter1", "Powered", Variant(true)),
        )
        .context("No se pudo encender el adaptador Bluetooth")?;
    log::info!("Adaptador {} encendido", target.adapter);

    let device_path = target.device_path();
    log::info!("Buscando dispositivo en: {}", device_path);
    let device_proxy = conn.with_proxy("org.bluez", &device_path, Duration::from_secs(10));

    match device_proxy.method_call::<(), _, _, _>("org.bluez.Device1", "Connect", ()) {
        Ok(_) => log::info!("Conectado a {}", target.mac),
        Err(e) => {
            log::warn!("No se pudo conectar a {}: {}; reintentando en 3 s", target.mac, e);
            std::thread::sleep(Duration::from_secs(3));
            device_proxy
                .method_call::<(), _, _, _>("org.bluez.Device1", "Connect", ())
                .with_context(|| format!("No se pudo conectar a {}", target.mac))?;
            log::info!("Conectado a {} en segundo intento", target.mac);
        }
    }
    // Dar tiempo a BlueZ para resolver los servicios GATT
    std::thread::sleep(Duration::from_secs(2));

    let characteristics = discover_characteristics(&conn, &device_path)?;

    // ruta de la característica -> id del canal
    let mut routes: HashMap<String, String> = HashMap::new();
    for channel in &target.channels {
        let Some(path) = characteristics.get(&channel.uuid.to_lowercase()) else {
            log::warn!("El dispositivo no expone '{}' ({})", channel.id, channel.uuid);
            continue;
        };
        routes.insert(path.clone(), channel.id.clone());
    }
    if routes.is_empty() {
        bail!("Ninguna característica configurada está disponible en {}", target.mac);
    }

    let calibration_path = target
        .calibration_uuid
        .as_ref()
        .and_then(|uuid| characteristics.get(&uuid.to_lowercase()).cloned());

    use dbus::blocking::stdintf::org_freedesktop_dbus::PropertiesPropertiesChanged as PC;
    use dbus::message::SignalArgs;

    let clock = Instant::now();
    let closed = Arc::new(AtomicBool::new(false));
    let closed_cb = Arc::clone(&closed);
    let routes_cb = routes.clone();
    let tx_cb = tx.clone();

    let mr = PC::match_rule(None, None);
    conn.add_match(mr, move |pc: PC, _, msg| {
        let Some(path) = msg.path().map(|p| p.to_string()) else {
            return true;
        };
        let Some(channel) = routes_cb.get(&path) else {
            return true;
        };

        if let Some(value_var) = pc.changed_properties.get("Value") {
            if let Some(iter) = value_var.0.as_iter() {
                let payload: Vec<u8> = iter.filter_map(|item| item.as_u64().map(|b| b as u8)).collect();
                let received_ms = clock.elapsed().as_millis() as u64;
                let event = TransportEvent::Notification(Notification::new(channel, payload, received_ms));
                if tx_cb.send(event).is_err() {
                    closed_cb.store(true, Ordering::Relaxed);
                }
            }
        }
        true
    })?;

    for (path, channel) in &routes {
        let char_proxy = conn.with_proxy("org.bluez", path, Duration::from_secs(5));
        char_proxy
            .method_call::<(), _, _, _>(GATT_CHARACTERISTIC, "StartNotify", ())
            .with_context(|| format!("StartNotify falló en {}", path))?;
        log::info!("Notificaciones iniciadas para '{}' en {}", channel, path);
        if tx.send(TransportEvent::Subscribed(channel.clone())).is_err() {
            closed.store(true, Ordering::Relaxed);
        }
    }

    loop {
        conn.process(Duration::from_millis(100))?;

        match calibration_rx.try_recv() {
            Ok(code) => match &calibration_path {
                Some(path) => {
                    let char_proxy = conn.with_proxy("org.bluez", path, Duration::from_secs(5));
                    let options = PropMap::new();
                    if let Err(e) = char_proxy.method_call::<(), _, _, _>(
                        GATT_CHARACTERISTIC,
                        "WriteValue",
                        (vec![code], options),
                    ) {
                        log::warn!("No se pudo enviar el código de calibración {}: {}", code, e);
                    }
                }
                None => log::debug!("Sin característica de calibración; código {} descartado", code),
            },
            Err(TryRecvError::Empty) => {}
            Err(TryRecvError::Disconnected) => break,
        }

        if closed.load(Ordering::Relaxed) {
            break;
        }
    }

    let _ = device_proxy.method_call::<(), _, _, _>("org.bluez.Device1", "Disconnect", ());
    log::info!("Desconectado de {}", target.mac);
    Ok(())
}

/// UUID (en minúsculas) -> ruta D-Bus de cada característica GATT del dispositivo
fn discover_characteristics(conn: &Connection, device_path: &str) -> Result<HashMap<String, String>> {
    use dbus::blocking::stdintf::org_freedesktop_dbus::ObjectManager;

    let root = conn.with_proxy("org.bluez", "/", Duration::from_secs(5));
    let objects = root
        .get_managed_objects()
        .context("No se pudieron listar los objetos de BlueZ")?;

    let prefix = format!("{}/", device_path);
    let mut found = HashMap::new();
    for (path, interfaces) in objects {
        let path = path.to_string();
        if !path.starts_with(&prefix) {
            continue;
        }
        let Some(props) = interfaces.get(GATT_CHARACTERISTIC) else {
            continue;
        };
        if let Some(uuid) = props.get("UUID").and_then(|v| v.0.as_str()) {
            found.insert(uuid.to_lowercase(), path);
        }
    }
    Ok(found)
}
