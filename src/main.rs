/*
Telemetría de brazo en tiempo real desde un Nicla Sense ME por BLE

El daemon:
1. Se conecta al dispositivo por BlueZ (D-Bus) y activa las notificaciones
2. Decodifica acelerómetro y giroscopio en ventanas de 200 puntos
3. Estima la orientación del brazo (hombro/codo)
4. Escribe un evento JSON por muestra en stdout para la gráfica y el avatar

Uso:
     ./target/release/brazoscopio 28:CD:C1:08:37:69 [config.json] [--record sesion.csv]

Enter en la terminal avanza el paso de calibración; "q" sale.
*/

use std::env;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use crossbeam_channel::{bounded, never, select, unbounded};

use brazoscopio::ble::{start_ble_receiver, BleTarget, TransportEvent};
use brazoscopio::config::PipelineConfig;
use brazoscopio::recording::SessionRecorder;
use brazoscopio::{SampleReady, TelemetryError, TelemetryPipeline};

struct DaemonOptions {
    target_mac: String,
    config_path: Option<PathBuf>,
    record_path: Option<PathBuf>,
}

fn parse_args() -> Result<DaemonOptions> {
    let usage = "Uso: brazoscopio <MAC> [config.json] [--record sesion.csv]";
    let mut args = env::args().skip(1);
    let mut target_mac: Option<String> = None;
    let mut config_path: Option<PathBuf> = None;
    let mut record_path: Option<PathBuf> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--record" => {
                let path = args.next().ok_or_else(|| anyhow!("--record necesita un archivo"))?;
                record_path = Some(PathBuf::from(path));
            }
            _ if target_mac.is_none() => target_mac = Some(arg),
            _ if config_path.is_none() => config_path = Some(PathBuf::from(arg)),
            _ => bail!(usage),
        }
    }

    Ok(DaemonOptions {
        target_mac: target_mac.ok_or_else(|| anyhow!(usage))?,
        config_path,
        record_path,
    })
}

/// Acción pedida desde la terminal
enum UserCommand {
    Calibrate,
    Quit,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let opts = parse_args()?;
    eprintln!("🦾 Telemetría de brazo - Rust + BlueZ\n");

    let config = match &opts.config_path {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("No se pudo cargar la configuración {:?}", path))?,
        None => PipelineConfig::default(),
    };
    eprintln!("🎯 Objetivo BLE: {}", opts.target_mac);
    eprintln!(
        "📐 Canales: {:?}, {} puntos, {} ms entre muestras",
        config.channels.iter().map(|c| c.id.as_str()).collect::<Vec<_>>(),
        config.capacity,
        config.update_interval_ms
    );

    // Transporte → pipeline
    let (tx_transport, rx_transport) = bounded::<TransportEvent>(100);
    // Pipeline → transporte (códigos de calibración)
    let (tx_calibration, rx_calibration) = unbounded::<u8>();

    let target = BleTarget::new(
        &opts.target_mac,
        config.channels.clone(),
        config.calibration_uuid.clone(),
    );
    let ble_thread = std::thread::spawn(move || {
        if let Err(e) = start_ble_receiver(&target, tx_transport, rx_calibration) {
            eprintln!("❌ Error en BLE: {:#}", e);
        }
    });

    // Salida: una línea JSON por evento
    let (tx_events, rx_events) = unbounded::<SampleReady>();
    std::thread::spawn(move || {
        let stdout = io::stdout();
        for event in rx_events.iter() {
            let mut out = stdout.lock();
            match serde_json::to_string(&event) {
                Ok(line) => {
                    if writeln!(out, "{}", line).is_err() {
                        return;
                    }
                }
                Err(e) => eprintln!("❌ Error serializando evento: {}", e),
            }
        }
    });

    let (tx_user, rx_user) = unbounded::<UserCommand>();
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            let command = if line.trim().eq_ignore_ascii_case("q") {
                UserCommand::Quit
            } else {
                UserCommand::Calibrate
            };
            if tx_user.send(command).is_err() {
                break;
            }
        }
    });

    let mut recorder = match &opts.record_path {
        Some(path) => {
            let max_fields = config.channels.iter().map(|c| c.fields.len()).max().unwrap_or(0);
            eprintln!("💾 Grabando sesión en {:?}", path);
            Some(SessionRecorder::create(path, max_fields)?)
        }
        None => None,
    };

    let mut pipeline = TelemetryPipeline::new(config, tx_events)?;
    let no_user = never::<UserCommand>();
    let mut stdin_open = true;
    eprintln!("🎬 Esperando datos... (Enter = calibrar, q = salir)\n");

    loop {
        select! {
            recv(rx_transport) -> msg => {
                match msg {
                    Ok(TransportEvent::Subscribed(channel)) => {
                        if let Err(e) = pipeline.mark_subscribed(&channel) {
                            eprintln!("⚠️  {}", e);
                        }
                    }
                    Ok(TransportEvent::Notification(notification)) => {
                        if let Some(rec) = recorder.as_mut() {
                            if let Err(e) = rec.record(&notification) {
                                eprintln!("❌ Error grabando: {}", e);
                            }
                        }
                        match pipeline.handle(&notification) {
                            Ok(_) => {}
                            Err(TelemetryError::MalformedPayload { .. }) => {
                                // Ya registrado por el pipeline; se sigue con la siguiente
                            }
                            Err(e) => eprintln!("⚠️  {}", e),
                        }
                    }
                    Err(_) => {
                        eprintln!("🔌 Transporte BLE cerrado");
                        break;
                    }
                }
            }
            recv(if stdin_open { &rx_user } else { &no_user }) -> cmd => {
                match cmd {
                    Ok(UserCommand::Calibrate) => {
                        let code = pipeline.advance_calibration();
                        eprintln!("🎚️  {}", pipeline.calibration_step().label());
                        if let Some(code) = code {
                            let _ = tx_calibration.send(code);
                        }
                    }
                    Ok(UserCommand::Quit) => {
                        eprintln!("\n👋 Saliendo...");
                        break;
                    }
                    // Sin stdin (p.ej. como servicio) se sigue sin calibración manual
                    Err(_) => stdin_open = false,
                }
            }
        }
    }

    pipeline.teardown();
    if let Some(rec) = recorder.as_mut() {
        rec.flush()?;
    }
    // Cerrar el canal de calibración detiene el hilo BLE
    drop(tx_calibration);
    let _ = ble_thread.join();
    Ok(())
}
