use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, bail, Context, Result};
use crossbeam_channel::unbounded;

use brazoscopio::config::PipelineConfig;
use brazoscopio::orientation::Orientation;
use brazoscopio::recording::load_notifications_from_csv;
use brazoscopio::{Outcome, TelemetryPipeline};

struct ReplayOptions {
    config_path: Option<PathBuf>,
    export_channel: Option<String>,
    json: bool,
}

fn parse_args() -> Result<(PathBuf, ReplayOptions)> {
    let usage = "Uso: replay_csv [--config cfg.json] [--export <canal>] [--json] <sesion.csv>";
    let mut args = env::args().skip(1);
    let mut csv_path: Option<PathBuf> = None;
    let mut opts = ReplayOptions {
        config_path: None,
        export_channel: None,
        json: false,
    };

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let path = args.next().ok_or_else(|| anyhow!("--config necesita un archivo"))?;
                opts.config_path = Some(PathBuf::from(path));
            }
            "--export" => {
                opts.export_channel = Some(args.next().ok_or_else(|| anyhow!("--export necesita un canal"))?);
            }
            "--json" => opts.json = true,
            _ => {
                if csv_path.is_some() {
                    bail!(usage);
                }
                csv_path = Some(PathBuf::from(arg));
            }
        }
    }

    let csv_path = csv_path.ok_or_else(|| anyhow!("Debes especificar un archivo CSV"))?;
    Ok((csv_path, opts))
}

fn describe(orientation: &Orientation) -> String {
    match orientation {
        Orientation::Tilt { pitch, roll } => format!(
            "pitch={:>7.2}° roll={:>7.2}°",
            pitch.to_degrees(),
            roll.to_degrees()
        ),
        Orientation::Swing { angle } => format!("swing={:>7.2}°", angle.to_degrees()),
        Orientation::TwoJoint { shoulder, elbow } => format!(
            "hombro={:>7.2}° codo={:>7.2}°",
            shoulder.to_degrees(),
            elbow.to_degrees()
        ),
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let (csv_path, opts) = parse_args()?;
    println!("🎞️  Reproduciendo sesión desde {:?}", csv_path);

    let config = match &opts.config_path {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("No se pudo cargar la configuración {:?}", path))?,
        None => PipelineConfig::default(),
    };

    let notifications = load_notifications_from_csv(&csv_path)?;
    println!("📦 {} notificaciones", notifications.len());

    let (tx, rx) = unbounded();
    let mut pipeline = TelemetryPipeline::new(config, tx)?;
    let channels: Vec<String> = pipeline.config().channels.iter().map(|c| c.id.clone()).collect();
    for channel in &channels {
        pipeline.mark_subscribed(channel)?;
    }

    let mut emitted = 0usize;
    let mut throttled = 0usize;
    let mut failed = 0usize;

    for notification in &notifications {
        match pipeline.handle(notification) {
            Ok(Outcome::Emitted) => emitted += 1,
            Ok(Outcome::Throttled) => throttled += 1,
            Ok(Outcome::Closed) => break,
            Err(e) => {
                failed += 1;
                println!("⚠️  t={}ms: {}", notification.received_ms, e);
            }
        }

        for event in rx.try_iter() {
            if opts.json {
                println!("{}", serde_json::to_string(&event)?);
                continue;
            }
            let t = event.snapshot.timestamps.last().copied().unwrap_or(0.0);
            match &event.orientation {
                Some(o) => println!("  {:>9.3}s {:<14} {}", t, event.channel, describe(o)),
                None => println!("  {:>9.3}s {:<14} ({} puntos)", t, event.channel, event.snapshot.len()),
            }
        }
    }

    println!(
        "\n✅ Emitidas: {}  ⏱️  Descartadas por intervalo: {}  ❌ Malformadas: {}",
        emitted, throttled, failed
    );

    if let Some(channel) = &opts.export_channel {
        let snapshot = pipeline
            .snapshot(channel)
            .ok_or_else(|| anyhow!("Canal desconocido: {}", channel))?;
        println!("\n🧱 Ventana de '{}' ({} puntos):", channel, snapshot.len());
        print!("{}", snapshot.to_csv()?);
    }

    pipeline.teardown();
    Ok(())
}
