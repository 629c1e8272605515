use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use clap::Parser;
use stm_core::Settings;

pub mod cli;
pub mod pipeline;

fn main() -> Result<()> {
    // 1. Parser CLI
    let cli = cli::Cli::parse();

    // 2. Initialiser le logging
    env_logger::Builder::new()
        .filter_level(cli.log_level.parse().unwrap_or(log::LevelFilter::Warn))
        .init();

    // 3. Commandes qui quittent immédiatement
    if cli.list_devices {
        return list_devices();
    }
    if cli.list_ports {
        return list_ports();
    }
    if cli.write_config {
        return write_config(&cli);
    }

    // 4. Charger la config puis appliquer les overrides CLI
    let mut settings = resolve_config(&cli)?;
    cli.apply(&mut settings)
        .context("Paramètres invalides après les options de ligne de commande")?;

    // 5. Ctrl-C arrête la boucle en cours
    let running = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&running);
    ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst))
        .context("Impossible d'installer le gestionnaire Ctrl-C")?;

    // 6. Mode réception, analyse de fichier ou capture live
    if let Some(ref port) = cli.monitor {
        return pipeline::run_monitor(&settings, port, &running);
    }
    if let Some(ref path) = cli.file {
        let report = pipeline::run_file(&settings, path, cli.realtime, &running)?;
        eprintln!(
            "{} frames analysées, {} messages MIDI",
            report.frames, report.messages
        );
        return Ok(());
    }
    pipeline::run_live(&settings, &running)
}

fn list_devices() -> Result<()> {
    let devices = stm_audio::capture::list_input_devices()?;
    if devices.is_empty() {
        println!("Aucune entrée audio.");
    }
    for name in devices {
        println!("{name}");
    }
    Ok(())
}

fn list_ports() -> Result<()> {
    println!("Sorties MIDI :");
    for name in stm_midi::transport::list_output_ports()? {
        println!("  {name}");
    }
    println!("Entrées MIDI :");
    for name in stm_midi::transport::list_input_ports()? {
        println!("  {name}");
    }
    Ok(())
}

fn write_config(cli: &cli::Cli) -> Result<()> {
    if let Some(backup) = stm_core::config::write_template(&cli.config)? {
        println!("Ancien fichier sauvegardé : {}", backup.display());
    }
    println!("Configuration écrite : {}", cli.config.display());
    Ok(())
}

/// Load the settings file, or fall back to defaults when it does not exist.
fn resolve_config(cli: &cli::Cli) -> Result<Settings> {
    if cli.config.exists() {
        stm_core::config::load_config(&cli.config)
    } else {
        log::warn!(
            "Config introuvable : {}. Utilisation des défauts.",
            cli.config.display()
        );
        Ok(Settings::default())
    }
}
