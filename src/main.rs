use anyhow::Result;
use std::fs::File;
use std::io::Write;
use std::path::Path;
use std::time::Instant;
use log::{info, warn, error, debug, trace};

use germline_common::{GonadSnapshot, SimulationConfig};
use germline_engine::checkpoint::SimulationCheckpoint;
use germline_engine::recorders::{write_gonad_data, write_tracking_data};
use germline_engine::GermlineSimulation;

/// Usage: `germline-engine [config.toml] [checkpoint.bin]`
fn main() -> Result<()> {
    // Initialize the logger
    env_logger::init();

    info!("Starting germline simulation...");

    // --- Load Configuration ---
    let mut args = std::env::args().skip(1);
    let config_path = args.next().unwrap_or_else(|| "config.toml".to_string());
    let config = SimulationConfig::load(&config_path)?;
    info!("Loaded configuration from {}.", config_path);
    info!("Using {} Rayon threads.", rayon::current_num_threads());

    // --- Initialize Simulation ---
    let mut sim = match args.next() {
        Some(checkpoint_path) => {
            let checkpoint = SimulationCheckpoint::load(&checkpoint_path)?;
            GermlineSimulation::from_checkpoint(config, checkpoint)?
        }
        None => GermlineSimulation::new(config)?,
    };
    info!("Simulation initialized with {} cells.", sim.current_cell_count());
    debug!("Simulation Parameters: {:#?}", sim.params());

    // --- Simulation Loop ---
    let params = sim.params().clone();
    let total_steps = params.total_steps();
    let first_step = sim.clock().steps_elapsed;
    let record_interval_hours = sim.config().timing.record_interval_hours.max(0.0);
    let mut record_interval_steps = if params.dt > 0.0 {
        (record_interval_hours / params.dt).round() as u32
    } else {
        1
    };
    if record_interval_steps == 0 {
        warn!("Record interval ({:.3} h) is smaller than the timestep ({:.3} h). Recording every step.",
            record_interval_hours, params.dt);
        record_interval_steps = 1;
    }
    info!("Recording every {} steps ({:.2} h).", record_interval_steps, record_interval_steps as f64 * params.dt);

    info!("Running steps {}..{} (end time {:.1} h)...", first_step, total_steps, params.end_time);
    let start_time = Instant::now();
    let mut previous_print_time = start_time;

    if let Err(e) = sim.record_snapshot() {
        error!("Error recording initial snapshot: {}", e);
        anyhow::bail!("Failed to record initial snapshot.");
    }

    for step in first_step..total_steps {
        let step_start_time = Instant::now();
        if let Err(e) = sim.step() {
            error!("Error during simulation step {}: {}", step + 1, e);
            return Err(e.context(format!("Simulation step {} failed.", step + 1)));
        }
        let step_duration = step_start_time.elapsed();

        let current_time = Instant::now();
        let should_print_status = current_time.duration_since(previous_print_time).as_secs_f64() >= 5.0;
        let is_record_step = (step + 1) % record_interval_steps == 0;
        let is_last_step = step + 1 == total_steps;

        if is_record_step || is_last_step {
            if let Err(e) = sim.record_snapshot() {
                error!("Error recording snapshot at step {}: {}", step + 1, e);
                anyhow::bail!("Failed to record snapshot.");
            }
        }

        if should_print_status || is_record_step || is_last_step {
            info!(
                "Step [{}/{}] ({:.2} h) | Cells: {} | Tube radius: {:.2} um | Step Time: {:6.2} ms | Elapsed: {:.2} s",
                step + 1,
                total_steps,
                sim.clock().time(),
                sim.current_cell_count(),
                sim.boundary().radius(),
                step_duration.as_secs_f64() * 1000.0,
                start_time.elapsed().as_secs_f64()
            );
            previous_print_time = current_time;
        } else {
            trace!("Step [{}/{}] completed in {:.2} ms", step + 1, total_steps, step_duration.as_secs_f64() * 1000.0);
        }
    }

    let total_duration = start_time.elapsed();
    info!(
        "Simulation finished in {:.3} seconds ({:.3} minutes).",
        total_duration.as_secs_f64(),
        total_duration.as_secs_f64() / 60.0
    );

    // --- Save Recorded Data ---
    let output = sim.config().output.clone();
    if output.save_stats {
        let format = output.format.as_deref().unwrap_or("json");
        save_snapshots(sim.get_recorded_snapshots(), &output.base_filename, format);
    } else {
        info!("Skipping saving snapshots as per config (save_stats is false).");
    }

    if output.save_gonad_data {
        write_gonad_data(Path::new("GonadData.tsv"), sim.get_recorded_snapshots())?;
    }
    if output.track_cells {
        write_tracking_data(Path::new("TrackingData.tsv"), sim.get_tracking_rows())?;
    }
    if output.save_checkpoint {
        let filename = format!("{}_checkpoint.bin", output.base_filename);
        sim.checkpoint().save(&filename)?;
        info!("Checkpoint saved to {}", filename);
    }

    info!("Simulation Complete.");
    Ok(())
}

/// Writes the recorded snapshots in the configured format. Failures are logged, not fatal.
fn save_snapshots(snapshots: &[GonadSnapshot], base_filename: &str, format: &str) {
    let format = match format {
        "json" | "bincode" | "messagepack" => format,
        other => {
            warn!("Unknown output format: {}. Using JSON instead.", other);
            "json"
        }
    };
    let extension = match format {
        "bincode" => "bin",
        "messagepack" => "msgpack",
        _ => "json",
    };
    let filename = format!("{}_snapshots.{}", base_filename, extension);

    let mut file = match File::create(&filename) {
        Ok(file) => file,
        Err(e) => {
            error!("Error creating snapshot file '{}': {}", filename, e);
            return;
        }
    };

    let written = match format {
        "bincode" => bincode::serialize_into(&mut file, snapshots).map_err(|e| e.to_string()),
        "messagepack" => rmp_serde::encode::write(&mut file, snapshots).map_err(|e| e.to_string()),
        _ => serde_json::to_string(snapshots)
            .map_err(|e| e.to_string())
            .and_then(|json| file.write_all(json.as_bytes()).map_err(|e| e.to_string())),
    };
    match written {
        Ok(()) => info!("All {} snapshots saved to {} ({} format)", snapshots.len(), filename, format),
        Err(e) => error!("Error writing snapshots to '{}': {}", filename, e),
    }
}
