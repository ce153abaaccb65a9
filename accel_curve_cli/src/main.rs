use std::fs;
use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use accel_curve::{
    compute_dyno_curve, measure_distance_from_speed, measure_rpm_range, measure_speed_range,
    parse_log_csv, DriveType, DynoParams, LocateMode, PowerType, Series,
};
use anyhow::{anyhow, Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum, ValueHint};
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use serde_json::json;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const NO_DATA: &str = "no data";

#[derive(Parser, Debug)]
#[command(author, version, about = "Acceleration log timing and dyno CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Measure elapsed time between two vehicle speeds across logs
    Speed(SpeedArgs),
    /// Measure elapsed time across an engine-speed band (RPM pull)
    Rpm(RpmArgs),
    /// Measure time to cover a distance starting from a given speed
    Distance(DistanceArgs),
    /// Estimate power/torque peaks from acceleration logs
    Dyno(DynoArgs),
}

#[derive(Args, Debug)]
struct CommonArgs {
    /// CSV log files to analyze
    #[arg(required = true, value_hint = ValueHint::FilePath)]
    inputs: Vec<PathBuf>,

    /// Output CSV path (`-` for stdout)
    #[arg(short, long, default_value = "-", value_hint = ValueHint::FilePath)]
    output: PathBuf,

    /// Emit JSON instead of CSV
    #[arg(long, action = ArgAction::SetTrue)]
    json: bool,

    /// Verbose logging
    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,
}

#[derive(Args, Debug)]
struct SpeedArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Start speed (km/h)
    #[arg(long = "from", default_value_t = 100.0)]
    from_kmh: f64,

    /// End speed (km/h)
    #[arg(long = "to", default_value_t = 150.0)]
    to_kmh: f64,

    /// Snap thresholds to logged samples instead of interpolating
    #[arg(long, action = ArgAction::SetTrue)]
    nearest: bool,
}

#[derive(Args, Debug)]
struct RpmArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Start engine speed (RPM)
    #[arg(long = "from", default_value_t = 2000.0)]
    from_rpm: f64,

    /// End engine speed (RPM)
    #[arg(long = "to", default_value_t = 5000.0)]
    to_rpm: f64,

    /// Snap thresholds to logged samples instead of interpolating
    #[arg(long, action = ArgAction::SetTrue)]
    nearest: bool,
}

#[derive(Args, Debug)]
struct DistanceArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Start speed (km/h)
    #[arg(long, default_value_t = 100.0)]
    speed: f64,

    /// Target distance (meters)
    #[arg(long, default_value_t = 150.0)]
    distance: f64,

    /// Snap the start threshold to a logged sample instead of interpolating
    #[arg(long, action = ArgAction::SetTrue)]
    nearest: bool,
}

#[derive(Args, Debug)]
struct DynoArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Vehicle mass (kg)
    #[arg(long, default_value_t = 1500.0)]
    mass: f64,

    /// Drivetrain layout (fixes the assumed transmission loss)
    #[arg(long, value_enum, default_value_t = DriveOpt::Fwd)]
    drive: DriveOpt,

    /// Report wheel or crank figures
    #[arg(long, value_enum, default_value_t = PowerOpt::Wheel)]
    power: PowerOpt,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum DriveOpt {
    Fwd,
    Rwd,
    Awd,
}

impl From<DriveOpt> for DriveType {
    fn from(value: DriveOpt) -> Self {
        match value {
            DriveOpt::Fwd => DriveType::Fwd,
            DriveOpt::Rwd => DriveType::Rwd,
            DriveOpt::Awd => DriveType::Awd,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum PowerOpt {
    Wheel,
    Crank,
}

impl From<PowerOpt> for PowerType {
    fn from(value: PowerOpt) -> Self {
        match value {
            PowerOpt::Wheel => PowerType::Wheel,
            PowerOpt::Crank => PowerType::Crank,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbose = match &cli.command {
        Command::Speed(args) => args.common.verbose,
        Command::Rpm(args) => args.common.verbose,
        Command::Distance(args) => args.common.verbose,
        Command::Dyno(args) => args.common.verbose,
    };
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    match cli.command {
        Command::Speed(args) => handle_speed(args),
        Command::Rpm(args) => handle_rpm(args),
        Command::Distance(args) => handle_distance(args),
        Command::Dyno(args) => handle_dyno(args),
    }
}

/// One output row per input log; `sort_key` is the elapsed time used to
/// rank valid results, absent for logs with no measurable interval.
struct ResultRow {
    file: String,
    cells: Vec<String>,
    sort_key: Option<f64>,
    json: serde_json::Value,
}

fn locate_mode(nearest: bool) -> LocateMode {
    if nearest {
        LocateMode::Nearest
    } else {
        LocateMode::Interpolated
    }
}

fn load_series(path: &Path) -> Result<Series> {
    let data = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let series =
        parse_log_csv(&data).with_context(|| format!("failed to parse {}", path.display()))?;
    Ok(series)
}

/// Load every input, isolating per-file failures so one bad log does not
/// abort the batch.
fn load_logs(inputs: &[PathBuf]) -> Vec<(String, Option<Series>)> {
    inputs
        .par_iter()
        .map(|path| {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("log")
                .to_string();
            match load_series(path) {
                Ok(series) => (name, Some(series)),
                Err(err) => {
                    warn!("Skipping {}: {:#}", path.display(), err);
                    (name, None)
                }
            }
        })
        .collect()
}

fn no_data_row(file: &str, width: usize) -> ResultRow {
    ResultRow {
        file: file.to_string(),
        cells: vec![NO_DATA.to_string(); width],
        sort_key: None,
        json: json!({ "file": file, "result": null }),
    }
}

/// Valid rows sorted ascending by elapsed time, no-data rows after.
fn sort_rows(rows: &mut [ResultRow]) {
    rows.sort_by_key(|row| {
        (
            row.sort_key.is_none(),
            OrderedFloat(row.sort_key.unwrap_or(0.0)),
        )
    });
}

fn handle_speed(args: SpeedArgs) -> Result<()> {
    if args.from_kmh >= args.to_kmh {
        return Err(anyhow!("start speed must be below end speed"));
    }
    let mode = locate_mode(args.nearest);
    let logs = load_logs(&args.common.inputs);

    let mut rows: Vec<ResultRow> = logs
        .par_iter()
        .map(|(name, series)| {
            let result = series
                .as_ref()
                .and_then(|s| measure_speed_range(s, args.from_kmh, args.to_kmh, mode));
            match result {
                Some(r) => ResultRow {
                    file: name.clone(),
                    cells: vec![
                        format!("{:.3}", r.start_speed_kmh),
                        format!("{:.3}", r.end_speed_kmh),
                        format!("{:.3}", r.elapsed_s),
                        format!("{:.3}", r.distance_m),
                        format!("{:.3}", r.avg_acceleration_mps2),
                    ],
                    sort_key: Some(r.elapsed_s),
                    json: json!({ "file": name, "result": r }),
                },
                None => no_data_row(name, 5),
            }
        })
        .collect();
    sort_rows(&mut rows);

    info!(
        "Speed range {:.0}-{:.0} km/h: {}/{} logs measured",
        args.from_kmh,
        args.to_kmh,
        rows.iter().filter(|r| r.sort_key.is_some()).count(),
        rows.len()
    );

    let header = [
        "file",
        "start_speed_kmh",
        "end_speed_kmh",
        "time_s",
        "distance_m",
        "avg_acceleration_mps2",
    ];
    write_output(&args.common, &header, &rows)
}

fn handle_rpm(args: RpmArgs) -> Result<()> {
    if args.from_rpm >= args.to_rpm {
        return Err(anyhow!("start RPM must be below end RPM"));
    }
    let mode = locate_mode(args.nearest);
    let logs = load_logs(&args.common.inputs);

    let mut rows: Vec<ResultRow> = logs
        .par_iter()
        .map(|(name, series)| {
            let result = series
                .as_ref()
                .and_then(|s| measure_rpm_range(s, args.from_rpm, args.to_rpm, mode));
            match result {
                Some(r) => ResultRow {
                    file: name.clone(),
                    cells: vec![
                        format!("{:.0}", r.start_rpm),
                        format!("{:.0}", r.end_rpm),
                        format!("{:.3}", r.start_speed_kmh),
                        format!("{:.3}", r.end_speed_kmh),
                        format!("{:.3}", r.elapsed_s),
                        format!("{:.3}", r.distance_m),
                    ],
                    sort_key: Some(r.elapsed_s),
                    json: json!({ "file": name, "result": r }),
                },
                None => no_data_row(name, 6),
            }
        })
        .collect();
    sort_rows(&mut rows);

    info!(
        "RPM band {:.0}-{:.0}: {}/{} logs measured",
        args.from_rpm,
        args.to_rpm,
        rows.iter().filter(|r| r.sort_key.is_some()).count(),
        rows.len()
    );

    let header = [
        "file",
        "start_rpm",
        "end_rpm",
        "start_speed_kmh",
        "end_speed_kmh",
        "time_s",
        "distance_m",
    ];
    write_output(&args.common, &header, &rows)
}

fn handle_distance(args: DistanceArgs) -> Result<()> {
    if args.speed <= 0.0 || args.distance <= 0.0 {
        return Err(anyhow!("speed and distance must be positive"));
    }
    let mode = locate_mode(args.nearest);
    let logs = load_logs(&args.common.inputs);

    let mut rows: Vec<ResultRow> = logs
        .par_iter()
        .map(|(name, series)| {
            let result = series
                .as_ref()
                .and_then(|s| measure_distance_from_speed(s, args.speed, args.distance, mode));
            match result {
                Some(r) => ResultRow {
                    file: name.clone(),
                    cells: vec![
                        format!("{:.3}", r.start_speed_kmh),
                        format!("{:.3}", r.end_speed_kmh),
                        format!("{:.1}", r.distance_m),
                        format!("{:.3}", r.elapsed_s),
                        format!("{:.3}", r.avg_speed_kmh),
                    ],
                    sort_key: Some(r.elapsed_s),
                    json: json!({ "file": name, "result": r }),
                },
                None => no_data_row(name, 5),
            }
        })
        .collect();
    sort_rows(&mut rows);

    info!(
        "Distance {:.0} m from {:.0} km/h: {}/{} logs measured",
        args.distance,
        args.speed,
        rows.iter().filter(|r| r.sort_key.is_some()).count(),
        rows.len()
    );

    let header = [
        "file",
        "start_speed_kmh",
        "end_speed_kmh",
        "distance_m",
        "time_s",
        "avg_speed_kmh",
    ];
    write_output(&args.common, &header, &rows)
}

fn handle_dyno(args: DynoArgs) -> Result<()> {
    let params = DynoParams {
        car_mass_kg: args.mass,
        drive: args.drive.into(),
        power: args.power.into(),
    };
    let logs = load_logs(&args.common.inputs);

    let rows: Vec<ResultRow> = logs
        .par_iter()
        .map(|(name, series)| {
            let curve = series.as_ref().and_then(|s| {
                match compute_dyno_curve(s, &params) {
                    Ok(curve) => Some(curve),
                    Err(err) => {
                        warn!("Skipping {}: {}", name, err);
                        None
                    }
                }
            });
            match curve {
                Some(curve) => ResultRow {
                    file: name.clone(),
                    cells: vec![
                        format!("{:.1}", curve.peak_power.value),
                        format!("{:.0}", curve.peak_power.rpm),
                        format!("{:.1}", curve.peak_torque.value),
                        format!("{:.0}", curve.peak_torque.rpm),
                    ],
                    sort_key: None,
                    json: json!({ "file": name, "result": curve }),
                },
                None => no_data_row(name, 4),
            }
        })
        .collect();

    info!(
        "Dyno ({:?}, {:?}, {:.0} kg): {} logs",
        params.drive,
        params.power,
        params.car_mass_kg,
        rows.len()
    );

    let header = [
        "file",
        "peak_power_hp",
        "peak_power_rpm",
        "peak_torque_nm",
        "peak_torque_rpm",
    ];
    write_output(&args.common, &header, &rows)
}

fn write_output(common: &CommonArgs, header: &[&str], rows: &[ResultRow]) -> Result<()> {
    if common.json {
        let values: Vec<&serde_json::Value> = rows.iter().map(|r| &r.json).collect();
        write_json(&common.output, &values)
    } else {
        write_table(&common.output, header, rows)
    }
}

fn write_table(output: &Path, header: &[&str], rows: &[ResultRow]) -> Result<()> {
    if output.as_os_str() == "-" {
        let stdout = io::stdout();
        let handle = stdout.lock();
        let mut writer = csv::Writer::from_writer(handle);
        write_table_rows(header, rows, &mut writer)
    } else {
        let file =
            File::create(output).with_context(|| format!("failed to create {}", output.display()))?;
        let mut writer = csv::Writer::from_writer(file);
        write_table_rows(header, rows, &mut writer)?;
        info!("Wrote results: {}", output.display());
        Ok(())
    }
}

fn write_table_rows<W: Write>(
    header: &[&str],
    rows: &[ResultRow],
    writer: &mut csv::Writer<W>,
) -> Result<()> {
    writer.write_record(header)?;
    for row in rows {
        let mut record = Vec::with_capacity(row.cells.len() + 1);
        record.push(row.file.clone());
        record.extend(row.cells.iter().cloned());
        writer.write_record(&record)?;
    }
    writer.flush()?;
    Ok(())
}

fn write_json(output: &Path, values: &[&serde_json::Value]) -> Result<()> {
    if output.as_os_str() == "-" {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        serde_json::to_writer_pretty(&mut handle, values)?;
        writeln!(handle)?;
    } else {
        let mut file =
            File::create(output).with_context(|| format!("failed to create {}", output.display()))?;
        serde_json::to_writer_pretty(&mut file, values)?;
        writeln!(file)?;
        info!("Wrote results: {}", output.display());
    }
    Ok(())
}
