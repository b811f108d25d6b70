use anyhow::Result;
use clap::{Parser, Subcommand};
use log::debug;
use std::path::PathBuf;
use std::process::ExitCode;

use coastseg::collect::global_variables::TEMP_PATH;
use coastseg::collect::settings::{AreaUnits, RoiAreaLimits, SettingsUpdate};
use coastseg::geometric::preprocess::FeatureKind;
use coastseg::ui::exception_handler::handle_exception;
use coastseg::ui::{run_action, Action, Session};

#[derive(Parser, Debug)]
#[command(author, version, about = "Prepare coastal ROIs, settings and configs for shoreline extraction", long_about = None)]
struct Cli {
    /// Working directory holding the session state
    #[arg(long, global = true, default_value = TEMP_PATH)]
    workspace: PathBuf,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Edit or show the download and extraction settings
    Settings {
        #[command(subcommand)]
        command: SettingsCommand,
    },
    /// Load, save or remove map layers
    Feature {
        #[command(subcommand)]
        command: FeatureCommand,
    },
    /// Save the session as a config or load one back
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// ROI queries
    Roi {
        #[command(subcommand)]
        command: RoiCommand,
    },
    /// Downloaded imagery housekeeping
    Images {
        #[command(subcommand)]
        command: ImagesCommand,
    },
    /// Extracted shoreline housekeeping
    Shorelines {
        #[command(subcommand)]
        command: ShorelinesCommand,
    },
}

#[derive(Subcommand, Debug)]
enum SettingsCommand {
    /// Update the saved settings; unset options keep their value
    Save(SettingsArgs),
    /// Print the settings summary
    Show,
}

#[derive(clap::Args, Debug)]
struct SettingsArgs {
    /// Satellites to download, e.g. --sat-list L8,S2
    #[arg(long, value_delimiter = ',')]
    sat_list: Option<Vec<String>>,
    /// Start and end date, e.g. --dates 2018-12-01,2019-03-01
    #[arg(long, value_delimiter = ',', num_args = 1)]
    dates: Option<Vec<String>>,
    #[arg(long)]
    cloud_thresh: Option<f64>,
    #[arg(long)]
    dist_clouds: Option<u32>,
    #[arg(long)]
    output_epsg: Option<u32>,
    #[arg(long)]
    save_figure: Option<bool>,
    #[arg(long)]
    min_beach_area: Option<u32>,
    #[arg(long)]
    min_length_sl: Option<u32>,
    #[arg(long)]
    cloud_mask_issue: Option<bool>,
    #[arg(long)]
    sand_color: Option<String>,
    #[arg(long)]
    pan_off: Option<bool>,
    #[arg(long)]
    max_dist_ref: Option<u32>,
    #[arg(long)]
    along_dist: Option<u32>,
    /// Small ROI area
    #[arg(long, requires = "lg_area")]
    sm_area: Option<f64>,
    /// Large ROI area
    #[arg(long, requires = "sm_area")]
    lg_area: Option<f64>,
    /// Units of --sm-area and --lg-area (m2 or km2)
    #[arg(long, default_value = "m2")]
    units: AreaUnits,
}

impl From<SettingsArgs> for SettingsUpdate {
    fn from(args: SettingsArgs) -> Self {
        let roi_area = match (args.sm_area, args.lg_area) {
            (Some(sm_area), Some(lg_area)) => Some(RoiAreaLimits {
                sm_area,
                lg_area,
                units: args.units,
            }),
            _ => None,
        };
        SettingsUpdate {
            sat_list: args.sat_list,
            dates: args.dates,
            cloud_thresh: args.cloud_thresh,
            dist_clouds: args.dist_clouds,
            output_epsg: args.output_epsg,
            save_figure: args.save_figure,
            min_beach_area: args.min_beach_area,
            min_length_sl: args.min_length_sl,
            cloud_mask_issue: args.cloud_mask_issue,
            sand_color: args.sand_color,
            pan_off: args.pan_off,
            max_dist_ref: args.max_dist_ref,
            along_dist: args.along_dist,
            roi_area,
        }
    }
}

#[derive(Subcommand, Debug)]
enum FeatureCommand {
    /// Load a layer from a GeoJSON file
    Load {
        /// rois, shoreline, transects or bbox
        kind: FeatureKind,
        path: PathBuf,
    },
    /// Save a layer to <dir>/<layer>.geojson
    Save {
        kind: FeatureKind,
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Remove a layer from the map
    Remove { kind: FeatureKind },
    /// Remove every layer from the map
    RemoveAll,
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write config_gdf.geojson and config.json
    Save {
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Load a config directory or config_gdf.geojson
    Load { path: PathBuf },
}

#[derive(Subcommand, Debug)]
enum RoiCommand {
    /// Area in km² of one ROI or of all of them
    Area {
        #[arg(long)]
        roi_id: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum ImagesCommand {
    /// Move partial images of a downloaded ROI into a "bad" folder
    Filter {
        directory: PathBuf,
        #[arg(long)]
        roi_id: Option<String>,
    },
}

#[derive(Subcommand, Debug)]
enum ShorelinesCommand {
    /// Remove extracted shorelines given as "<satellite>_<YYYY-mm-dd HH:MM:SS>"
    Remove {
        session_dir: PathBuf,
        #[arg(required = true)]
        items: Vec<String>,
    },
}

impl From<Command> for Action {
    fn from(command: Command) -> Self {
        match command {
            Command::Settings { command } => match command {
                SettingsCommand::Save(args) => Action::SaveSettings(args.into()),
                SettingsCommand::Show => Action::ViewSettings,
            },
            Command::Feature { command } => match command {
                FeatureCommand::Load { kind, path } => Action::LoadFeature { kind, path },
                FeatureCommand::Save { kind, dir } => Action::SaveFeature { kind, dir },
                FeatureCommand::Remove { kind } => Action::RemoveFeature { kind },
                FeatureCommand::RemoveAll => Action::RemoveAll,
            },
            Command::Config { command } => match command {
                ConfigCommand::Save { dir } => Action::SaveConfig { dir },
                ConfigCommand::Load { path } => Action::LoadConfigs { path },
            },
            Command::Roi {
                command: RoiCommand::Area { roi_id },
            } => Action::ComputeArea { roi_id },
            Command::Images {
                command: ImagesCommand::Filter { directory, roi_id },
            } => Action::FilterImages { directory, roi_id },
            Command::Shorelines {
                command: ShorelinesCommand::Remove { session_dir, items },
            } => Action::RemoveShorelines { session_dir, items },
        }
    }
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
    debug!("{:?}", cli);

    let mut session = match Session::open(&cli.workspace) {
        Ok(session) => session,
        Err(err) => {
            eprintln!("{}", handle_exception(&err, Some("Open Session"), None));
            return Ok(ExitCode::FAILURE);
        }
    };
    let outcome = run_action(&mut session, cli.command.into());
    if outcome.success {
        println!("{}", outcome.message);
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("{}", outcome.message);
        Ok(ExitCode::FAILURE)
    }
}
