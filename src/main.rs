use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dialoguer::Confirm;
use photogramkit::core::build::{BuildReport, BuildService};
use photogramkit::core::capture::ImageFormat;
use photogramkit::core::color::{ColorReport, ColorService};
use photogramkit::core::engine::ProcessRunner;
use photogramkit::core::metadata::{ExifService, ExifTool, MetadataSource};
use photogramkit::core::pipeline::{
    FixedGate, PipelineState, ProfileGate, Relax, RelaxEngines, RelaxPaths,
};
use photogramkit::core::sort::{SortReport, SortService};
use photogramkit::{PipelineConfig, PipelineError, PipelineResult, UnitFailure};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(
    name = "photogramkit",
    version,
    about = "Sort, color calibrate and build 3D models of specimen photos"
)]
struct Cli {
    /// Configuration file (default: <config dir>/photogramkit/config.json)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Show debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct MetadataArgs {
    /// exiftool executable used to read capture times
    #[arg(long, value_name = "PATH", default_value = "exiftool")]
    exiftool: PathBuf,

    /// Read capture times in-process instead of with exiftool (no CR3 support)
    #[arg(long, conflicts_with = "exiftool")]
    embedded_exif: bool,
}

impl MetadataArgs {
    fn source(&self) -> Box<dyn MetadataSource> {
        if self.embedded_exif {
            Box::new(ExifService::new())
        } else {
            Box::new(ExifTool::new(&self.exiftool))
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Sort photos into specimen folders
    Sort {
        /// Input folder of raw photos (<date>/<camera>/<photo>)
        #[arg(short, long, value_name = "DIR")]
        input: PathBuf,
        /// Output folder of sorted photos
        #[arg(short, long, value_name = "DIR")]
        output: PathBuf,
        /// Image format
        #[arg(short, long, value_enum, ignore_case = true, default_value = "CR3")]
        format: ImageFormat,
        #[command(flatten)]
        metadata: MetadataArgs,
    },

    /// Apply color profiles to sorted photos
    Color {
        /// Sorted photo folder
        #[arg(short, long, value_name = "DIR")]
        input: PathBuf,
        /// Output folder of color calibrated photos
        #[arg(short, long, value_name = "DIR")]
        output: PathBuf,
        /// Path to darktable-cli
        #[arg(short, long, value_name = "PATH")]
        darktable: PathBuf,
        /// Image format
        #[arg(short, long, value_enum, ignore_case = true, default_value = "CR3")]
        format: ImageFormat,
    },

    /// Build 3D models with Agisoft Metashape
    Build {
        /// Color calibrated photo folder
        #[arg(short, long, value_name = "DIR")]
        input: PathBuf,
        /// Output 3D model folder
        #[arg(short, long, value_name = "DIR")]
        output: PathBuf,
        /// Path to the Metashape executable
        #[arg(short, long, value_name = "PATH")]
        metashape: PathBuf,
        /// Python script executed by Metashape
        #[arg(short, long, value_name = "FILE")]
        script: PathBuf,
        /// Image format
        #[arg(short, long, value_enum, ignore_case = true, default_value = "TIFF")]
        format: ImageFormat,
    },

    /// Sort, color and build; pauses for color profiles after sorting
    Relax {
        /// Input raw photo folder
        #[arg(short, long = "input-raw", value_name = "DIR")]
        input_raw: PathBuf,
        /// Output sorted folder
        #[arg(short = 's', long = "output-sort", value_name = "DIR")]
        output_sort: PathBuf,
        /// Output color calibrated folder
        #[arg(short = 'c', long = "output-color", value_name = "DIR")]
        output_color: PathBuf,
        /// Output 3D model folder
        #[arg(short = 'm', long = "output-model", value_name = "DIR")]
        output_model: PathBuf,
        /// Path to the Metashape executable
        #[arg(long, value_name = "PATH")]
        metashape: PathBuf,
        /// Python script executed by Metashape
        #[arg(long, value_name = "FILE")]
        script: PathBuf,
        /// Path to darktable-cli
        #[arg(long, value_name = "PATH")]
        darktable: PathBuf,
        /// Image format of the raw photos
        #[arg(long, value_enum, ignore_case = true, default_value = "CR3")]
        img_format: ImageFormat,
        /// Profiles already exist; do not ask before coloring
        #[arg(long, conflicts_with = "no_prompt")]
        profiles_ready: bool,
        /// Stop after sorting instead of asking; run again to resume
        #[arg(long)]
        no_prompt: bool,
        /// Ignore saved progress and start from sorting
        #[arg(long)]
        fresh: bool,
        #[command(flatten)]
        metadata: MetadataArgs,
    },
}

/// Asks on the terminal whether the calibration profiles are in place.
struct PromptGate;

impl ProfileGate for PromptGate {
    fn profiles_ready(&self, sorted_root: &Path) -> PipelineResult<bool> {
        println!(
            "\n✅ Photo sorting complete. Generate color profiles under {} now.",
            sorted_root.display()
        );
        Confirm::new()
            .with_prompt("Profiles ready? Continue with color calibration")
            .default(false)
            .interact()
            .map_err(|e| PipelineError::Io(std::io::Error::other(e)))
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if cli.verbose { "debug" } else { "info" }),
    )
    .init();

    let config = PipelineConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let runner = ProcessRunner::new();

    match cli.command {
        Commands::Sort {
            input,
            output,
            format,
            metadata,
        } => {
            println!("▶ Sorting {} photos in: {}", format, input.display());
            let source = metadata.source();
            let report = SortService::new(&config, source.as_ref(), format)
                .run(&input, &output)
                .with_context(|| format!("Failed to sort {}", input.display()))?;
            print_sort(&report, &output.join(&config.bug_log));
        }

        Commands::Color {
            input,
            output,
            darktable,
            format,
        } => {
            println!("▶ Color calibrating photos in: {}", input.display());
            let report = ColorService::new(&config, &runner, darktable, format)
                .run(&input, &output)
                .with_context(|| format!("Failed to color calibrate {}", input.display()))?;
            print_color(&report);
        }

        Commands::Build {
            input,
            output,
            metashape,
            script,
            format,
        } => {
            println!("▶ Building models from: {}", input.display());
            let report = BuildService::new(&config, &runner, metashape, script, format)
                .run(&input, &output)
                .with_context(|| format!("Failed to build models from {}", input.display()))?;
            print_build(&report);
        }

        Commands::Relax {
            input_raw,
            output_sort,
            output_color,
            output_model,
            metashape,
            script,
            darktable,
            img_format,
            profiles_ready,
            no_prompt,
            fresh,
            metadata,
        } => {
            if fresh {
                PipelineState::clear(&output_sort)?;
            }
            let gate: Box<dyn ProfileGate> = if profiles_ready {
                Box::new(FixedGate(true))
            } else if no_prompt {
                Box::new(FixedGate(false))
            } else {
                Box::new(PromptGate)
            };

            println!("▶ Starting full relax pipeline…");
            let source = metadata.source();
            let relax = Relax {
                config: &config,
                metadata: source.as_ref(),
                runner: &runner,
                gate: gate.as_ref(),
                format: img_format,
            };
            let outcome = relax.run(
                &RelaxPaths {
                    input_raw,
                    output_sort: output_sort.clone(),
                    output_color,
                    output_model,
                },
                &RelaxEngines {
                    darktable,
                    metashape,
                    script,
                },
            )?;

            if let Some(report) = &outcome.sort {
                print_sort(report, &output_sort.join(&config.bug_log));
            }
            if outcome.paused {
                println!(
                    "\n⏸  Paused before color calibration. Run the same relax command again once profiles are in place."
                );
                return Ok(());
            }
            if let Some(report) = &outcome.color {
                print_color(report);
            }
            if let Some(report) = &outcome.build {
                print_build(report);
            }
            println!("\n✅ Relax pipeline completed");
        }
    }

    Ok(())
}

fn print_failures(failures: &[UnitFailure]) {
    for failure in failures {
        eprintln!("   ⚠️  {}", failure);
    }
}

fn print_sort(report: &SortReport, bug_log: &Path) {
    println!(
        "✅ Sorted {} session(s): {} specimen photo(s), {} calibration photo(s)",
        report.sessions, report.specimen_copies, report.calibration_copies
    );
    if !report.bugs.is_empty() {
        println!(
            "⚠️  {} specimen folder(s) miss a camera; see {}",
            report.bugs.len(),
            bug_log.display()
        );
    }
    if !report.failures.is_empty() {
        eprintln!("⚠️  {} camera stream(s) could not be sorted:", report.failures.len());
        print_failures(&report.failures);
    }
}

fn print_color(report: &ColorReport) {
    println!("✅ Color calibrated {} photo(s)", report.calibrated);
    if !report.failures.is_empty() {
        eprintln!("⚠️  {} photo(s) skipped:", report.failures.len());
        print_failures(&report.failures);
    }
}

fn print_build(report: &BuildReport) {
    println!("✅ Built {} model(s)", report.built);
    if !report.failures.is_empty() {
        eprintln!("⚠️  {} specimen(s) skipped:", report.failures.len());
        print_failures(&report.failures);
    }
}
