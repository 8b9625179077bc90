//! hyfu: hybrid no-reference pixel-based video quality model CLI.
//!
//! Same pipeline as nofu but with bitstream metadata features merged
//! into the pooled vector (hence "hybrid").

use std::fs;
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;

use pixel_core::{
    default_cpu_count, dump_json, predict_video_score, read_database, report_file_name,
    run_batch, Extractor, FfmpegSource, ModelVariant, Prediction,
};

const VARIANT: ModelVariant = ModelVariant::Hyfu;

#[derive(Parser)]
#[command(name = "hyfu", version, about = "hyfu: a hybrid no-reference video quality model", long_about = None)]
struct Cli {
    /// Folder for cached per-feature values, e.g. for training an own model
    #[arg(long, default_value = "features/hyfu")]
    feature_folder: PathBuf,

    /// Pre-trained model folder
    #[arg(long, default_value = "models/hyfu")]
    model: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Predict video quality of a single video
    Predict {
        /// Distorted video to predict video quality for
        video: PathBuf,
        /// Output report path; defaults to the video name with .json
        #[arg(long)]
        output_report: Option<PathBuf>,
        /// Also write the full per-frame feature report here
        #[arg(long)]
        full_report: Option<PathBuf>,
    },
    /// Batch prediction over a database CSV
    Batch {
        /// CSV file with a `video` column
        database: PathBuf,
        /// Thread/cpu count
        #[arg(long, default_value_t = default_cpu_count())]
        cpu_count: usize,
        /// Folder for per-video output reports
        #[arg(long, default_value = "reports/hyfu")]
        output_report_folder: PathBuf,
    },
}

/// Default report location: the video name with a .json extension.
fn default_report_path(video: &PathBuf) -> PathBuf {
    let stem = video
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "report".to_string());
    PathBuf::from(format!("{stem}.json"))
}

fn predict_one(
    extractor: &Extractor<FfmpegSource>,
    model: &PathBuf,
    video: &PathBuf,
    full_report: Option<&PathBuf>,
) -> anyhow::Result<Prediction> {
    let (pooled, report) = extractor.extract_default(video, None)?;
    if let Some(path) = full_report {
        report.write(path)?;
    }
    Ok(predict_video_score(&pooled, model, true)?)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    let extractor = Extractor::new(VARIANT, &cli.feature_folder, FfmpegSource::default());

    match cli.command {
        Commands::Predict {
            video,
            output_report,
            full_report,
        } => {
            let output_report = output_report.unwrap_or_else(|| default_report_path(&video));
            let prediction = predict_one(&extractor, &cli.model, &video, full_report.as_ref())?;
            println!("{}", serde_json::to_string_pretty(&prediction)?);
            dump_json(&output_report, &prediction)?;
        }
        Commands::Batch {
            database,
            cpu_count,
            output_report_folder,
        } => {
            info!("batch prediction");
            let entries = read_database(&database, false)?;
            let (results, summary) = run_batch(&entries, cpu_count, |entry| {
                let (pooled, _) = extractor.extract_default(&entry.video, None)?;
                predict_video_score(&pooled, &cli.model, true)
            })?;

            fs::create_dir_all(&output_report_folder)?;
            for (entry, result) in entries.iter().zip(&results) {
                if let Some(prediction) = result {
                    let path = output_report_folder.join(report_file_name(&entry.video));
                    dump_json(&path, prediction)?;
                }
            }
            info!(
                total = summary.total,
                succeeded = summary.succeeded,
                failed = summary.failed,
                "batch finished ({:.1}% ok)",
                summary.success_rate()
            );
        }
    }

    Ok(())
}
