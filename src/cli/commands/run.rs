//! The `run` command

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use event_ingest::models::SheetAssignment;
use event_ingest::pipeline::{MAX_STAGE_STEPS, StepOutcome, SystemClock, run_import};
use event_ingest::{
    Dataset, FileFormat, ImportFile, ImportStore, MemoryStore, PipelineConfig,
    StagePipelineController,
};

use crate::output::{format_summary, to_pretty_json};

/// Arguments for the `run` command
pub struct RunArgs {
    pub file: PathBuf,
    pub format: Option<String>,
    pub language: String,
    pub config: Option<PathBuf>,
    pub auto_approve: bool,
    pub source_key: Option<String>,
}

/// Handle the `run` command
pub async fn handle_run(args: &RunArgs) -> anyhow::Result<()> {
    let content = std::fs::read(&args.file)
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    let format = resolve_format(&args.file, args.format.as_deref())?;

    let config = match &args.config {
        Some(path) => PipelineConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => PipelineConfig::default(),
    };

    let store = Arc::new(MemoryStore::new());
    let dataset_name = args
        .file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "import".to_string());
    let dataset = Dataset::new(dataset_name).with_language(args.language.clone());
    store.save_dataset(&dataset).await?;

    let file_name = args
        .file
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut file = ImportFile::new(file_name, format, content);
    if let Some(key) = &args.source_key {
        file = file.with_source_key(key.clone());
    }
    store.save_file(&file).await?;

    let controller = StagePipelineController::new(store.clone(), Arc::new(SystemClock), config)?;
    let sheets = [SheetAssignment::new(0, dataset.id)];
    let outcomes = run_import(&controller, file.id, &sheets).await?;

    for (job_id, outcome) in outcomes {
        if outcome != StepOutcome::Suspended {
            continue;
        }
        if !args.auto_approve {
            eprintln!("Job {} is waiting for schema approval (use --auto-approve)", job_id);
            continue;
        }
        controller.approve_schema(job_id, "cli").await?;
        controller.drive(job_id, MAX_STAGE_STEPS).await?;
    }

    let report = controller.progress(file.id).await?;
    let events = store.list_events(dataset.id).await?;
    eprintln!("{}", format_summary(&report, events.len()));
    println!("{}", to_pretty_json(&report)?);
    Ok(())
}

fn resolve_format(path: &Path, explicit: Option<&str>) -> anyhow::Result<FileFormat> {
    if let Some(format) = explicit {
        return format.parse::<FileFormat>().map_err(anyhow::Error::msg);
    }
    match path.extension().and_then(|e| e.to_str()) {
        Some(ext) => ext
            .parse::<FileFormat>()
            .map_err(anyhow::Error::msg)
            .with_context(|| "Pass --format to choose csv or json"),
        None => bail!("Cannot guess the format of {}; pass --format", path.display()),
    }
}
