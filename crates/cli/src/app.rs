use std::time::Instant;

use anyhow::{Context, Result};
use ppnet_align_analysis::{
    AnalysisObserver, AnalysisRequest, NoopObserver, paths::parse_checkpoint_path, run_analysis,
};
use ppnet_align_config::{AppConfig, ConfigOverrides};
use ppnet_align_core::prepare_device;
use ppnet_align_infer_ppnet::{ModelLoadArgs, load_model};
use tracing::info;

use crate::{args::Cli, progress::ProgressObserver};

pub fn run(args: Cli) -> Result<()> {
    let overrides = ConfigOverrides::from(&args);
    let (app_config, descriptor) = AppConfig::load_with_overrides(&overrides)?;
    info!(
        "Using configuration {}",
        descriptor
            .path
            .as_ref()
            .map(|path| path.display().to_string())
            .unwrap_or_else(|| "<built-in defaults>".to_string())
    );

    let selection = app_config.inference.device_selection();
    let device = prepare_device(selection)?;
    // The architecture directory doubles as the backbone name when the
    // network config does not record one.
    let checkpoint = parse_checkpoint_path(&args.model)?;

    info!("Loading model {} (device={selection})", args.model.display());
    let load_start = Instant::now();
    let model = load_model(&ModelLoadArgs {
        checkpoint: &args.model,
        config_path: overrides.model_config.as_deref(),
        architecture_hint: Some(&checkpoint.architecture),
        device,
    })
    .with_context(|| format!("failed to load model from {}", args.model.display()))?;
    info!("Model ready in {:.2?}", load_start.elapsed());

    let observer: Box<dyn AnalysisObserver> = if args.quiet {
        Box::new(NoopObserver)
    } else {
        Box::new(ProgressObserver::default())
    };
    let request = AnalysisRequest {
        image: &args.img,
        checkpoint: &args.model,
        out_dir: &args.out,
        settings: &app_config.analysis,
        preprocess: &app_config.preprocess,
    };
    let outcome = run_analysis(&model, &request, observer.as_ref())?;
    info!(
        "Analysis written to {} (predicted={}, correct={})",
        outcome.output_dir.display(),
        outcome.predicted_class,
        outcome.correct_class
    );
    Ok(())
}
