use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use image::Rgb32FImage;
use ppnet_align_config::AnalysisSettings;
use ppnet_align_core::{
    ActivationMap, AlignmentReport, ClassWeights, PreprocessConfig, PrototypeModel, argmax,
    check_alignment, distinct_classes, preprocess_image, select_class_prototypes,
    select_top_classes, select_top_prototypes,
};
use tracing::debug;

use crate::{
    dataset::DatasetClasses,
    error::AnalysisError,
    log::AnalysisLog,
    metadata::PrototypeMetadata,
    observer::{AnalysisEvent, AnalysisObserver, RankingScope},
    paths::{OutputLayout, parse_checkpoint_path, parse_image_path},
    render::{save_prototype_images, save_rgb32f, save_target_images},
    report::{ClassPrototypeReport, GlobalPrototypeReport, PrototypeFacts, write_info},
    store::PrototypeStore,
};

const GLOBAL_OVERLAY: &str = "target_activations.png";
const CLASS_OVERLAY: &str = "target_activation.png";

/// Inputs of one analysis run.
pub struct AnalysisRequest<'a> {
    pub image: &'a Path,
    pub checkpoint: &'a Path,
    /// Root under which the `<arch>/<experiment>/...` tree is created.
    pub out_dir: &'a Path,
    pub settings: &'a AnalysisSettings,
    pub preprocess: &'a PreprocessConfig,
}

#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub output_dir: PathBuf,
    pub predicted_class: usize,
    pub correct_class: usize,
    pub alignment: AlignmentReport,
    /// Prototypes under `most_activated_prototypes/`, best first.
    pub top_prototypes: Vec<usize>,
    /// `(class, prototypes)` per expanded class, best class first.
    pub class_prototypes: Vec<(usize, Vec<usize>)>,
}

impl AnalysisOutcome {
    pub fn is_correct(&self) -> bool {
        self.predicted_class == self.correct_class
    }
}

struct RenderContext<'a> {
    store: &'a PrototypeStore,
    metadata: &'a PrototypeMetadata,
    weights: &'a ClassWeights,
    strongest: &'a [usize],
    activations: &'a [f32],
    patterns: &'a [ActivationMap],
    original: &'a Rgb32FImage,
    img_size: usize,
    settings: &'a AnalysisSettings,
}

impl RenderContext<'_> {
    fn facts(&self, prototype: usize) -> Result<PrototypeFacts> {
        let record = self
            .metadata
            .get(prototype)
            .ok_or_else(|| anyhow!("no metadata for prototype {prototype}"))?;
        Ok(PrototypeFacts {
            index: prototype,
            class: record.class,
            strongest_class: self.strongest[prototype],
            activation: self.activations[prototype],
        })
    }

    fn render(&self, prototype: usize, dir: &Path, info: &str, overlay_name: &str) -> Result<()> {
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
        let record = self
            .metadata
            .get(prototype)
            .ok_or_else(|| anyhow!("no metadata for prototype {prototype}"))?;
        save_prototype_images(
            &self.store.patch_path(prototype),
            &self.store.original_path(prototype),
            &self.store.self_activation_path(prototype),
            &record.bbox,
            &self.settings.render,
            dir,
        )
        .with_context(|| format!("failed to render stored images of prototype {prototype}"))?;

        let upsampled = self.patterns[prototype].upsample(self.img_size, self.img_size)?;
        let crop = save_target_images(
            self.original,
            &upsampled,
            self.settings.crop_percentile,
            &self.settings.render,
            dir,
            overlay_name,
        )
        .with_context(|| format!("failed to render activation of prototype {prototype}"))?;
        debug!(prototype, %crop, dir = %dir.display(), "rendered prototype");
        write_info(dir, info)
    }
}

/// Runs the full alignment analysis of one image against `model` and writes
/// the artifact tree.
pub fn run_analysis(
    model: &dyn PrototypeModel,
    request: &AnalysisRequest<'_>,
    observer: &dyn AnalysisObserver,
) -> Result<AnalysisOutcome> {
    let test_image = parse_image_path(request.image)?;
    let checkpoint = parse_checkpoint_path(request.checkpoint)?;
    let layout = OutputLayout::new(request.out_dir, &checkpoint, &test_image);
    fs::create_dir_all(layout.root())
        .with_context(|| format!("failed to create {}", layout.root().display()))?;

    let mut log = AnalysisLog::create(&layout.log_file())?;
    log.blank()?;
    log.line(&format!("Load model from: {}", request.checkpoint.display()))?;
    log.line(&format!("Model epoch: {}", checkpoint.epoch))?;
    log.line(&format!("Model base architecture: {}", checkpoint.architecture))?;
    log.line(&format!("Experiment run: {}", checkpoint.experiment))?;
    log.blank()?;

    let settings = request.settings;
    let dataset = DatasetClasses::for_image(&test_image)?;
    if settings.top_classes >= dataset.len() {
        return Err(AnalysisError::TooManyClasses {
            requested: settings.top_classes,
            available: dataset.len(),
        }
        .into());
    }
    let correct_class = dataset.index_of(&test_image.class_name)?;

    let store = PrototypeStore::open(&checkpoint.prototype_img_dir(), checkpoint.epoch)?;
    let metadata = store.load_metadata()?;
    if metadata.len() != model.num_prototypes() {
        return Err(AnalysisError::PrototypeCountMismatch {
            records: metadata.len(),
            prototypes: model.num_prototypes(),
        }
        .into());
    }
    let recorded_classes = metadata.classes();
    log.line(&format!(
        "Prototypes are chosen from {} classes",
        distinct_classes(&recorded_classes)
    ))?;

    let weights = model.last_layer_weights()?;
    let strongest = weights.strongest_classes();
    let alignment = check_alignment(&strongest, &recorded_classes);
    if alignment.is_aligned() {
        log.line(alignment.message())?;
    } else {
        log.warn(alignment.message())?;
    }
    log.blank()?;
    observer.on_event(&AnalysisEvent::AlignmentChecked {
        aligned: alignment.aligned,
        total: alignment.total,
    });

    let decoded = image::open(&test_image.path)
        .with_context(|| format!("failed to open image {}", test_image.path.display()))?;
    let normalized = preprocess_image(&decoded, model.img_size(), request.preprocess)?;
    let output = model.forward(&normalized)?;
    output.validate(model.num_prototypes(), model.num_classes())?;

    let mode = model.activation_mode();
    let volume = model.prototype_volume();
    let activations = mode.activations(&output.min_distances, volume);
    let patterns: Vec<_> = output
        .distance_maps
        .iter()
        .map(|map| map.to_activation(mode, volume))
        .collect();

    let predicted_class =
        argmax(&output.logits).ok_or_else(|| anyhow!("model returned no logits"))?;
    log.line(&format!("Predicted class: {predicted_class}"))?;
    log.line(&format!("Correct class: {correct_class}"))?;
    log.blank()?;
    observer.on_event(&AnalysisEvent::InferenceFinished {
        predicted_class,
        correct_class,
    });

    let original = normalized.denormalize();
    save_rgb32f(&layout.original_image(), &original)?;

    let ctx = RenderContext {
        store: &store,
        metadata: &metadata,
        weights: &weights,
        strongest: &strongest,
        activations: &activations,
        patterns: &patterns,
        original: &original,
        img_size: model.img_size(),
        settings,
    };

    let top_prototypes = select_top_prototypes(&activations, settings.top_prototypes);
    let scope = RankingScope::Global;
    observer.on_event(&AnalysisEvent::RankingStarted {
        scope,
        prototypes: top_prototypes.len(),
    });
    for (idx, &prototype) in top_prototypes.iter().enumerate() {
        let rank = idx + 1;
        let report = GlobalPrototypeReport {
            facts: ctx.facts(prototype)?,
            predicted_class_weight: ctx.weights.get(predicted_class, prototype),
        };
        ctx.render(
            prototype,
            &layout.most_activated_dir(rank),
            &report.render(),
            GLOBAL_OVERLAY,
        )?;
        observer.on_event(&AnalysisEvent::PrototypeRendered {
            scope,
            rank,
            prototype,
        });
    }
    observer.on_event(&AnalysisEvent::RankingFinished { scope });

    log.line(&format!(
        "Prototypes from top-{} classes:",
        settings.top_classes
    ))?;
    let identity = model.prototype_class_identity();
    let per_class_limit = settings
        .class_prototypes
        .unwrap_or_else(|| model.num_prototypes());
    let mut class_prototypes = Vec::new();
    for (idx, class) in select_top_classes(&output.logits, settings.top_classes)
        .into_iter()
        .enumerate()
    {
        let class_rank = idx + 1;
        let class_dir = layout.class_dir(class_rank);
        fs::create_dir_all(&class_dir)
            .with_context(|| format!("failed to create {}", class_dir.display()))?;
        let selected =
            select_class_prototypes(&activations, &identity.class_mask(class), per_class_limit);
        debug!(class, class_rank, prototypes = selected.len(), "expanding class");

        let scope = RankingScope::Class {
            rank: class_rank,
            class,
        };
        observer.on_event(&AnalysisEvent::RankingStarted {
            scope,
            prototypes: selected.len(),
        });
        for (proto_idx, &prototype) in selected.iter().enumerate() {
            let rank = proto_idx + 1;
            let report = ClassPrototypeReport {
                facts: ctx.facts(prototype)?,
                class_logit: output.logits[class],
                class_weight: ctx.weights.get(class, prototype),
            };
            ctx.render(
                prototype,
                &layout.class_prototype_dir(class_rank, rank),
                &report.render(),
                CLASS_OVERLAY,
            )?;
            observer.on_event(&AnalysisEvent::PrototypeRendered {
                scope,
                rank,
                prototype,
            });
        }
        observer.on_event(&AnalysisEvent::RankingFinished { scope });
        class_prototypes.push((class, selected));
    }

    let outcome = AnalysisOutcome {
        output_dir: layout.root().to_path_buf(),
        predicted_class,
        correct_class,
        alignment,
        top_prototypes,
        class_prototypes,
    };
    if outcome.is_correct() {
        log.line("Prediction is correct.")?;
    } else {
        log.line("Prediction is wrong.")?;
    }
    log.finish()?;
    observer.on_event(&AnalysisEvent::Finished {
        correct: outcome.is_correct(),
    });
    Ok(outcome)
}
