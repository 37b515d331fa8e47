use std::{
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::Result;
use image::{Rgb, RgbImage};
use ndarray::Array2;
use ndarray_npy::write_npy;
use ppnet_align_analysis::{
    AnalysisError, AnalysisEvent, AnalysisObserver, AnalysisRequest, NoopObserver, run_analysis,
};
use ppnet_align_config::AnalysisSettings;
use ppnet_align_core::{
    ActivationMap, ActivationMode, ClassIdentity, ClassWeights, ForwardOutput, NormalizedImage,
    PreprocessConfig, PrototypeModel,
};
use tempfile::{TempDir, tempdir};

const IMG_SIZE: usize = 8;
const VOLUME: usize = 4;

/// Fixed-output network: every prototype reports a constant distance map.
struct StubModel {
    mode: ActivationMode,
    distances: Vec<f32>,
    identity: ClassIdentity,
    weights: ClassWeights,
}

impl StubModel {
    fn new(mode: ActivationMode, distances: Vec<f32>, classes: usize, weights: Vec<f32>) -> Self {
        let prototypes = distances.len();
        Self {
            mode,
            identity: ClassIdentity::evenly_partitioned(prototypes, classes).unwrap(),
            weights: ClassWeights::from_vec(classes, prototypes, weights).unwrap(),
            distances,
        }
    }
}

impl PrototypeModel for StubModel {
    fn img_size(&self) -> usize {
        IMG_SIZE
    }

    fn num_prototypes(&self) -> usize {
        self.distances.len()
    }

    fn num_classes(&self) -> usize {
        self.weights.num_classes()
    }

    fn prototype_volume(&self) -> usize {
        VOLUME
    }

    fn activation_mode(&self) -> ActivationMode {
        self.mode
    }

    fn prototype_class_identity(&self) -> &ClassIdentity {
        &self.identity
    }

    fn last_layer_weights(&self) -> Result<ClassWeights> {
        Ok(self.weights.clone())
    }

    fn forward(&self, image: &NormalizedImage) -> Result<ForwardOutput> {
        assert_eq!(image.size(), IMG_SIZE);
        let logits = (0..self.num_classes())
            .map(|class| {
                self.distances
                    .iter()
                    .enumerate()
                    .map(|(proto, &d)| self.weights.get(class, proto) * self.mode.similarity(d))
                    .sum::<f32>()
            })
            .collect();
        let distance_maps = self
            .distances
            .iter()
            .map(|&d| {
                // nearest cell in the top-left corner
                let mut values = vec![d + 1.0; 4];
                values[0] = d;
                ActivationMap::new(2, 2, values)
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(ForwardOutput {
            logits,
            min_distances: self.distances.clone(),
            distance_maps,
        })
    }
}

struct Fixture {
    _dir: TempDir,
    image: PathBuf,
    checkpoint: PathBuf,
    out: PathBuf,
}

/// Lays out a dataset, a push-epoch image directory and a checkpoint path.
fn fixture(dataset_classes: &[&str], records: &[[i64; 6]]) -> Fixture {
    let dir = tempdir().unwrap();
    let data = dir.path().join("data").join("test");
    for class in dataset_classes {
        fs::create_dir_all(data.join(class)).unwrap();
    }
    let image = data.join(dataset_classes[0]).join("sample.png");
    RgbImage::from_fn(16, 16, |x, y| Rgb([(x * 16) as u8, (y * 16) as u8, 128]))
        .save(&image)
        .unwrap();

    let run = dir.path().join("saved_models").join("vgg19").join("003");
    fs::create_dir_all(run.join("checkpoints")).unwrap();
    let checkpoint = run.join("checkpoints").join("10_18push0.7822.pth");

    let epoch_dir = run.join("img").join("epoch-10");
    fs::create_dir_all(&epoch_dir).unwrap();
    let flat: Vec<i64> = records.iter().flatten().copied().collect();
    let values = Array2::from_shape_vec((records.len(), 6), flat).unwrap();
    write_npy(epoch_dir.join("bb.npy"), &values).unwrap();
    let stored = RgbImage::from_pixel(12, 12, Rgb([40, 80, 120]));
    for idx in 0..records.len() {
        for name in [
            format!("prototype-img{idx}.png"),
            format!("prototype-img-original{idx}.png"),
            format!("prototype-img-original_with_self_act{idx}.png"),
        ] {
            stored.save(epoch_dir.join(name)).unwrap();
        }
    }

    let out = dir.path().join("out");
    Fixture {
        _dir: dir,
        image,
        checkpoint,
        out,
    }
}

fn settings(top_prototypes: usize, top_classes: usize) -> AnalysisSettings {
    AnalysisSettings {
        top_prototypes,
        top_classes,
        ..AnalysisSettings::default()
    }
}

fn analysis_root(fixture: &Fixture, class: &str) -> PathBuf {
    fixture
        .out
        .join("vgg19/003/10_18push0.7822.pth/alignment")
        .join(class)
        .join("sample.png")
}

fn read(path: &Path) -> String {
    fs::read_to_string(path).unwrap_or_else(|err| panic!("{}: {err}", path.display()))
}

#[derive(Default)]
struct Recorder(Mutex<Vec<AnalysisEvent>>);

impl AnalysisObserver for Recorder {
    fn on_event(&self, event: &AnalysisEvent) {
        self.0.lock().unwrap().push(event.clone());
    }
}

const ONE_CLASS_RECORDS: [[i64; 6]; 2] = [[0, 0, 4, 0, 4, 0], [1, 2, 6, 2, 6, 0]];

#[test]
fn nearest_prototype_reports_maximum_log_similarity() {
    let fixture = fixture(&["birds"], &ONE_CLASS_RECORDS);
    let model = StubModel::new(ActivationMode::Log, vec![0.0, 50.0], 1, vec![1.0, 1.0]);
    let settings = settings(1, 0);
    let request = AnalysisRequest {
        image: &fixture.image,
        checkpoint: &fixture.checkpoint,
        out_dir: &fixture.out,
        settings: &settings,
        preprocess: &PreprocessConfig::default(),
    };
    let recorder = Recorder::default();
    let outcome = run_analysis(&model, &request, &recorder).unwrap();

    assert_eq!(outcome.top_prototypes, vec![0]);
    assert!(outcome.is_correct());
    assert!(outcome.alignment.is_aligned());
    assert!(outcome.class_prototypes.is_empty());

    let root = analysis_root(&fixture, "birds");
    assert_eq!(outcome.output_dir, root);
    let top = root.join("most_activated_prototypes/top-1");
    assert_eq!(
        read(&top.join("info.txt")),
        "prototype index: 0\n\
         prototype class: 0\n\
         activation value (similarity score): 9.2103\n\
         last layer connection with predicted class: 1.0000\n"
    );
    for name in [
        "prototype_patch.png",
        "prototype_bbox.png",
        "prototype_activation.png",
        "target_patch.png",
        "target_bbox.png",
        "target_activations.png",
    ] {
        assert!(top.join(name).is_file(), "{name} missing");
    }
    assert!(!root.join("most_activated_prototypes/top-2").exists());
    assert!(!root.join("class_prototypes").exists());

    let original = image::open(root.join("original_img.png")).unwrap();
    assert_eq!((original.width(), original.height()), (8, 8));
    let patch = image::open(top.join("target_patch.png")).unwrap();
    assert!(patch.width() < 8 && patch.height() < 8);

    let log = read(&root.join("local_analysis.log"));
    for expected in [
        "Model epoch: 10",
        "Model base architecture: vgg19",
        "Experiment run: 003",
        "Prototypes are chosen from 1 classes",
        "All prototypes connect strongly to their respective classes",
        "Predicted class: 0",
        "Correct class: 0",
        "Prototypes from top-0 classes:",
        "Prediction is correct.",
    ] {
        assert!(log.contains(expected), "log lacks `{expected}`:\n{log}");
    }

    let events = recorder.0.lock().unwrap();
    assert!(matches!(events.last(), Some(AnalysisEvent::Finished { correct: true })));
    let rendered = events
        .iter()
        .filter(|event| matches!(event, AnalysisEvent::PrototypeRendered { .. }))
        .count();
    assert_eq!(rendered, 1);
}

#[test]
fn linear_activation_is_offset_by_prototype_volume() {
    let fixture = fixture(&["birds"], &ONE_CLASS_RECORDS);
    let model = StubModel::new(ActivationMode::Linear, vec![0.0, 3.0], 1, vec![1.0, 1.0]);
    let settings = settings(2, 0);
    let request = AnalysisRequest {
        image: &fixture.image,
        checkpoint: &fixture.checkpoint,
        out_dir: &fixture.out,
        settings: &settings,
        preprocess: &PreprocessConfig::default(),
    };
    let outcome = run_analysis(&model, &request, &NoopObserver).unwrap();
    assert_eq!(outcome.top_prototypes, vec![0, 1]);

    let root = analysis_root(&fixture, "birds");
    let first = read(&root.join("most_activated_prototypes/top-1/info.txt"));
    let second = read(&root.join("most_activated_prototypes/top-2/info.txt"));
    assert!(first.contains("activation value (similarity score): 4.0000"), "{first}");
    assert!(second.contains("activation value (similarity score): 1.0000"), "{second}");
}

#[test]
fn class_rankings_and_misalignment_are_reported() {
    // prototypes 0,1 belong to class 0; 2,3 to class 1; prototype 1 leans to class 1
    let records = [
        [0, 0, 4, 0, 4, 0],
        [1, 0, 4, 0, 4, 0],
        [2, 0, 4, 0, 4, 1],
        [3, 0, 4, 0, 4, 1],
    ];
    let fixture = fixture(&["cats", "dogs", "owls"], &records);
    let weights = vec![
        1.0, -0.5, -0.5, -0.5, // class 0
        -0.5, 1.0, 1.0, 1.0, // class 1
    ];
    let model = StubModel::new(ActivationMode::Log, vec![2.0, 0.5, 1.0, 8.0], 2, weights);
    let settings = AnalysisSettings {
        class_prototypes: Some(1),
        ..settings(2, 2)
    };
    let request = AnalysisRequest {
        image: &fixture.image,
        checkpoint: &fixture.checkpoint,
        out_dir: &fixture.out,
        settings: &settings,
        preprocess: &PreprocessConfig::default(),
    };
    let outcome = run_analysis(&model, &request, &NoopObserver).unwrap();

    assert!(!outcome.alignment.is_aligned());
    assert_eq!(outcome.alignment.mismatched, vec![1]);
    assert_eq!(outcome.top_prototypes, vec![1, 2]);
    assert_eq!(outcome.predicted_class, 1);
    assert_eq!(outcome.correct_class, 0);
    assert!(!outcome.is_correct());
    assert_eq!(outcome.class_prototypes, vec![(1, vec![2]), (0, vec![1])]);

    let root = analysis_root(&fixture, "cats");
    let log = read(&root.join("local_analysis.log"));
    assert!(log.contains("WARNING: Not all prototypes connect most strongly to their respective classes"));
    assert!(!log.contains("All prototypes connect strongly"));
    assert!(log.contains("Prediction is wrong."));

    let global = read(&root.join("most_activated_prototypes/top-1/info.txt"));
    assert!(global.contains("prototype index: 1\n"), "{global}");
    assert!(global.contains("prototype connection: 1\n"), "{global}");

    let class_dir = root.join("class_prototypes/top-2_class/top-1_prototype");
    let info = read(&class_dir.join("info.txt"));
    assert!(info.starts_with("prototype index: 1\nprototype class: 0\nprototype class logits: "));
    assert!(info.contains("last layer connection: -0.5000\n"), "{info}");
    assert!(class_dir.join("target_activation.png").is_file());
    assert!(!root.join("class_prototypes/top-1_class/top-2_prototype").exists());
}

#[test]
fn top_classes_must_leave_a_class_out() {
    let fixture = fixture(&["birds"], &ONE_CLASS_RECORDS);
    let model = StubModel::new(ActivationMode::Log, vec![0.0, 1.0], 1, vec![1.0, 1.0]);
    let settings = settings(1, 1);
    let request = AnalysisRequest {
        image: &fixture.image,
        checkpoint: &fixture.checkpoint,
        out_dir: &fixture.out,
        settings: &settings,
        preprocess: &PreprocessConfig::default(),
    };
    let err = run_analysis(&model, &request, &NoopObserver).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<AnalysisError>(),
        Some(AnalysisError::TooManyClasses {
            requested: 1,
            available: 1
        })
    ));
}

#[test]
fn prototype_count_mismatch_is_fatal() {
    let fixture = fixture(&["birds", "cats"], &ONE_CLASS_RECORDS);
    let model = StubModel::new(ActivationMode::Log, vec![0.0, 1.0, 2.0], 1, vec![1.0; 3]);
    let settings = settings(1, 0);
    let request = AnalysisRequest {
        image: &fixture.image,
        checkpoint: &fixture.checkpoint,
        out_dir: &fixture.out,
        settings: &settings,
        preprocess: &PreprocessConfig::default(),
    };
    let err = run_analysis(&model, &request, &NoopObserver).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<AnalysisError>(),
        Some(AnalysisError::PrototypeCountMismatch {
            records: 2,
            prototypes: 3
        })
    ));
}

#[test]
fn missing_prototype_images_are_fatal() {
    let fixture = fixture(&["birds", "cats"], &ONE_CLASS_RECORDS);
    fs::remove_dir_all(fixture.checkpoint.parent().unwrap().parent().unwrap().join("img")).unwrap();
    let model = StubModel::new(ActivationMode::Log, vec![0.0, 1.0], 1, vec![1.0, 1.0]);
    let settings = settings(1, 0);
    let request = AnalysisRequest {
        image: &fixture.image,
        checkpoint: &fixture.checkpoint,
        out_dir: &fixture.out,
        settings: &settings,
        preprocess: &PreprocessConfig::default(),
    };
    let err = run_analysis(&model, &request, &NoopObserver).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<AnalysisError>(),
        Some(AnalysisError::MissingPrototypeDir(_))
    ));
}
