use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail, ensure};
use candle_core::{D, DType, Device, Module, Tensor};
use candle_nn::{Conv2d, Init, Linear, VarBuilder, conv2d, linear_no_bias};
use ppnet_align_core::{
    ActivationMode, ClassIdentity, ClassWeights, ForwardOutput, NormalizedImage, PrototypeModel,
    activation::LOG_EPSILON,
    tensor::{image_to_batch, to_host_maps, to_host_vec1},
};
use tracing::{debug, info};

use crate::{
    config::{AddOnLayersType, PPNetConfig, load_config},
    features::{VggFeatures, VggVariant},
};

pub struct ModelLoadArgs<'a> {
    pub checkpoint: &'a Path,
    /// Explicit `ppnet.json`; looked up beside the checkpoint otherwise.
    pub config_path: Option<&'a Path>,
    /// Backbone name used when the config does not carry one.
    pub architecture_hint: Option<&'a str>,
    pub device: Device,
}

/// One `conv -> relu -> conv -> act` group of the add-on stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddOnStage {
    pub in_channels: usize,
    pub out_channels: usize,
    /// Sigmoid closes the stack; intermediate stages use ReLU.
    pub sigmoid: bool,
}

/// Channel plan for the add-on layers between the backbone and the
/// prototype layer.
pub fn add_on_plan(
    kind: AddOnLayersType,
    in_channels: usize,
    prototype_channels: usize,
) -> Vec<AddOnStage> {
    match kind {
        AddOnLayersType::Regular => vec![AddOnStage {
            in_channels,
            out_channels: prototype_channels,
            sigmoid: true,
        }],
        AddOnLayersType::Bottleneck => {
            let mut stages = Vec::new();
            let mut current = in_channels;
            while current > prototype_channels || stages.is_empty() {
                let out_channels = prototype_channels.max(current / 2);
                stages.push(AddOnStage {
                    in_channels: current,
                    out_channels,
                    sigmoid: out_channels <= prototype_channels,
                });
                current /= 2;
            }
            stages
        }
    }
}

struct AddOnLayer {
    first: Conv2d,
    second: Conv2d,
    sigmoid: bool,
}

impl AddOnLayer {
    fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let xs = self.first.forward(xs)?.relu()?;
        let xs = self.second.forward(&xs)?;
        if self.sigmoid {
            Ok(candle_nn::ops::sigmoid(&xs)?)
        } else {
            Ok(xs.relu()?)
        }
    }
}

/// Squared L2 distance between every prototype and every patch of
/// `features`.
///
/// `features` is `[batch, channels, height, width]` and `prototypes` is
/// `[prototypes, channels, h, w]`; the result is
/// `[batch, prototypes, height - h + 1, width - w + 1]`, clamped at zero.
pub fn l2_distances(features: &Tensor, prototypes: &Tensor) -> Result<Tensor> {
    let (_, channels, _, _) = features.dims4()?;
    let (count, proto_channels, proto_h, proto_w) = prototypes.dims4()?;
    ensure!(
        channels == proto_channels,
        "feature channels ({channels}) do not match prototype channels ({proto_channels})"
    );
    let ones = Tensor::ones(
        (1, channels, proto_h, proto_w),
        features.dtype(),
        features.device(),
    )?;
    let patch_sq = features.sqr()?.conv2d(&ones, 0, 1, 1, 1)?;
    let proto_sq = prototypes.sqr()?.sum((1, 2, 3))?.reshape((1, count, 1, 1))?;
    let cross = features.conv2d(prototypes, 0, 1, 1, 1)?;
    let distances = cross
        .affine(-2.0, 0.0)?
        .broadcast_add(&patch_sq)?
        .broadcast_add(&proto_sq)?
        .relu()?;
    Ok(distances)
}

fn distance_to_similarity(mode: ActivationMode, distances: &Tensor) -> Result<Tensor> {
    let similarity = match mode {
        ActivationMode::Log => {
            let numerator = distances.affine(1.0, 1.0)?;
            let denominator = distances.affine(1.0, LOG_EPSILON as f64)?;
            numerator.div(&denominator)?.log()?
        }
        ActivationMode::Linear => distances.neg()?,
    };
    Ok(similarity)
}

/// Prototypical part network: VGG trunk, add-on layers, L2 prototype layer
/// and a bias-free class layer.
pub struct PPNet {
    config: PPNetConfig,
    base_architecture: String,
    device: Device,
    features: VggFeatures,
    add_on_layers: Vec<AddOnLayer>,
    prototype_vectors: Tensor,
    last_layer: Linear,
    class_identity: ClassIdentity,
    checkpoint: Option<PathBuf>,
}

impl PPNet {
    /// Builds the network from `vb`, which must be rooted at the state dict
    /// top level.
    pub fn load(config: PPNetConfig, base_architecture: &str, vb: VarBuilder) -> Result<Self> {
        config.validate()?;
        let variant: VggVariant = base_architecture.parse()?;
        let device = vb.device().clone();
        let vb = if vb.contains_tensor("module.prototype_vectors") {
            debug!("checkpoint saved from a data-parallel wrapper, stripping `module.`");
            vb.pp("module")
        } else {
            vb
        };

        let features = VggFeatures::load(variant, vb.pp("features").pp("features"))
            .with_context(|| format!("failed to load {base_architecture} features"))?;

        let add_on_vb = vb.pp("add_on_layers");
        let plan = add_on_plan(
            config.add_on_layers_type,
            variant.out_channels(),
            config.prototype_channels(),
        );
        let mut add_on_layers = Vec::with_capacity(plan.len());
        for (stage_idx, stage) in plan.iter().enumerate() {
            let base = stage_idx * 4;
            let first = conv2d(
                stage.in_channels,
                stage.out_channels,
                1,
                Default::default(),
                add_on_vb.pp(base),
            )
            .with_context(|| format!("failed to load add_on_layers.{base}"))?;
            let second = conv2d(
                stage.out_channels,
                stage.out_channels,
                1,
                Default::default(),
                add_on_vb.pp(base + 2),
            )
            .with_context(|| format!("failed to load add_on_layers.{}", base + 2))?;
            add_on_layers.push(AddOnLayer {
                first,
                second,
                sigmoid: stage.sigmoid,
            });
        }

        let [count, channels, height, width] = config.prototype_shape;
        let prototype_vectors = vb
            .get_with_hints(
                (count, channels, height, width),
                "prototype_vectors",
                Init::Uniform { lo: 0.0, up: 1.0 },
            )
            .context("missing prototype_vectors")?;
        let last_layer = linear_no_bias(count, config.num_classes, vb.pp("last_layer"))
            .context("failed to load last_layer")?;
        let class_identity = ClassIdentity::evenly_partitioned(count, config.num_classes)?;

        Ok(Self {
            config,
            base_architecture: base_architecture.to_string(),
            device,
            features,
            add_on_layers,
            prototype_vectors,
            last_layer,
            class_identity,
            checkpoint: None,
        })
    }

    pub fn config(&self) -> &PPNetConfig {
        &self.config
    }

    pub fn base_architecture(&self) -> &str {
        &self.base_architecture
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn checkpoint(&self) -> Option<&Path> {
        self.checkpoint.as_deref()
    }

    /// Add-on features for a `[batch, 3, size, size]` input.
    pub fn conv_features(&self, xs: &Tensor) -> Result<Tensor> {
        let mut xs = self.features.forward(xs)?;
        for layer in &self.add_on_layers {
            xs = layer.forward(&xs)?;
        }
        Ok(xs)
    }

    /// Returns `(logits, min_distances, distances)` for a batch.
    pub fn forward_tensors(&self, xs: &Tensor) -> Result<(Tensor, Tensor, Tensor)> {
        let conv = self.conv_features(xs)?;
        let distances = l2_distances(&conv, &self.prototype_vectors)?;
        let min_distances = distances.flatten_from(2)?.min(D::Minus1)?;
        let similarities =
            distance_to_similarity(self.config.prototype_activation_function, &min_distances)?;
        let logits = self.last_layer.forward(&similarities)?;
        Ok((logits, min_distances, distances))
    }
}

impl PrototypeModel for PPNet {
    fn img_size(&self) -> usize {
        self.config.img_size
    }

    fn num_prototypes(&self) -> usize {
        self.config.num_prototypes()
    }

    fn num_classes(&self) -> usize {
        self.config.num_classes
    }

    fn prototype_volume(&self) -> usize {
        self.config.prototype_volume()
    }

    fn activation_mode(&self) -> ActivationMode {
        self.config.prototype_activation_function
    }

    fn prototype_class_identity(&self) -> &ClassIdentity {
        &self.class_identity
    }

    fn last_layer_weights(&self) -> Result<ClassWeights> {
        let weight = self.last_layer.weight();
        let (classes, prototypes) = weight.dims2()?;
        let values = to_host_vec1(&weight.flatten_all()?)?;
        ClassWeights::from_vec(classes, prototypes, values)
    }

    fn forward(&self, image: &NormalizedImage) -> Result<ForwardOutput> {
        ensure!(
            image.size() == self.config.img_size,
            "image is {}px but the network expects {}px",
            image.size(),
            self.config.img_size
        );
        let batch = image_to_batch(image, &self.device, DType::F32)?;
        let (logits, min_distances, distances) = self.forward_tensors(&batch)?;
        let output = ForwardOutput {
            logits: to_host_vec1(&logits.squeeze(0)?)?,
            min_distances: to_host_vec1(&min_distances.squeeze(0)?)?,
            distance_maps: to_host_maps(&distances.squeeze(0)?)?,
        };
        output.validate(self.num_prototypes(), self.num_classes())?;
        Ok(output)
    }
}

fn checkpoint_var_builder(path: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "safetensors" => {
            let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[path], DType::F32, device) }
                .with_context(|| format!("failed to mmap weights at {}", path.display()))?;
            Ok(vb)
        }
        "pth" | "pt" | "bin" => VarBuilder::from_pth(path, DType::F32, device).with_context(|| {
            format!(
                "failed to read state dict at {} (whole pickled modules are not supported, save `model.state_dict()` instead)",
                path.display()
            )
        }),
        other => bail!(
            "unsupported checkpoint format `{other}` for {}",
            path.display()
        ),
    }
}

pub fn load_model(args: &ModelLoadArgs<'_>) -> Result<PPNet> {
    ensure!(
        args.checkpoint.exists(),
        "checkpoint not found at {}",
        args.checkpoint.display()
    );
    let loaded = load_config(args.config_path, args.checkpoint)?;
    let base_architecture = loaded
        .value
        .resolve_base_architecture(args.architecture_hint)?;
    let vb = checkpoint_var_builder(args.checkpoint, &args.device)?;
    let mut model = PPNet::load(loaded.value, &base_architecture, vb)
        .with_context(|| format!("failed to build network from {}", args.checkpoint.display()))?;
    model.checkpoint = Some(args.checkpoint.to_path_buf());
    info!(
        checkpoint = %args.checkpoint.display(),
        config = %loaded.path.display(),
        base_architecture = %base_architecture,
        prototypes = model.num_prototypes(),
        classes = model.num_classes(),
        activation = %model.activation_mode(),
        "loaded prototype network"
    );
    Ok(model)
}
