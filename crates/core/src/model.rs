use anyhow::{Result, ensure};

use crate::{activation::ActivationMode, map::ActivationMap, preprocess::NormalizedImage};

/// Dense per-prototype distances over the feature grid of one image.
pub type DistanceMap = ActivationMap;

/// Result of a single forward pass, detached from any tensor framework.
#[derive(Debug, Clone)]
pub struct ForwardOutput {
    /// One score per class.
    pub logits: Vec<f32>,
    /// Spatially pooled (minimum) distance per prototype.
    pub min_distances: Vec<f32>,
    /// Full distance map per prototype.
    pub distance_maps: Vec<DistanceMap>,
}

impl ForwardOutput {
    pub fn validate(&self, num_prototypes: usize, num_classes: usize) -> Result<()> {
        ensure!(
            self.logits.len() == num_classes,
            "model returned {} logits for {num_classes} classes",
            self.logits.len()
        );
        ensure!(
            self.min_distances.len() == num_prototypes,
            "model returned {} min distances for {num_prototypes} prototypes",
            self.min_distances.len()
        );
        ensure!(
            self.distance_maps.len() == num_prototypes,
            "model returned {} distance maps for {num_prototypes} prototypes",
            self.distance_maps.len()
        );
        Ok(())
    }
}

/// One-hot prototype to class assignment, `[prototypes, classes]` row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassIdentity {
    num_prototypes: usize,
    num_classes: usize,
    data: Vec<f32>,
}

impl ClassIdentity {
    pub fn from_vec(num_prototypes: usize, num_classes: usize, data: Vec<f32>) -> Result<Self> {
        ensure!(
            data.len() == num_prototypes * num_classes,
            "class identity expects {} values, got {}",
            num_prototypes * num_classes,
            data.len()
        );
        Ok(Self {
            num_prototypes,
            num_classes,
            data,
        })
    }

    /// Evenly partitions prototypes over classes: prototype `j` belongs to
    /// class `j / (P / C)`.
    pub fn evenly_partitioned(num_prototypes: usize, num_classes: usize) -> Result<Self> {
        ensure!(num_classes > 0, "num_classes must be > 0");
        ensure!(
            num_prototypes >= num_classes,
            "need at least one prototype per class ({num_prototypes} prototypes, {num_classes} classes)"
        );
        let per_class = num_prototypes / num_classes;
        let mut data = vec![0f32; num_prototypes * num_classes];
        for prototype in 0..num_prototypes {
            let class = (prototype / per_class).min(num_classes - 1);
            data[prototype * num_classes + class] = 1.0;
        }
        Self::from_vec(num_prototypes, num_classes, data)
    }

    pub fn num_prototypes(&self) -> usize {
        self.num_prototypes
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn get(&self, prototype: usize, class: usize) -> f32 {
        self.data[prototype * self.num_classes + class]
    }

    /// Prototypes whose indicator for `class` is non-zero.
    pub fn class_mask(&self, class: usize) -> Vec<bool> {
        (0..self.num_prototypes)
            .map(|prototype| class < self.num_classes && self.get(prototype, class) != 0.0)
            .collect()
    }
}

/// Final linear layer weights, `[classes, prototypes]` row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassWeights {
    num_classes: usize,
    num_prototypes: usize,
    data: Vec<f32>,
}

impl ClassWeights {
    pub fn from_vec(num_classes: usize, num_prototypes: usize, data: Vec<f32>) -> Result<Self> {
        ensure!(
            data.len() == num_classes * num_prototypes,
            "last layer expects {} weights, got {}",
            num_classes * num_prototypes,
            data.len()
        );
        Ok(Self {
            num_classes,
            num_prototypes,
            data,
        })
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    pub fn num_prototypes(&self) -> usize {
        self.num_prototypes
    }

    pub fn get(&self, class: usize, prototype: usize) -> f32 {
        self.data[class * self.num_prototypes + prototype]
    }

    /// Class each prototype connects to most strongly (first maximum wins).
    pub fn strongest_classes(&self) -> Vec<usize> {
        (0..self.num_prototypes)
            .map(|prototype| {
                let mut best = 0usize;
                let mut best_weight = f32::NEG_INFINITY;
                for class in 0..self.num_classes {
                    let weight = self.get(class, prototype);
                    if weight > best_weight {
                        best = class;
                        best_weight = weight;
                    }
                }
                best
            })
            .collect()
    }
}

/// Capabilities the analysis needs from a trained prototype network.
pub trait PrototypeModel {
    /// Side length of the square input the network expects.
    fn img_size(&self) -> usize;

    fn num_prototypes(&self) -> usize;

    fn num_classes(&self) -> usize;

    /// Product of the prototype's channel and spatial extents; the largest
    /// distance a prototype can report.
    fn prototype_volume(&self) -> usize;

    fn activation_mode(&self) -> ActivationMode;

    fn prototype_class_identity(&self) -> &ClassIdentity;

    fn last_layer_weights(&self) -> Result<ClassWeights>;

    fn forward(&self, image: &NormalizedImage) -> Result<ForwardOutput>;
}
