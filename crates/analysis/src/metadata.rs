use std::path::{Path, PathBuf};

use ndarray::Array2;
use ndarray_npy::{ReadNpyError, read_npy};
use ppnet_align_core::BoundingBox;
use thiserror::Error;

/// Columns of a `bb.npy` row.
pub const METADATA_COLUMNS: usize = 6;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("failed to read prototype metadata {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: ReadNpyError,
    },
    #[error("prototype metadata must have {METADATA_COLUMNS} columns, got shape ({rows}, {cols})")]
    Shape { rows: usize, cols: usize },
    #[error("prototype {row}: column {col} holds {value}, expected a non-negative integer")]
    InvalidValue { row: usize, col: usize, value: f64 },
    #[error("prototype {row}: bounding box {bbox} is empty")]
    EmptyBox { row: usize, bbox: BoundingBox },
}

/// Where a prototype was projected from during the push stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrototypeRecord {
    pub source_image: usize,
    pub bbox: BoundingBox,
    pub class: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrototypeMetadata {
    records: Vec<PrototypeRecord>,
}

impl PrototypeMetadata {
    /// Reads `bb.npy`, accepting `i64`, `i32` or `f64` element types.
    pub fn load(path: &Path) -> Result<Self, MetadataError> {
        let values = match read_npy::<_, Array2<i64>>(path) {
            Ok(array) => array.mapv(|v| v as f64),
            Err(first) => {
                if let Ok(array) = read_npy::<_, Array2<i32>>(path) {
                    array.mapv(f64::from)
                } else if let Ok(array) = read_npy::<_, Array2<f64>>(path) {
                    array
                } else {
                    return Err(MetadataError::Read {
                        path: path.to_path_buf(),
                        source: first,
                    });
                }
            }
        };
        Self::from_array(&values)
    }

    pub fn from_array(values: &Array2<f64>) -> Result<Self, MetadataError> {
        let (rows, cols) = values.dim();
        if cols != METADATA_COLUMNS {
            return Err(MetadataError::Shape { rows, cols });
        }
        let mut records = Vec::with_capacity(rows);
        for (row, line) in values.outer_iter().enumerate() {
            let mut fields = [0usize; METADATA_COLUMNS];
            for (col, (&value, field)) in line.iter().zip(fields.iter_mut()).enumerate() {
                if !(value >= 0.0) || value.fract() != 0.0 {
                    return Err(MetadataError::InvalidValue { row, col, value });
                }
                *field = value as usize;
            }
            let [source_image, h_start, h_end, w_start, w_end, class] = fields;
            let bbox = BoundingBox::new(h_start, h_end, w_start, w_end);
            if bbox.is_empty() {
                return Err(MetadataError::EmptyBox { row, bbox });
            }
            records.push(PrototypeRecord {
                source_image,
                bbox,
                class,
            });
        }
        Ok(Self { records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, prototype: usize) -> Option<&PrototypeRecord> {
        self.records.get(prototype)
    }

    pub fn records(&self) -> &[PrototypeRecord] {
        &self.records
    }

    /// Recorded class per prototype.
    pub fn classes(&self) -> Vec<usize> {
        self.records.iter().map(|record| record.class).collect()
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn parses_rows() {
        let values = array![[3.0, 1.0, 5.0, 2.0, 9.0, 0.0], [7.0, 0.0, 4.0, 0.0, 4.0, 1.0]];
        let metadata = PrototypeMetadata::from_array(&values).unwrap();
        assert_eq!(metadata.len(), 2);
        assert_eq!(metadata.get(0).unwrap().bbox, BoundingBox::new(1, 5, 2, 9));
        assert_eq!(metadata.get(1).unwrap().source_image, 7);
        assert_eq!(metadata.classes(), vec![0, 1]);
    }

    #[test]
    fn rejects_unfilled_rows() {
        let values = array![[-1.0, -1.0, -1.0, -1.0, -1.0, -1.0]];
        assert!(matches!(
            PrototypeMetadata::from_array(&values),
            Err(MetadataError::InvalidValue { row: 0, col: 0, .. })
        ));
    }

    #[test]
    fn rejects_wrong_width() {
        let values = Array2::<f64>::zeros((3, 5));
        assert!(matches!(
            PrototypeMetadata::from_array(&values),
            Err(MetadataError::Shape { rows: 3, cols: 5 })
        ));
    }

    #[test]
    fn rejects_empty_box() {
        let values = array![[0.0, 4.0, 4.0, 0.0, 3.0, 0.0]];
        assert!(matches!(
            PrototypeMetadata::from_array(&values),
            Err(MetadataError::EmptyBox { row: 0, .. })
        ));
    }
}
