use std::fs;

use ndarray::{Array2, array};
use ndarray_npy::write_npy;
use ppnet_align_analysis::{AnalysisError, MetadataError, PrototypeMetadata, PrototypeStore};
use ppnet_align_core::BoundingBox;
use tempfile::tempdir;

#[test]
fn reads_int64_metadata() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bb.npy");
    let values: Array2<i64> = array![[4, 0, 112, 16, 128, 0], [9, 32, 96, 0, 64, 1]];
    write_npy(&path, &values).unwrap();

    let metadata = PrototypeMetadata::load(&path).unwrap();
    assert_eq!(metadata.len(), 2);
    let record = metadata.get(1).unwrap();
    assert_eq!(record.source_image, 9);
    assert_eq!(record.bbox, BoundingBox::new(32, 96, 0, 64));
    assert_eq!(record.class, 1);
}

#[test]
fn reads_int32_and_float_metadata() {
    let dir = tempdir().unwrap();
    let int_path = dir.path().join("int.npy");
    let values: Array2<i32> = array![[0, 1, 2, 3, 4, 5]];
    write_npy(&int_path, &values).unwrap();
    assert_eq!(PrototypeMetadata::load(&int_path).unwrap().classes(), vec![5]);

    let float_path = dir.path().join("float.npy");
    let values: Array2<f64> = array![[0.0, 1.0, 2.0, 3.0, 4.0, 2.0]];
    write_npy(&float_path, &values).unwrap();
    assert_eq!(PrototypeMetadata::load(&float_path).unwrap().classes(), vec![2]);
}

#[test]
fn missing_file_is_a_read_error() {
    let dir = tempdir().unwrap();
    assert!(matches!(
        PrototypeMetadata::load(&dir.path().join("bb.npy")),
        Err(MetadataError::Read { .. })
    ));
}

#[test]
fn store_requires_image_directory() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("img");
    assert!(matches!(
        PrototypeStore::open(&missing, 10),
        Err(AnalysisError::MissingPrototypeDir(path)) if path == missing
    ));

    fs::create_dir_all(&missing).unwrap();
    let store = PrototypeStore::open(&missing, 10).unwrap();
    assert_eq!(store.metadata_path(), missing.join("epoch-10").join("bb.npy"));
    assert_eq!(
        store.self_activation_path(3),
        missing
            .join("epoch-10")
            .join("prototype-img-original_with_self_act3.png")
    );
}
