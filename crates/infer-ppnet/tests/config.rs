use std::fs;

use anyhow::Result;
use ppnet_align_core::ActivationMode;
use ppnet_align_infer_ppnet::{AddOnLayersType, PPNetConfig, load_config};
use tempfile::tempdir;

const MINIMAL: &str = r#"{ "prototype_shape": [2000, 128, 1, 1], "num_classes": 200 }"#;

#[test]
fn minimal_config_uses_training_defaults() -> Result<()> {
    let config: PPNetConfig = serde_json::from_str(MINIMAL)?;
    assert_eq!(config.img_size, 224);
    assert_eq!(config.prototype_activation_function, ActivationMode::Log);
    assert_eq!(config.add_on_layers_type, AddOnLayersType::Bottleneck);
    assert_eq!(config.base_architecture, None);
    assert_eq!(config.prototype_volume(), 128);
    assert_eq!(config.num_prototypes(), 2000);
    assert_eq!(config.resolve_base_architecture(Some("vgg19"))?, "vgg19");
    assert!(config.resolve_base_architecture(None).is_err());
    Ok(())
}

#[test]
fn full_config_parses() -> Result<()> {
    let raw = r#"{
        "base_architecture": "vgg16_bn",
        "img_size": 224,
        "prototype_shape": [20, 64, 1, 1],
        "num_classes": 10,
        "prototype_activation_function": "linear",
        "add_on_layers_type": "regular"
    }"#;
    let config: PPNetConfig = serde_json::from_str(raw)?;
    assert_eq!(config.prototype_activation_function, ActivationMode::Linear);
    assert_eq!(config.add_on_layers_type, AddOnLayersType::Regular);
    assert_eq!(config.resolve_base_architecture(Some("vgg19"))?, "vgg16_bn");
    config.validate()?;
    Ok(())
}

#[test]
fn uneven_prototype_split_is_invalid() -> Result<()> {
    let config: PPNetConfig =
        serde_json::from_str(r#"{ "prototype_shape": [7, 8, 1, 1], "num_classes": 2 }"#)?;
    assert!(config.validate().is_err());
    Ok(())
}

#[test]
fn config_is_found_above_checkpoint_directory() -> Result<()> {
    let dir = tempdir()?;
    let run = dir.path().join("vgg19").join("003");
    let checkpoints = run.join("checkpoints");
    fs::create_dir_all(&checkpoints)?;
    let checkpoint = checkpoints.join("10_18push0.7822.pth");
    fs::write(&checkpoint, b"")?;
    fs::write(run.join("ppnet.json"), MINIMAL)?;

    let loaded = load_config(None, &checkpoint)?;
    assert_eq!(loaded.path, run.join("ppnet.json"));
    assert_eq!(loaded.value.num_classes, 200);
    Ok(())
}

#[test]
fn config_beside_checkpoint_is_used_as_fallback() -> Result<()> {
    let dir = tempdir()?;
    let checkpoints = dir.path().join("checkpoints");
    fs::create_dir_all(&checkpoints)?;
    let checkpoint = checkpoints.join("5push.pth");
    fs::write(checkpoints.join("ppnet.json"), MINIMAL)?;

    let loaded = load_config(None, &checkpoint)?;
    assert_eq!(loaded.path, checkpoints.join("ppnet.json"));
    Ok(())
}

#[test]
fn missing_config_is_reported() -> Result<()> {
    let dir = tempdir()?;
    let checkpoint = dir.path().join("checkpoints").join("5push.pth");
    assert!(load_config(None, &checkpoint).is_err());
    assert!(load_config(Some(&dir.path().join("nope.json")), &checkpoint).is_err());
    Ok(())
}
