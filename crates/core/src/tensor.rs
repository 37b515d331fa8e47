use anyhow::{Result, ensure};
use candle_core::{DType, Device, Tensor};

use crate::{map::ActivationMap, preprocess::NormalizedImage};

/// Returns `tensor` cast to `dtype` only when needed.
pub fn to_dtype_if_needed(tensor: &Tensor, dtype: DType) -> Result<Tensor> {
    if tensor.dtype() == dtype {
        Ok(tensor.clone())
    } else {
        Ok(tensor.to_dtype(dtype)?)
    }
}

/// Returns `tensor` moved to `device` only when needed.
pub fn to_device_if_needed(tensor: &Tensor, device: &Device) -> Result<Tensor> {
    if tensor.device().same_device(device) {
        Ok(tensor.clone())
    } else {
        Ok(tensor.to_device(device)?)
    }
}

/// Builds a `[1, 3, size, size]` batch from a normalised image.
pub fn image_to_batch(image: &NormalizedImage, device: &Device, dtype: DType) -> Result<Tensor> {
    let size = image.size();
    let tensor = Tensor::from_slice(image.as_chw(), (1, 3, size, size), device)?;
    to_dtype_if_needed(&tensor, dtype)
}

/// Copies a rank-1 tensor to host `f32` values.
pub fn to_host_vec1(tensor: &Tensor) -> Result<Vec<f32>> {
    ensure!(
        tensor.rank() == 1,
        "expected rank-1 tensor, got shape {:?}",
        tensor.dims()
    );
    let tensor = to_dtype_if_needed(tensor, DType::F32)?;
    let tensor = to_device_if_needed(&tensor, &Device::Cpu)?;
    Ok(tensor.to_vec1::<f32>()?)
}

/// Splits a `[maps, height, width]` tensor into host activation maps.
pub fn to_host_maps(tensor: &Tensor) -> Result<Vec<ActivationMap>> {
    let (count, height, width) = tensor.dims3()?;
    let tensor = to_dtype_if_needed(tensor, DType::F32)?;
    let tensor = to_device_if_needed(&tensor, &Device::Cpu)?;
    let flat = tensor.flatten_all()?.to_vec1::<f32>()?;
    let plane = height * width;
    (0..count)
        .map(|idx| ActivationMap::new(height, width, flat[idx * plane..(idx + 1) * plane].to_vec()))
        .collect()
}
