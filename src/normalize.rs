// 该文件是 Fenge （分割） 项目的一部分。
// src/normalize.rs - 均值/标准差归一化到仿射预处理的转换
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use image::RgbImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::frame::NchwTensor;

const RGB_CHANNELS: usize = 3;
const PIXEL_MAX: f32 = 255.0;

/// ImageNet 均值（RGB 顺序）
pub const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
/// ImageNet 标准差（RGB 顺序）
pub const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];

#[derive(Error, Debug, PartialEq)]
pub enum NormalizeError {
  #[error("归一化参数无效: {0}")]
  InvalidSpec(String),
}

/// 逐通道的均值/标准差归一化参数：`(p / 255 - mean) / std`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalizationSpec {
  pub mean: [f32; 3],
  pub std: [f32; 3],
}

impl Default for NormalizationSpec {
  fn default() -> Self {
    Self {
      mean: IMAGENET_MEAN,
      std: IMAGENET_STD,
    }
  }
}

impl NormalizationSpec {
  pub fn new(mean: [f32; 3], std: [f32; 3]) -> Result<Self, NormalizeError> {
    let spec = Self { mean, std };
    spec.validate()?;
    Ok(spec)
  }

  pub fn validate(&self) -> Result<(), NormalizeError> {
    for (c, std) in self.std.iter().enumerate() {
      if !std.is_finite() || *std <= 0.0 {
        return Err(NormalizeError::InvalidSpec(format!(
          "通道 {} 的标准差必须为正数, 实际为 {}",
          c, std
        )));
      }
    }

    for (c, value) in self.mean.iter().chain(self.std.iter()).enumerate() {
      if !(*value > 0.0 && *value <= 1.0) {
        warn!(
          "归一化参数 {} 超出 (0, 1] 范围: {}",
          c % RGB_CHANNELS,
          value
        );
      }
    }

    Ok(())
  }

  pub fn mean_std(&self) -> f32 {
    self.std.iter().sum::<f32>() / RGB_CHANNELS as f32
  }

  /// 单个像素值的精确归一化结果
  pub fn normalize_value(&self, channel: usize, pixel: u8) -> f32 {
    (pixel as f32 / PIXEL_MAX - self.mean[channel]) / self.std[channel]
  }

  /// 参考实现：对整幅图像做精确的逐通道归一化
  pub fn normalize(&self, image: &RgbImage) -> NchwTensor {
    NchwTensor::from_rgb_with(image, |c, p| self.normalize_value(c, p))
  }

  /// 推导仿射预处理参数
  pub fn to_affine(&self) -> Result<AffineParams, NormalizeError> {
    self.validate()?;

    // 仿射预处理只接受单一的 scale，逐通道差异全部折算到 bias 中
    let scale = 1.0 / (PIXEL_MAX * self.mean_std());
    let bias = [
      -self.mean[0] / self.std[0],
      -self.mean[1] / self.std[1],
      -self.mean[2] / self.std[2],
    ];

    Ok(AffineParams { scale, bias })
  }
}

/// 仿射预处理参数：`p * scale + bias[c]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffineParams {
  scale: f32,
  bias: [f32; 3],
}

impl AffineParams {
  pub fn scale(&self) -> f32 {
    self.scale
  }

  pub fn bias(&self) -> [f32; 3] {
    self.bias
  }

  pub fn apply_value(&self, channel: usize, pixel: u8) -> f32 {
    pixel as f32 * self.scale + self.bias[channel]
  }

  pub fn apply(&self, image: &RgbImage) -> NchwTensor {
    NchwTensor::from_rgb_with(image, |c, p| self.apply_value(c, p))
  }

  /// 各通道相对精确归一化的误差上界（每单位 `p / 255`）
  ///
  /// 当某通道的标准差与平均标准差相等时该通道误差为 0；
  /// 像素值为 255 时误差达到该上界。
  pub fn channel_residuals(spec: &NormalizationSpec) -> [f32; 3] {
    let avg = spec.mean_std();
    let mut residuals = [0.0f32; 3];
    for (c, residual) in residuals.iter_mut().enumerate() {
      let std = spec.std[c];
      *residual = (std - avg).abs() / (std * avg);
    }
    residuals
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use approx::assert_abs_diff_eq;

  #[test]
  fn imagenet_affine_params() -> Result<(), NormalizeError> {
    let params = NormalizationSpec::default().to_affine()?;
    let avg = (0.229 + 0.224 + 0.225) / 3.0;
    assert_abs_diff_eq!(params.scale(), 1.0 / (255.0 * avg), epsilon = 1e-7);
    assert_abs_diff_eq!(params.bias()[0], -0.485 / 0.229, epsilon = 1e-6);
    assert_abs_diff_eq!(params.bias()[1], -0.456 / 0.224, epsilon = 1e-6);
    assert_abs_diff_eq!(params.bias()[2], -0.406 / 0.225, epsilon = 1e-6);
    Ok(())
  }

  #[test]
  fn uniform_std_is_exact() -> Result<(), NormalizeError> {
    let spec = NormalizationSpec::new([0.5, 0.4, 0.3], [0.25, 0.25, 0.25])?;
    let params = spec.to_affine()?;
    for c in 0..3 {
      for p in [0u8, 1, 17, 128, 200, 255] {
        assert_abs_diff_eq!(
          spec.normalize_value(c, p),
          params.apply_value(c, p),
          epsilon = 1e-5
        );
      }
    }
    assert_eq!(AffineParams::channel_residuals(&spec), [0.0, 0.0, 0.0]);
    Ok(())
  }

  #[test]
  fn residual_is_bounded() -> Result<(), NormalizeError> {
    let spec = NormalizationSpec::default();
    let params = spec.to_affine()?;
    let residuals = AffineParams::channel_residuals(&spec);
    for c in 0..3 {
      for p in 0..=255u8 {
        let deviation = p as f32 / 255.0;
        let err = (spec.normalize_value(c, p) - params.apply_value(c, p)).abs();
        assert!(err <= residuals[c] * deviation + 1e-5, "c={c} p={p} err={err}");
      }
    }
    // 第 0 通道的标准差与平均值差异最大
    assert!(residuals[0] > residuals[1]);
    assert!(residuals[0] > residuals[2]);
    Ok(())
  }

  #[test]
  fn rejects_non_positive_std() {
    assert!(matches!(
      NormalizationSpec::new([0.5, 0.5, 0.5], [0.2, 0.0, 0.2]),
      Err(NormalizeError::InvalidSpec(_))
    ));
    let spec = NormalizationSpec {
      mean: [0.5, 0.5, 0.5],
      std: [0.2, 0.2, -0.1],
    };
    assert!(spec.to_affine().is_err());
  }

  #[test]
  fn tensor_forms_agree_for_uniform_std() -> Result<(), NormalizeError> {
    let spec = NormalizationSpec::new([0.485, 0.456, 0.406], [0.226, 0.226, 0.226])?;
    let params = spec.to_affine()?;
    let image = RgbImage::from_fn(4, 3, |x, y| image::Rgb([(x * 60) as u8, (y * 80) as u8, 255]));
    let exact = spec.normalize(&image);
    let affine = params.apply(&image);
    assert!(exact.max_abs_diff(&affine).unwrap_or(f32::MAX) < 1e-5);
    Ok(())
  }
}
