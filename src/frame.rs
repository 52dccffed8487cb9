// 该文件是 Fenge （分割） 项目的一部分。
// src/frame.rs - 输入帧与 NCHW 张量定义
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

const RGB_CHANNELS: usize = 3;

/// 一帧原始输入图像
#[derive(Debug, Clone)]
pub struct Frame {
  /// 帧名称（通常为文件名，不含扩展名）
  pub name: String,
  pub image: RgbImage,
}

impl Frame {
  pub fn new(name: impl Into<String>, image: RgbImage) -> Self {
    Self {
      name: name.into(),
      image,
    }
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }
}

/// 批大小为 1 的 RGB 浮点张量，形状为 (1, 3, H, W)
#[derive(Debug, Clone, PartialEq)]
pub struct NchwTensor {
  width: usize,
  height: usize,
  data: Box<[f32]>,
}

impl NchwTensor {
  pub fn with_shape(height: usize, width: usize) -> Self {
    let data = vec![0.0f32; RGB_CHANNELS * height * width].into_boxed_slice();
    Self {
      width,
      height,
      data,
    }
  }

  /// 逐像素逐通道地按 `f(channel, value)` 转换 RGB 图像
  pub fn from_rgb_with<F>(image: &RgbImage, f: F) -> Self
  where
    F: Fn(usize, u8) -> f32,
  {
    let (width, height) = image.dimensions();
    let mut tensor = Self::with_shape(height as usize, width as usize);
    let plane = tensor.plane_size();

    for (x, y, pixel) in image.enumerate_pixels() {
      let idx = (y as usize) * (width as usize) + (x as usize);
      for c in 0..RGB_CHANNELS {
        tensor.data[c * plane + idx] = f(c, pixel[c]);
      }
    }
    tensor
  }

  pub fn shape(&self) -> [usize; 4] {
    [1, RGB_CHANNELS, self.height, self.width]
  }

  pub fn height(&self) -> usize {
    self.height
  }

  pub fn width(&self) -> usize {
    self.width
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }

  fn plane_size(&self) -> usize {
    self.width * self.height
  }

  pub fn get(&self, channel: usize, y: usize, x: usize) -> f32 {
    self.data[channel * self.plane_size() + y * self.width + x]
  }

  /// 形状不同时返回 `None`
  pub fn max_abs_diff(&self, other: &NchwTensor) -> Option<f32> {
    if self.shape() != other.shape() {
      return None;
    }
    Some(
      self
        .data
        .iter()
        .zip(other.data.iter())
        .map(|(a, b)| (a - b).abs())
        .fold(0.0f32, f32::max),
    )
  }
}

impl AsRef<[f32]> for NchwTensor {
  fn as_ref(&self) -> &[f32] {
    &self.data
  }
}
