// 该文件是 Fenge （分割） 项目的一部分。
// src/letterbox.rs - 等比缩放加黑边填充及其逆变换
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

use image::{Rgb, RgbImage, imageops::FilterType};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::{frame::Frame, label_map::LabelMap};

/// 模型输入画布尺寸
pub const MODEL_INPUT_SIZE: (u32, u32) = (640, 640);

const BACKGROUND: Rgb<u8> = Rgb([0, 0, 0]);

#[derive(Error, Debug, PartialEq)]
pub enum LetterboxError {
  #[error("几何参数无效: {0}")]
  InvalidGeometry(String),
}

fn invalid(msg: String) -> LetterboxError {
  LetterboxError::InvalidGeometry(msg)
}

/// 一次正向变换的填充信息，逆变换必须使用同一张图像的这份信息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LetterboxInfo {
  pub target_width: u32,
  pub target_height: u32,
  pub paste_x: u32,
  pub paste_y: u32,
  pub scaled_width: u32,
  pub scaled_height: u32,
}

impl LetterboxInfo {
  /// 由原图尺寸计算填充信息
  pub fn compute(source: (u32, u32), target: (u32, u32)) -> Result<Self, LetterboxError> {
    let (orig_w, orig_h) = source;
    let (target_w, target_h) = target;

    if orig_w == 0 || orig_h == 0 {
      return Err(invalid(format!("原图面积为 0: {}x{}", orig_w, orig_h)));
    }
    if target_w == 0 || target_h == 0 {
      return Err(invalid(format!("目标画布面积为 0: {}x{}", target_w, target_h)));
    }

    let ratio = (target_w as f64 / orig_w as f64).min(target_h as f64 / orig_h as f64);
    // 向下取整，保证不超出画布
    let scaled_width = ((orig_w as f64 * ratio).floor() as u32).min(target_w);
    let scaled_height = ((orig_h as f64 * ratio).floor() as u32).min(target_h);

    Ok(Self {
      target_width: target_w,
      target_height: target_h,
      paste_x: (target_w - scaled_width) / 2,
      paste_y: (target_h - scaled_height) / 2,
      scaled_width,
      scaled_height,
    })
  }

  pub fn target_size(&self) -> (u32, u32) {
    (self.target_width, self.target_height)
  }

  pub fn scaled_size(&self) -> (u32, u32) {
    (self.scaled_width, self.scaled_height)
  }

  pub fn validate(&self) -> Result<(), LetterboxError> {
    if self.scaled_width == 0 || self.scaled_height == 0 {
      return Err(invalid(format!(
        "缩放后尺寸为 0: {}x{}",
        self.scaled_width, self.scaled_height
      )));
    }
    if self.paste_x + self.scaled_width > self.target_width
      || self.paste_y + self.scaled_height > self.target_height
    {
      return Err(invalid(format!("粘贴区域超出画布: {:?}", self)));
    }
    Ok(())
  }
}

/// 正向变换：等比缩放（双三次）后居中粘贴到黑色画布
pub fn forward(image: &RgbImage, target: (u32, u32)) -> Result<(RgbImage, LetterboxInfo), LetterboxError> {
  let info = LetterboxInfo::compute(image.dimensions(), target)?;
  let mut canvas = RgbImage::from_pixel(info.target_width, info.target_height, BACKGROUND);

  if info.scaled_width == 0 || info.scaled_height == 0 {
    debug!("原图 {:?} 缩放后尺寸为 0，画布保持空白", image.dimensions());
    return Ok((canvas, info));
  }

  if info.scaled_size() == image.dimensions() {
    image::imageops::replace(&mut canvas, image, info.paste_x as i64, info.paste_y as i64);
  } else {
    let resized = image::imageops::resize(
      image,
      info.scaled_width,
      info.scaled_height,
      FilterType::CatmullRom,
    );
    image::imageops::replace(&mut canvas, &resized, info.paste_x as i64, info.paste_y as i64);
  }

  debug!(
    "letterbox: {:?} -> {:?}, 粘贴位置 ({}, {})",
    image.dimensions(),
    info.scaled_size(),
    info.paste_x,
    info.paste_y
  );

  Ok((canvas, info))
}

/// 逆变换：裁掉填充区域后最近邻缩放回原图尺寸
pub fn inverse(
  label_map: &LabelMap,
  info: &LetterboxInfo,
  original_size: (u32, u32),
) -> Result<LabelMap, LetterboxError> {
  info.validate()?;

  if label_map.dimensions() != info.target_size() {
    return Err(invalid(format!(
      "标签图尺寸 {:?} 与填充信息的画布尺寸 {:?} 不一致",
      label_map.dimensions(),
      info.target_size()
    )));
  }
  let (orig_w, orig_h) = original_size;
  if orig_w == 0 || orig_h == 0 {
    return Err(invalid(format!("原图面积为 0: {}x{}", orig_w, orig_h)));
  }

  let cropped = label_map.crop(
    info.paste_x,
    info.paste_y,
    info.scaled_width,
    info.scaled_height,
  );
  Ok(cropped.resize_nearest(orig_w, orig_h))
}

/// 已完成正向变换的帧：画布与其填充信息绑定在一起，避免逆变换时错配
#[derive(Debug, Clone)]
pub struct LetterboxedFrame {
  pub name: String,
  pub canvas: RgbImage,
  pub info: LetterboxInfo,
  pub source_size: (u32, u32),
}

impl LetterboxedFrame {
  pub fn from_frame(frame: &Frame, target: (u32, u32)) -> Result<Self, LetterboxError> {
    let (canvas, info) = forward(&frame.image, target)?;
    Ok(Self {
      name: frame.name.clone(),
      canvas,
      info,
      source_size: frame.image.dimensions(),
    })
  }

  /// 将画布分辨率的标签图还原到原图分辨率
  pub fn restore(&self, label_map: &LabelMap) -> Result<LabelMap, LetterboxError> {
    inverse(label_map, &self.info, self.source_size)
  }
}
