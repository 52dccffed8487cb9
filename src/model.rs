// 该文件是 Fenge （分割） 项目的一部分。
// src/model.rs - 模型边界定义
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use thiserror::Error;

use crate::letterbox::{LetterboxError, LetterboxedFrame};

/// 模型服务：输入已完成 letterbox 的画布，输出原始 logits
pub trait Model {
  type Error;

  fn infer(&self, frame: &LetterboxedFrame) -> Result<RawModelOutput, Self::Error>;
}

#[derive(Error, Debug, PartialEq)]
pub enum DecodeError {
  #[error("张量形状不匹配: {0}")]
  ShapeMismatch(String),
  #[error(transparent)]
  Geometry(#[from] LetterboxError),
}

/// 去掉前导的单例批维度
fn squeeze_batch(shape: &[usize], rank: usize) -> Option<&[usize]> {
  match shape.len() {
    n if n == rank => Some(shape),
    n if n == rank + 1 && shape[0] == 1 => Some(&shape[1..]),
    _ => None,
  }
}

/// 模型的两路原始输出
///
/// - 类别 logits: (queries, classes)
/// - 掩码 logits: (queries, height, width)
#[derive(Debug, Clone, PartialEq)]
pub struct RawModelOutput {
  num_queries: usize,
  num_classes: usize,
  mask_height: usize,
  mask_width: usize,
  class_logits: Box<[f32]>,
  mask_logits: Box<[f32]>,
}

impl RawModelOutput {
  /// 校验形状并构造，两路张量允许各自带有一个大小为 1 的批维度
  pub fn new(
    class_shape: &[usize],
    class_logits: Vec<f32>,
    mask_shape: &[usize],
    mask_logits: Vec<f32>,
  ) -> Result<Self, DecodeError> {
    let class_dims = squeeze_batch(class_shape, 2).ok_or_else(|| {
      DecodeError::ShapeMismatch(format!("类别 logits 形状应为 (Q, C) 或 (1, Q, C), 实际为 {:?}", class_shape))
    })?;
    let mask_dims = squeeze_batch(mask_shape, 3).ok_or_else(|| {
      DecodeError::ShapeMismatch(format!("掩码 logits 形状应为 (Q, H, W) 或 (1, Q, H, W), 实际为 {:?}", mask_shape))
    })?;

    let (num_queries, num_classes) = (class_dims[0], class_dims[1]);
    let (mask_queries, mask_height, mask_width) = (mask_dims[0], mask_dims[1], mask_dims[2]);

    if num_queries != mask_queries {
      return Err(DecodeError::ShapeMismatch(format!(
        "查询数量不一致: 类别 logits {} 个, 掩码 logits {} 个",
        num_queries, mask_queries
      )));
    }
    if num_classes == 0 || mask_height == 0 || mask_width == 0 {
      return Err(DecodeError::ShapeMismatch(format!(
        "张量维度不能为 0: 类别 {:?}, 掩码 {:?}",
        class_shape, mask_shape
      )));
    }
    if class_logits.len() != num_queries * num_classes {
      return Err(DecodeError::ShapeMismatch(format!(
        "类别 logits 数据长度 {} 与形状 {:?} 不符",
        class_logits.len(),
        class_shape
      )));
    }
    if mask_logits.len() != num_queries * mask_height * mask_width {
      return Err(DecodeError::ShapeMismatch(format!(
        "掩码 logits 数据长度 {} 与形状 {:?} 不符",
        mask_logits.len(),
        mask_shape
      )));
    }

    Ok(Self {
      num_queries,
      num_classes,
      mask_height,
      mask_width,
      class_logits: class_logits.into_boxed_slice(),
      mask_logits: mask_logits.into_boxed_slice(),
    })
  }

  pub fn num_queries(&self) -> usize {
    self.num_queries
  }

  pub fn num_classes(&self) -> usize {
    self.num_classes
  }

  /// 掩码分辨率 (height, width)
  pub fn mask_size(&self) -> (usize, usize) {
    (self.mask_height, self.mask_width)
  }

  pub fn class_shape(&self) -> [usize; 2] {
    [self.num_queries, self.num_classes]
  }

  pub fn mask_shape(&self) -> [usize; 3] {
    [self.num_queries, self.mask_height, self.mask_width]
  }

  pub fn class_logits(&self) -> &[f32] {
    &self.class_logits
  }

  pub fn mask_logits(&self) -> &[f32] {
    &self.mask_logits
  }

  pub fn query_class_logits(&self, query: usize) -> &[f32] {
    let start = query * self.num_classes;
    &self.class_logits[start..start + self.num_classes]
  }

  pub fn query_mask_logits(&self, query: usize) -> &[f32] {
    let plane = self.mask_height * self.mask_width;
    &self.mask_logits[query * plane..(query + 1) * plane]
  }
}

/// 一个分割段，id 在单次解码中唯一且从 1 开始
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
  pub id: u32,
  pub label_id: u32,
  pub score: Option<f32>,
}

mod decoder;
pub use self::decoder::{DEFAULT_THRESHOLD, DecodeOptions, SegmentDecoder};

mod labels;
pub use self::labels::{LabelNames, LabelNamesError};

#[cfg(feature = "recorded_logits")]
mod recorded;
#[cfg(feature = "recorded_logits")]
pub use self::recorded::{LogitsRecorder, PadInfo, RecordedLogits, RecordedLogitsError};
