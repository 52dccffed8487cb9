// 该文件是 Fenge （分割） 项目的一部分。
// src/model/decoder.rs - 全景分割输出解码
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use tracing::debug;

use crate::{
  label_map::{LabelMap, UNLABELED},
  letterbox::{self, LetterboxInfo},
  model::{DecodeError, RawModelOutput, Segment},
};

/// 默认置信度阈值
pub const DEFAULT_THRESHOLD: f32 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecodeOptions {
  /// 置信度阈值 (0.0 - 1.0)，低于该值的查询被丢弃
  pub threshold: f32,
  /// 最后一个类别是否为“无目标”类别
  pub has_null_class: bool,
}

impl Default for DecodeOptions {
  fn default() -> Self {
    Self {
      threshold: DEFAULT_THRESHOLD,
      has_null_class: true,
    }
  }
}

impl DecodeOptions {
  pub fn with_threshold(mut self, threshold: f32) -> Self {
    self.threshold = threshold;
    self
  }

  pub fn with_null_class(mut self, has_null_class: bool) -> Self {
    self.has_null_class = has_null_class;
    self
  }
}

/// 保留下来的查询
struct Survivor<'a> {
  id: u32,
  mask: &'a [f32],
}

/// 全景分割解码器
#[derive(Debug, Clone, Copy)]
pub struct SegmentDecoder {
  options: DecodeOptions,
  /// 输出标签图（即模型输入画布）的尺寸 (width, height)
  canvas_size: (u32, u32),
}

impl SegmentDecoder {
  pub fn new(options: DecodeOptions, canvas_size: (u32, u32)) -> Self {
    Self {
      options,
      canvas_size,
    }
  }

  pub fn options(&self) -> &DecodeOptions {
    &self.options
  }

  /// 解码为画布分辨率的标签图与分割段列表
  ///
  /// 没有查询通过阈值时返回全 0 标签图与空列表。
  pub fn decode(&self, raw: &RawModelOutput) -> (LabelMap, Vec<Segment>) {
    let mut segments = Vec::new();
    let mut survivors = Vec::new();

    for query in 0..raw.num_queries() {
      let Some((label_id, score)) = self.classify(raw.query_class_logits(query)) else {
        continue;
      };
      if score.is_nan() || score < self.options.threshold {
        continue;
      }

      let id = segments.len() as u32 + 1;
      segments.push(Segment {
        id,
        label_id,
        score: Some(score),
      });
      survivors.push(Survivor {
        id,
        mask: raw.query_mask_logits(query),
      });
    }

    debug!(
      "{} 个查询中保留 {} 个 (阈值 {})",
      raw.num_queries(),
      segments.len(),
      self.options.threshold
    );

    let (width, height) = self.canvas_size;
    if survivors.is_empty() {
      return (LabelMap::new(width, height), segments);
    }

    let sampler = MaskSampler::new(raw.mask_size(), self.canvas_size);
    let label_map = LabelMap::from_fn(width, height, |x, y| {
      let mut best = UNLABELED;
      let mut best_logit = 0.0f32;
      for survivor in &survivors {
        let logit = sampler.sample(survivor.mask, x, y);
        // 只有正的掩码 logit（sigmoid >= 0.5）才能占据像素
        if logit > best_logit {
          best_logit = logit;
          best = survivor.id;
        }
      }
      best
    });

    (label_map, segments)
  }

  /// 解码并还原到原图分辨率，`info` 必须来自同一张图像的正向变换
  pub fn decode_to_source(
    &self,
    raw: &RawModelOutput,
    info: &LetterboxInfo,
    original_size: (u32, u32),
  ) -> Result<(LabelMap, Vec<Segment>), DecodeError> {
    let (canvas_map, segments) = self.decode(raw);
    let restored = letterbox::inverse(&canvas_map, info, original_size)?;
    Ok((restored, segments))
  }

  /// 返回 (类别, 置信度)，最佳类别为“无目标”时返回 `None`
  fn classify(&self, logits: &[f32]) -> Option<(u32, f32)> {
    let (label_id, score) = softmax_max(logits)?;
    if self.options.has_null_class && label_id + 1 == logits.len() {
      return None;
    }
    Some((label_id as u32, score))
  }
}

/// softmax 后的最大概率及其下标，NaN 不参与计算
///
/// 存在 `+inf` 时概率在所有 `+inf` 之间平分；全部为 `-inf` 或 NaN 时返回 `None`。
fn softmax_max(logits: &[f32]) -> Option<(usize, f32)> {
  let (arg, max) = logits
    .iter()
    .copied()
    .enumerate()
    .filter(|(_, v)| !v.is_nan())
    .max_by(|a, b| a.1.total_cmp(&b.1))?;
  if max == f32::NEG_INFINITY {
    return None;
  }
  if max == f32::INFINITY {
    let ties = logits.iter().filter(|&&v| v == f32::INFINITY).count();
    return Some((arg, 1.0 / ties as f32));
  }
  let denom: f32 = logits
    .iter()
    .filter(|v| !v.is_nan())
    .map(|v| (v - max).exp())
    .sum();
  Some((arg, 1.0 / denom))
}

/// 以画布坐标读取掩码 logits，分辨率不同时做双线性采样（像素中心对齐）
struct MaskSampler {
  mask_width: usize,
  identity: bool,
  xs: Vec<(usize, usize, f32)>,
  ys: Vec<(usize, usize, f32)>,
}

impl MaskSampler {
  fn new(mask_size: (usize, usize), canvas_size: (u32, u32)) -> Self {
    let (mask_height, mask_width) = mask_size;
    let (canvas_width, canvas_height) = canvas_size;
    let identity = mask_width == canvas_width as usize && mask_height == canvas_height as usize;
    let (xs, ys) = if identity {
      (Vec::new(), Vec::new())
    } else {
      (
        linear_taps(mask_width, canvas_width as usize),
        linear_taps(mask_height, canvas_height as usize),
      )
    };
    Self {
      mask_width,
      identity,
      xs,
      ys,
    }
  }

  fn sample(&self, mask: &[f32], x: u32, y: u32) -> f32 {
    if self.identity {
      return mask[y as usize * self.mask_width + x as usize];
    }
    let (x0, x1, fx) = self.xs[x as usize];
    let (y0, y1, fy) = self.ys[y as usize];
    let row0 = y0 * self.mask_width;
    let row1 = y1 * self.mask_width;
    let top = mask[row0 + x0] * (1.0 - fx) + mask[row0 + x1] * fx;
    let bottom = mask[row1 + x0] * (1.0 - fx) + mask[row1 + x1] * fx;
    top * (1.0 - fy) + bottom * fy
  }
}

fn linear_taps(src_len: usize, dst_len: usize) -> Vec<(usize, usize, f32)> {
  let scale = src_len as f32 / dst_len as f32;
  let last = src_len - 1;
  (0..dst_len)
    .map(|d| {
      let pos = ((d as f32 + 0.5) * scale - 0.5).max(0.0);
      let i0 = (pos.floor() as usize).min(last);
      let i1 = (i0 + 1).min(last);
      (i0, i1, pos - i0 as f32)
    })
    .collect()
}
