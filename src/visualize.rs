// 该文件是 Fenge （分割） 项目的一部分。
// src/visualize.rs - 分割结果叠加与标注
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::collections::HashMap;

use image::{Pixel, Rgb, RgbImage, Rgba, RgbaImage};

use crate::{
  color::color_of,
  label_map::{LabelMap, UNLABELED},
  model::{LabelNames, Segment},
};

/// 颜色层的混合权重
pub const OVERLAY_ALPHA: f32 = 0.6;

const BLACK: Rgb<u8> = Rgb([0, 0, 0]);

/// 标注文字，坐标为分割段质心
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
  pub segment_id: u32,
  pub x: f32,
  pub y: f32,
  pub text: String,
}

/// 渲染输入：叠加后的 RGBA 图像与文字标注
#[derive(Debug, Clone)]
pub struct Visualization {
  pub image: RgbaImage,
  pub annotations: Vec<Annotation>,
}

/// 一次推理在原图分辨率下的完整结果
#[derive(Debug, Clone)]
pub struct Panoptic {
  pub label_map: LabelMap,
  pub segments: Vec<Segment>,
}

impl Panoptic {
  pub fn is_empty(&self) -> bool {
    self.segments.is_empty()
  }
}

/// 按分割段 id 上色，未标注像素为黑色
pub fn colorize(label_map: &LabelMap, segments: &[Segment]) -> RgbImage {
  let colors: HashMap<u32, Rgb<u8>> = segments
    .iter()
    .map(|segment| (segment.id, color_of(segment.id)))
    .collect();
  RgbImage::from_fn(label_map.width(), label_map.height(), |x, y| {
    colors
      .get(&label_map.get(x, y))
      .copied()
      .unwrap_or(BLACK)
  })
}

/// `color` 以不透明度 `alpha` 叠加到不透明的 `source` 上
fn blend(source: &Rgb<u8>, color: &Rgb<u8>, alpha: f32) -> Rgba<u8> {
  let [r, g, b] = color.0;
  let mut pixel = source.to_rgba();
  pixel.blend(&Rgba([r, g, b, (alpha * 255.0).round() as u8]));
  pixel
}

fn annotation_text(segment: &Segment, labels: &LabelNames) -> String {
  let name = labels.name_of(segment.label_id);
  match segment.score {
    Some(score) => format!("{}\n{:.2}", name, score),
    None => name,
  }
}

pub struct Visualizer {
  labels: LabelNames,
  alpha: f32,
}

impl Default for Visualizer {
  fn default() -> Self {
    Self::new(LabelNames::default())
  }
}

impl Visualizer {
  pub fn new(labels: LabelNames) -> Self {
    Self {
      labels,
      alpha: OVERLAY_ALPHA,
    }
  }

  pub fn with_alpha(mut self, alpha: f32) -> Self {
    self.alpha = alpha.clamp(0.0, 1.0);
    self
  }

  /// 将分割结果叠加到原图上，并为每个非空分割段生成一条标注
  pub fn visualize(&self, source: &RgbImage, result: &Panoptic) -> Visualization {
    let colors = colorize(&result.label_map, &result.segments);
    let image = RgbaImage::from_fn(source.width(), source.height(), |x, y| {
      if x < colors.width() && y < colors.height() {
        blend(source.get_pixel(x, y), colors.get_pixel(x, y), self.alpha)
      } else {
        blend(source.get_pixel(x, y), &BLACK, self.alpha)
      }
    });

    let regions = result.label_map.regions();
    let annotations = result
      .segments
      .iter()
      .filter(|segment| segment.id != UNLABELED)
      .filter_map(|segment| {
        let (x, y) = regions.get(&segment.id)?.centroid;
        Some(Annotation {
          segment_id: segment.id,
          x,
          y,
          text: annotation_text(segment, &self.labels),
        })
      })
      .collect();

    Visualization { image, annotations }
  }
}
