// 该文件是 Fenge （分割） 项目的一部分。
// src/output/draw.rs - 分割结果标注绘制
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::Path;

use ab_glyph::{FontVec, PxScale};
use image::{DynamicImage, Rgba, RgbaImage};
use imageproc::{
  drawing::{Blend, draw_filled_rect_mut, draw_text_mut, text_size},
  rect::Rect,
};
use thiserror::Error;
use tracing::{debug, warn};
use url::Url;

use crate::visualize::{Annotation, Visualization};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 18.0;
const LABEL_PADDING: i32 = 3;
const LABEL_LINE_SPACING: i32 = 2;
const LABEL_BACKGROUND_ALPHA: f32 = 0.6;
const LABEL_TEXT_COLOR: Rgba<u8> = Rgba([255, 255, 255, 255]);

const FONT_QUERY_KEY: &str = "font";
const FONT_SIZE_QUERY_KEY: &str = "font_size";

#[derive(Error, Debug)]
pub enum DrawError {
  #[error("字体文件读取错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体无效: {0}")]
  InvalidFont(String),
  #[error("图像错误: {0}")]
  ImageError(#[from] image::ImageError),
}

pub struct Draw {
  font: Option<FontVec>,
  font_size: f32,
  background_alpha: f32,
  text_color: Rgba<u8>,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      font: None,
      font_size: LABEL_FONT_SIZE,
      background_alpha: LABEL_BACKGROUND_ALPHA,
      text_color: LABEL_TEXT_COLOR,
    }
  }
}

impl Draw {
  pub fn with_font_file(path: impl AsRef<Path>) -> Result<Self, DrawError> {
    let data = std::fs::read(path.as_ref())?;
    let font = FontVec::try_from_vec(data).map_err(|e| DrawError::InvalidFont(e.to_string()))?;
    debug!("加载字体: {}", path.as_ref().display());
    Ok(Self {
      font: Some(font),
      ..Self::default()
    })
  }

  /// 从 URL 的 `font` 查询参数加载字体，未指定时不绘制文字
  pub fn from_url_query(url: &Url) -> Result<Self, DrawError> {
    let draw = match url.query_pairs().find(|(k, _)| k == FONT_QUERY_KEY) {
      Some((_, path)) => Self::with_font_file(path.as_ref())?,
      None => {
        warn!("未指定字体 (?{}=...), 仅输出颜色叠加", FONT_QUERY_KEY);
        Self::default()
      }
    };
    let size = url
      .query_pairs()
      .find(|(k, _)| k == FONT_SIZE_QUERY_KEY)
      .and_then(|(_, v)| v.parse::<f32>().ok());
    Ok(match size {
      Some(size) if size > 0.0 => draw.with_font_size(size),
      _ => draw,
    })
  }

  pub fn with_font_size(mut self, font_size: f32) -> Self {
    self.font_size = font_size;
    self
  }

  /// 在叠加图像上绘制所有标注
  pub fn draw_visualization(&self, visualization: &Visualization) -> RgbaImage {
    let mut image = visualization.image.clone();
    if let Some(font) = &self.font {
      for annotation in &visualization.annotations {
        self.draw_annotation(&mut image, annotation, font);
      }
    }
    image
  }

  // 以 (x, y) 为中心绘制多行文字及半透明黑色背景
  fn draw_annotation(&self, image: &mut RgbaImage, annotation: &Annotation, font: &FontVec) {
    let scale = PxScale::from(self.font_size);
    let lines: Vec<&str> = annotation.text.lines().collect();
    if lines.is_empty() {
      return;
    }

    let sizes: Vec<(u32, u32)> = lines.iter().map(|l| text_size(scale, font, l)).collect();
    let text_width = sizes.iter().map(|s| s.0 as i32).max().unwrap_or(0);
    let line_height = self.font_size.ceil() as i32;
    let text_height =
      line_height * lines.len() as i32 + LABEL_LINE_SPACING * (lines.len() as i32 - 1);

    let box_width = text_width + 2 * LABEL_PADDING;
    let box_height = text_height + 2 * LABEL_PADDING;
    let left = annotation.x.round() as i32 - box_width / 2;
    let top = annotation.y.round() as i32 - box_height / 2;

    shade_box(
      image,
      left,
      top,
      box_width as u32,
      box_height as u32,
      self.background_alpha,
    );

    let mut y = top + LABEL_PADDING;
    for (line, (w, _)) in lines.iter().zip(sizes) {
      let x = annotation.x.round() as i32 - w as i32 / 2;
      draw_text_mut(image, self.text_color, x, y, scale, font, line);
      y += line_height + LABEL_LINE_SPACING;
    }
  }
}

/// 在矩形区域叠加不透明度为 `alpha` 的黑色，超出图像的部分被裁掉
fn shade_box(image: &mut RgbaImage, left: i32, top: i32, width: u32, height: u32, alpha: f32) {
  if width == 0 || height == 0 {
    return;
  }
  let rect = Rect::at(left, top).of_size(width, height);
  let shade = Rgba([0, 0, 0, (alpha.clamp(0.0, 1.0) * 255.0) as u8]);
  let mut canvas = Blend(std::mem::take(image));
  draw_filled_rect_mut(&mut canvas, rect, shade);
  *image = canvas.0;
}

/// 保存 RGBA 图像，不支持透明通道的格式先转换为 RGB
pub fn save_rgba(image: RgbaImage, path: &Path) -> Result<(), DrawError> {
  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)?;
  }

  let extension = path
    .extension()
    .and_then(|e| e.to_str())
    .map(|e| e.to_ascii_lowercase());
  match extension.as_deref() {
    Some("jpg") | Some("jpeg") | Some("bmp") => {
      DynamicImage::ImageRgba8(image).to_rgb8().save(path)?
    }
    _ => image.save(path)?,
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn shade_is_clipped_to_image() {
    let mut image = RgbaImage::from_pixel(4, 4, Rgba([100, 100, 100, 255]));
    shade_box(&mut image, -2, -2, 4, 4, LABEL_BACKGROUND_ALPHA);
    for (x, y) in [(0, 0), (1, 1)] {
      let pixel = image.get_pixel(x, y);
      assert!((38..=41).contains(&pixel[0]), "{:?}", pixel);
      assert_eq!(pixel[0], pixel[2]);
      assert_eq!(pixel[3], 255);
    }
    assert_eq!(*image.get_pixel(2, 2), Rgba([100, 100, 100, 255]));
    assert_eq!(image.dimensions(), (4, 4));
  }

  #[test]
  fn empty_or_outside_box_leaves_image() {
    let mut image = RgbaImage::from_pixel(4, 4, Rgba([100, 100, 100, 255]));
    shade_box(&mut image, 1, 1, 0, 3, LABEL_BACKGROUND_ALPHA);
    shade_box(&mut image, 10, 10, 2, 2, LABEL_BACKGROUND_ALPHA);
    assert!(image.pixels().all(|p| *p == Rgba([100, 100, 100, 255])));
  }

  #[test]
  fn without_font_only_overlay_is_kept() {
    let visualization = Visualization {
      image: RgbaImage::from_pixel(8, 8, Rgba([10, 20, 30, 255])),
      annotations: vec![Annotation {
        segment_id: 1,
        x: 4.0,
        y: 4.0,
        text: "person\n0.99".to_string(),
      }],
    };
    let image = Draw::default().draw_visualization(&visualization);
    assert_eq!(image, visualization.image);
  }

  #[test]
  fn font_size_from_query() -> Result<(), Box<dyn std::error::Error>> {
    let url = Url::parse("image:///tmp/out.png?font_size=24")?;
    assert_eq!(Draw::from_url_query(&url)?.font_size, 24.0);
    let url = Url::parse("image:///tmp/out.png?font_size=-1")?;
    assert_eq!(Draw::from_url_query(&url)?.font_size, LABEL_FONT_SIZE);
    Ok(())
  }

  #[test]
  fn missing_font_file_is_an_error() -> Result<(), url::ParseError> {
    let url = Url::parse("image:///tmp/out.png?font=/nonexistent/font.ttf")?;
    assert!(matches!(Draw::from_url_query(&url), Err(DrawError::IoError(_))));
    Ok(())
  }

  #[test]
  fn jpeg_output_drops_alpha() -> Result<(), DrawError> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("nested").join("out.jpg");
    save_rgba(RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 255])), &path)?;
    assert!(path.exists());
    Ok(())
  }
}
