// 该文件是 Fenge （分割） 项目的一部分。
// src/output/directory_record.rs - 目录记录输出
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{
  path::{Path, PathBuf},
  sync::atomic::{AtomicU16, Ordering},
};

use chrono::{Datelike, Utc};
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  output::{
    Render,
    draw::{Draw, DrawError, save_rgba},
  },
  visualize::Visualization,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("绘制错误: {0}")]
  DrawError(#[from] DrawError),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 分割段文本记录，每行一个标注
pub struct Record {
  pub label_with_name: bool,
}

impl Record {
  pub fn format(&self, visualization: &Visualization) -> String {
    let mut records = Vec::with_capacity(visualization.annotations.len());
    for annotation in &visualization.annotations {
      let record = if self.label_with_name {
        format!(
          "{}, {}, {:.1}, {:.1}",
          annotation.segment_id,
          annotation.text.replace('\n', ", "),
          annotation.x,
          annotation.y
        )
      } else {
        format!(
          "{}, {:.1}, {:.1}",
          annotation.segment_id, annotation.x, annotation.y
        )
      };
      records.push(record);
    }
    records.join("\n")
  }

  pub fn record(&self, visualization: &Visualization, path: &Path) -> Result<(), std::io::Error> {
    std::fs::write(path.with_extension("txt"), self.format(visualization))
  }
}

pub struct DirectoryRecordOutput {
  directory: PathBuf,
  draw: Draw,
  record: Option<Record>,
  frame_counter: AtomicU16,
  always: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let record = uri
      .query_pairs()
      .find(|(k, _)| k == "record")
      .map(|(_, v)| Record {
        label_with_name: v != "id",
      });
    let always = uri.query_pairs().any(|(k, _)| k == "always");

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(uri.path()),
      draw: Draw::from_url_query(uri)?,
      record,
      frame_counter: AtomicU16::new(0),
      always,
    })
  }
}

impl DirectoryRecordOutput {
  fn frame_id(&self) -> u16 {
    self.frame_counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1)
  }

  fn frame_path(&self, frame: &Frame) -> Result<PathBuf, std::io::Error> {
    let now = Utc::now();
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    std::fs::create_dir_all(&directory)?;

    Ok(directory.join(format!(
      "{}-{:04X}-{}.png",
      now.format("%H-%M-%S"),
      self.frame_id(),
      frame.name
    )))
  }
}

impl Render<Visualization> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, frame: &Frame, result: &Visualization) -> Result<(), Self::Error> {
    if !self.always && result.annotations.is_empty() {
      debug!("帧 {} 没有分割结果, 跳过保存", frame.name);
      return Ok(());
    }

    let path = self.frame_path(frame)?;
    save_rgba(self.draw.draw_visualization(result), &path)?;
    if let Some(record) = &self.record {
      record.record(result, &path)?;
    }
    debug!("保存帧 {} 到 {}", frame.name, path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::visualize::Annotation;
  use image::{RgbImage, Rgba, RgbaImage};

  fn visualization(annotations: Vec<Annotation>) -> Visualization {
    Visualization {
      image: RgbaImage::from_pixel(2, 2, Rgba([0, 0, 0, 255])),
      annotations,
    }
  }

  #[test]
  fn record_formats() {
    let vis = visualization(vec![Annotation {
      segment_id: 2,
      x: 10.26,
      y: 3.0,
      text: "person\n0.91".to_string(),
    }]);
    let named = Record {
      label_with_name: true,
    };
    assert_eq!(named.format(&vis), "2, person, 0.91, 10.3, 3.0");
    let ids = Record {
      label_with_name: false,
    };
    assert_eq!(ids.format(&vis), "2, 10.3, 3.0");
  }

  #[test]
  fn empty_results_are_skipped_unless_always() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let frame = Frame::new("empty", RgbImage::new(2, 2));

    let url = url::Url::parse(&format!("folder://{}?record=name", dir.path().display()))?;
    DirectoryRecordOutput::from_url(&url)?.render_result(&frame, &visualization(Vec::new()))?;
    assert_eq!(std::fs::read_dir(dir.path())?.count(), 0);

    let url = url::Url::parse(&format!("folder://{}?always", dir.path().display()))?;
    DirectoryRecordOutput::from_url(&url)?.render_result(&frame, &visualization(Vec::new()))?;
    assert_eq!(std::fs::read_dir(dir.path())?.count(), 1);
    Ok(())
  }
}
