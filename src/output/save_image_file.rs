// 该文件是 Fenge （分割） 项目的一部分。
// src/output/save_image_file.rs - 保存图像文件
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

use std::path::PathBuf;

use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  output::{
    Render,
    draw::{Draw, DrawError, save_rgba},
  },
  visualize::Visualization,
};

pub struct SaveImageFileOutput {
  path: PathBuf,
  draw: Draw,
}

#[derive(Error, Debug)]
pub enum SaveImageFileError {
  #[error("绘制错误: {0}")]
  DrawError(#[from] DrawError),
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
}

impl FromUrlWithScheme for SaveImageFileOutput {
  const SCHEME: &'static str = "image";
}

impl FromUrl for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn from_url(uri: &Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(SaveImageFileError::SchemeMismatch(format!(
        "期望保存方式 '{}', 实际保存方式 '{}'",
        Self::SCHEME,
        uri.scheme()
      )));
    }

    Ok(SaveImageFileOutput {
      path: PathBuf::from(uri.path()),
      draw: Draw::from_url_query(uri)?,
    })
  }
}

impl SaveImageFileOutput {
  pub fn new(path: impl Into<PathBuf>, draw: Draw) -> Self {
    Self {
      path: path.into(),
      draw,
    }
  }
}

impl Render<Visualization> for SaveImageFileOutput {
  type Error = SaveImageFileError;

  fn render_result(&self, frame: &Frame, result: &Visualization) -> Result<(), Self::Error> {
    let image = self.draw.draw_visualization(result);
    save_rgba(image, &self.path)?;
    info!(
      "帧 {} 的分割结果 ({} 个标注) 已保存到文件: {}",
      frame.name,
      result.annotations.len(),
      self.path.display()
    );
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::{RgbImage, Rgba, RgbaImage};

  #[test]
  fn renders_to_path() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    let path = dir.path().join("out.png");
    let url = Url::parse(&format!("image://{}", path.display()))?;
    let output = SaveImageFileOutput::from_url(&url)?;

    let frame = Frame::new("sample", RgbImage::new(3, 2));
    let visualization = Visualization {
      image: RgbaImage::from_pixel(3, 2, Rgba([9, 8, 7, 255])),
      annotations: Vec::new(),
    };
    output.render_result(&frame, &visualization)?;

    let saved = image::open(&path)?.to_rgba8();
    assert_eq!(saved, visualization.image);
    Ok(())
  }

  #[test]
  fn rejects_other_schemes() -> Result<(), url::ParseError> {
    let url = Url::parse("folder:///tmp/out")?;
    assert!(matches!(
      SaveImageFileOutput::from_url(&url),
      Err(SaveImageFileError::SchemeMismatch(_))
    ));
    Ok(())
  }
}
