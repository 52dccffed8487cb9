// 该文件是 Fenge （分割） 项目的一部分。
// src/input/image_directory.rs - 图像目录输入
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{collections::VecDeque, path::PathBuf};

use tracing::{debug, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  input::{InputError, load_frame},
};

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];

/// 按文件名顺序逐张读取目录中的图像
pub struct ImageDirectoryInput {
  pending: VecDeque<PathBuf>,
}

impl FromUrlWithScheme for ImageDirectoryInput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for ImageDirectoryInput {
  type Error = InputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(InputError::SchemeMismatch(url.scheme().to_string()));
    }
    Self::open(url.path())
  }
}

impl ImageDirectoryInput {
  pub fn open(directory: impl Into<PathBuf>) -> Result<Self, InputError> {
    let directory = directory.into();
    let mut paths = Vec::new();
    for entry in std::fs::read_dir(&directory)? {
      let path = entry?.path();
      let is_image = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false);
      if path.is_file() && is_image {
        paths.push(path);
      } else {
        debug!("跳过非图像文件: {}", path.display());
      }
    }
    paths.sort();
    info!("目录 {} 中共有 {} 张图像", directory.display(), paths.len());

    Ok(Self {
      pending: paths.into(),
    })
  }

  pub fn remaining(&self) -> usize {
    self.pending.len()
  }
}

impl Iterator for ImageDirectoryInput {
  type Item = Result<Frame, InputError>;

  fn next(&mut self) -> Option<Self::Item> {
    let path = self.pending.pop_front()?;
    debug!("读取图像: {}", path.display());
    Some(load_frame(&path))
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use image::RgbImage;

  #[test]
  fn lists_images_in_name_order() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempfile::tempdir()?;
    RgbImage::new(3, 2).save(dir.path().join("b.png"))?;
    RgbImage::new(4, 4).save(dir.path().join("a.PNG"))?;
    std::fs::write(dir.path().join("notes.txt"), "x")?;

    let url = Url::parse(&format!("folder://{}", dir.path().display()))?;
    let mut input = ImageDirectoryInput::from_url(&url)?;
    assert_eq!(input.remaining(), 2);

    let first = input.next().ok_or("缺少第一帧")??;
    assert_eq!(first.name, "a");
    assert_eq!(first.image.dimensions(), (4, 4));
    let second = input.next().ok_or("缺少第二帧")??;
    assert_eq!(second.name, "b");
    assert!(input.next().is_none());
    Ok(())
  }
}
