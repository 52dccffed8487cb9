// 该文件是 Fenge （分割） 项目的一部分。
// src/model/recorded.rs - 离线记录的模型输出
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  letterbox::{LetterboxInfo, LetterboxedFrame},
  model::{DecodeError, Model, RawModelOutput},
};

const CLASS_LOGITS_PREFIX: &str = "class_queries_logits";
const MASK_LOGITS_PREFIX: &str = "masks_queries_logits";
const METADATA_PREFIX: &str = "metadata";
const F32_BYTES: usize = 4;

#[derive(Error, Debug)]
pub enum RecordedLogitsError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0} ({1})")]
  IoError(PathBuf, std::io::Error),
  #[error("元数据解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("数据长度错误: {0}")]
  LengthMismatch(String),
  #[error("模型输出无效: {0}")]
  InvalidOutput(#[from] DecodeError),
}

/// 设备端记录的填充信息
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PadInfo {
  pub paste_x: u32,
  pub paste_y: u32,
  pub new_w: u32,
  pub new_h: u32,
  pub original_w: u32,
  pub original_h: u32,
}

impl PadInfo {
  pub fn from_frame(frame: &LetterboxedFrame) -> Self {
    Self {
      paste_x: frame.info.paste_x,
      paste_y: frame.info.paste_y,
      new_w: frame.info.scaled_width,
      new_h: frame.info.scaled_height,
      original_w: frame.source_size.0,
      original_h: frame.source_size.1,
    }
  }

  pub fn matches(&self, info: &LetterboxInfo, source_size: (u32, u32)) -> bool {
    self.paste_x == info.paste_x
      && self.paste_y == info.paste_y
      && self.new_w == info.scaled_width
      && self.new_h == info.scaled_height
      && (self.original_w, self.original_h) == source_size
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Metadata {
  class_logits_shape: Vec<usize>,
  mask_logits_shape: Vec<usize>,
  pad_info: PadInfo,
}

fn tensor_path(directory: &Path, prefix: &str, name: &str) -> PathBuf {
  directory.join(format!("{}_{}.bin", prefix, name))
}

fn metadata_path(directory: &Path, name: &str) -> PathBuf {
  directory.join(format!("{}_{}.json", METADATA_PREFIX, name))
}

fn read_f32_file(path: &Path, shape: &[usize]) -> Result<Vec<f32>, RecordedLogitsError> {
  let bytes = std::fs::read(path).map_err(|e| RecordedLogitsError::IoError(path.to_owned(), e))?;
  let expected = shape.iter().product::<usize>() * F32_BYTES;
  if bytes.len() != expected {
    return Err(RecordedLogitsError::LengthMismatch(format!(
      "{} 大小为 {} 字节, 形状 {:?} 需要 {} 字节",
      path.display(),
      bytes.len(),
      shape,
      expected
    )));
  }
  Ok(
    bytes
      .chunks_exact(F32_BYTES)
      .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
      .collect(),
  )
}

fn write_f32_file(path: &Path, data: &[f32]) -> Result<(), RecordedLogitsError> {
  let bytes: Vec<u8> = data.iter().flat_map(|v| v.to_le_bytes()).collect();
  std::fs::write(path, bytes).map_err(|e| RecordedLogitsError::IoError(path.to_owned(), e))
}

/// 从目录回放设备端记录的 logits，按帧名称查找文件
pub struct RecordedLogits {
  directory: PathBuf,
}

impl FromUrlWithScheme for RecordedLogits {
  const SCHEME: &'static str = "logits";
}

impl FromUrl for RecordedLogits {
  type Error = RecordedLogitsError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(RecordedLogitsError::SchemeMismatch(format!(
        "模型路径必须使用 {} 方案, 实际为 {}",
        Self::SCHEME,
        url.scheme()
      )));
    }
    Ok(Self::new(url.path()))
  }
}

impl RecordedLogits {
  pub fn new(directory: impl Into<PathBuf>) -> Self {
    let directory = directory.into();
    info!("从目录回放模型输出: {}", directory.display());
    Self { directory }
  }

  pub fn load(&self, name: &str) -> Result<(RawModelOutput, PadInfo), RecordedLogitsError> {
    let path = metadata_path(&self.directory, name);
    let text =
      std::fs::read_to_string(&path).map_err(|e| RecordedLogitsError::IoError(path.clone(), e))?;
    let metadata: Metadata = serde_json::from_str(&text)?;
    debug!("读取元数据 {}: {:?}", path.display(), metadata);

    let class_logits = read_f32_file(
      &tensor_path(&self.directory, CLASS_LOGITS_PREFIX, name),
      &metadata.class_logits_shape,
    )?;
    let mask_logits = read_f32_file(
      &tensor_path(&self.directory, MASK_LOGITS_PREFIX, name),
      &metadata.mask_logits_shape,
    )?;

    let raw = RawModelOutput::new(
      &metadata.class_logits_shape,
      class_logits,
      &metadata.mask_logits_shape,
      mask_logits,
    )?;
    Ok((raw, metadata.pad_info))
  }
}

impl Model for RecordedLogits {
  type Error = RecordedLogitsError;

  fn infer(&self, frame: &LetterboxedFrame) -> Result<RawModelOutput, Self::Error> {
    let (raw, pad_info) = self.load(&frame.name)?;
    if !pad_info.matches(&frame.info, frame.source_size) {
      // 以本地计算的填充信息为准
      warn!(
        "帧 {} 记录的填充信息 {:?} 与本地计算结果 {:?} 不一致",
        frame.name, pad_info, frame.info
      );
    }
    debug!(
      "帧 {}: 类别 logits {:?}, 掩码 logits {:?}",
      frame.name,
      raw.class_shape(),
      raw.mask_shape()
    );
    Ok(raw)
  }
}

/// 将模型输出与填充信息写入目录，格式与 [`RecordedLogits`] 相同
pub struct LogitsRecorder {
  directory: PathBuf,
}

impl LogitsRecorder {
  pub fn new(directory: impl Into<PathBuf>) -> Result<Self, RecordedLogitsError> {
    let directory = directory.into();
    std::fs::create_dir_all(&directory)
      .map_err(|e| RecordedLogitsError::IoError(directory.clone(), e))?;
    Ok(Self { directory })
  }

  pub fn record(
    &self,
    frame: &LetterboxedFrame,
    raw: &RawModelOutput,
  ) -> Result<(), RecordedLogitsError> {
    let mut class_shape = vec![1];
    class_shape.extend_from_slice(&raw.class_shape());
    let mut mask_shape = vec![1];
    mask_shape.extend_from_slice(&raw.mask_shape());

    write_f32_file(
      &tensor_path(&self.directory, CLASS_LOGITS_PREFIX, &frame.name),
      raw.class_logits(),
    )?;
    write_f32_file(
      &tensor_path(&self.directory, MASK_LOGITS_PREFIX, &frame.name),
      raw.mask_logits(),
    )?;

    let metadata = Metadata {
      class_logits_shape: class_shape,
      mask_logits_shape: mask_shape,
      pad_info: PadInfo::from_frame(frame),
    };
    let path = metadata_path(&self.directory, &frame.name);
    let json = serde_json::to_vec(&metadata)?;
    std::fs::write(&path, json).map_err(|e| RecordedLogitsError::IoError(path.clone(), e))?;
    info!("保存模型输出: {}", path.display());
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{frame::Frame, letterbox::MODEL_INPUT_SIZE};
  use image::RgbImage;

  fn frame(name: &str) -> LetterboxedFrame {
    LetterboxedFrame::from_frame(&Frame::new(name, RgbImage::new(1280, 720)), MODEL_INPUT_SIZE)
      .unwrap()
  }

  #[test]
  fn parses_device_metadata() {
    let text = r#"{"class_logits_shape":[1,200,134],"mask_logits_shape":[1,200,160,160],
      "pad_info":{"pasteX":0,"pasteY":140,"newW":640,"newH":360,"originalW":1280,"originalH":720}}"#;
    let metadata: Metadata = serde_json::from_str(text).unwrap();
    assert_eq!(metadata.mask_logits_shape, vec![1, 200, 160, 160]);
    let frame = frame("a");
    assert!(metadata.pad_info.matches(&frame.info, frame.source_size));
  }

  #[test]
  fn record_then_replay() -> Result<(), RecordedLogitsError> {
    let dir = tempfile::tempdir().map_err(|e| RecordedLogitsError::IoError(PathBuf::new(), e))?;
    let frame = frame("000000015497");
    let raw = RawModelOutput::new(
      &[2, 3],
      vec![0.5, -1.0, 2.0, 0.0, 1.5, -0.25],
      &[2, 2, 2],
      (0..8).map(|v| v as f32 * 0.5).collect(),
    )?;

    LogitsRecorder::new(dir.path())?.record(&frame, &raw)?;
    let model = RecordedLogits::new(dir.path());
    let replayed = model.infer(&frame)?;
    assert_eq!(replayed, raw);
    Ok(())
  }

  #[test]
  fn truncated_tensor_is_rejected() -> Result<(), RecordedLogitsError> {
    let dir = tempfile::tempdir().map_err(|e| RecordedLogitsError::IoError(PathBuf::new(), e))?;
    let frame = frame("short");
    let raw = RawModelOutput::new(&[1, 2], vec![1.0, 2.0], &[1, 1, 1], vec![3.0])?;
    LogitsRecorder::new(dir.path())?.record(&frame, &raw)?;
    std::fs::write(tensor_path(dir.path(), MASK_LOGITS_PREFIX, "short"), [0u8; 3])
      .map_err(|e| RecordedLogitsError::IoError(PathBuf::new(), e))?;

    let result = RecordedLogits::new(dir.path()).infer(&frame);
    assert!(matches!(result, Err(RecordedLogitsError::LengthMismatch(_))));
    Ok(())
  }

  #[test]
  fn scheme_is_checked() {
    let url = Url::parse("image:///tmp/x").unwrap();
    assert!(matches!(
      RecordedLogits::from_url(&url),
      Err(RecordedLogitsError::SchemeMismatch(_))
    ));
  }
}
