// 该文件是 Fenge （分割） 项目的一部分。
// src/convert.rs - 模型转换请求
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

use std::{collections::BTreeMap, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::{letterbox::MODEL_INPUT_SIZE, normalize::AffineParams};

pub const INPUT_NAME: &str = "pixel_values";
pub const CLASS_LOGITS_NAME: &str = "class_logits";
pub const MASK_LOGITS_NAME: &str = "mask_logits";
pub const MANIFEST_FILE: &str = "manifest.json";

#[derive(Error, Debug)]
pub enum ConvertError {
  #[error("I/O 错误 {0}: {1}")]
  IoError(PathBuf, std::io::Error),
  #[error("JSON 错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

/// 转换后模型的计算精度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum Precision {
  #[serde(rename = "FP32")]
  Fp32,
  #[serde(rename = "FP16")]
  Fp16,
}

/// 图像输入描述，转换工具在图中插入 `value * scale + bias`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageInput {
  pub name: String,
  pub shape: [usize; 4],
  pub color_layout: String,
  pub scale: f32,
  pub bias: [f32; 3],
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionRequest {
  pub graph: PathBuf,
  pub input: ImageInput,
  pub outputs: Vec<String>,
  pub precision: Precision,
  pub metadata: BTreeMap<String, String>,
}

impl ConversionRequest {
  /// 640×640 RGB 输入，两路 logits 输出，FP32
  pub fn new(graph: impl Into<PathBuf>, params: &AffineParams) -> Self {
    let (width, height) = MODEL_INPUT_SIZE;
    Self {
      graph: graph.into(),
      input: ImageInput {
        name: INPUT_NAME.to_string(),
        shape: [1, 3, height as usize, width as usize],
        color_layout: "RGB".to_string(),
        scale: params.scale(),
        bias: params.bias(),
      },
      outputs: vec![CLASS_LOGITS_NAME.to_string(), MASK_LOGITS_NAME.to_string()],
      precision: Precision::Fp32,
      metadata: BTreeMap::new(),
    }
  }

  pub fn with_precision(mut self, precision: Precision) -> Self {
    self.precision = precision;
    self
  }

  pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
    self.metadata.insert(key.into(), value.into());
    self
  }
}

/// 转换服务
pub trait Converter {
  type Error;

  /// 返回生成的模型包路径
  fn convert(&self, request: &ConversionRequest) -> Result<PathBuf, Self::Error>;
}

/// 将转换请求写为模型包目录中的 JSON 清单，交给外部工具链处理
pub struct ManifestConverter {
  package: PathBuf,
}

impl ManifestConverter {
  pub fn new(package: impl Into<PathBuf>) -> Self {
    Self {
      package: package.into(),
    }
  }
}

impl Converter for ManifestConverter {
  type Error = ConvertError;

  fn convert(&self, request: &ConversionRequest) -> Result<PathBuf, Self::Error> {
    std::fs::create_dir_all(&self.package)
      .map_err(|e| ConvertError::IoError(self.package.clone(), e))?;
    let path = self.package.join(MANIFEST_FILE);
    let json = serde_json::to_string_pretty(request)?;
    std::fs::write(&path, json).map_err(|e| ConvertError::IoError(path.clone(), e))?;
    info!("写入转换清单: {}", path.display());
    Ok(self.package.clone())
  }
}
