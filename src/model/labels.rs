// 该文件是 Fenge （分割） 项目的一部分。
// src/model/labels.rs - 类别名称表
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::{collections::HashMap, path::Path};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum LabelNamesError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("配置解析错误: {0}")]
  JsonError(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct ModelConfig {
  #[serde(default)]
  id2label: HashMap<String, String>,
}

/// 类别 id 到名称的映射，未知 id 显示为数字
#[derive(Debug, Clone, Default)]
pub struct LabelNames {
  names: HashMap<u32, String>,
}

impl LabelNames {
  /// 从模型 `config.json` 的 `id2label` 字段读取
  pub fn from_config_json(text: &str) -> Result<Self, LabelNamesError> {
    let config: ModelConfig = serde_json::from_str(text)?;
    let mut names = HashMap::with_capacity(config.id2label.len());
    for (key, name) in config.id2label {
      match key.parse::<u32>() {
        Ok(id) => {
          names.insert(id, name);
        }
        Err(_) => warn!("忽略无法解析的类别 id: {}", key),
      }
    }
    debug!("读取 {} 个类别名称", names.len());
    Ok(Self { names })
  }

  pub fn load(path: impl AsRef<Path>) -> Result<Self, LabelNamesError> {
    let text = std::fs::read_to_string(path)?;
    Self::from_config_json(&text)
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn name_of(&self, label_id: u32) -> String {
    self
      .names
      .get(&label_id)
      .cloned()
      .unwrap_or_else(|| label_id.to_string())
  }
}

impl FromIterator<(u32, String)> for LabelNames {
  fn from_iter<I: IntoIterator<Item = (u32, String)>>(iter: I) -> Self {
    Self {
      names: iter.into_iter().collect(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_id2label() -> Result<(), LabelNamesError> {
    let labels = LabelNames::from_config_json(
      r#"{"model_type": "eomt", "id2label": {"0": "person", "1": "bicycle", "x": "bad"}}"#,
    )?;
    assert_eq!(labels.len(), 2);
    assert_eq!(labels.name_of(0), "person");
    assert_eq!(labels.name_of(1), "bicycle");
    assert_eq!(labels.name_of(57), "57");
    Ok(())
  }

  #[test]
  fn missing_table_falls_back_to_ids() -> Result<(), LabelNamesError> {
    let labels = LabelNames::from_config_json("{}")?;
    assert!(labels.is_empty());
    assert_eq!(labels.name_of(3), "3");
    Ok(())
  }
}
