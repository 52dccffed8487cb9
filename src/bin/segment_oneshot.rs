// 该文件是 Fenge （分割） 项目的一部分。
// src/bin/segment_oneshot.rs - 单张图像分割
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use url::Url;

use fenge::{
  FromUrl,
  model::{DEFAULT_THRESHOLD, DecodeOptions, LabelNames, RecordedLogits},
  task::{OneShotTask, Pipeline, Task},
  visualize::{OVERLAY_ALPHA, Visualizer},
};
use tracing::info;

/// Fenge 单张图像分割参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型来源，例如 logits:///path/to/dump
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 置信度阈值
  #[arg(long, default_value_t = DEFAULT_THRESHOLD)]
  pub threshold: f32,
  /// 模型 config.json，用于读取类别名称
  #[arg(long, value_name = "CONFIG")]
  pub labels: Option<PathBuf>,
  /// 叠加透明度
  #[arg(long, default_value_t = OVERLAY_ALPHA)]
  pub alpha: f32,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型来源: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let labels = match &args.labels {
    Some(path) => LabelNames::load(path)?,
    None => LabelNames::default(),
  };
  info!("类别数量: {}", labels.len());

  let input = fenge::input::InputWrapper::from_url(&args.input)?;
  let model = RecordedLogits::from_url(&args.model)?;
  let output = fenge::output::OutputWrapper::from_url(&args.output)?;

  let pipeline = Pipeline::new(
    DecodeOptions::default().with_threshold(args.threshold),
    Visualizer::new(labels).with_alpha(args.alpha),
  );
  OneShotTask::new(pipeline).run_task(input, model, output)?;

  Ok(())
}
