// 该文件是 Fenge （分割） 项目的一部分。
// src/bin/convert.rs - 生成模型转换清单
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

use fenge::{
  convert::{ConversionRequest, Converter, ManifestConverter, Precision},
  input::load_frame,
  letterbox::{MODEL_INPUT_SIZE, forward},
  normalize::{AffineParams, IMAGENET_MEAN, IMAGENET_STD, NormalizationSpec},
};
use tracing::{info, warn};

/// Fenge 模型转换参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 各通道均值 (R,G,B)
  #[arg(long, value_delimiter = ',', default_values_t = IMAGENET_MEAN)]
  pub mean: Vec<f32>,
  /// 各通道标准差 (R,G,B)
  #[arg(long, value_delimiter = ',', default_values_t = IMAGENET_STD)]
  pub std: Vec<f32>,
  /// 已导出的计算图路径
  #[arg(long, value_name = "GRAPH")]
  pub graph: PathBuf,
  /// 模型包输出目录
  #[arg(long, value_name = "OUTPUT")]
  pub output: PathBuf,
  /// 转换后模型的计算精度
  #[arg(long, value_enum, default_value_t = Precision::Fp32)]
  pub precision: Precision,
  /// 用于测量仿射近似误差的样例图像
  #[arg(long, value_name = "IMAGE")]
  pub sample: Option<PathBuf>,
}

fn channels(values: &[f32], what: &str) -> Result<[f32; 3]> {
  values
    .try_into()
    .map_err(|_| anyhow::anyhow!("{} 需要 3 个通道值, 实际为 {}", what, values.len()))
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  let spec = NormalizationSpec::new(channels(&args.mean, "mean")?, channels(&args.std, "std")?)?;
  let params = spec.to_affine()?;
  info!("scale: {}", params.scale());
  info!("bias: {:?}", params.bias());

  let residuals = AffineParams::channel_residuals(&spec);
  info!("各通道残差上界 (每单位 p/255): {:?}", residuals);

  if let Some(sample) = &args.sample {
    let frame = load_frame(sample)?;
    let (canvas, _) = forward(&frame.image, MODEL_INPUT_SIZE)?;
    let exact = spec.normalize(&canvas);
    let affine = params.apply(&canvas);
    match exact.max_abs_diff(&affine) {
      Some(diff) => info!("样例 {} 的最大绝对误差: {}", frame.name, diff),
      None => warn!("样例 {} 的张量形状不一致", frame.name),
    }
  }

  let request = ConversionRequest::new(&args.graph, &params)
    .with_precision(args.precision)
    .with_metadata("mean", format!("{:?}", spec.mean))
    .with_metadata("std", format!("{:?}", spec.std));
  let package = ManifestConverter::new(&args.output).convert(&request)?;
  info!("模型包: {}", package.display());

  Ok(())
}
