// 该文件是 Fenge （分割） 项目的一部分。
// tests/pipeline.rs - 端到端流程测试
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

#![cfg(all(feature = "recorded_logits", feature = "save_image_file"))]

use std::error::Error;

use fenge::{
  FromUrl,
  input::InputWrapper,
  label_map::UNLABELED,
  model::{LogitsRecorder, Model, RawModelOutput, RecordedLogits},
  output::OutputWrapper,
  task::{EvaluationTask, Pipeline, Task},
};
use image::{Rgb, RgbImage};
use url::Url;

const CANVAS: usize = 640;

/// 两个查询：第一个覆盖画布 y ∈ [140, 320)，第二个预测为“无目标”
fn street_logits() -> Result<RawModelOutput, Box<dyn Error>> {
  let mut mask = vec![-4.0f32; 2 * CANVAS * CANVAS];
  for y in 140..320 {
    for x in 0..CANVAS {
      mask[y * CANVAS + x] = 4.0;
    }
  }
  for v in &mut mask[CANVAS * CANVAS..] {
    *v = 9.0;
  }
  Ok(RawModelOutput::new(
    &[1, 2, 3],
    vec![8.0, 0.0, 0.0, 0.0, 0.0, 8.0],
    &[1, 2, CANVAS, CANVAS],
    mask,
  )?)
}

#[test]
fn recorded_logits_round_trip_to_source_resolution() -> Result<(), Box<dyn Error>> {
  let dir = tempfile::tempdir()?;
  let image_path = dir.path().join("street.png");
  RgbImage::from_pixel(1280, 720, Rgb([220, 40, 40])).save(&image_path)?;

  let mut input = InputWrapper::from_url(&Url::parse(&format!("image://{}", image_path.display()))?)?;
  let frame = input.next().ok_or("缺少输入帧")??;
  assert_eq!(frame.name, "street");

  let pipeline = Pipeline::default();
  let letterboxed = pipeline.preprocess(&frame)?;
  assert_eq!(letterboxed.info.scaled_size(), (640, 360));
  assert_eq!((letterboxed.info.paste_x, letterboxed.info.paste_y), (0, 140));

  let logits_dir = dir.path().join("logits");
  LogitsRecorder::new(&logits_dir)?.record(&letterboxed, &street_logits()?)?;

  let model = RecordedLogits::from_url(&Url::parse(&format!("logits://{}", logits_dir.display()))?)?;
  let raw = model.infer(&letterboxed)?;
  assert_eq!(raw, street_logits()?);

  let result = pipeline.decode(&letterboxed, &raw)?;
  assert_eq!(result.label_map.dimensions(), (1280, 720));
  assert_eq!(result.segments.len(), 1);
  assert_eq!(result.segments[0].id, 1);
  assert_eq!(result.segments[0].label_id, 0);
  // 画布第 320 行对应原图第 360 行，边界两侧不应漂移
  assert_eq!(result.label_map.get(0, 0), 1);
  assert_eq!(result.label_map.get(1279, 359), 1);
  assert_eq!(result.label_map.get(0, 360), UNLABELED);
  assert_eq!(result.label_map.get(640, 719), UNLABELED);
  Ok(())
}

#[test]
fn evaluation_writes_overlay() -> Result<(), Box<dyn Error>> {
  let dir = tempfile::tempdir()?;
  let images = dir.path().join("images");
  std::fs::create_dir_all(&images)?;
  RgbImage::from_pixel(1280, 720, Rgb([220, 40, 40])).save(images.join("street.png"))?;

  let pipeline = Pipeline::default();
  let logits_dir = dir.path().join("logits");
  let frame = InputWrapper::from_url(&Url::parse(&format!("folder://{}", images.display()))?)?
    .next()
    .ok_or("缺少输入帧")??;
  LogitsRecorder::new(&logits_dir)?.record(&pipeline.preprocess(&frame)?, &street_logits()?)?;

  let out_path = dir.path().join("out.png");
  let input = InputWrapper::from_url(&Url::parse(&format!("folder://{}", images.display()))?)?;
  let model = RecordedLogits::from_url(&Url::parse(&format!("logits://{}", logits_dir.display()))?)?;
  let output = OutputWrapper::from_url(&Url::parse(&format!("image://{}", out_path.display()))?)?;
  EvaluationTask::new(pipeline).run_task(input, model, output)?;

  let saved = image::open(&out_path)?.to_rgb8();
  assert_eq!(saved.dimensions(), (1280, 720));
  // 有标签的区域叠加了颜色，其余区域与黑色混合
  assert_ne!(saved.get_pixel(10, 10), saved.get_pixel(10, 700));
  Ok(())
}
