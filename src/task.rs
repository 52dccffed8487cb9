// 该文件是 Fenge （分割） 项目的一部分。
// src/task.rs - 推理任务
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

use std::{
  sync::mpsc::Receiver,
  thread,
  time::{Duration, Instant},
};

use tracing::{debug, error, info, warn};

#[cfg(feature = "recorded_logits")]
use crate::model::LogitsRecorder;
use crate::{
  frame::Frame,
  letterbox::{LetterboxError, LetterboxedFrame, MODEL_INPUT_SIZE},
  model::{DecodeError, DecodeOptions, Model, RawModelOutput, SegmentDecoder},
  output::Render,
  visualize::{Panoptic, Visualization, Visualizer},
};

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error>;
}

/// 单帧处理流程: letterbox → 模型 → 解码并还原 → 可视化
pub struct Pipeline {
  target: (u32, u32),
  decoder: SegmentDecoder,
  visualizer: Visualizer,
}

impl Default for Pipeline {
  fn default() -> Self {
    Self::new(DecodeOptions::default(), Visualizer::default())
  }
}

impl Pipeline {
  pub fn new(options: DecodeOptions, visualizer: Visualizer) -> Self {
    Self {
      target: MODEL_INPUT_SIZE,
      decoder: SegmentDecoder::new(options, MODEL_INPUT_SIZE),
      visualizer,
    }
  }

  pub fn preprocess(&self, frame: &Frame) -> Result<LetterboxedFrame, LetterboxError> {
    LetterboxedFrame::from_frame(frame, self.target)
  }

  pub fn decode(
    &self,
    frame: &LetterboxedFrame,
    raw: &RawModelOutput,
  ) -> Result<Panoptic, DecodeError> {
    let (label_map, segments) = self
      .decoder
      .decode_to_source(raw, &frame.info, frame.source_size)?;
    Ok(Panoptic {
      label_map,
      segments,
    })
  }

  pub fn visualize(&self, frame: &Frame, result: &Panoptic) -> Visualization {
    self.visualizer.visualize(&frame.image, result)
  }

  /// 完整处理一帧，返回分割结果与可视化
  pub fn run<M, ME>(&self, model: &M, frame: &Frame) -> anyhow::Result<(Panoptic, Visualization)>
  where
    M: Model<Error = ME>,
    ME: std::error::Error + Sync + Send + 'static,
  {
    let letterboxed = self.preprocess(frame)?;
    let raw = model.infer(&letterboxed)?;
    let result = self.decode(&letterboxed, &raw)?;
    let visualization = self.visualize(frame, &result);
    Ok((result, visualization))
  }
}

pub struct OneShotTask {
  pipeline: Pipeline,
}

impl OneShotTask {
  pub fn new(pipeline: Pipeline) -> Self {
    Self { pipeline }
  }
}

impl<
  IE: std::error::Error + Sync + Send + 'static,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Result<Frame, IE>>,
  M: Model<Error = ME>,
  O: Render<Visualization, Error = RE>,
> Task<I, M, O> for OneShotTask
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, model: M, output: O) -> Result<(), Self::Error> {
    info!("开始任务...");
    let frame = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))??;
    info!("输入帧 {} 获取成功，开始推理...", frame.name);
    let now = Instant::now();
    let (result, visualization) = self.pipeline.run(&model, &frame)?;
    let elapsed = now.elapsed();
    info!(
      "推理完成，共 {} 个分割段，耗时: {:.2?}",
      result.segments.len(),
      elapsed
    );
    output.render_result(&frame, &visualization)?;
    info!("渲染完成，总耗时: {:.2?}", now.elapsed());

    Ok(())
  }
}

/// 安装 Ctrl-C 处理器，返回中断信号通道；每个进程只能调用一次
pub fn interrupt_channel() -> Result<Receiver<()>, ctrlc::Error> {
  let (tx, rx) = std::sync::mpsc::channel();
  ctrlc::set_handler(move || {
    info!("收到中断信号，准备退出...");
    let _ = tx.send(());
    thread::spawn(|| {
      thread::sleep(Duration::from_secs(30));
      warn!("强制退出程序");
      std::process::exit(1);
    });
  })?;
  Ok(rx)
}

/// 各阶段耗时统计
#[derive(Debug, Default, Clone)]
pub struct Timings {
  pub preprocess: Vec<Duration>,
  pub predict: Vec<Duration>,
  pub decode: Vec<Duration>,
  /// 读取或处理失败而被跳过的帧数
  pub failed: usize,
}

fn average(times: &[Duration]) -> Option<Duration> {
  if times.is_empty() {
    return None;
  }
  Some(times.iter().sum::<Duration>() / times.len() as u32)
}

impl Timings {
  pub fn frames(&self) -> usize {
    self.predict.len()
  }

  pub fn average_preprocess(&self) -> Option<Duration> {
    average(&self.preprocess)
  }

  pub fn average_predict(&self) -> Option<Duration> {
    average(&self.predict)
  }

  pub fn average_decode(&self) -> Option<Duration> {
    average(&self.decode)
  }

  /// 以三个阶段的平均耗时之和计算
  pub fn fps(&self) -> Option<f64> {
    let total = self.average_preprocess()? + self.average_predict()? + self.average_decode()?;
    let secs = total.as_secs_f64();
    (secs > 0.0).then(|| 1.0 / secs)
  }

  fn report(&self) {
    let (Some(preprocess), Some(predict), Some(decode)) = (
      self.average_preprocess(),
      self.average_predict(),
      self.average_decode(),
    ) else {
      warn!("没有处理任何帧, 跳过 {} 帧", self.failed);
      return;
    };
    warn!("共处理 {} 帧, 跳过 {} 帧", self.frames(), self.failed);
    warn!("平均预处理时间: {:.2?}", preprocess);
    warn!("平均推理时间: {:.2?}", predict);
    warn!("平均解码时间: {:.2?}", decode);
    if let Some(fps) = self.fps() {
      warn!("FPS: {:.1}", fps);
    }
  }
}

/// 逐帧处理全部输入并统计耗时
#[derive(Default)]
pub struct EvaluationTask {
  pipeline: Pipeline,
  frame_number: Option<usize>,
  interrupt: Option<Receiver<()>>,
  #[cfg(feature = "recorded_logits")]
  recorder: Option<LogitsRecorder>,
}

impl EvaluationTask {
  pub fn new(pipeline: Pipeline) -> Self {
    Self {
      pipeline,
      ..Default::default()
    }
  }

  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  pub fn with_interrupt(mut self, interrupt: Receiver<()>) -> Self {
    self.interrupt = Some(interrupt);
    self
  }

  #[cfg(feature = "recorded_logits")]
  pub fn with_recorder(mut self, recorder: Option<LogitsRecorder>) -> Self {
    self.recorder = recorder;
    self
  }

  fn interrupted(&self) -> bool {
    self
      .interrupt
      .as_ref()
      .map(|rx| rx.try_recv().is_ok())
      .unwrap_or(false)
  }

  /// 预处理、推理与解码一帧，并记录各阶段耗时
  fn segment<M, ME>(&self, model: &M, frame: &Frame, timings: &mut Timings) -> anyhow::Result<Panoptic>
  where
    M: Model<Error = ME>,
    ME: std::error::Error + Sync + Send + 'static,
  {
    let now = Instant::now();
    let letterboxed = self.pipeline.preprocess(frame)?;
    let preprocess = now.elapsed();

    let now = Instant::now();
    let raw = model.infer(&letterboxed)?;
    let predict = now.elapsed();

    #[cfg(feature = "recorded_logits")]
    if let Some(recorder) = &self.recorder {
      recorder.record(&letterboxed, &raw)?;
    }

    let now = Instant::now();
    let result = self.pipeline.decode(&letterboxed, &raw)?;
    timings.preprocess.push(preprocess);
    timings.predict.push(predict);
    timings.decode.push(now.elapsed());
    Ok(result)
  }

  /// 运行并返回耗时统计
  ///
  /// 单帧的读取、几何、推理或解码错误只跳过该帧，渲染错误终止任务。
  pub fn evaluate<I, IE, M, ME, O, RE>(
    self,
    input: I,
    model: M,
    output: O,
  ) -> anyhow::Result<Timings>
  where
    IE: std::error::Error + Sync + Send + 'static,
    ME: std::error::Error + Sync + Send + 'static,
    RE: std::error::Error + Sync + Send + 'static,
    I: Iterator<Item = Result<Frame, IE>>,
    M: Model<Error = ME>,
    O: Render<Visualization, Error = RE>,
  {
    info!("开始任务...");
    let mut timings = Timings::default();

    for (index, frame) in input.enumerate() {
      match frame {
        Ok(frame) => {
          info!("处理第 {} 帧图像: {}", index + 1, frame.name);
          match self.segment(&model, &frame, &mut timings) {
            Ok(result) => {
              if result.is_empty() {
                debug!("帧 {} 没有分割段", frame.name);
              } else {
                debug!("帧 {} 共 {} 个分割段", frame.name, result.segments.len());
              }
              let visualization = self.pipeline.visualize(&frame, &result);
              output.render_result(&frame, &visualization)?;
            }
            Err(e) => {
              error!("处理帧 {} 失败, 跳过: {:#}", frame.name, e);
              timings.failed += 1;
            }
          }
        }
        Err(e) => {
          error!("读取第 {} 帧失败, 跳过: {}", index + 1, e);
          timings.failed += 1;
        }
      }

      if self.frame_number.map(|n| timings.frames() >= n).unwrap_or(false) {
        info!("达到指定帧数 {}, 退出任务循环", timings.frames());
        break;
      }
      if self.interrupted() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    timings.report();
    info!("任务完成，退出");
    Ok(timings)
  }
}

impl<
  IE: std::error::Error + Sync + Send + 'static,
  ME: std::error::Error + Sync + Send + 'static,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = Result<Frame, IE>>,
  M: Model<Error = ME>,
  O: Render<Visualization, Error = RE>,
> Task<I, M, O> for EvaluationTask
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, model: M, output: O) -> Result<(), Self::Error> {
    self.evaluate(input, model, output).map(|_| ())
  }
}

#[cfg(test)]
mod tests {
  use std::cell::RefCell;

  use super::*;
  use crate::{input::InputError, label_map::UNLABELED};
  use image::{Rgb, RgbImage};

  /// 一个查询，掩码覆盖画布上半部分
  struct TopHalf;

  impl Model for TopHalf {
    type Error = DecodeError;

    fn infer(&self, frame: &LetterboxedFrame) -> Result<RawModelOutput, Self::Error> {
      let (w, h) = frame.info.target_size();
      let (w, h) = (w as usize, h as usize);
      let mask = (0..h)
        .flat_map(|y| (0..w).map(move |_| if y < h / 2 { 5.0 } else { -5.0 }))
        .collect();
      RawModelOutput::new(&[1, 1, 3], vec![6.0, 0.0, 0.0], &[1, 1, h, w], mask)
    }
  }

  #[derive(Default)]
  struct Collect {
    rendered: RefCell<Vec<(String, usize)>>,
  }

  impl Render<Visualization> for &Collect {
    type Error = std::convert::Infallible;

    fn render_result(&self, frame: &Frame, result: &Visualization) -> Result<(), Self::Error> {
      self
        .rendered
        .borrow_mut()
        .push((frame.name.clone(), result.annotations.len()));
      Ok(())
    }
  }

  fn frames(n: usize) -> impl Iterator<Item = Result<Frame, InputError>> {
    (0..n).map(|i| Ok(Frame::new(format!("f{i}"), RgbImage::from_pixel(64, 32, Rgb([10, 20, 30])))))
  }

  #[test]
  fn pipeline_restores_to_source_size() -> anyhow::Result<()> {
    let frame = Frame::new("a", RgbImage::from_pixel(64, 32, Rgb([10, 20, 30])));
    let (result, visualization) = Pipeline::default().run(&TopHalf, &frame)?;
    assert_eq!(result.label_map.dimensions(), (64, 32));
    assert_eq!(result.segments.len(), 1);
    assert_eq!(visualization.image.dimensions(), (64, 32));
    assert_eq!(visualization.annotations.len(), 1);
    // 画布上半部分为 [0, 320)，图像在画布中占 [160, 480)
    assert_eq!(result.label_map.get(10, 0), 1);
    assert_eq!(result.label_map.get(10, 31), UNLABELED);
    Ok(())
  }

  #[test]
  fn oneshot_renders_first_frame() -> anyhow::Result<()> {
    let collect = Collect::default();
    OneShotTask::new(Pipeline::default()).run_task(frames(3), TopHalf, &collect)?;
    assert_eq!(*collect.rendered.borrow(), vec![("f0".to_string(), 1)]);
    Ok(())
  }

  #[test]
  fn oneshot_without_input_fails() {
    let collect = Collect::default();
    let result = OneShotTask::new(Pipeline::default()).run_task(frames(0), TopHalf, &collect);
    assert!(result.is_err());
  }

  #[test]
  fn evaluation_times_every_frame() -> anyhow::Result<()> {
    let collect = Collect::default();
    let timings = EvaluationTask::new(Pipeline::default()).evaluate(frames(3), TopHalf, &collect)?;
    assert_eq!(timings.frames(), 3);
    assert_eq!(timings.preprocess.len(), 3);
    assert_eq!(timings.decode.len(), 3);
    assert_eq!(collect.rendered.borrow().len(), 3);
    Ok(())
  }

  #[test]
  fn evaluation_skips_frames_that_fail() -> anyhow::Result<()> {
    let input = vec![
      Ok(Frame::new("sliver", RgbImage::new(1, 5000))),
      Err(InputError::SchemeMismatch("video".to_string())),
      Ok(Frame::new("normal", RgbImage::from_pixel(64, 32, Rgb([10, 20, 30])))),
    ];
    let collect = Collect::default();
    let timings =
      EvaluationTask::new(Pipeline::default()).evaluate(input.into_iter(), TopHalf, &collect)?;
    assert_eq!(timings.frames(), 1);
    assert_eq!(timings.preprocess.len(), 1);
    assert_eq!(timings.failed, 2);
    assert_eq!(*collect.rendered.borrow(), vec![("normal".to_string(), 1)]);
    Ok(())
  }

  #[test]
  fn evaluation_stops_at_frame_number() -> anyhow::Result<()> {
    let collect = Collect::default();
    let timings = EvaluationTask::new(Pipeline::default())
      .with_frame_number(Some(2))
      .evaluate(frames(5), TopHalf, &collect)?;
    assert_eq!(timings.frames(), 2);
    Ok(())
  }

  #[test]
  fn evaluation_stops_on_interrupt() -> anyhow::Result<()> {
    let (tx, rx) = std::sync::mpsc::channel();
    tx.send(())?;
    let collect = Collect::default();
    let timings = EvaluationTask::new(Pipeline::default())
      .with_interrupt(rx)
      .evaluate(frames(5), TopHalf, &collect)?;
    assert_eq!(timings.frames(), 1);
    Ok(())
  }

  #[test]
  fn empty_timings() {
    let timings = Timings::default();
    assert_eq!(timings.average_predict(), None);
    assert_eq!(timings.fps(), None);
  }
}
