// 该文件是 Duizhun （对准） 项目的一部分。
// src/task.rs - 检测周期驱动与任务循环
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

use std::sync::{
  Arc, Mutex, PoisonError,
  atomic::{AtomicBool, AtomicU64, Ordering},
  mpsc::Receiver,
};

use tracing::{debug, info, warn};

use crate::{
  geometry::FrameGeometry,
  model::RawTensor,
  output::Render,
  pipeline::{CycleOutcome, DetectionPipeline, PipelineError, PipelineResult},
};

/// 外部推理调用，可能阻塞
pub trait Inference {
  type Input;
  type Error: std::fmt::Display;

  fn infer(&self, input: &Self::Input) -> Result<RawTensor, Self::Error>;
}

/// 正在进行中的检测周期，drop 时释放占用标记
#[derive(Debug)]
pub struct CycleToken {
  generation: u64,
  in_flight: Arc<AtomicBool>,
}

impl CycleToken {
  pub fn generation(&self) -> u64 {
    self.generation
  }
}

impl Drop for CycleToken {
  fn drop(&mut self) {
    self.in_flight.store(false, Ordering::Release);
  }
}

/// 页面失焦或摄像头停止时使尚未完成的周期作废
#[derive(Debug, Clone)]
pub struct CancelHandle {
  generation: Arc<AtomicU64>,
}

impl CancelHandle {
  pub fn cancel(&self) {
    let previous = self.generation.fetch_add(1, Ordering::AcqRel);
    debug!("检测周期作废, 代号 {} -> {}", previous, previous + 1);
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CycleReport {
  /// 已有周期在进行中，本次未启动
  Skipped,
  /// 周期完成前被取消，结果被丢弃
  Discarded,
  Delivered(CycleOutcome),
}

/// 保证同一时刻最多只有一个检测周期，并丢弃取消后的结果
pub struct CycleDriver<M> {
  model: M,
  pipeline: DetectionPipeline,
  in_flight: Arc<AtomicBool>,
  generation: Arc<AtomicU64>,
  last: Mutex<Option<PipelineResult>>,
}

impl<M> CycleDriver<M> {
  pub fn new(model: M, pipeline: DetectionPipeline) -> Self {
    Self {
      model,
      pipeline,
      in_flight: Arc::new(AtomicBool::new(false)),
      generation: Arc::new(AtomicU64::new(0)),
      last: Mutex::new(None),
    }
  }

  pub fn pipeline(&self) -> &DetectionPipeline {
    &self.pipeline
  }

  pub fn cancel_handle(&self) -> CancelHandle {
    CancelHandle {
      generation: self.generation.clone(),
    }
  }

  pub fn cancel(&self) {
    self.cancel_handle().cancel();
  }

  /// 已有周期在进行中时返回 `None`
  pub fn begin_cycle(&self) -> Option<CycleToken> {
    self
      .in_flight
      .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
      .ok()?;
    Some(CycleToken {
      generation: self.generation.load(Ordering::Acquire),
      in_flight: self.in_flight.clone(),
    })
  }

  pub fn is_in_flight(&self) -> bool {
    self.in_flight.load(Ordering::Acquire)
  }

  /// 最近一次交付的结果
  pub fn last_result(&self) -> Option<PipelineResult> {
    self.last.lock().unwrap_or_else(PoisonError::into_inner).clone()
  }

  /// 用推理输出完成周期；令牌过期则丢弃
  pub fn complete(
    &self,
    token: CycleToken,
    raw: Result<RawTensor, PipelineError>,
    geometry: &FrameGeometry,
  ) -> CycleReport {
    if self.is_stale(&token) {
      return CycleReport::Discarded;
    }

    let outcome = match raw {
      Ok(raw) => self.pipeline.run(Some(&raw), geometry),
      Err(e) => {
        warn!("推理没有输出: {}", e);
        CycleOutcome::failed(e)
      }
    };

    self.deliver(token, outcome)
  }

  /// 后处理期间也可能被取消，写入结果前再检查一次
  fn deliver(&self, token: CycleToken, outcome: CycleOutcome) -> CycleReport {
    let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
    if self.is_stale(&token) {
      return CycleReport::Discarded;
    }
    *last = Some(outcome.result.clone());
    drop(last);
    drop(token);
    CycleReport::Delivered(outcome)
  }

  fn is_stale(&self, token: &CycleToken) -> bool {
    let current = self.generation.load(Ordering::Acquire);
    if token.generation != current {
      warn!(
        "检测周期已取消 (代号 {} / 当前 {}), 丢弃结果",
        token.generation, current
      );
      return true;
    }
    false
  }
}

impl<M: Inference> CycleDriver<M> {
  pub fn run_cycle(&self, input: &M::Input, geometry: &FrameGeometry) -> CycleReport {
    let Some(token) = self.begin_cycle() else {
      debug!("上一个检测周期尚未完成, 跳过本帧");
      return CycleReport::Skipped;
    };

    let now = std::time::Instant::now();
    let raw = self
      .model
      .infer(input)
      .map_err(|e| PipelineError::Inference(e.to_string()));
    debug!("推理完成，耗时: {:.2?}", now.elapsed());

    self.complete(token, raw, geometry)
  }
}

pub trait Task<I, M, O>: Sized {
  type Error;
  fn run_task(self, input: I, driver: &CycleDriver<M>, output: O) -> Result<usize, Self::Error>;
}

/// 只处理第一帧
pub struct OneShotTask;

impl<F, M, O, I> Task<I, M, O> for OneShotTask
where
  I: Iterator<Item = (F, FrameGeometry)>,
  M: Inference<Input = F>,
  O: Render<CycleOutcome>,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  fn run_task(self, mut input: I, driver: &CycleDriver<M>, output: O) -> Result<usize, Self::Error> {
    info!("开始任务...");
    let (frame, geometry) = input.next().ok_or_else(|| anyhow::anyhow!("没有输入帧"))?;
    match driver.run_cycle(&frame, &geometry) {
      CycleReport::Delivered(outcome) => {
        output.render_result(0, &outcome)?;
        info!("任务完成");
        Ok(1)
      }
      report => Err(anyhow::anyhow!("检测周期未交付: {:?}", report)),
    }
  }
}

/// 逐帧运行，直到输入耗尽、达到帧数或收到停止信号
#[derive(Default, Debug)]
pub struct ContinuousTask {
  frame_number: Option<usize>,
  stop: Option<Receiver<()>>,
}

impl ContinuousTask {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  pub fn with_stop_signal(mut self, stop: Receiver<()>) -> Self {
    self.stop = Some(stop);
    self
  }
}

impl<F, M, O, I> Task<I, M, O> for ContinuousTask
where
  I: Iterator<Item = (F, FrameGeometry)>,
  M: Inference<Input = F>,
  O: Render<CycleOutcome>,
  O::Error: std::error::Error + Send + Sync + 'static,
{
  type Error = anyhow::Error;

  fn run_task(self, input: I, driver: &CycleDriver<M>, output: O) -> Result<usize, Self::Error> {
    info!("开始任务...");

    let mut delivered = 0usize;
    for (frame_index, (frame, geometry)) in input.enumerate() {
      debug!("处理第 {} 帧", frame_index);
      match driver.run_cycle(&frame, &geometry) {
        CycleReport::Delivered(outcome) => {
          output.render_result(frame_index, &outcome)?;
          delivered += 1;
        }
        CycleReport::Skipped => debug!("第 {} 帧被跳过", frame_index),
        CycleReport::Discarded => warn!("第 {} 帧结果已丢弃", frame_index),
      }

      if self.frame_number.is_some_and(|n| frame_index + 1 >= n) {
        info!("达到指定帧数 {}, 退出任务循环", frame_index + 1);
        break;
      }
      if self.stop.as_ref().is_some_and(|rx| rx.try_recv().is_ok()) {
        warn!("中断信号接收，退出任务循环");
        driver.cancel();
        break;
      }
    }

    info!("任务完成，共交付 {} 个结果", delivered);
    Ok(delivered)
  }
}
