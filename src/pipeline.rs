// 该文件是 Duizhun （对准） 项目的一部分。
// src/pipeline.rs - 检测后处理流水线
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

use thiserror::Error;
use tracing::{debug, error};

use crate::{
  config::{ConfigError, PipelineConfig},
  geometry::{CoordinateMapper, CropRect, FrameGeometry, GeometryError},
  model::{BoxDecoder, Detection, RawTensor, TensorError},
  nms::NonMaxSuppressor,
  select::CenterSelector,
  space::{DisplaySpace, NativeSpace},
};

/// 错误的大类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  /// 张量形状或画面几何不合法
  MalformedInput,
  /// 推理失败或没有输出
  InferenceFailure,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
  #[error("缺少模型输出")]
  MissingOutput,
  #[error("推理失败: {0}")]
  Inference(String),
  #[error("张量错误: {0}")]
  Tensor(#[from] TensorError),
  #[error("画面几何错误: {0}")]
  Geometry(#[from] GeometryError),
}

impl PipelineError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      PipelineError::MissingOutput | PipelineError::Inference(_) => ErrorKind::InferenceFailure,
      PipelineError::Tensor(_) | PipelineError::Geometry(_) => ErrorKind::MalformedInput,
    }
  }
}

/// 单个检测周期的结果，每个周期重新生成
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PipelineResult {
  /// 显示空间中的检测框，按置信度降序
  pub detections: Box<[Detection<DisplaySpace>]>,
  /// 用户正在对准的目标
  pub chosen_index: Option<usize>,
  /// 选中目标在原始帧中的坐标
  pub chosen_native: Option<Detection<NativeSpace>>,
  /// 选中目标在原始帧中的裁剪区域
  pub capture: Option<CropRect>,
}

impl PipelineResult {
  pub fn empty() -> Self {
    Self::default()
  }

  pub fn chosen(&self) -> Option<&Detection<DisplaySpace>> {
    self.chosen_index.and_then(|i| self.detections.get(i))
  }

  /// 没有选中目标时禁止拍照
  pub fn can_capture(&self) -> bool {
    self.chosen_index.is_some() && self.capture.is_some()
  }
}

/// `run` 总会给出结果；失败时结果为空并附带错误
#[derive(Debug, Clone, PartialEq)]
pub struct CycleOutcome {
  pub result: PipelineResult,
  pub error: Option<PipelineError>,
}

impl CycleOutcome {
  pub fn failed(error: PipelineError) -> Self {
    Self {
      result: PipelineResult::empty(),
      error: Some(error),
    }
  }
}

/// 原始输出 -> 解码 -> NMS -> 坐标映射 -> 中心选择
#[derive(Debug, Clone)]
pub struct DetectionPipeline {
  config: PipelineConfig,
  decoder: BoxDecoder,
  suppressor: NonMaxSuppressor,
}

impl DetectionPipeline {
  pub fn new(config: PipelineConfig) -> Result<Self, ConfigError> {
    config.validate()?;
    let decoder = BoxDecoder::new(config.score_layout, config.labels.len());
    let suppressor = NonMaxSuppressor::new(config.score_threshold, config.iou_threshold, config.max_outputs)
      .with_class_aware(config.class_aware);
    Ok(Self {
      config,
      decoder,
      suppressor,
    })
  }

  pub fn config(&self) -> &PipelineConfig {
    &self.config
  }

  pub fn try_run(
    &self,
    raw: Option<&RawTensor>,
    geometry: &FrameGeometry,
  ) -> Result<PipelineResult, PipelineError> {
    let raw = raw.ok_or(PipelineError::MissingOutput)?;
    let mapper = CoordinateMapper::new(self.config.model_input_size, *geometry)?;
    let table = raw.candidates(self.config.tensor_layout, self.decoder.expected_columns())?;

    let mut decoded = Vec::with_capacity(table.len());
    table.for_each_row(|row| decoded.extend(self.decoder.try_decode(row)));
    if decoded.len() < table.len() {
      debug!("丢弃格式错误的候选框 {} 个", table.len() - decoded.len());
    }

    let kept = self.suppressor.suppress(&decoded);

    let native: Vec<Detection<NativeSpace>> = kept.iter().map(|d| mapper.model_to_native(d)).collect();
    let detections: Box<[Detection<DisplaySpace>]> =
      native.iter().map(|d| mapper.native_to_display(d)).collect();

    let chosen_index = CenterSelector::select(&detections, geometry.displayed_width, geometry.displayed_height);
    let chosen_native = chosen_index.map(|i| native[i]);
    let capture = chosen_native.as_ref().and_then(|d| mapper.crop_rect(d));

    debug!(
      "检测周期完成: 候选 {} 个, 保留 {} 个, 选中 {:?}",
      table.len(),
      detections.len(),
      chosen_index
    );

    Ok(PipelineResult {
      detections,
      chosen_index,
      chosen_native,
      capture,
    })
  }

  /// 不会失败的版本，错误记录日志并随结果返回
  pub fn run(&self, raw: Option<&RawTensor>, geometry: &FrameGeometry) -> CycleOutcome {
    match self.try_run(raw, geometry) {
      Ok(result) => CycleOutcome { result, error: None },
      Err(e) => {
        error!("检测周期失败 ({:?}): {}", e.kind(), e);
        CycleOutcome::failed(e)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn pipeline(score_threshold: f32, iou_threshold: f32) -> DetectionPipeline {
    DetectionPipeline::new(PipelineConfig::new(640.0, score_threshold, iou_threshold, 100)).unwrap()
  }

  #[test]
  fn test_single_centered_candidate() {
    let raw = RawTensor::from_rows(&[[320.0, 320.0, 100.0, 100.0, 0.9, 0.0]]);
    let geometry = FrameGeometry::new(640.0, 640.0, 640.0, 640.0);
    let result = pipeline(0.5, 0.5).try_run(Some(&raw), &geometry).unwrap();

    assert_eq!(result.detections.len(), 1);
    let d = result.detections[0];
    assert_eq!((d.x, d.y, d.width, d.height), (270.0, 270.0, 100.0, 100.0));
    assert_eq!(result.chosen_index, Some(0));
    assert_eq!(
      result.capture,
      Some(CropRect {
        x: 270,
        y: 270,
        width: 100,
        height: 100
      })
    );
    assert!(result.can_capture());
  }

  #[test]
  fn test_empty_candidates() {
    let raw = RawTensor::empty(6);
    let geometry = FrameGeometry::new(1920.0, 1080.0, 360.0, 640.0);
    let outcome = pipeline(0.5, 0.5).run(Some(&raw), &geometry);
    assert_eq!(outcome.result, PipelineResult::empty());
    assert_eq!(outcome.error, None);
    assert!(!outcome.result.can_capture());
  }

  #[test]
  fn test_missing_output_is_inference_failure() {
    let geometry = FrameGeometry::new(640.0, 640.0, 640.0, 640.0);
    let outcome = pipeline(0.5, 0.5).run(None, &geometry);
    assert_eq!(outcome.result, PipelineResult::empty());
    assert_eq!(outcome.error, Some(PipelineError::MissingOutput));
    assert_eq!(outcome.error.map(|e| e.kind()), Some(ErrorKind::InferenceFailure));
  }

  #[test]
  fn test_malformed_inputs_yield_empty_result() {
    let good = RawTensor::from_rows(&[[320.0, 320.0, 100.0, 100.0, 0.9, 0.0]]);
    let cases = [
      (RawTensor::new(vec![0.0; 6], &[6]), FrameGeometry::new(640.0, 640.0, 640.0, 640.0)),
      (RawTensor::new(vec![0.0; 7], &[1, 7]), FrameGeometry::new(640.0, 640.0, 640.0, 640.0)),
      (good, FrameGeometry::new(640.0, 0.0, 640.0, 640.0)),
    ];
    for (raw, geometry) in cases {
      let outcome = pipeline(0.5, 0.5).run(Some(&raw), &geometry);
      assert_eq!(outcome.result, PipelineResult::empty());
      assert_eq!(outcome.error.map(|e| e.kind()), Some(ErrorKind::MalformedInput));
    }
  }

  #[test]
  fn test_rejects_invalid_config() {
    assert!(DetectionPipeline::new(PipelineConfig::new(640.0, 0.5, 0.5, 0)).is_err());
    assert!(DetectionPipeline::new(PipelineConfig::new(-1.0, 0.5, 0.5, 10)).is_err());
  }
}
