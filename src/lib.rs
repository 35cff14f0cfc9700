// 该文件是 Duizhun （对准） 项目的一部分。
// src/lib.rs - 库主文件
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

//! 对准拍照的检测后处理。
//!
//! 每个检测周期把模型原始输出变成屏幕上的一个目标框:
//! 解码 -> NMS -> 模型/原始帧/显示 三个坐标空间的映射 -> 选择离画面中心最近的目标。

pub mod config;
pub mod geometry;
pub mod input;
pub mod model;
pub mod nms;
pub mod output;
pub mod pipeline;
pub mod select;
pub mod space;
pub mod task;

pub use crate::config::PipelineConfig;
pub use crate::geometry::{CoordinateMapper, CropRect, FrameGeometry};
pub use crate::model::{Detection, RawTensor};
pub use crate::pipeline::{CycleOutcome, DetectionPipeline, PipelineError, PipelineResult};

pub trait FromUrl {
  type Error;
  fn from_url(url: &url::Url) -> Result<Self, Self::Error>
  where
    Self: Sized;
}

pub trait FromUrlWithScheme: FromUrl {
  const SCHEME: &'static str;
}
