// 该文件是 Duizhun （对准） 项目的一部分。
// src/input/replay_input.rs - 回放录制的推理输出
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

use serde::Deserialize;
use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  geometry::FrameGeometry,
  model::RawTensor,
  task::Inference,
};

#[derive(Error, Debug)]
pub enum ReplayInputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("回放文件格式错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("第 {0} 帧没有推理输出")]
  MissingOutput(usize),
}

#[derive(Deserialize)]
struct ReplayFile {
  geometry: FrameGeometry,
  frames: Vec<FrameRecord>,
}

#[derive(Deserialize)]
struct FrameRecord {
  #[serde(default)]
  shape: Vec<usize>,
  #[serde(default)]
  data: Vec<f32>,
  #[serde(default)]
  geometry: Option<FrameGeometry>,
  /// 模拟推理失败
  #[serde(default)]
  missing: bool,
}

/// 一帧录制的推理输出
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayFrame {
  pub index: usize,
  pub raw: Option<RawTensor>,
}

/// `replay:///path/to/frames.json`
pub struct ReplayInput {
  frames: Vec<(ReplayFrame, FrameGeometry)>,
}

impl FromUrlWithScheme for ReplayInput {
  const SCHEME: &'static str = "replay";
}

impl FromUrl for ReplayInput {
  type Error = ReplayInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ReplayInputError::SchemeMismatch(url.scheme().to_string()));
    }

    info!("读取回放文件: {}", url.path());
    let text = std::fs::read_to_string(url.path())?;
    Self::from_json_str(&text)
  }
}

impl ReplayInput {
  pub fn from_json_str(text: &str) -> Result<Self, ReplayInputError> {
    let file: ReplayFile = serde_json::from_str(text)?;
    let frames = file
      .frames
      .into_iter()
      .enumerate()
      .map(|(index, record)| {
        let raw = (!record.missing).then(|| RawTensor::new(record.data, &record.shape));
        let geometry = record.geometry.unwrap_or(file.geometry);
        (ReplayFrame { index, raw }, geometry)
      })
      .collect::<Vec<_>>();

    info!("回放帧数: {}", frames.len());
    Ok(Self { frames })
  }

  pub fn len(&self) -> usize {
    self.frames.len()
  }

  pub fn is_empty(&self) -> bool {
    self.frames.is_empty()
  }

  pub fn into_frames(self) -> ReplayFrames {
    ReplayFrames {
      inner: self.frames.into_iter(),
    }
  }
}

pub struct ReplayFrames {
  inner: std::vec::IntoIter<(ReplayFrame, FrameGeometry)>,
}

impl Iterator for ReplayFrames {
  type Item = (ReplayFrame, FrameGeometry);

  fn next(&mut self) -> Option<Self::Item> {
    self.inner.next()
  }
}

/// 把录制的输出当作推理结果返回
pub struct ReplayInference;

impl Inference for ReplayInference {
  type Input = ReplayFrame;
  type Error = ReplayInputError;

  fn infer(&self, input: &ReplayFrame) -> Result<RawTensor, Self::Error> {
    input
      .raw
      .clone()
      .ok_or(ReplayInputError::MissingOutput(input.index))
  }
}
