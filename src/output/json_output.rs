// 该文件是 Duizhun （对准） 项目的一部分。
// src/output/json_output.rs - 以 JSON 行输出检测结果
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

use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::{Mutex, PoisonError};

use serde_json::{Value, json};
use thiserror::Error;
use tracing::info;
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::LabelSet,
  output::Render,
  pipeline::CycleOutcome,
};

const STDOUT_HOST: &str = "-";

#[derive(Error, Debug)]
pub enum JsonOutputError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
}

/// 每个检测周期写一行 JSON
///
/// - `json://-` 写到标准输出
/// - `json:///path/to/result.jsonl` 写到文件
pub struct JsonLinesOutput {
  sink: Mutex<Box<dyn Write + Send>>,
  labels: LabelSet,
}

impl FromUrlWithScheme for JsonLinesOutput {
  const SCHEME: &'static str = "json";
}

impl FromUrl for JsonLinesOutput {
  type Error = JsonOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(JsonOutputError::SchemeMismatch(format!(
        "期望输出方式 '{}', 实际输出方式 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    if url.host_str() == Some(STDOUT_HOST) {
      info!("检测结果输出到标准输出");
      return Ok(Self::from_writer(std::io::stdout()));
    }

    info!("检测结果输出到文件: {}", url.path());
    let file = File::create(url.path())?;
    Ok(Self::from_writer(BufWriter::new(file)))
  }
}

impl JsonLinesOutput {
  pub fn from_writer(writer: impl Write + Send + 'static) -> Self {
    Self {
      sink: Mutex::new(Box::new(writer)),
      labels: LabelSet::default(),
    }
  }

  pub fn with_labels(mut self, labels: LabelSet) -> Self {
    self.labels = labels;
    self
  }
}

impl Render<CycleOutcome> for JsonLinesOutput {
  type Error = JsonOutputError;

  fn render_result(&self, index: usize, result: &CycleOutcome) -> Result<(), Self::Error> {
    let line = outcome_to_json(index, result, &self.labels);
    let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
    writeln!(sink, "{}", line)?;
    sink.flush()?;
    Ok(())
  }
}

/// 单个周期结果的 JSON 表示，检测框为显示空间坐标，`capture` 为原始帧裁剪区域
pub fn outcome_to_json(index: usize, outcome: &CycleOutcome, labels: &LabelSet) -> Value {
  let result = &outcome.result;
  let detections: Vec<Value> = result
    .detections
    .iter()
    .map(|d| {
      json!({
        "x": d.x,
        "y": d.y,
        "width": d.width,
        "height": d.height,
        "score": d.score,
        "class_id": d.class_id,
        "label": labels.name(d.class_id),
      })
    })
    .collect();

  let capture = result.capture.map(|c| {
    json!({
      "x": c.x,
      "y": c.y,
      "width": c.width,
      "height": c.height,
    })
  });

  json!({
    "frame": index,
    "chosen_index": result.chosen_index,
    "detections": detections,
    "capture": capture,
    "error": outcome.error.as_ref().map(|e| e.to_string()),
  })
}
