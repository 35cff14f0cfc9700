// 该文件是 Duizhun （对准） 项目的一部分。
// src/config.rs - 流水线配置
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

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;
use tracing::{debug, error};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  model::{LabelError, LabelSet, ScoreLayout, TensorLayout},
};

const DEFAULT_MODEL_INPUT_SIZE: f32 = 640.0;
const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
const DEFAULT_MAX_OUTPUTS: usize = 100;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("URI 方案不匹配: {0}")]
  SchemeMismatch(String),
  #[error("缺少必需参数: {0}")]
  MissingParameter(&'static str),
  #[error("参数 {name} 无法解析: {value}")]
  InvalidParameter { name: &'static str, value: String },
  #[error("参数 {name} 超出范围: {value}")]
  OutOfRange { name: &'static str, value: String },
  #[error("标签错误: {0}")]
  LabelError(#[from] LabelError),
}

/// 每个检测周期只读的配置
///
/// `score_threshold` 没有默认值，必须显式给出。
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
  pub model_input_size: f32,
  pub score_threshold: f32,
  pub iou_threshold: f32,
  pub max_outputs: usize,
  pub score_layout: ScoreLayout,
  pub tensor_layout: TensorLayout,
  pub class_aware: bool,
  pub labels: LabelSet,
}

impl PipelineConfig {
  pub fn new(model_input_size: f32, score_threshold: f32, iou_threshold: f32, max_outputs: usize) -> Self {
    Self {
      model_input_size,
      score_threshold,
      iou_threshold,
      max_outputs,
      score_layout: ScoreLayout::default(),
      tensor_layout: TensorLayout::default(),
      class_aware: false,
      labels: LabelSet::default(),
    }
  }

  pub fn with_score_layout(mut self, score_layout: ScoreLayout) -> Self {
    self.score_layout = score_layout;
    self
  }

  pub fn with_tensor_layout(mut self, tensor_layout: TensorLayout) -> Self {
    self.tensor_layout = tensor_layout;
    self
  }

  pub fn with_class_aware(mut self, class_aware: bool) -> Self {
    self.class_aware = class_aware;
    self
  }

  pub fn with_labels(mut self, labels: LabelSet) -> Self {
    self.labels = labels;
    self
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if !(self.model_input_size.is_finite() && self.model_input_size > 0.0) {
      return Err(out_of_range("model_input_size", self.model_input_size));
    }
    for (name, value) in [
      ("score_threshold", self.score_threshold),
      ("iou_threshold", self.iou_threshold),
    ] {
      if !(0.0..=1.0).contains(&value) {
        return Err(out_of_range(name, value));
      }
    }
    if self.max_outputs == 0 {
      return Err(out_of_range("max_outputs", self.max_outputs));
    }
    if self.labels.is_empty() {
      return Err(LabelError::Empty.into());
    }
    Ok(())
  }
}

fn out_of_range(name: &'static str, value: impl ToString) -> ConfigError {
  ConfigError::OutOfRange {
    name,
    value: value.to_string(),
  }
}

fn parse_param<T: FromStr>(query: &HashMap<String, String>, name: &'static str) -> Result<Option<T>, ConfigError> {
  query
    .get(name)
    .map(|value| {
      value.parse().map_err(|_| ConfigError::InvalidParameter {
        name,
        value: value.clone(),
      })
    })
    .transpose()
}

impl FromUrlWithScheme for PipelineConfig {
  const SCHEME: &'static str = "detect";
}

/// `detect://640?score_threshold=0.5&iou_threshold=0.45&max_outputs=100&layout=class-id&tensor=rows&class_aware=false&labels=/path/labels.json`
impl FromUrl for PipelineConfig {
  type Error = ConfigError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI scheme mismatch: expected '{}', found '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(ConfigError::SchemeMismatch(format!(
        "期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      )));
    }

    let query: HashMap<String, String> = url
      .query_pairs()
      .map(|(k, v)| (String::from(k), String::from(v)))
      .collect();

    let model_input_size = match url.host_str().filter(|h| !h.is_empty()) {
      Some(host) => host.parse().map_err(|_| ConfigError::InvalidParameter {
        name: "model_input_size",
        value: host.to_string(),
      })?,
      None => DEFAULT_MODEL_INPUT_SIZE,
    };

    let score_threshold = parse_param(&query, "score_threshold")?
      .ok_or(ConfigError::MissingParameter("score_threshold"))?;
    let iou_threshold = parse_param(&query, "iou_threshold")?.unwrap_or(DEFAULT_IOU_THRESHOLD);
    let max_outputs = parse_param(&query, "max_outputs")?.unwrap_or(DEFAULT_MAX_OUTPUTS);

    let mut config = PipelineConfig::new(model_input_size, score_threshold, iou_threshold, max_outputs)
      .with_score_layout(parse_param(&query, "layout")?.unwrap_or_default())
      .with_tensor_layout(parse_param(&query, "tensor")?.unwrap_or_default())
      .with_class_aware(parse_param(&query, "class_aware")?.unwrap_or(false));

    if let Some(path) = query.get("labels") {
      config = config.with_labels(LabelSet::from_json_file(Path::new(path))?);
    }

    config.validate()?;
    debug!("流水线配置: {:?}", config);
    Ok(config)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn parse(url: &str) -> Result<PipelineConfig, ConfigError> {
    PipelineConfig::from_url(&Url::parse(url).unwrap())
  }

  #[test]
  fn test_from_url_full() {
    let config = parse(
      "detect://320?score_threshold=0.66&iou_threshold=0.3&max_outputs=5&layout=logits&tensor=columns&class_aware=true",
    )
    .unwrap();
    assert_eq!(config.model_input_size, 320.0);
    assert_eq!(config.score_threshold, 0.66);
    assert_eq!(config.iou_threshold, 0.3);
    assert_eq!(config.max_outputs, 5);
    assert_eq!(config.score_layout, ScoreLayout::Logits);
    assert_eq!(config.tensor_layout, TensorLayout::Columns);
    assert!(config.class_aware);
  }

  #[test]
  fn test_from_url_defaults() {
    let config = parse("detect://?score_threshold=0.5").unwrap();
    assert_eq!(config.model_input_size, 640.0);
    assert_eq!(config.iou_threshold, 0.45);
    assert_eq!(config.max_outputs, 100);
    assert_eq!(config.score_layout, ScoreLayout::ClassId);
    assert_eq!(config.labels.len(), 80);
  }

  #[test]
  fn test_score_threshold_is_required() {
    assert!(matches!(
      parse("detect://640?iou_threshold=0.5"),
      Err(ConfigError::MissingParameter("score_threshold"))
    ));
  }

  #[test]
  fn test_rejects_bad_values() {
    assert!(matches!(parse("image://640?score_threshold=0.5"), Err(ConfigError::SchemeMismatch(_))));
    assert!(matches!(
      parse("detect://640?score_threshold=high"),
      Err(ConfigError::InvalidParameter { name: "score_threshold", .. })
    ));
    assert!(matches!(
      parse("detect://640?score_threshold=1.5"),
      Err(ConfigError::OutOfRange { name: "score_threshold", .. })
    ));
    assert!(matches!(
      parse("detect://640?score_threshold=0.5&max_outputs=0"),
      Err(ConfigError::OutOfRange { name: "max_outputs", .. })
    ));
    assert!(matches!(
      parse("detect://640?score_threshold=0.5&layout=softmax"),
      Err(ConfigError::InvalidParameter { name: "layout", .. })
    ));
  }

  #[test]
  fn test_accepts_threshold_bounds() {
    for (score, iou) in [(0.0, 0.0), (1.0, 1.0), (0.0, 1.0), (1.0, 0.0)] {
      let config = parse(&format!("detect://640?score_threshold={score}&iou_threshold={iou}")).unwrap();
      assert_eq!((config.score_threshold, config.iou_threshold), (score, iou));
    }
    assert!(matches!(
      parse("detect://640?score_threshold=0.5&iou_threshold=-0.1"),
      Err(ConfigError::OutOfRange { name: "iou_threshold", .. })
    ));
  }

  #[test]
  fn test_labels_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("labels.json");
    std::fs::write(&path, r#"["ring", "watch", "coin"]"#).unwrap();

    let url = format!(
      "detect://640?score_threshold=0.5&layout=probabilities&labels={}",
      path.display()
    );
    let config = parse(&url).unwrap();
    assert_eq!(config.labels.len(), 3);
    assert_eq!(config.labels.name(2), Some("coin"));
  }
}
