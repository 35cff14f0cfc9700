// 该文件是 Duizhun （对准） 项目的一部分。
// src/model.rs - 检测结果与类别标签
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

use std::marker::PhantomData;
use std::path::Path;

use thiserror::Error;
use tracing::debug;

use crate::space::Space;

mod decode;
pub use self::decode::{BoxDecoder, RawTensor, ScoreLayout, TensorError, TensorLayout, UnknownLayout};

/// 检测框，`x`/`y` 为左上角，坐标空间由 `S` 指定
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Detection<S: Space> {
  pub x: f32,
  pub y: f32,
  pub width: f32,
  pub height: f32,
  /// 置信度，范围 [0, 1]
  pub score: f32,
  /// 类别索引
  pub class_id: u32,
  _space: PhantomData<S>,
}

impl<S: Space> Detection<S> {
  pub fn new(x: f32, y: f32, width: f32, height: f32, score: f32, class_id: u32) -> Self {
    Self {
      x,
      y,
      width,
      height,
      score,
      class_id,
      _space: PhantomData,
    }
  }

  /// 无效候选框：零面积、零分
  pub fn rejected() -> Self {
    Self::new(0.0, 0.0, 0.0, 0.0, 0.0, 0)
  }

  pub fn x_max(&self) -> f32 {
    self.x + self.width
  }

  pub fn y_max(&self) -> f32 {
    self.y + self.height
  }

  pub fn center(&self) -> (f32, f32) {
    (self.x + self.width / 2.0, self.y + self.height / 2.0)
  }

  pub fn area(&self) -> f32 {
    self.width * self.height
  }

  /// 两个同空间检测框的交并比
  pub fn iou(&self, other: &Self) -> f32 {
    Corners::of(self).iou(&Corners::of(other))
  }
}

/// 角点形式的检测框，面积按角点计算，保证 `iou(a, a) == 1`
#[derive(Debug, Clone, Copy)]
pub(crate) struct Corners {
  x1: f32,
  y1: f32,
  x2: f32,
  y2: f32,
  area: f32,
}

impl Corners {
  pub(crate) fn of<S: Space>(det: &Detection<S>) -> Self {
    let (x1, y1, x2, y2) = (det.x, det.y, det.x_max(), det.y_max());
    Self {
      x1,
      y1,
      x2,
      y2,
      area: (x2 - x1).max(0.0) * (y2 - y1).max(0.0),
    }
  }

  pub(crate) fn iou(&self, other: &Self) -> f32 {
    let inter_w = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
    let inter_h = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
    let intersection = inter_w * inter_h;
    let union = self.area + other.area - intersection;

    if union > 0.0 {
      intersection / union
    } else {
      0.0
    }
  }
}

/// COCO 数据集类别名称
pub const COCO_CLASSES: [&str; 80] = [
  "person",
  "bicycle",
  "car",
  "motorcycle",
  "airplane",
  "bus",
  "train",
  "truck",
  "boat",
  "traffic light",
  "fire hydrant",
  "stop sign",
  "parking meter",
  "bench",
  "bird",
  "cat",
  "dog",
  "horse",
  "sheep",
  "cow",
  "elephant",
  "bear",
  "zebra",
  "giraffe",
  "backpack",
  "umbrella",
  "handbag",
  "tie",
  "suitcase",
  "frisbee",
  "skis",
  "snowboard",
  "sports ball",
  "kite",
  "baseball bat",
  "baseball glove",
  "skateboard",
  "surfboard",
  "tennis racket",
  "bottle",
  "wine glass",
  "cup",
  "fork",
  "knife",
  "spoon",
  "bowl",
  "banana",
  "apple",
  "sandwich",
  "orange",
  "broccoli",
  "carrot",
  "hot dog",
  "pizza",
  "donut",
  "cake",
  "chair",
  "couch",
  "potted plant",
  "bed",
  "dining table",
  "toilet",
  "tv",
  "laptop",
  "mouse",
  "remote",
  "keyboard",
  "cell phone",
  "microwave",
  "oven",
  "toaster",
  "sink",
  "refrigerator",
  "book",
  "clock",
  "vase",
  "scissors",
  "teddy bear",
  "hair drier",
  "toothbrush",
];

#[derive(Error, Debug)]
pub enum LabelError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("标签文件格式错误: {0}")]
  JsonError(#[from] serde_json::Error),
  #[error("标签集合为空")]
  Empty,
}

/// 有序的类别名称集合，`class_id` 即下标
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelSet {
  names: Box<[String]>,
}

impl Default for LabelSet {
  fn default() -> Self {
    Self::coco()
  }
}

impl LabelSet {
  pub fn coco() -> Self {
    Self {
      names: COCO_CLASSES.iter().map(|name| name.to_string()).collect(),
    }
  }

  pub fn from_names<I, T>(names: I) -> Result<Self, LabelError>
  where
    I: IntoIterator<Item = T>,
    T: Into<String>,
  {
    let names: Box<[String]> = names.into_iter().map(Into::into).collect();
    if names.is_empty() {
      return Err(LabelError::Empty);
    }
    Ok(Self { names })
  }

  /// 从 JSON 字符串数组读取，例如 `["ring", "watch"]`
  pub fn from_json_str(text: &str) -> Result<Self, LabelError> {
    let names: Vec<String> = serde_json::from_str(text)?;
    Self::from_names(names)
  }

  pub fn from_json_file(path: &Path) -> Result<Self, LabelError> {
    debug!("读取标签文件: {}", path.display());
    let text = std::fs::read_to_string(path)?;
    Self::from_json_str(&text)
  }

  pub fn len(&self) -> usize {
    self.names.len()
  }

  pub fn is_empty(&self) -> bool {
    self.names.is_empty()
  }

  pub fn contains(&self, class_id: u32) -> bool {
    (class_id as usize) < self.names.len()
  }

  pub fn name(&self, class_id: u32) -> Option<&str> {
    self.names.get(class_id as usize).map(String::as_str)
  }
}
