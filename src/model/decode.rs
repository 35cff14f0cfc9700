// 该文件是 Duizhun （对准） 项目的一部分。
// src/model/decode.rs - 原始输出张量与候选框解码
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

use std::str::FromStr;

use thiserror::Error;

use crate::model::Detection;
use crate::space::ModelSpace;

/// 前 5 列: cx, cy, w, h, objectness/score
const BOX_COLUMNS: usize = 5;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TensorError {
  #[error("张量维度错误: 期望 2 维, 实际 {0} 维")]
  Rank(usize),
  #[error("张量列数错误: 期望 {expected}, 实际 {actual}")]
  ColumnCount { expected: usize, actual: usize },
  #[error("张量数据长度与形状 {shape:?} 不符: 实际长度 {len}")]
  LengthMismatch { shape: Vec<usize>, len: usize },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("未知的布局: {0}")]
pub struct UnknownLayout(pub String);

/// 第 5 列之后的类别列如何解释
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScoreLayout {
  /// 第 4 列为置信度，第 5 列为类别编号
  #[default]
  ClassId,
  /// 每类概率，score = max(p)
  Probabilities,
  /// 每类概率，score = objectness * max(p)
  Objectness,
  /// 每类 logit，score = sigmoid(max(logit))
  Logits,
}

impl FromStr for ScoreLayout {
  type Err = UnknownLayout;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "class-id" => Ok(ScoreLayout::ClassId),
      "probabilities" => Ok(ScoreLayout::Probabilities),
      "objectness" => Ok(ScoreLayout::Objectness),
      "logits" => Ok(ScoreLayout::Logits),
      _ => Err(UnknownLayout(s.to_string())),
    }
  }
}

/// 张量排布: `[N, 5+K]` 或转置的 `[5+K, N]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TensorLayout {
  #[default]
  Rows,
  Columns,
}

impl FromStr for TensorLayout {
  type Err = UnknownLayout;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "rows" => Ok(TensorLayout::Rows),
      "columns" => Ok(TensorLayout::Columns),
      _ => Err(UnknownLayout(s.to_string())),
    }
  }
}

/// 推理得到的原始输出，形状在流水线内部校验
#[derive(Debug, Clone, PartialEq)]
pub struct RawTensor {
  data: Box<[f32]>,
  shape: Box<[usize]>,
}

impl RawTensor {
  pub fn new(data: Vec<f32>, shape: &[usize]) -> Self {
    Self {
      data: data.into_boxed_slice(),
      shape: shape.into(),
    }
  }

  /// 按行构造 `[N, C]` 张量
  pub fn from_rows<const C: usize>(rows: &[[f32; C]]) -> Self {
    let data = rows.iter().flatten().copied().collect();
    Self::new(data, &[rows.len(), C])
  }

  /// 没有候选框的 `[0, columns]` 张量
  pub fn empty(columns: usize) -> Self {
    Self::new(Vec::new(), &[0, columns])
  }

  pub fn data(&self) -> &[f32] {
    &self.data
  }

  pub fn shape(&self) -> &[usize] {
    &self.shape
  }

  pub(crate) fn candidates(
    &self,
    layout: TensorLayout,
    expected_columns: usize,
  ) -> Result<CandidateTable<'_>, TensorError> {
    let &[d0, d1] = &*self.shape else {
      return Err(TensorError::Rank(self.shape.len()));
    };

    let (rows, cols) = match layout {
      TensorLayout::Rows => (d0, d1),
      TensorLayout::Columns => (d1, d0),
    };

    if cols != expected_columns {
      return Err(TensorError::ColumnCount {
        expected: expected_columns,
        actual: cols,
      });
    }

    if d0.checked_mul(d1) != Some(self.data.len()) {
      return Err(TensorError::LengthMismatch {
        shape: self.shape.to_vec(),
        len: self.data.len(),
      });
    }

    Ok(CandidateTable {
      data: &self.data,
      rows,
      cols,
      layout,
    })
  }
}

/// 已校验形状的候选框表
pub(crate) struct CandidateTable<'a> {
  data: &'a [f32],
  rows: usize,
  cols: usize,
  layout: TensorLayout,
}

impl CandidateTable<'_> {
  pub(crate) fn len(&self) -> usize {
    self.rows
  }

  /// 按候选框顺序逐行访问
  pub(crate) fn for_each_row(&self, mut f: impl FnMut(&[f32])) {
    match self.layout {
      TensorLayout::Rows => {
        if self.cols == 0 {
          return;
        }
        self.data.chunks_exact(self.cols).for_each(f);
      }
      TensorLayout::Columns => {
        let mut row = vec![0.0f32; self.cols];
        for i in 0..self.rows {
          for (c, value) in row.iter_mut().enumerate() {
            *value = self.data[c * self.rows + i];
          }
          f(&row);
        }
      }
    }
  }
}

/// 将一行 `[cx, cy, w, h, score, ...]` 解码为模型空间的检测框
#[derive(Debug, Clone, Copy)]
pub struct BoxDecoder {
  layout: ScoreLayout,
  num_classes: usize,
}

impl BoxDecoder {
  pub fn new(layout: ScoreLayout, num_classes: usize) -> Self {
    Self {
      layout,
      num_classes,
    }
  }

  pub fn expected_columns(&self) -> usize {
    match self.layout {
      ScoreLayout::ClassId => BOX_COLUMNS + 1,
      _ => BOX_COLUMNS + self.num_classes,
    }
  }

  /// 格式错误的候选框返回 [`Detection::rejected`]
  pub fn decode(&self, row: &[f32]) -> Detection<ModelSpace> {
    self.try_decode(row).unwrap_or_else(Detection::rejected)
  }

  /// 格式错误的候选框返回 `None`，与阈值无关
  pub fn try_decode(&self, row: &[f32]) -> Option<Detection<ModelSpace>> {
    if row.len() != self.expected_columns() || row.iter().any(|v| !v.is_finite()) {
      return None;
    }

    let (cx, cy, w, h, objectness) = (row[0], row[1], row[2], row[3], row[4]);
    if w < 0.0 || h < 0.0 {
      return None;
    }

    let classes = &row[BOX_COLUMNS..];
    let (score, class_id) = match self.layout {
      ScoreLayout::ClassId => (objectness, self.class_index(classes[0])?),
      ScoreLayout::Probabilities => argmax(classes),
      ScoreLayout::Objectness => {
        let (best, id) = argmax(classes);
        (objectness * best, id)
      }
      ScoreLayout::Logits => {
        let (best, id) = argmax(classes);
        (sigmoid(best), id)
      }
    };

    if !(0.0..=1.0).contains(&score) {
      return None;
    }
    Some(Detection::new(cx - w / 2.0, cy - h / 2.0, w, h, score, class_id))
  }

  fn class_index(&self, value: f32) -> Option<u32> {
    if value < 0.0 || value.fract() != 0.0 || value as usize >= self.num_classes {
      return None;
    }
    Some(value as u32)
  }
}

/// 最大值及其下标，相等时取最小下标
fn argmax(values: &[f32]) -> (f32, u32) {
  let mut best = f32::NEG_INFINITY;
  let mut index = 0usize;
  for (i, &v) in values.iter().enumerate() {
    if v > best {
      best = v;
      index = i;
    }
  }
  (best, index as u32)
}

fn sigmoid(x: f32) -> f32 {
  1.0 / (1.0 + (-x).exp())
}
