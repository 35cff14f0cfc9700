// 该文件是 Duizhun （对准） 项目的一部分。
// src/nms.rs - 非极大值抑制
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

use tracing::debug;

use crate::model::{Corners, Detection};
use crate::space::Space;

/// 贪心 NMS
///
/// 1. 丢弃 `score < score_threshold` 的框
/// 2. 按置信度降序排序，相同置信度按原始下标升序
/// 3. 依次取最高分的框，抑制与其 IoU 大于 `iou_threshold` 的其余框，
///    直到输出达到 `max_outputs`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NonMaxSuppressor {
  pub score_threshold: f32,
  pub iou_threshold: f32,
  pub max_outputs: usize,
  /// 只在同类别之间抑制
  pub class_aware: bool,
}

impl NonMaxSuppressor {
  pub fn new(score_threshold: f32, iou_threshold: f32, max_outputs: usize) -> Self {
    Self {
      score_threshold,
      iou_threshold,
      max_outputs,
      class_aware: false,
    }
  }

  pub fn with_class_aware(mut self, class_aware: bool) -> Self {
    self.class_aware = class_aware;
    self
  }

  /// 返回保留的检测框，按置信度降序
  pub fn suppress<S: Space>(&self, detections: &[Detection<S>]) -> Vec<Detection<S>> {
    // NaN 置信度在此处被过滤
    let mut order: Vec<usize> = (0..detections.len())
      .filter(|&i| detections[i].score >= self.score_threshold)
      .collect();
    order.sort_by(|&a, &b| {
      detections[b]
        .score
        .total_cmp(&detections[a].score)
        .then(a.cmp(&b))
    });

    let corners: Vec<Corners> = order.iter().map(|&i| Corners::of(&detections[i])).collect();
    let mut suppressed = vec![false; order.len()];
    let mut kept = Vec::with_capacity(self.max_outputs.min(order.len()));

    for i in 0..order.len() {
      if kept.len() >= self.max_outputs {
        break;
      }
      if suppressed[i] {
        continue;
      }

      let best = &detections[order[i]];
      kept.push(*best);

      for j in (i + 1)..order.len() {
        if suppressed[j] {
          continue;
        }
        if self.class_aware && detections[order[j]].class_id != best.class_id {
          continue;
        }
        if corners[i].iou(&corners[j]) > self.iou_threshold {
          suppressed[j] = true;
        }
      }
    }

    debug!(
      "NMS: 输入 {} 个, 阈值过滤后 {} 个, 保留 {} 个",
      detections.len(),
      order.len(),
      kept.len()
    );

    kept
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::space::ModelSpace;

  fn det(x: f32, y: f32, w: f32, h: f32, score: f32, class_id: u32) -> Detection<ModelSpace> {
    Detection::new(x, y, w, h, score, class_id)
  }

  #[test]
  fn test_nearly_identical_boxes_keep_higher_score() {
    let detections = vec![
      det(272.0, 272.0, 100.0, 100.0, 0.6, 0),
      det(270.0, 270.0, 100.0, 100.0, 0.9, 0),
    ];
    let kept = NonMaxSuppressor::new(0.5, 0.5, 100).suppress(&detections);
    assert_eq!(kept, vec![detections[1]]);
  }

  #[test]
  fn test_score_threshold_filters_first() {
    let detections = vec![
      det(0.0, 0.0, 10.0, 10.0, 0.3, 0),
      det(100.0, 100.0, 10.0, 10.0, 0.5, 0),
      det(200.0, 200.0, 10.0, 10.0, f32::NAN, 0),
    ];
    let kept = NonMaxSuppressor::new(0.5, 0.5, 100).suppress(&detections);
    assert_eq!(kept, vec![detections[1]]);
  }

  #[test]
  fn test_sorted_descending_with_stable_ties() {
    let detections = vec![
      det(0.0, 0.0, 10.0, 10.0, 0.6, 0),
      det(100.0, 0.0, 10.0, 10.0, 0.8, 1),
      det(200.0, 0.0, 10.0, 10.0, 0.6, 2),
      det(300.0, 0.0, 10.0, 10.0, 0.9, 3),
    ];
    let kept = NonMaxSuppressor::new(0.1, 0.5, 100).suppress(&detections);
    let ids: Vec<u32> = kept.iter().map(|d| d.class_id).collect();
    assert_eq!(ids, vec![3, 1, 0, 2]);
  }

  #[test]
  fn test_equal_scores_keep_earliest_candidate() {
    let detections = vec![
      det(0.0, 0.0, 10.0, 10.0, 0.7, 5),
      det(1.0, 1.0, 10.0, 10.0, 0.7, 6),
    ];
    let kept = NonMaxSuppressor::new(0.1, 0.5, 100).suppress(&detections);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].class_id, 5);
  }

  #[test]
  fn test_iou_equal_to_threshold_is_not_suppressed() {
    // IoU = 50 / (100 + 100 - 50) = 1/3
    let detections = vec![
      det(0.0, 0.0, 10.0, 10.0, 0.9, 0),
      det(5.0, 0.0, 10.0, 10.0, 0.8, 0),
    ];
    let iou = detections[0].iou(&detections[1]);
    let kept = NonMaxSuppressor::new(0.1, iou, 100).suppress(&detections);
    assert_eq!(kept.len(), 2);
    let kept = NonMaxSuppressor::new(0.1, iou - 1e-3, 100).suppress(&detections);
    assert_eq!(kept.len(), 1);
  }

  #[test]
  fn test_max_outputs_bounds_result() {
    let detections: Vec<_> = (0..10)
      .map(|i| det(i as f32 * 20.0, 0.0, 10.0, 10.0, 0.5 + i as f32 * 0.01, 0))
      .collect();
    let kept = NonMaxSuppressor::new(0.1, 0.5, 3).suppress(&detections);
    assert_eq!(kept, vec![detections[9], detections[8], detections[7]]);
    assert!(NonMaxSuppressor::new(0.1, 0.5, 0).suppress(&detections).is_empty());
  }

  #[test]
  fn test_class_aware_keeps_overlapping_other_class() {
    let detections = vec![
      det(0.0, 0.0, 10.0, 10.0, 0.9, 0),
      det(0.0, 0.0, 10.0, 10.0, 0.8, 1),
    ];
    let nms = NonMaxSuppressor::new(0.1, 0.5, 100);
    assert_eq!(nms.suppress(&detections).len(), 1);
    assert_eq!(nms.with_class_aware(true).suppress(&detections).len(), 2);
  }

  #[test]
  fn test_suppression_is_idempotent() {
    let detections: Vec<_> = (0..40)
      .map(|i| {
        let f = i as f32;
        det(
          (f * 7.3) % 50.0,
          (f * 3.1) % 40.0,
          10.0 + f % 5.0,
          12.0,
          ((f * 0.37) % 1.0).max(0.05),
          i % 3,
        )
      })
      .collect();
    let nms = NonMaxSuppressor::new(0.2, 0.4, 100);
    let once = nms.suppress(&detections);
    let twice = nms.suppress(&once);
    assert!(!once.is_empty());
    assert_eq!(once, twice);
  }

  #[test]
  fn test_empty_input() {
    let kept = NonMaxSuppressor::new(0.5, 0.5, 10).suppress::<ModelSpace>(&[]);
    assert!(kept.is_empty());
  }
}
