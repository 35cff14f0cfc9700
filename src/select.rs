// 该文件是 Duizhun （对准） 项目的一部分。
// src/select.rs - 选择用户正在对准的目标
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

use crate::model::Detection;
use crate::space::DisplaySpace;

pub struct CenterSelector;

impl CenterSelector {
  /// 返回中心离显示区域中心最近的检测框下标，距离相同时取靠前者
  pub fn select(
    detections: &[Detection<DisplaySpace>],
    displayed_width: f32,
    displayed_height: f32,
  ) -> Option<usize> {
    let (vx, vy) = (displayed_width / 2.0, displayed_height / 2.0);

    let mut best: Option<(usize, f32)> = None;
    for (index, det) in detections.iter().enumerate() {
      let (cx, cy) = det.center();
      let distance = (cx - vx) * (cx - vx) + (cy - vy) * (cy - vy);
      match best {
        Some((_, d)) if d <= distance => {}
        _ => best = Some((index, distance)),
      }
    }

    best.map(|(index, _)| index)
  }
}
