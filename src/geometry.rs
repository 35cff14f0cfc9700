// 该文件是 Duizhun （对准） 项目的一部分。
// src/geometry.rs - 画面几何与坐标映射
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

use crate::model::Detection;
use crate::space::{DisplaySpace, ModelSpace, NativeSpace};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
  #[error("{name} 必须为正有限数, 实际为 {value}")]
  InvalidDimension { name: &'static str, value: f32 },
  #[error("模型输入尺寸必须为正有限数, 实际为 {0}")]
  InvalidModelInputSize(f32),
}

/// 当前帧的原始分辨率与屏幕显示区域
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct FrameGeometry {
  pub native_width: f32,
  pub native_height: f32,
  pub displayed_width: f32,
  pub displayed_height: f32,
}

impl FrameGeometry {
  pub fn new(native_width: f32, native_height: f32, displayed_width: f32, displayed_height: f32) -> Self {
    Self {
      native_width,
      native_height,
      displayed_width,
      displayed_height,
    }
  }

  pub fn validate(&self) -> Result<(), GeometryError> {
    for (name, value) in [
      ("native_width", self.native_width),
      ("native_height", self.native_height),
      ("displayed_width", self.displayed_width),
      ("displayed_height", self.displayed_height),
    ] {
      if !(value.is_finite() && value > 0.0) {
        return Err(GeometryError::InvalidDimension { name, value });
      }
    }
    Ok(())
  }

  /// 计算显示区域实际可见的原始帧矩形（cover 模式，居中裁剪）
  pub fn cover_crop(&self) -> Result<CoverCrop, GeometryError> {
    self.validate()?;

    let native_aspect = self.native_width / self.native_height;
    let displayed_aspect = self.displayed_width / self.displayed_height;

    let crop = if native_aspect > displayed_aspect {
      // 原始帧更宽，左右裁剪
      let visible_width = self.native_height * (self.displayed_width / self.displayed_height);
      CoverCrop {
        source_x: (self.native_width - visible_width) / 2.0,
        source_y: 0.0,
        visible_width,
        visible_height: self.native_height,
      }
    } else {
      // 原始帧更高或比例相同，上下裁剪
      let visible_height = self.native_width * (self.displayed_height / self.displayed_width);
      CoverCrop {
        source_x: 0.0,
        source_y: (self.native_height - visible_height) / 2.0,
        visible_width: self.native_width,
        visible_height,
      }
    };

    Ok(crop)
  }
}

/// 原始帧中可见的区域，单位为原始帧像素
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoverCrop {
  pub source_x: f32,
  pub source_y: f32,
  pub visible_width: f32,
  pub visible_height: f32,
}

/// 原始帧上的整数像素裁剪区域，供拍照裁剪使用
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
  pub x: u32,
  pub y: u32,
  pub width: u32,
  pub height: u32,
}

/// 模型空间 -> 原始帧空间 -> 显示空间
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateMapper {
  model_input_size: f32,
  geometry: FrameGeometry,
  crop: CoverCrop,
}

impl CoordinateMapper {
  pub fn new(model_input_size: f32, geometry: FrameGeometry) -> Result<Self, GeometryError> {
    if !(model_input_size.is_finite() && model_input_size > 0.0) {
      return Err(GeometryError::InvalidModelInputSize(model_input_size));
    }
    let crop = geometry.cover_crop()?;
    Ok(Self {
      model_input_size,
      geometry,
      crop,
    })
  }

  pub fn geometry(&self) -> &FrameGeometry {
    &self.geometry
  }

  pub fn crop(&self) -> &CoverCrop {
    &self.crop
  }

  pub fn model_to_native(&self, det: &Detection<ModelSpace>) -> Detection<NativeSpace> {
    let scale_x = self.geometry.native_width / self.model_input_size;
    let scale_y = self.geometry.native_height / self.model_input_size;
    Detection::new(
      det.x * scale_x,
      det.y * scale_y,
      det.width * scale_x,
      det.height * scale_y,
      det.score,
      det.class_id,
    )
  }

  pub fn native_to_display(&self, det: &Detection<NativeSpace>) -> Detection<DisplaySpace> {
    let CoverCrop {
      source_x,
      source_y,
      visible_width,
      visible_height,
    } = self.crop;
    let (dw, dh) = (self.geometry.displayed_width, self.geometry.displayed_height);

    Detection::new(
      (det.x - source_x) / visible_width * dw,
      (det.y - source_y) / visible_height * dh,
      det.width / visible_width * dw,
      det.height / visible_height * dh,
      det.score,
      det.class_id,
    )
  }

  pub fn display_to_native(&self, det: &Detection<DisplaySpace>) -> Detection<NativeSpace> {
    let CoverCrop {
      source_x,
      source_y,
      visible_width,
      visible_height,
    } = self.crop;
    let (dw, dh) = (self.geometry.displayed_width, self.geometry.displayed_height);

    Detection::new(
      det.x / dw * visible_width + source_x,
      det.y / dh * visible_height + source_y,
      det.width / dw * visible_width,
      det.height / dh * visible_height,
      det.score,
      det.class_id,
    )
  }

  /// 检测框与原始帧的交集，向外取整；交集为空时返回 `None`
  pub fn crop_rect(&self, det: &Detection<NativeSpace>) -> Option<CropRect> {
    let x0 = det.x.floor().max(0.0);
    let y0 = det.y.floor().max(0.0);
    let x1 = det.x_max().ceil().min(self.geometry.native_width.floor());
    let y1 = det.y_max().ceil().min(self.geometry.native_height.floor());

    if !(x1 > x0 && y1 > y0) {
      return None;
    }

    Some(CropRect {
      x: x0 as u32,
      y: y0 as u32,
      width: (x1 - x0) as u32,
      height: (y1 - y0) as u32,
    })
  }
}
