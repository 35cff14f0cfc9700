// 该文件是 Duizhun （对准） 项目的一部分。
// src/space.rs - 坐标空间标记
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

//! 检测框所在的坐标空间。
//!
//! 每个 [`crate::model::Detection`] 都带有一个空间类型参数，
//! 不同空间的检测框不能混用，只能通过 [`crate::geometry::CoordinateMapper`] 转换。

mod sealed {
  pub trait Sealed {}
}

pub trait Space: sealed::Sealed + Copy + std::fmt::Debug + PartialEq + Send + Sync + 'static {}

/// 模型输入空间，例如 640x640
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelSpace;

/// 摄像头原始帧空间
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeSpace;

/// 屏幕显示空间（cover 裁剪后）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisplaySpace;

impl sealed::Sealed for ModelSpace {}
impl sealed::Sealed for NativeSpace {}
impl sealed::Sealed for DisplaySpace {}

impl Space for ModelSpace {}
impl Space for NativeSpace {}
impl Space for DisplaySpace {}
