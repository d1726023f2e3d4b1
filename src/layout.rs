// 该文件是 Multitask-Yolo（多任务 YOLO 后处理）项目的一部分。
// src/layout.rs - GPU 内核数据交换布局
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

//! 与后处理内核共享的定长结构体。
//!
//! 内核按偏移量而非字段名读取这些结构体，所以字段顺序、宽度与对齐
//! 必须与 C 头文件完全一致，见文件末尾的编译期断言。

use std::mem::{align_of, offset_of, size_of};

use bytemuck::{Pod, Zeroable};
use serde::Serialize;
use thiserror::Error;

/// 单个框最多携带的关键点槽位数
pub const MAX_KPTS: usize = 51;
/// 单个锚点原始输出的长度
pub const TENSOR_VALUES: usize = 23;
/// 框坐标通道数 (cx, cy, w, h)
pub const NUM_COORDS: u32 = 4;

#[derive(Error, Debug, PartialEq)]
pub enum LayoutError {
  #[error("关键点数量 {0} 超过上限 51")]
  KeypointOverflow(u32),
  #[error("通道步长必须为正数, 实际为 {0}")]
  InvalidStride(i32),
  #[error("参数需要 {required} 个通道, 张量只有 {channels} 个")]
  ChannelMismatch { required: usize, channels: usize },
  #[error("张量长度必须为 23, 实际为 {0}")]
  TensorLength(usize),
  #[error("缓冲区长度 {0} 不是 BBox 大小的整数倍")]
  BufferLength(usize),
  #[error("内核输出数量 {count} 超出缓冲区容量 {capacity}")]
  CountOverflow { count: i32, capacity: usize },
}

/// 对应 `simd_float2`：两个 f32，按 8 字节对齐
#[repr(C, align(8))]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Float2 {
  pub x: f32,
  pub y: f32,
}

// SAFETY: 两个 f32 恰好填满 8 字节，没有填充，全零是合法值
unsafe impl Zeroable for Float2 {}
unsafe impl Pod for Float2 {}

impl Float2 {
  pub const ONE: Float2 = Float2 { x: 1.0, y: 1.0 };

  pub fn new(x: f32, y: f32) -> Self {
    Self { x, y }
  }
}

impl Default for Float2 {
  fn default() -> Self {
    Self::ONE
  }
}

/// 单次后处理调用的参数，作为内核的第 1 号参数传入
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FilterParams {
  pub confidence_threshold: f32,
  /// 相邻通道在预测缓冲区中的距离，即每个通道的锚点数
  pub stride: i32,
  pub factor: Float2,
  pub number_of_coords: u32,
  pub number_of_classes: u32,
  pub number_of_kpts: u32,
  pub task_id: u32,
}

impl FilterParams {
  pub fn new(
    confidence_threshold: f32,
    stride: i32,
    factor: Float2,
    number_of_classes: u32,
    number_of_kpts: u32,
    task_id: u32,
  ) -> Self {
    Self {
      confidence_threshold,
      stride,
      factor,
      number_of_coords: NUM_COORDS,
      number_of_classes,
      number_of_kpts,
      task_id,
    }
  }

  /// 每个锚点所需的通道总数
  pub fn required_channels(&self) -> usize {
    self.number_of_coords as usize + self.number_of_classes as usize + self.number_of_kpts as usize
  }

  pub fn validate(&self, channels: usize) -> Result<(), LayoutError> {
    if self.number_of_kpts as usize > MAX_KPTS {
      return Err(LayoutError::KeypointOverflow(self.number_of_kpts));
    }
    if self.stride <= 0 {
      return Err(LayoutError::InvalidStride(self.stride));
    }
    let required = self.required_channels();
    if required > channels {
      return Err(LayoutError::ChannelMismatch { required, channels });
    }
    Ok(())
  }

  pub fn as_bytes(&self) -> &[u8] {
    bytemuck::bytes_of(self)
  }
}

/// 一个检测结果
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct BBox {
  pub class_id: u32,
  pub confidence: f32,
  pub x: i32,
  pub y: i32,
  pub h: i32,
  pub w: i32,
  pub num_kpts: u32,
  /// 产生该框的检测头
  pub task_id: u32,
  /// 只有前 `num_kpts` 个有效，其余为零填充
  pub kpts: [i32; MAX_KPTS],
}

impl Default for BBox {
  fn default() -> Self {
    Self::zeroed()
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Keypoint {
  pub x: i32,
  pub y: i32,
  pub visible: bool,
}

impl BBox {
  /// 有效的关键点槽位，`num_kpts` 越界时截断到 [`MAX_KPTS`]
  pub fn kpts(&self) -> &[i32] {
    let n = (self.num_kpts as usize).min(MAX_KPTS);
    &self.kpts[..n]
  }

  /// 按 (x, y, 可见性) 三元组解析关键点，不完整的尾部被忽略
  pub fn keypoints(&self) -> impl Iterator<Item = Keypoint> + '_ {
    self.kpts().chunks_exact(3).map(|t| Keypoint {
      x: t[0],
      y: t[1],
      visible: t[2] == 1,
    })
  }

  pub fn visible_keypoints(&self) -> impl Iterator<Item = Keypoint> + '_ {
    self.keypoints().filter(|k| k.visible)
  }

  pub fn area(&self) -> i64 {
    self.w as i64 * self.h as i64
  }

  /// 读回内核输出：`count` 为计数缓冲区中的值，`bytes` 为框缓冲区
  pub fn read_back(count: i32, bytes: &[u8]) -> Result<Vec<BBox>, LayoutError> {
    let size = size_of::<BBox>();
    if bytes.len() % size != 0 {
      return Err(LayoutError::BufferLength(bytes.len()));
    }
    let capacity = bytes.len() / size;
    if count < 0 || count as usize > capacity {
      return Err(LayoutError::CountOverflow { count, capacity });
    }
    // 缓冲区不一定按 4 字节对齐，逐个拷贝
    Ok(bytemuck::pod_collect_to_vec(&bytes[..count as usize * size]))
  }

  pub fn slice_as_bytes(boxes: &[BBox]) -> &[u8] {
    bytemuck::cast_slice(boxes)
  }
}

/// 单个锚点的原始输出列
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Tensor {
  pub values: [f32; TENSOR_VALUES],
}

impl Default for Tensor {
  fn default() -> Self {
    Self::zeroed()
  }
}

impl Tensor {
  pub fn from_slice(values: &[f32]) -> Result<Self, LayoutError> {
    let values: [f32; TENSOR_VALUES] = values
      .try_into()
      .map_err(|_| LayoutError::TensorLength(values.len()))?;
    Ok(Self { values })
  }

  /// [cx, cy, w, h]
  pub fn coords(&self) -> &[f32] {
    &self.values[..NUM_COORDS as usize]
  }

  pub fn class_scores(&self, params: &FilterParams) -> Result<&[f32], LayoutError> {
    let start = params.number_of_coords as usize;
    let end = start + params.number_of_classes as usize;
    if end > TENSOR_VALUES {
      return Err(LayoutError::ChannelMismatch {
        required: end,
        channels: TENSOR_VALUES,
      });
    }
    Ok(&self.values[start..end])
  }
}

const _: () = {
  assert!(size_of::<Float2>() == 8);
  assert!(align_of::<Float2>() == 8);

  assert!(size_of::<FilterParams>() == 32);
  assert!(align_of::<FilterParams>() == 8);
  assert!(offset_of!(FilterParams, confidence_threshold) == 0);
  assert!(offset_of!(FilterParams, stride) == 4);
  assert!(offset_of!(FilterParams, factor) == 8);
  assert!(offset_of!(FilterParams, number_of_coords) == 16);
  assert!(offset_of!(FilterParams, number_of_classes) == 20);
  assert!(offset_of!(FilterParams, number_of_kpts) == 24);
  assert!(offset_of!(FilterParams, task_id) == 28);

  assert!(size_of::<BBox>() == 236);
  assert!(align_of::<BBox>() == 4);
  assert!(offset_of!(BBox, class_id) == 0);
  assert!(offset_of!(BBox, confidence) == 4);
  assert!(offset_of!(BBox, x) == 8);
  assert!(offset_of!(BBox, y) == 12);
  assert!(offset_of!(BBox, h) == 16);
  assert!(offset_of!(BBox, w) == 20);
  assert!(offset_of!(BBox, num_kpts) == 24);
  assert!(offset_of!(BBox, task_id) == 28);
  assert!(offset_of!(BBox, kpts) == 32);

  assert!(size_of::<Tensor>() == 4 * TENSOR_VALUES);
};

#[cfg(test)]
mod tests {
  use super::*;

  fn body_box(kpts: &[i32]) -> BBox {
    let mut bbox = BBox {
      class_id: 0,
      confidence: 0.9,
      x: 10,
      y: 20,
      h: 30,
      w: 40,
      num_kpts: kpts.len() as u32,
      task_id: 1,
      ..BBox::default()
    };
    bbox.kpts[..kpts.len()].copy_from_slice(kpts);
    bbox
  }

  #[test]
  fn filter_params_bytes_follow_header_order() {
    let params = FilterParams::new(0.5, 1470, Float2::new(2.0, 3.0), 19, 0, 1);
    let bytes = params.as_bytes();
    assert_eq!(bytes.len(), 32);
    assert_eq!(&bytes[0..4], &0.5f32.to_ne_bytes());
    assert_eq!(&bytes[4..8], &1470i32.to_ne_bytes());
    assert_eq!(&bytes[8..12], &2.0f32.to_ne_bytes());
    assert_eq!(&bytes[12..16], &3.0f32.to_ne_bytes());
    assert_eq!(&bytes[16..20], &4u32.to_ne_bytes());
    assert_eq!(&bytes[20..24], &19u32.to_ne_bytes());
    assert_eq!(&bytes[28..32], &1u32.to_ne_bytes());
  }

  #[test]
  fn validate_rejects_bad_params() {
    let params = FilterParams::new(0.5, 1470, Float2::ONE, 1, 52, 1);
    assert_eq!(params.validate(100), Err(LayoutError::KeypointOverflow(52)));

    let params = FilterParams::new(0.5, 0, Float2::ONE, 1, 0, 1);
    assert_eq!(params.validate(100), Err(LayoutError::InvalidStride(0)));

    let params = FilterParams::new(0.5, 1470, Float2::ONE, 19, 0, 0);
    assert_eq!(
      params.validate(22),
      Err(LayoutError::ChannelMismatch {
        required: 23,
        channels: 22
      })
    );
    assert!(params.validate(23).is_ok());

    let params = FilterParams::new(0.5, 1470, Float2::ONE, u32::MAX, 0, 0);
    assert_eq!(params.required_channels(), u32::MAX as usize + 4);
    assert!(matches!(
      params.validate(23),
      Err(LayoutError::ChannelMismatch { .. })
    ));
  }

  #[test]
  fn keypoints_ignore_padding_and_partial_triples() {
    let bbox = body_box(&[1, 2, 1, 3, 4, 0, 5]);
    let kps: Vec<_> = bbox.keypoints().collect();
    assert_eq!(kps.len(), 2);
    assert_eq!(kps[0], Keypoint { x: 1, y: 2, visible: true });
    assert!(!kps[1].visible);
    assert_eq!(bbox.visible_keypoints().count(), 1);
  }

  #[test]
  fn bbox_bytes_cover_full_keypoint_array() {
    let mut bbox = body_box(&[7, 8, 1]);
    bbox.kpts[MAX_KPTS - 1] = -3;
    let bytes = bytemuck::bytes_of(&bbox);
    assert_eq!(bytes.len(), 236);
    assert_eq!(&bytes[232..236], &(-3i32).to_ne_bytes());
    assert_eq!(bytemuck::pod_read_unaligned::<BBox>(bytes), bbox);
    assert!(bytemuck::zeroed::<BBox>().kpts.iter().all(|&v| v == 0));
  }

  #[test]
  fn keypoints_clamp_oversized_count() {
    let mut bbox = body_box(&[]);
    bbox.num_kpts = 200;
    assert_eq!(bbox.kpts().len(), MAX_KPTS);
    assert_eq!(bbox.keypoints().count(), MAX_KPTS / 3);
  }

  #[test]
  fn read_back_returns_counted_prefix() {
    let boxes = [body_box(&[1, 2, 1]), body_box(&[]), BBox::default()];
    let bytes = BBox::slice_as_bytes(&boxes).to_vec();

    let read = BBox::read_back(2, &bytes).unwrap();
    assert_eq!(read.len(), 2);
    assert_eq!(read[0], boxes[0]);
    assert_eq!(read[1], boxes[1]);

    assert_eq!(
      BBox::read_back(4, &bytes),
      Err(LayoutError::CountOverflow {
        count: 4,
        capacity: 3
      })
    );
    assert!(BBox::read_back(-1, &bytes).is_err());
    assert_eq!(
      BBox::read_back(0, &bytes[..10]),
      Err(LayoutError::BufferLength(10))
    );
  }

  #[test]
  fn tensor_accessors() {
    let values: Vec<f32> = (0..23).map(|v| v as f32).collect();
    let tensor = Tensor::from_slice(&values).unwrap();
    assert_eq!(tensor.coords(), &[0.0, 1.0, 2.0, 3.0]);

    let params = FilterParams::new(0.3, 1470, Float2::ONE, 19, 0, 0);
    let scores = tensor.class_scores(&params).unwrap();
    assert_eq!(scores.len(), 19);
    assert_eq!(scores[0], 4.0);

    assert_eq!(
      Tensor::from_slice(&values[..5]),
      Err(LayoutError::TensorLength(5))
    );
  }
}
