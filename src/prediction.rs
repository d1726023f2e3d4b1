// 该文件是 Multitask-Yolo（多任务 YOLO 后处理）项目的一部分。
// src/prediction.rs - 检测头原始输出
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

use thiserror::Error;

use crate::layout::{LayoutError, TENSOR_VALUES, Tensor};

#[derive(Error, Debug, PartialEq)]
pub enum PredictionError {
  #[error("预测形状 [1, {channels}, {anchors}] 需要 {expected} 个值, 实际为 {actual}")]
  ShapeMismatch {
    channels: usize,
    anchors: usize,
    expected: usize,
    actual: usize,
  },
  #[error("预测形状 [1, {channels}, {anchors}] 的元素个数溢出")]
  ShapeOverflow { channels: usize, anchors: usize },
  #[error("预测形状不能为空: [1, {channels}, {anchors}]")]
  EmptyShape { channels: usize, anchors: usize },
  #[error("锚点索引 {anchor} 越界, 锚点数为 {anchors}")]
  AnchorOutOfRange { anchor: usize, anchors: usize },
  #[error("布局错误: {0}")]
  Layout(#[from] LayoutError),
}

/// 单个检测头的输出，形状为 `[1, channels, anchors]`，按通道优先存储
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
  channels: usize,
  anchors: usize,
  data: Box<[f32]>,
}

impl Prediction {
  pub fn new(channels: usize, anchors: usize, data: Vec<f32>) -> Result<Self, PredictionError> {
    if channels == 0 || anchors == 0 {
      return Err(PredictionError::EmptyShape { channels, anchors });
    }
    let expected = channels
      .checked_mul(anchors)
      .ok_or(PredictionError::ShapeOverflow { channels, anchors })?;
    if data.len() != expected {
      return Err(PredictionError::ShapeMismatch {
        channels,
        anchors,
        expected,
        actual: data.len(),
      });
    }

    Ok(Self {
      channels,
      anchors,
      data: data.into_boxed_slice(),
    })
  }

  pub fn channels(&self) -> usize {
    self.channels
  }

  pub fn anchors(&self) -> usize {
    self.anchors
  }

  pub fn shape(&self) -> [usize; 3] {
    [1, self.channels, self.anchors]
  }

  #[inline]
  pub fn get(&self, channel: usize, anchor: usize) -> f32 {
    self.data[anchor + self.anchors * channel]
  }

  pub fn as_slice(&self) -> &[f32] {
    &self.data
  }

  /// 取出一个锚点的整列，仅适用于 23 通道的输出
  pub fn column(&self, anchor: usize) -> Result<Tensor, PredictionError> {
    if self.channels != TENSOR_VALUES {
      return Err(LayoutError::TensorLength(self.channels).into());
    }
    if anchor >= self.anchors {
      return Err(PredictionError::AnchorOutOfRange {
        anchor,
        anchors: self.anchors,
      });
    }
    let mut tensor = Tensor::default();
    for (c, value) in tensor.values.iter_mut().enumerate() {
      *value = self.get(c, anchor);
    }
    Ok(tensor)
  }
}
