// 该文件是 Multitask-Yolo（多任务 YOLO 后处理）项目的一部分。
// src/postprocess.rs - 置信度过滤与框解码
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

use std::{fmt, str::FromStr};

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::{
  layout::{BBox, FilterParams, LayoutError},
  prediction::Prediction,
};

/// 内核每个线程组的默认线程数
pub const DEFAULT_THREADGROUP_WIDTH: usize = 32;
/// 关键点可见性的判定阈值
const KPT_VISIBLE_THRESH: f32 = 0.5;

#[derive(Error, Debug, PartialEq)]
pub enum PostProcessError {
  #[error("参数无效: {0}")]
  InvalidParams(#[from] LayoutError),
  #[error("通道步长 {stride} 与锚点数 {anchors} 不一致")]
  StrideMismatch { stride: i32, anchors: usize },
  #[error("未知的后处理后端: {0}")]
  UnknownBackend(String),
}

pub trait PostProcessor: Send + Sync {
  fn apply(
    &self,
    prediction: &Prediction,
    params: &FilterParams,
  ) -> Result<Vec<BBox>, PostProcessError>;
}

fn check(prediction: &Prediction, params: &FilterParams) -> Result<(), PostProcessError> {
  params.validate(prediction.channels())?;
  if params.stride as usize != prediction.anchors() {
    return Err(PostProcessError::StrideMismatch {
      stride: params.stride,
      anchors: prediction.anchors(),
    });
  }
  Ok(())
}

/// 在所有类别通道中取最大分数，返回 (类别, 分数)
#[inline]
fn best_class(prediction: &Prediction, anchor: usize, params: &FilterParams) -> (u32, f32) {
  let start = params.number_of_coords as usize;
  let end = start + params.number_of_classes as usize;

  let mut class_id = 0u32;
  let mut max_confidence = 0f32;
  for c in start..end {
    let confidence = prediction.get(c, anchor);
    if confidence > max_confidence {
      max_confidence = confidence;
      class_id = (c - start) as u32;
    }
  }
  (class_id, max_confidence)
}

/// 解码单个锚点，分数未超过阈值时返回 `None`
pub fn decode_box(prediction: &Prediction, anchor: usize, params: &FilterParams) -> Option<BBox> {
  let (class_id, confidence) = best_class(prediction, anchor, params);
  if confidence <= params.confidence_threshold {
    return None;
  }

  let factor = params.factor;
  let cx = prediction.get(0, anchor);
  let cy = prediction.get(1, anchor);
  let w = prediction.get(2, anchor);
  let h = prediction.get(3, anchor);

  let mut bbox = BBox {
    class_id,
    confidence,
    x: ((cx - 0.5 * w) * factor.x) as i32,
    y: ((cy - 0.5 * h) * factor.y) as i32,
    h: (h * factor.y) as i32,
    w: (w * factor.x) as i32,
    num_kpts: params.number_of_kpts,
    task_id: params.task_id,
    ..BBox::default()
  };

  let start = params.number_of_coords as usize + params.number_of_classes as usize;
  // 按关键点内的相对下标取 (x, y, 可见性)；只有 start % 3 == 2 的检测头
  // (如人体头 4 + 1) 与按绝对通道取模的解码结果相同
  for j in 0..params.number_of_kpts as usize {
    let value = prediction.get(start + j, anchor);
    bbox.kpts[j] = match j % 3 {
      0 => (value * factor.x) as i32,
      1 => (value * factor.y) as i32,
      _ => (value > KPT_VISIBLE_THRESH) as i32,
    };
  }

  Some(bbox)
}

/// 顺序遍历全部锚点
#[derive(Debug, Default, Clone, Copy)]
pub struct CpuPostProcessor;

impl PostProcessor for CpuPostProcessor {
  fn apply(
    &self,
    prediction: &Prediction,
    params: &FilterParams,
  ) -> Result<Vec<BBox>, PostProcessError> {
    check(prediction, params)?;
    let boxes: Vec<BBox> = (0..prediction.anchors())
      .filter_map(|n| decode_box(prediction, n, params))
      .collect();
    debug!("检测头 {}: CPU 解码得到 {} 个框", params.task_id, boxes.len());
    Ok(boxes)
  }
}

/// 与内核相同的调度方式：每个锚点一个工作项，按线程组分发到线程池
#[derive(Debug, Clone, Copy)]
pub struct ParallelPostProcessor {
  threadgroup_width: usize,
}

impl Default for ParallelPostProcessor {
  fn default() -> Self {
    Self {
      threadgroup_width: DEFAULT_THREADGROUP_WIDTH,
    }
  }
}

impl ParallelPostProcessor {
  pub fn with_threadgroup_width(mut self, width: usize) -> Self {
    self.threadgroup_width = width.max(1);
    self
  }

  pub fn threadgroup_width(&self) -> usize {
    self.threadgroup_width
  }
}

impl PostProcessor for ParallelPostProcessor {
  fn apply(
    &self,
    prediction: &Prediction,
    params: &FilterParams,
  ) -> Result<Vec<BBox>, PostProcessError> {
    check(prediction, params)?;
    let boxes: Vec<BBox> = (0..prediction.anchors())
      .into_par_iter()
      .with_min_len(self.threadgroup_width)
      .filter_map(|n| decode_box(prediction, n, params))
      .collect();
    debug!(
      "检测头 {}: 并行解码得到 {} 个框 (线程组宽度 {})",
      params.task_id,
      boxes.len(),
      self.threadgroup_width
    );
    Ok(boxes)
  }
}

/// 先按内存顺序逐通道求出每个锚点的最大类别分数，只解码超过阈值的锚点
#[derive(Debug, Default, Clone, Copy)]
pub struct PrefilterPostProcessor;

impl PrefilterPostProcessor {
  fn max_class_scores(prediction: &Prediction, params: &FilterParams) -> Vec<f32> {
    let anchors = prediction.anchors();
    let start = params.number_of_coords as usize;
    let end = start + params.number_of_classes as usize;

    let mut best = vec![0f32; anchors];
    for row in prediction.as_slice()[start * anchors..end * anchors].chunks_exact(anchors) {
      for (b, &v) in best.iter_mut().zip(row) {
        if v > *b {
          *b = v;
        }
      }
    }
    best
  }
}

impl PostProcessor for PrefilterPostProcessor {
  fn apply(
    &self,
    prediction: &Prediction,
    params: &FilterParams,
  ) -> Result<Vec<BBox>, PostProcessError> {
    check(prediction, params)?;
    let best = Self::max_class_scores(prediction, params);
    let candidates: Vec<usize> = best
      .iter()
      .enumerate()
      .filter(|&(_, &score)| score > params.confidence_threshold)
      .map(|(n, _)| n)
      .collect();
    debug!(
      "检测头 {}: 预筛选保留 {}/{} 个锚点",
      params.task_id,
      candidates.len(),
      best.len()
    );

    Ok(
      candidates
        .into_iter()
        .filter_map(|n| decode_box(prediction, n, params))
        .collect(),
    )
  }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
  #[default]
  Cpu,
  Parallel,
  Prefilter,
}

impl Backend {
  pub fn processor(self) -> Box<dyn PostProcessor> {
    match self {
      Backend::Cpu => Box::new(CpuPostProcessor),
      Backend::Parallel => Box::new(ParallelPostProcessor::default()),
      Backend::Prefilter => Box::new(PrefilterPostProcessor),
    }
  }
}

impl FromStr for Backend {
  type Err = PostProcessError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "cpu" => Ok(Backend::Cpu),
      "parallel" | "gpu" => Ok(Backend::Parallel),
      "prefilter" => Ok(Backend::Prefilter),
      other => Err(PostProcessError::UnknownBackend(other.to_string())),
    }
  }
}

impl fmt::Display for Backend {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Backend::Cpu => "cpu",
      Backend::Parallel => "parallel",
      Backend::Prefilter => "prefilter",
    };
    f.write_str(name)
  }
}
