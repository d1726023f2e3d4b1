// 该文件是 Multitask-Yolo（多任务 YOLO 后处理）项目的一部分。
// src/detector.rs - 多任务检测器
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

use std::{sync::Mutex, time::Instant};

use rayon::prelude::*;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::{
  config::{ConfigError, DetectorConfig, HeadConfig},
  frame::Frame,
  layout::{BBox, FilterParams, Float2},
  model::{DetectItem, DetectResult, Model},
  nms::apply_nms,
  postprocess::{Backend, PostProcessError, PostProcessor},
};

/// 计时的滑动平均系数
const TIME_SMOOTHING: f64 = 0.1;
/// 避免 NMS 耗时为零时除零
const FPS_EPSILON: f64 = 1e-5;

#[derive(Error, Debug)]
pub enum DetectorError {
  #[error("配置错误: {0}")]
  Config(#[from] ConfigError),
  #[error("检测头 {0} 没有输出")]
  MissingHead(u32),
  #[error("检测头 {task_id} 后处理失败: {source}")]
  PostProcess {
    task_id: u32,
    #[source]
    source: PostProcessError,
  },
}

/// 由图像尺寸与模型输入尺寸计算坐标缩放系数
pub fn frame_factor(frame_width: u32, frame_height: u32, input_width: u32, input_height: u32) -> Float2 {
  Float2::new(
    frame_width as f32 / input_width as f32,
    frame_height as f32 / input_height as f32,
  )
}

/// 各阶段耗时（秒）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ComputedTime {
  pub load: f64,
  pub post_proc: f64,
  pub nms: f64,
}

impl Default for ComputedTime {
  fn default() -> Self {
    Self {
      load: 1.0,
      post_proc: 1.0,
      nms: 1.0,
    }
  }
}

impl ComputedTime {
  pub fn all(&self) -> f64 {
    self.load + self.post_proc + self.nms
  }

  /// 指数滑动平均，`coef` 为新样本的权重
  pub fn update(&mut self, new: &ComputedTime, coef: f64) {
    self.load = new.load * coef + self.load * (1.0 - coef);
    self.post_proc = new.post_proc * coef + self.post_proc * (1.0 - coef);
    self.nms = new.nms * coef + self.nms * (1.0 - coef);
  }

  pub fn fps(&self) -> StageFps {
    StageFps {
      all: 1.0 / self.all(),
      load: 1.0 / self.load,
      post_proc: 1.0 / self.post_proc,
      nms: 1.0 / (self.nms + FPS_EPSILON),
    }
  }
}

#[derive(Debug, Clone, Copy)]
pub struct StageFps {
  pub all: f64,
  pub load: f64,
  pub post_proc: f64,
  pub nms: f64,
}

impl std::fmt::Display for StageFps {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    write!(
      f,
      "总计 {:.0} fps, 读取 {:.0} fps, 后处理 {:.0} fps, NMS {:.0} fps",
      self.all, self.load, self.post_proc, self.nms
    )
  }
}

pub struct MultiTaskDetector {
  config: DetectorConfig,
  processor: Box<dyn PostProcessor>,
  computed_time: Mutex<ComputedTime>,
}

impl MultiTaskDetector {
  pub fn new(config: DetectorConfig) -> Result<Self, DetectorError> {
    config.validate()?;
    let processor = config.backend.processor();
    info!(
      "创建检测器: 后端 {}, {} 个检测头, 输入 {}x{}, 锚点数 {}",
      config.backend,
      config.heads.len(),
      config.input_width,
      config.input_height,
      config.anchors
    );
    Ok(Self {
      config,
      processor,
      computed_time: Mutex::new(ComputedTime::default()),
    })
  }

  pub fn with_processor(mut self, processor: Box<dyn PostProcessor>) -> Self {
    self.processor = processor;
    self
  }

  pub fn config(&self) -> &DetectorConfig {
    &self.config
  }

  pub fn backend(&self) -> Backend {
    self.config.backend
  }

  /// 平滑后的各阶段耗时
  pub fn computed_time(&self) -> ComputedTime {
    *self
      .computed_time
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
  }

  fn params(&self, head: &HeadConfig, factor: Float2) -> FilterParams {
    FilterParams::new(
      head.confidence_threshold,
      self.config.anchors as i32,
      factor,
      head.num_classes(),
      head.num_kpts,
      head.task_id,
    )
  }

  /// 并行后处理所有检测头，再逐头做 NMS；结果按配置中的检测头顺序拼接
  pub fn detect(&self, frame: &Frame, factor: Float2) -> Result<(Vec<BBox>, ComputedTime), DetectorError> {
    for head in &frame.heads {
      if self.config.head(head.task_id).is_none() {
        warn!("帧 {}: 检测头 {} 未配置, 已跳过", frame.index, head.task_id);
      }
    }

    let inputs = self
      .config
      .heads
      .iter()
      .map(|head| {
        frame
          .head(head.task_id)
          .map(|prediction| (head, prediction))
          .ok_or(DetectorError::MissingHead(head.task_id))
      })
      .collect::<Result<Vec<_>, _>>()?;

    let start = Instant::now();
    let per_head = inputs
      .par_iter()
      .map(|&(head, prediction)| {
        let params = self.params(head, factor);
        self
          .processor
          .apply(prediction, &params)
          .map(|boxes| (head, boxes))
          .map_err(|source| DetectorError::PostProcess {
            task_id: head.task_id,
            source,
          })
      })
      .collect::<Result<Vec<_>, _>>()?;
    let post_proc = start.elapsed();

    let start = Instant::now();
    let mut boxes = Vec::new();
    for (head, candidates) in per_head {
      let before = candidates.len();
      let kept = apply_nms(candidates, head.iou_max);
      debug!(
        "帧 {}: 检测头 {} ({}) NMS {} -> {}",
        frame.index,
        head.task_id,
        head.name,
        before,
        kept.len()
      );
      boxes.extend(kept);
    }
    let nms = start.elapsed();

    let this_frame = ComputedTime {
      load: frame.load_time.as_secs_f64(),
      post_proc: post_proc.as_secs_f64(),
      nms: nms.as_secs_f64(),
    };
    self
      .computed_time
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner())
      .update(&this_frame, TIME_SMOOTHING);

    Ok((boxes, this_frame))
  }
}

impl Model for MultiTaskDetector {
  type Input = Frame;
  type Output = DetectResult;
  type Error = DetectorError;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    let factor = frame_factor(
      input.width,
      input.height,
      self.config.input_width,
      self.config.input_height,
    );
    debug!(
      "帧 {}: 尺寸 {}x{}, 缩放系数 ({:.3}, {:.3})",
      input.index, input.width, input.height, factor.x, factor.y
    );

    let (boxes, elapsed) = self.detect(input, factor)?;
    debug!(
      "帧 {}: 后处理 {:.3} ms, NMS {:.3} ms",
      input.index,
      elapsed.post_proc * 1e3,
      elapsed.nms * 1e3
    );

    let items = boxes
      .iter()
      .filter_map(|bbox| {
        self
          .config
          .head(bbox.task_id)
          .map(|head| DetectItem::new(bbox, head))
      })
      .collect::<Vec<_>>();

    Ok(DetectResult {
      frame_index: input.index,
      items: items.into_boxed_slice(),
      boxes,
    })
  }
}
