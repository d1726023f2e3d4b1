// 该文件是 Multitask-Yolo（多任务 YOLO 后处理）项目的一部分。
// src/model.rs - 模型接口与检测结果
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

use serde::Serialize;

use crate::{
  config::HeadConfig,
  layout::{BBox, Keypoint},
};

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

impl<M: Model> Model for &M {
  type Input = M::Input;
  type Output = M::Output;
  type Error = M::Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error> {
    (**self).infer(input)
  }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DetectItem {
  pub task_id: u32,
  pub task: String,
  pub class_id: u32,
  pub label: String,
  pub score: f32,
  pub bbox: [i32; 4], // [x, y, w, h]，图像像素坐标
  #[serde(skip_serializing_if = "Vec::is_empty")]
  pub keypoints: Vec<Keypoint>,
}

impl DetectItem {
  pub fn new(bbox: &BBox, head: &HeadConfig) -> Self {
    Self {
      task_id: bbox.task_id,
      task: head.name.clone(),
      class_id: bbox.class_id,
      label: head.label(bbox.class_id).to_string(),
      score: bbox.confidence,
      bbox: [bbox.x, bbox.y, bbox.w, bbox.h],
      keypoints: bbox.keypoints().collect(),
    }
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectResult {
  pub frame_index: u64,
  pub items: Box<[DetectItem]>,
  /// 与内核布局一致的原始框
  #[serde(skip)]
  pub boxes: Vec<BBox>,
}

impl DetectResult {
  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }

  pub fn len(&self) -> usize {
    self.items.len()
  }
}
