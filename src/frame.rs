// 该文件是 Multitask-Yolo（多任务 YOLO 后处理）项目的一部分。
// src/frame.rs - 单帧模型输出
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

use std::time::Duration;

use crate::prediction::Prediction;

#[derive(Debug, Clone)]
pub struct HeadOutput {
  pub task_id: u32,
  pub prediction: Prediction,
}

/// 一帧图像经过模型后得到的全部检测头输出
#[derive(Debug, Clone)]
pub struct Frame {
  pub index: u64,
  /// 原始图像尺寸，用于把模型坐标缩放回图像坐标
  pub width: u32,
  pub height: u32,
  pub heads: Vec<HeadOutput>,
  /// 读取该帧所花的时间
  pub load_time: Duration,
}

impl Frame {
  pub fn new(index: u64, width: u32, height: u32) -> Self {
    Self {
      index,
      width,
      height,
      heads: Vec::new(),
      load_time: Duration::ZERO,
    }
  }

  pub fn with_head(mut self, task_id: u32, prediction: Prediction) -> Self {
    self.heads.push(HeadOutput {
      task_id,
      prediction,
    });
    self
  }

  pub fn head(&self, task_id: u32) -> Option<&Prediction> {
    self
      .heads
      .iter()
      .find(|h| h.task_id == task_id)
      .map(|h| &h.prediction)
  }
}
