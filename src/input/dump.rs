// 该文件是 Multitask-Yolo（多任务 YOLO 后处理）项目的一部分。
// src/input/dump.rs - 读取模型输出转储
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

use std::{
  path::{Path, PathBuf},
  time::Instant,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  prediction::{Prediction, PredictionError},
};

#[derive(Error, Debug)]
pub enum DumpInputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("转储解析错误: {0}")]
  ParseError(#[from] serde_json::Error),
  #[error("预测数据错误: {0}")]
  PredictionError(#[from] PredictionError),
  #[error("检测头 {0} 既没有 data 也没有 file")]
  MissingData(u32),
  #[error("原始数据文件 {0} 长度不是 4 的整数倍")]
  RawLength(PathBuf),
  #[error("目录中没有转储文件: {0}")]
  Empty(PathBuf),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadDump {
  pub task_id: u32,
  pub channels: usize,
  pub anchors: usize,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub data: Option<Vec<f32>>,
  /// 本机字节序的 f32 原始数据，相对于转储文件所在目录
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameDump {
  #[serde(default)]
  pub index: Option<u64>,
  pub frame_width: u32,
  pub frame_height: u32,
  pub heads: Vec<HeadDump>,
}

fn read_raw(path: &Path) -> Result<Vec<f32>, DumpInputError> {
  let bytes = std::fs::read(path)?;
  if bytes.len() % size_of::<f32>() != 0 {
    return Err(DumpInputError::RawLength(path.to_path_buf()));
  }
  Ok(bytemuck::pod_collect_to_vec::<u8, f32>(&bytes))
}

impl FrameDump {
  pub fn from_json_file(path: &Path) -> Result<Self, DumpInputError> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
  }

  /// `base` 为相对路径 `file` 的起点
  pub fn into_frame(self, base: &Path, fallback_index: u64) -> Result<Frame, DumpInputError> {
    let mut frame = Frame::new(
      self.index.unwrap_or(fallback_index),
      self.frame_width,
      self.frame_height,
    );
    for head in self.heads {
      let data = match (head.data, head.file) {
        (Some(data), _) => data,
        (None, Some(file)) => read_raw(&base.join(file))?,
        (None, None) => return Err(DumpInputError::MissingData(head.task_id)),
      };
      let prediction = Prediction::new(head.channels, head.anchors, data)?;
      frame = frame.with_head(head.task_id, prediction);
    }
    Ok(frame)
  }
}

pub struct DumpInput {
  files: Vec<PathBuf>,
}

impl FromUrlWithScheme for DumpInput {
  const SCHEME: &'static str = "dump";
}

impl FromUrl for DumpInput {
  type Error = DumpInputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      error!(
        "URI 方案不匹配: 期望 '{}', 实际 '{}'",
        Self::SCHEME,
        url.scheme()
      );
      return Err(DumpInputError::SchemeMismatch);
    }

    Self::open(Path::new(url.path()))
  }
}

impl DumpInput {
  /// 打开单个 `.json` 转储或包含转储的目录
  pub fn open(path: &Path) -> Result<Self, DumpInputError> {
    let files = if path.is_dir() {
      let mut files = std::fs::read_dir(path)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
        .collect::<Vec<_>>();
      files.sort();
      if files.is_empty() {
        return Err(DumpInputError::Empty(path.to_path_buf()));
      }
      files
    } else {
      // 提前报告不存在的文件
      std::fs::metadata(path)?;
      vec![path.to_path_buf()]
    };

    info!("打开转储输入: {} ({} 个文件)", path.display(), files.len());
    Ok(Self { files })
  }

  pub fn len(&self) -> usize {
    self.files.len()
  }

  pub fn is_empty(&self) -> bool {
    self.files.is_empty()
  }

  pub fn into_frames(self) -> DumpInputFrames {
    DumpInputFrames {
      files: self.files.into_iter(),
      counter: 0,
    }
  }
}

pub struct DumpInputFrames {
  files: std::vec::IntoIter<PathBuf>,
  counter: u64,
}

impl DumpInputFrames {
  fn load(path: &Path, index: u64) -> Result<Frame, DumpInputError> {
    let now = Instant::now();
    let base = path.parent().unwrap_or_else(|| Path::new("."));
    let mut frame = FrameDump::from_json_file(path)?.into_frame(base, index)?;
    frame.load_time = now.elapsed();
    Ok(frame)
  }
}

impl Iterator for DumpInputFrames {
  type Item = Frame;

  fn next(&mut self) -> Option<Self::Item> {
    for path in self.files.by_ref() {
      let index = self.counter;
      self.counter += 1;
      match Self::load(&path, index) {
        Ok(frame) => {
          debug!("读取转储 {}: {:.2?}", path.display(), frame.load_time);
          return Some(frame);
        }
        Err(e) => error!("读取转储 {} 失败, 已跳过: {}", path.display(), e),
      }
    }
    None
  }
}
