// 该文件是 Multitask-Yolo（多任务 YOLO 后处理）项目的一部分。
// src/output/directory_record.rs - 目录记录输出
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

use chrono::{DateTime, Datelike, Utc};
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::debug;

use crate::{
  FromUrl, FromUrlWithScheme,
  frame::Frame,
  layout::BBox,
  model::DetectResult,
  output::Render,
};

#[derive(Error, Debug)]
pub enum DirectoryRecordOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("序列化错误: {0}")]
  SerializeError(#[from] serde_json::Error),
}

/// 按日期分目录保存每帧的检测结果
///
/// `folder:///path/to/dir?always&raw`
/// - `always`: 没有检测结果的帧也保存
/// - `raw`: 额外保存与内核布局一致的 `.bbox` 文件
pub struct DirectoryRecordOutput {
  directory: PathBuf,
  frame_counters: Arc<Mutex<u16>>,
  always: bool,
  raw: bool,
}

impl FromUrlWithScheme for DirectoryRecordOutput {
  const SCHEME: &'static str = "folder";
}

impl FromUrl for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn from_url(uri: &url::Url) -> Result<Self, Self::Error> {
    if uri.scheme() != Self::SCHEME {
      return Err(DirectoryRecordOutputError::SchemeMismatch);
    }

    let always = uri.query_pairs().any(|(k, _)| k == "always");
    let raw = uri.query_pairs().any(|(k, _)| k == "raw");

    Ok(DirectoryRecordOutput {
      directory: PathBuf::from(uri.path()),
      frame_counters: Arc::new(Mutex::new(0)),
      always,
      raw,
    })
  }
}

impl DirectoryRecordOutput {
  pub fn new<P: AsRef<Path>>(directory: P) -> Self {
    Self {
      directory: directory.as_ref().to_path_buf(),
      frame_counters: Arc::new(Mutex::new(0)),
      always: false,
      raw: false,
    }
  }

  pub fn always(mut self, always: bool) -> Self {
    self.always = always;
    self
  }

  pub fn raw(mut self, raw: bool) -> Self {
    self.raw = raw;
    self
  }

  fn frame_id(&self) -> u16 {
    let mut counter = self
      .frame_counters
      .lock()
      .unwrap_or_else(|poisoned| poisoned.into_inner());
    let id = counter.wrapping_add(1);
    *counter = id;
    id
  }

  /// 不带扩展名的记录路径
  fn frame_stem(&self, now: DateTime<Utc>) -> Result<PathBuf, DirectoryRecordOutputError> {
    let directory = self
      .directory
      .join(now.year().to_string())
      .join(format!("{:02}", now.month()))
      .join(format!("{:02}", now.day()));
    if !directory.exists() {
      std::fs::create_dir_all(&directory)?;
    }

    Ok(directory.join(format!(
      "{}-{:04X}",
      now.format("%H-%M-%S"),
      self.frame_id()
    )))
  }

  fn save_result(&self, stem: &Path, result: &DetectResult) -> Result<(), DirectoryRecordOutputError> {
    let path = stem.with_extension("json");
    let writer = BufWriter::new(File::create(&path)?);
    serde_json::to_writer_pretty(writer, result)?;
    debug!("记录检测结果: {}", path.display());

    if self.raw {
      let path = stem.with_extension("bbox");
      std::fs::write(&path, BBox::slice_as_bytes(&result.boxes))?;
      debug!("记录原始检测框: {}", path.display());
    }
    Ok(())
  }
}

impl Render<Frame, DetectResult> for DirectoryRecordOutput {
  type Error = DirectoryRecordOutputError;

  fn render_result(&self, _frame: &Frame, result: &DetectResult) -> Result<(), Self::Error> {
    if self.always || !result.is_empty() {
      let stem = self.frame_stem(Utc::now())?;
      self.save_result(&stem, result)?;
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::DetectItem;

  fn result(boxes: Vec<BBox>) -> DetectResult {
    let items = boxes
      .iter()
      .map(|b| DetectItem {
        task_id: b.task_id,
        task: "hand".to_string(),
        class_id: b.class_id,
        label: "Call".to_string(),
        score: b.confidence,
        bbox: [b.x, b.y, b.w, b.h],
        keypoints: Vec::new(),
      })
      .collect::<Vec<_>>();
    DetectResult {
      frame_index: 0,
      items: items.into_boxed_slice(),
      boxes,
    }
  }

  fn records(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let mut stack = vec![dir.to_path_buf()];
    while let Some(path) = stack.pop() {
      for entry in std::fs::read_dir(path).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
          stack.push(path);
        } else {
          found.push(path);
        }
      }
    }
    found.sort();
    found
  }

  #[test]
  fn from_url_reads_flags() {
    let url = url::Url::parse("folder:///tmp/records?always&raw").unwrap();
    let output = DirectoryRecordOutput::from_url(&url).unwrap();
    assert_eq!(output.directory, PathBuf::from("/tmp/records"));
    assert!(output.always);
    assert!(output.raw);

    let url = url::Url::parse("stdout:").unwrap();
    assert!(matches!(
      DirectoryRecordOutput::from_url(&url),
      Err(DirectoryRecordOutputError::SchemeMismatch)
    ));
  }

  #[test]
  fn skips_empty_frames_unless_always() {
    let dir = tempfile::tempdir().unwrap();
    let frame = Frame::new(0, 224, 320);

    let output = DirectoryRecordOutput::new(dir.path());
    output.render_result(&frame, &result(Vec::new())).unwrap();
    assert!(records(dir.path()).is_empty());

    let output = output.always(true);
    output.render_result(&frame, &result(Vec::new())).unwrap();
    assert_eq!(records(dir.path()).len(), 1);
  }

  #[test]
  fn writes_json_and_raw_boxes() {
    let dir = tempfile::tempdir().unwrap();
    let frame = Frame::new(0, 224, 320);
    let bbox = BBox {
      class_id: 3,
      confidence: 0.75,
      x: 1,
      y: 2,
      h: 3,
      w: 4,
      ..BBox::default()
    };

    let output = DirectoryRecordOutput::new(dir.path()).raw(true);
    output.render_result(&frame, &result(vec![bbox])).unwrap();

    let files = records(dir.path());
    assert_eq!(files.len(), 2);
    let raw = files.iter().find(|p| p.extension().unwrap() == "bbox").unwrap();
    let json = files.iter().find(|p| p.extension().unwrap() == "json").unwrap();

    let bytes = std::fs::read(raw).unwrap();
    assert_eq!(BBox::read_back(1, &bytes).unwrap(), vec![bbox]);

    let value: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(json).unwrap()).unwrap();
    assert_eq!(value["items"][0]["class_id"], 3);
    assert_eq!(value["items"][0]["bbox"], serde_json::json!([1, 2, 4, 3]));
    assert!(value.get("boxes").is_none());
  }
}
