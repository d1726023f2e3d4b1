// 该文件是 Multitask-Yolo（多任务 YOLO 后处理）项目的一部分。
// src/config.rs - 检测器配置
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

use std::{collections::HashSet, path::Path};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::{
  labels::{BODY_TASK_ID, HAND_TASK_ID, UNKNOWN_LABEL, builtin_labels},
  layout::MAX_KPTS,
  postprocess::Backend,
};

const DEFAULT_INPUT_WIDTH: u32 = 224;
const DEFAULT_INPUT_HEIGHT: u32 = 320;
/// 28x40 + 14x20 + 7x10
const DEFAULT_ANCHORS: usize = 1470;

#[derive(Error, Debug)]
pub enum ConfigError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("配置解析错误: {0}")]
  ParseError(#[from] serde_json::Error),
  #[error("检测头 {0} 重复配置")]
  DuplicateHead(u32),
  #[error("检测头 {0} 没有类别")]
  NoLabels(u32),
  #[error("检测头 {task_id} 的关键点数量 {num_kpts} 超过上限 51")]
  TooManyKeypoints { task_id: u32, num_kpts: u32 },
  #[error("检测头 {task_id} 的 {name} 取值 {value} 超出 [0, 1]")]
  OutOfRange {
    task_id: u32,
    name: &'static str,
    value: f32,
  },
  #[error("模型输入尺寸与锚点数必须为正数")]
  EmptyModel,
  #[error("未配置任何检测头")]
  NoHeads,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadConfig {
  pub task_id: u32,
  pub name: String,
  /// 类别数即标签数
  pub labels: Vec<String>,
  pub confidence_threshold: f32,
  #[serde(default)]
  pub num_kpts: u32,
  pub iou_max: f32,
}

impl HeadConfig {
  pub fn num_classes(&self) -> u32 {
    self.labels.len() as u32
  }

  pub fn label(&self, class_id: u32) -> &str {
    self
      .labels
      .get(class_id as usize)
      .map(String::as_str)
      .unwrap_or(UNKNOWN_LABEL)
  }

  pub fn hand() -> Self {
    Self {
      task_id: HAND_TASK_ID,
      name: "hand".to_string(),
      labels: builtin_labels(HAND_TASK_ID).iter().map(|s| s.to_string()).collect(),
      confidence_threshold: 0.3,
      num_kpts: 0,
      iou_max: 0.4,
    }
  }

  pub fn body() -> Self {
    Self {
      task_id: BODY_TASK_ID,
      name: "body".to_string(),
      labels: builtin_labels(BODY_TASK_ID).iter().map(|s| s.to_string()).collect(),
      confidence_threshold: 0.5,
      // 17 个关键点, 每个为 (x, y, 可见性)
      num_kpts: 51,
      iou_max: 0.3,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
  pub input_width: u32,
  pub input_height: u32,
  /// 每个检测头输出的锚点数，也是内核参数中的通道步长
  pub anchors: usize,
  pub backend: Backend,
  pub heads: Vec<HeadConfig>,
}

impl Default for DetectorConfig {
  fn default() -> Self {
    Self {
      input_width: DEFAULT_INPUT_WIDTH,
      input_height: DEFAULT_INPUT_HEIGHT,
      anchors: DEFAULT_ANCHORS,
      backend: Backend::default(),
      heads: vec![HeadConfig::hand(), HeadConfig::body()],
    }
  }
}

impl DetectorConfig {
  pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
    info!("加载配置文件: {}", path.as_ref().display());
    let content = std::fs::read_to_string(path)?;
    let config: Self = serde_json::from_str(&content)?;
    config.validate()?;
    debug!("配置: {:?}", config);
    Ok(config)
  }

  pub fn head(&self, task_id: u32) -> Option<&HeadConfig> {
    self.heads.iter().find(|h| h.task_id == task_id)
  }

  pub fn validate(&self) -> Result<(), ConfigError> {
    if self.input_width == 0 || self.input_height == 0 || self.anchors == 0 {
      return Err(ConfigError::EmptyModel);
    }
    if self.heads.is_empty() {
      return Err(ConfigError::NoHeads);
    }

    let mut seen = HashSet::new();
    for head in &self.heads {
      if !seen.insert(head.task_id) {
        return Err(ConfigError::DuplicateHead(head.task_id));
      }
      if head.labels.is_empty() {
        return Err(ConfigError::NoLabels(head.task_id));
      }
      if head.num_kpts as usize > MAX_KPTS {
        return Err(ConfigError::TooManyKeypoints {
          task_id: head.task_id,
          num_kpts: head.num_kpts,
        });
      }
      for (name, value) in [
        ("confidence_threshold", head.confidence_threshold),
        ("iou_max", head.iou_max),
      ] {
        if !(0.0..=1.0).contains(&value) {
          return Err(ConfigError::OutOfRange {
            task_id: head.task_id,
            name,
            value,
          });
        }
      }
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn default_matches_model() {
    let config = DetectorConfig::default();
    assert!(config.validate().is_ok());
    assert_eq!(config.anchors, 1470);

    let hand = config.head(0).unwrap();
    assert_eq!(hand.num_classes(), 19);
    assert_eq!(hand.num_kpts, 0);
    assert_eq!(hand.label(2), "Fist");

    let body = config.head(1).unwrap();
    assert_eq!(body.num_classes(), 1);
    assert_eq!(body.num_kpts, 51);
    assert_eq!(body.label(3), UNKNOWN_LABEL);
  }

  #[test]
  fn partial_json_uses_defaults() {
    let config: DetectorConfig =
      serde_json::from_str(r#"{ "backend": "prefilter", "anchors": 8 }"#).unwrap();
    assert_eq!(config.backend, Backend::Prefilter);
    assert_eq!(config.anchors, 8);
    assert_eq!(config.heads.len(), 2);
  }

  #[test]
  fn validate_rejects_bad_heads() {
    let mut config = DetectorConfig::default();
    config.heads.push(HeadConfig::hand());
    assert!(matches!(
      config.validate(),
      Err(ConfigError::DuplicateHead(0))
    ));

    let mut config = DetectorConfig::default();
    config.heads[1].num_kpts = 54;
    assert!(matches!(
      config.validate(),
      Err(ConfigError::TooManyKeypoints { task_id: 1, .. })
    ));

    let mut config = DetectorConfig::default();
    config.heads[0].iou_max = 1.5;
    assert!(matches!(
      config.validate(),
      Err(ConfigError::OutOfRange { name: "iou_max", .. })
    ));
  }

  #[test]
  fn loads_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    std::fs::write(&path, r#"{ "heads": [] }"#).unwrap();
    assert!(matches!(
      DetectorConfig::from_json_file(&path),
      Err(ConfigError::NoHeads)
    ));
  }
}
