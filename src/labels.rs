// 该文件是 Multitask-Yolo（多任务 YOLO 后处理）项目的一部分。
// src/labels.rs - 各检测头的类别名称
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

pub const UNKNOWN_LABEL: &str = "Unknown";

pub const HAND_TASK_ID: u32 = 0;
pub const BODY_TASK_ID: u32 = 1;

/// 手势检测头 (task 0)
pub const HAND_LABELS: [&str; 19] = [
  "Call",
  "Dislike",
  "Fist",
  "Four",
  "Like",
  "Mute",
  "Ok",
  "One",
  "Palm",
  "Peace",
  "Rock",
  "Stop",
  "Stop inverted",
  "Three",
  "Two up",
  "Two up inverted",
  "Three2",
  "Peace inverted",
  "No gesture",
];

/// 人体检测头 (task 1)
pub const BODY_LABELS: [&str; 1] = ["Person"];

pub fn builtin_labels(task_id: u32) -> &'static [&'static str] {
  match task_id {
    HAND_TASK_ID => &HAND_LABELS,
    BODY_TASK_ID => &BODY_LABELS,
    _ => &[],
  }
}

/// 查找内置类别名称，未知时返回 [`UNKNOWN_LABEL`]
pub fn label(task_id: u32, class_id: u32) -> &'static str {
  builtin_labels(task_id)
    .get(class_id as usize)
    .copied()
    .unwrap_or(UNKNOWN_LABEL)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn known_and_unknown_labels() {
    assert_eq!(label(HAND_TASK_ID, 0), "Call");
    assert_eq!(label(HAND_TASK_ID, 18), "No gesture");
    assert_eq!(label(BODY_TASK_ID, 0), "Person");
    assert_eq!(label(HAND_TASK_ID, 19), UNKNOWN_LABEL);
    assert_eq!(label(7, 0), UNKNOWN_LABEL);
  }
}
