// 该文件是 Multitask-Yolo（多任务 YOLO 后处理）项目的一部分。
// src/nms.rs - 非极大值抑制
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

use crate::layout::BBox;

/// 计算两个整数边界框的 IoU
///
/// 并集为 0 时结果为 NaN，[`apply_nms`] 中按重叠处理
pub fn iou(a: &BBox, b: &BBox) -> f32 {
  let x1 = a.x.max(b.x) as i64;
  let y1 = a.y.max(b.y) as i64;
  let x2 = (a.x as i64 + a.w as i64).min(b.x as i64 + b.w as i64);
  let y2 = (a.y as i64 + a.h as i64).min(b.y as i64 + b.h as i64);

  let intersection = (x2 - x1).max(0) * (y2 - y1).max(0);
  let union = a.area() + b.area() - intersection;

  intersection as f32 / union as f32
}

/// 分数最高者的下标，同分时取靠前的一个
fn argmax(boxes: &[BBox]) -> Option<usize> {
  let mut best: Option<usize> = None;
  for (i, bbox) in boxes.iter().enumerate() {
    match best {
      Some(j) if boxes[j].confidence >= bbox.confidence => {}
      _ => best = Some(i),
    }
  }
  best
}

/// 贪心 NMS，不区分类别；输出按置信度降序排列
pub fn apply_nms(mut boxes: Vec<BBox>, iou_max: f32) -> Vec<BBox> {
  let mut output = Vec::with_capacity(boxes.len());

  while let Some(index) = argmax(&boxes) {
    let best = boxes.remove(index);
    // NaN 不小于任何阈值，零面积框被抑制
    boxes.retain(|other| iou(other, &best) < iou_max);
    output.push(best);
  }

  output
}

#[cfg(test)]
mod tests {
  use super::*;
  use approx::assert_abs_diff_eq;

  fn bbox(x: i32, y: i32, w: i32, h: i32, confidence: f32) -> BBox {
    BBox {
      confidence,
      x,
      y,
      w,
      h,
      ..BBox::default()
    }
  }

  #[test]
  fn iou_of_overlapping_boxes() {
    let a = bbox(0, 0, 10, 10, 0.9);
    let b = bbox(5, 0, 10, 10, 0.8);
    // 交集 50, 并集 150
    assert_abs_diff_eq!(iou(&a, &b), 1.0 / 3.0, epsilon = 1e-6);
    assert_abs_diff_eq!(iou(&a, &a), 1.0);
    assert_eq!(iou(&a, &bbox(20, 20, 5, 5, 0.1)), 0.0);
  }

  #[test]
  fn iou_of_degenerate_boxes() {
    let a = bbox(3, 3, 0, 0, 0.5);
    assert!(iou(&a, &a).is_nan());
    // 零面积框与普通框的并集为正
    assert_eq!(iou(&a, &bbox(0, 0, 10, 10, 0.9)), 0.0);
  }

  #[test]
  fn nms_keeps_best_of_each_cluster() {
    let boxes = vec![
      bbox(0, 0, 10, 10, 0.6),
      bbox(1, 1, 10, 10, 0.9),
      bbox(100, 100, 10, 10, 0.7),
      bbox(2, 0, 10, 10, 0.8),
    ];
    let kept = apply_nms(boxes, 0.4);
    let scores: Vec<f32> = kept.iter().map(|b| b.confidence).collect();
    assert_eq!(scores, vec![0.9, 0.7]);
  }

  #[test]
  fn nms_threshold_is_exclusive() {
    let a = bbox(0, 0, 10, 10, 0.9);
    let b = bbox(5, 0, 10, 10, 0.8);
    let overlap = iou(&a, &b);
    assert_eq!(apply_nms(vec![a, b], overlap).len(), 1);
    assert_eq!(apply_nms(vec![a, b], overlap + 1e-3).len(), 2);
  }

  #[test]
  fn nms_suppresses_zero_area_boxes() {
    let boxes = vec![
      bbox(0, 0, 0, 0, 0.5),
      bbox(0, 0, 0, 0, 0.4),
      bbox(7, 0, 0, 0, 0.3),
    ];
    let kept = apply_nms(boxes, 0.3);
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].confidence, 0.5);

    let boxes = vec![bbox(0, 0, 0, 0, 0.5), bbox(20, 20, 10, 10, 0.4)];
    assert_eq!(apply_nms(boxes, 0.3).len(), 2);
  }

  #[test]
  fn nms_of_empty_input() {
    assert!(apply_nms(Vec::new(), 0.5).is_empty());
  }
}
