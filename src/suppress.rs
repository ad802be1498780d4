// 该文件是 Hexi （河西晚照） 项目的一部分。
// src/suppress.rs - 非极大值抑制
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::cmp::Ordering;
use std::collections::BTreeMap;

use tracing::debug;

use crate::geometry::Roi;

/// 同类区域判定冗余的 IoU 阈值
pub const SUPPRESS_IOU_THRESHOLD: f32 = 0.1;
/// 背景类别编号
pub const SUPPRESS_BACKGROUND_ID: u32 = 0;

/// 抑制参数
#[derive(Debug, Clone, Copy)]
pub struct SuppressConfig {
  pub iou_threshold: f32,
  pub ignore_background: bool,
  pub background_id: u32,
}

impl Default for SuppressConfig {
  fn default() -> Self {
    SuppressConfig {
      iou_threshold: SUPPRESS_IOU_THRESHOLD,
      ignore_background: true,
      background_id: SUPPRESS_BACKGROUND_ID,
    }
  }
}

/// 单个区域槽位的分类结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoiPrediction {
  pub class_id: u32,
  pub score: f32,
}

/// 按类别独立做贪心非极大值抑制，返回保留的区域下标。
///
/// 每个类别内按置信度降序排序（稳定排序，同分保持原下标升序），
/// 依次取出当前最高分区域，丢弃与其 IoU 超过阈值的同类剩余区域。
/// 类别按编号升序处理，输出为各类别保留下标的并集；
/// 下标顺序仅反映贪心选择次序，调用方应按集合比较。
/// 空输入返回空集合，不是错误。
pub fn suppress(rois: &[Roi], predictions: &[RoiPrediction], config: &SuppressConfig) -> Vec<usize> {
  debug_assert_eq!(rois.len(), predictions.len());

  let mut by_class: BTreeMap<u32, Vec<usize>> = BTreeMap::new();
  for (index, prediction) in predictions.iter().enumerate().take(rois.len()) {
    if config.ignore_background && prediction.class_id == config.background_id {
      continue;
    }
    by_class.entry(prediction.class_id).or_default().push(index);
  }

  let mut kept = Vec::new();
  for (class_id, mut indices) in by_class {
    indices.sort_by(|&a, &b| {
      predictions[b]
        .score
        .partial_cmp(&predictions[a].score)
        .unwrap_or(Ordering::Equal)
    });

    let before = indices.len();
    let kept_before = kept.len();
    while !indices.is_empty() {
      let best = indices.remove(0);
      kept.push(best);
      indices.retain(|&index| rois[best].iou(&rois[index]) <= config.iou_threshold);
    }
    debug!(
      "类别 {}: {} 个候选保留 {} 个",
      class_id,
      before,
      kept.len() - kept_before
    );
  }

  kept
}

#[cfg(test)]
mod tests {
  use super::{RoiPrediction, SuppressConfig, suppress};
  use crate::geometry::Roi;

  fn prediction(class_id: u32, score: f32) -> RoiPrediction {
    RoiPrediction { class_id, score }
  }

  #[test]
  fn overlapping_boxes_keep_highest_score() {
    // box1/box2 IoU 为 0.5，box3 不相交
    let rois = [
      Roi::new(0.0, 0.0, 20.0, 10.0),
      Roi::new(0.0, 0.0, 10.0, 10.0),
      Roi::new(50.0, 50.0, 60.0, 60.0),
    ];
    assert!((rois[0].iou(&rois[1]) - 0.5).abs() < 1e-6);

    let predictions = [prediction(2, 0.9), prediction(2, 0.8), prediction(2, 0.3)];
    let mut kept = suppress(&rois, &predictions, &SuppressConfig::default());
    kept.sort_unstable();
    assert_eq!(kept, vec![0, 2]);
  }

  #[test]
  fn empty_input_returns_empty_set() {
    let kept = suppress(&[], &[], &SuppressConfig::default());
    assert!(kept.is_empty());
  }

  #[test]
  fn background_class_is_never_emitted() {
    let rois = [
      Roi::new(0.0, 0.0, 10.0, 10.0),
      Roi::new(20.0, 20.0, 30.0, 30.0),
    ];
    let predictions = [prediction(0, 0.99), prediction(1, 0.5)];
    let kept = suppress(&rois, &predictions, &SuppressConfig::default());
    assert_eq!(kept, vec![1]);

    let config = SuppressConfig {
      ignore_background: false,
      ..SuppressConfig::default()
    };
    let mut kept = suppress(&rois, &predictions, &config);
    kept.sort_unstable();
    assert_eq!(kept, vec![0, 1]);
  }

  #[test]
  fn different_classes_do_not_suppress_each_other() {
    let rois = [
      Roi::new(0.0, 0.0, 10.0, 10.0),
      Roi::new(1.0, 1.0, 11.0, 11.0),
    ];
    let predictions = [prediction(1, 0.9), prediction(2, 0.2)];
    let mut kept = suppress(&rois, &predictions, &SuppressConfig::default());
    kept.sort_unstable();
    assert_eq!(kept, vec![0, 1]);
  }

  #[test]
  fn suppression_is_idempotent() {
    let rois = [
      Roi::new(0.0, 0.0, 20.0, 10.0),
      Roi::new(0.0, 0.0, 10.0, 10.0),
      Roi::new(8.0, 0.0, 18.0, 10.0),
      Roi::new(50.0, 50.0, 60.0, 60.0),
      Roi::new(52.0, 52.0, 62.0, 62.0),
    ];
    let predictions = [
      prediction(1, 0.9),
      prediction(1, 0.8),
      prediction(2, 0.7),
      prediction(2, 0.6),
      prediction(2, 0.5),
    ];
    let config = SuppressConfig::default();
    let first = suppress(&rois, &predictions, &config);

    let rois2: Vec<Roi> = first.iter().map(|&i| rois[i]).collect();
    let predictions2: Vec<RoiPrediction> = first.iter().map(|&i| predictions[i]).collect();
    let second = suppress(&rois2, &predictions2, &config);

    let survivors: Vec<Roi> = second.iter().map(|&i| rois2[i]).collect();
    let mut expected: Vec<Roi> = rois2.clone();
    let mut got = survivors.clone();
    expected.sort_by(|a, b| a.x1.partial_cmp(&b.x1).unwrap());
    got.sort_by(|a, b| a.x1.partial_cmp(&b.x1).unwrap());
    assert_eq!(expected.len(), got.len());
    assert_eq!(expected, got);
  }

  #[test]
  fn kept_boxes_of_one_class_have_iou_below_threshold() {
    let rois: Vec<Roi> = (0..10)
      .map(|i| {
        let offset = i as f32 * 3.0;
        Roi::new(offset, 0.0, offset + 12.0, 12.0)
      })
      .collect();
    let predictions: Vec<RoiPrediction> = (0..10)
      .map(|i| prediction(1, 1.0 - i as f32 * 0.05))
      .collect();
    let config = SuppressConfig::default();
    let kept = suppress(&rois, &predictions, &config);
    for (a, &i) in kept.iter().enumerate() {
      for &j in kept.iter().skip(a + 1) {
        assert!(rois[i].iou(&rois[j]) <= config.iou_threshold);
      }
    }
  }

  #[test]
  fn tied_scores_keep_ascending_index_order() {
    // 两个不相交区域同分，稳定排序保证下标小者先被选出
    let rois = [
      Roi::new(0.0, 0.0, 10.0, 10.0),
      Roi::new(30.0, 30.0, 40.0, 40.0),
    ];
    let predictions = [prediction(1, 0.7), prediction(1, 0.7)];
    let kept = suppress(&rois, &predictions, &SuppressConfig::default());
    assert_eq!(kept, vec![0, 1]);
  }
}
