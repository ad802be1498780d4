// 该文件是 Hexi （河西晚照） 项目的一部分。
// src/detect.rs - 区域检测流水线
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::marker::PhantomData;

use thiserror::Error;
use tracing::debug;

use crate::frame::{FrameError, PaddedFrame, SourceFrame};
use crate::model::{ClassifyRegions, DetectItem, DetectResult, Model, WithLabel};
use crate::proposal::{ProposalError, RegionProposer};
use crate::segment::Segmenter;
use crate::suppress::{RoiPrediction, SuppressConfig, suppress};

/// 结果入选的最低置信度
pub const DETECT_MIN_CONFIDENCE: f32 = 0.5;

/// 流水线参数
#[derive(Debug, Clone, Copy)]
pub struct DetectConfig {
  /// 分类器输出为原始 logit 时按行做 softmax
  pub apply_softmax: bool,
  pub min_confidence: f32,
}

impl Default for DetectConfig {
  fn default() -> Self {
    DetectConfig {
      apply_softmax: true,
      min_confidence: DETECT_MIN_CONFIDENCE,
    }
  }
}

#[derive(Error, Debug)]
pub enum DetectError<E: std::error::Error> {
  #[error("画布帧错误: {0}")]
  Frame(#[from] FrameError),
  #[error("候选区域错误: {0}")]
  Proposal(#[from] ProposalError),
  #[error("分类器错误: {0}")]
  Classifier(E),
  #[error("区域数量 {regions} 与得分行数 {rows} 不一致")]
  ScoreCountMismatch { regions: usize, rows: usize },
}

/// 检测流水线：分割与网格候选 -> 区域分类 -> 非极大值抑制。
/// 对外实现 Model，输入原始帧，输出原图坐标系的检测结果。
pub struct RcnnDetector<S, C, T, const W: u32, const H: u32> {
  segmenter: S,
  proposer: RegionProposer,
  classifier: C,
  suppress: SuppressConfig,
  config: DetectConfig,
  _label: PhantomData<T>,
}

impl<S, C, T, const W: u32, const H: u32> RcnnDetector<S, C, T, W, H> {
  pub fn new(segmenter: S, proposer: RegionProposer, classifier: C) -> Self {
    RcnnDetector {
      segmenter,
      proposer,
      classifier,
      suppress: SuppressConfig::default(),
      config: DetectConfig::default(),
      _label: PhantomData,
    }
  }

  pub fn with_suppress(mut self, suppress: SuppressConfig) -> Self {
    self.suppress = suppress;
    self
  }

  pub fn with_config(mut self, config: DetectConfig) -> Self {
    self.config = config;
    self
  }
}

fn softmax(row: &[f32]) -> Vec<f32> {
  let max = row.iter().copied().fold(f32::NEG_INFINITY, f32::max);
  let exps: Vec<f32> = row.iter().map(|&v| (v - max).exp()).collect();
  let sum: f32 = exps.iter().sum();
  exps.into_iter().map(|v| v / sum).collect()
}

/// 取行内最高分类别，同分取编号较小者
fn predict_row(row: &[f32], apply_softmax: bool) -> RoiPrediction {
  let probs;
  let row = if apply_softmax {
    probs = softmax(row);
    probs.as_slice()
  } else {
    row
  };

  let mut class_id = 0usize;
  let mut best = f32::NEG_INFINITY;
  for (index, &score) in row.iter().enumerate() {
    if score > best {
      best = score;
      class_id = index;
    }
  }

  RoiPrediction {
    class_id: class_id as u32,
    score: best,
  }
}

impl<S, C, T, const W: u32, const H: u32> Model for RcnnDetector<S, C, T, W, H>
where
  S: Segmenter,
  C: ClassifyRegions<W, H>,
  C::Error: std::error::Error,
  T: WithLabel,
{
  type Input = SourceFrame;
  type Output = DetectResult<T>;
  type Error = DetectError<C::Error>;

  fn infer(&self, frame: &Self::Input) -> Result<Self::Output, Self::Error> {
    let padded = PaddedFrame::<W, H>::from_image(frame.image())?;
    let regions = self
      .proposer
      .propose(&self.segmenter, frame.image(), padded.transform())?;
    debug!(
      "候选区域 {} 个, 槽位 {} 个",
      regions.padding_index(),
      regions.capacity()
    );

    let scores = self
      .classifier
      .classify(&padded, &regions)
      .map_err(DetectError::Classifier)?;

    // 区域与得分按构造应当行数一致，出现偏差说明不变量被破坏
    if scores.num_rows() != regions.capacity() {
      return Err(DetectError::ScoreCountMismatch {
        regions: regions.capacity(),
        rows: scores.num_rows(),
      });
    }

    let predictions: Vec<RoiPrediction> = (0..regions.padding_index())
      .map(|index| predict_row(scores.row(index), self.config.apply_softmax))
      .collect();

    let kept = suppress(regions.real_original(), &predictions, &self.suppress);

    let (width, height) = (frame.width() as f32, frame.height() as f32);
    let items: Vec<DetectItem<T>> = kept
      .into_iter()
      .filter(|&index| predictions[index].score >= self.config.min_confidence)
      .map(|index| {
        let roi = regions.original()[index];
        DetectItem {
          kind: T::from_label_id(predictions[index].class_id),
          score: predictions[index].score,
          bbox: [
            roi.x1 / width,
            roi.y1 / height,
            roi.x2 / width,
            roi.y2 / height,
          ],
        }
      })
      .collect();

    debug!("检测到 {} 个物体", items.len());

    Ok(DetectResult {
      items: items.into_boxed_slice(),
    })
  }
}

#[cfg(test)]
mod tests {
  use std::convert::Infallible;

  use image::RgbImage;

  use super::{DetectConfig, DetectError, RcnnDetector, predict_row, softmax};
  use crate::frame::SourceFrame;
  use crate::geometry::Roi;
  use crate::input::AsNhwcFrame;
  use crate::model::{ClassifyRegions, GroceryLabel, Model, ScoreMatrix};
  use crate::proposal::{ProposalConfig, RegionProposer, RegionSet};
  use crate::segment::Segmenter;

  const CLASSES: usize = 17;

  struct FixedSegmenter(Vec<Roi>);

  impl Segmenter for FixedSegmenter {
    fn segment(&self, _image: &RgbImage) -> Vec<Roi> {
      self.0.clone()
    }
  }

  /// 指定槽位给出高 logit，其余槽位偏向背景
  struct StubClassifier {
    hot: Vec<(usize, u32)>,
    extra_rows: isize,
  }

  impl StubClassifier {
    fn new(hot: Vec<(usize, u32)>) -> Self {
      StubClassifier { hot, extra_rows: 0 }
    }
  }

  impl<const W: u32, const H: u32> ClassifyRegions<W, H> for StubClassifier {
    type Error = Infallible;

    fn classify<F: AsNhwcFrame<W, H>>(
      &self,
      _frame: &F,
      regions: &RegionSet,
    ) -> Result<ScoreMatrix, Self::Error> {
      let rows = (regions.capacity() as isize + self.extra_rows) as usize;
      let mut scores = vec![0.0f32; rows * CLASSES];
      for &(slot, class) in &self.hot {
        scores[slot * CLASSES + class as usize] = 8.0;
      }
      Ok(ScoreMatrix::new(scores, CLASSES).unwrap())
    }
  }

  fn proposer() -> RegionProposer {
    RegionProposer::new(ProposalConfig::default().with_grid(0, &[]).with_capacity(8))
  }

  #[test]
  fn softmax_rows_sum_to_one() {
    let probs = softmax(&[1.0, 2.0, 3.0]);
    let sum: f32 = probs.iter().sum();
    assert!((sum - 1.0).abs() < 1e-6);
    assert!(probs[2] > probs[1] && probs[1] > probs[0]);
  }

  #[test]
  fn predict_row_ties_take_lowest_class() {
    let prediction = predict_row(&[0.3, 0.3, 0.1], false);
    assert_eq!(prediction.class_id, 0);
    assert_eq!(prediction.score, 0.3);
  }

  #[test]
  fn pipeline_detects_hot_region() {
    let segmenter = FixedSegmenter(vec![
      Roi::new(20.0, 20.0, 60.0, 60.0),
      Roi::new(120.0, 80.0, 160.0, 120.0),
    ]);
    let classifier = StubClassifier::new(vec![(0, 2)]);
    let detector: RcnnDetector<_, _, GroceryLabel, 256, 256> =
      RcnnDetector::new(segmenter, proposer(), classifier);

    let frame = SourceFrame::new(RgbImage::new(200, 150)).unwrap();
    let result = detector.infer(&frame).unwrap();

    assert_eq!(result.len(), 1);
    let item = &result.items[0];
    assert_eq!(item.kind, GroceryLabel::Orange);
    assert!(item.score > 0.9);
    assert!((item.bbox[0] - 0.1).abs() < 1e-3);
    assert!((item.bbox[1] - 20.0 / 150.0).abs() < 1e-3);
    assert!((item.bbox[2] - 0.3).abs() < 1e-3);
    assert!((item.bbox[3] - 60.0 / 150.0).abs() < 1e-3);
  }

  #[test]
  fn background_rows_produce_no_detections() {
    let segmenter = FixedSegmenter(vec![Roi::new(20.0, 20.0, 60.0, 60.0)]);
    let classifier = StubClassifier::new(vec![(0, 0)]);
    let detector: RcnnDetector<_, _, GroceryLabel, 256, 256> =
      RcnnDetector::new(segmenter, proposer(), classifier);

    let frame = SourceFrame::new(RgbImage::new(200, 150)).unwrap();
    let result = detector.infer(&frame).unwrap();
    assert!(result.is_empty());
  }

  #[test]
  fn low_confidence_detections_are_cut() {
    let segmenter = FixedSegmenter(vec![Roi::new(20.0, 20.0, 60.0, 60.0)]);
    // 全零行 softmax 后为均匀分布，远低于默认阈值
    let classifier = StubClassifier::new(vec![]);
    let config = DetectConfig {
      apply_softmax: true,
      min_confidence: 0.5,
    };
    let detector: RcnnDetector<_, _, GroceryLabel, 256, 256> =
      RcnnDetector::new(segmenter, proposer(), classifier).with_config(config);

    let frame = SourceFrame::new(RgbImage::new(200, 150)).unwrap();
    let result = detector.infer(&frame).unwrap();
    assert!(result.is_empty());
  }

  #[test]
  fn score_row_count_mismatch_is_fatal() {
    let segmenter = FixedSegmenter(vec![Roi::new(20.0, 20.0, 60.0, 60.0)]);
    let mut classifier = StubClassifier::new(vec![]);
    classifier.extra_rows = -1;
    let detector: RcnnDetector<_, _, GroceryLabel, 256, 256> =
      RcnnDetector::new(segmenter, proposer(), classifier);

    let frame = SourceFrame::new(RgbImage::new(200, 150)).unwrap();
    match detector.infer(&frame) {
      Err(DetectError::ScoreCountMismatch { regions, rows }) => {
        assert_eq!(regions, 8);
        assert_eq!(rows, 7);
      }
      other => panic!("预期数量不一致错误, 实际: {:?}", other.map(|r| r.len())),
    }
  }
}
