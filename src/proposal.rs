// 该文件是 Hexi （河西晚照） 项目的一部分。
// src/proposal.rs - 候选区域生成与归一化
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use image::{RgbImage, imageops};
use thiserror::Error;
use tracing::{debug, warn};

use crate::geometry::{CanvasTransform, Roi};
use crate::segment::Segmenter;

mod grid;
pub use self::grid::grid_rois;

/// 分割前缩放的长边上限
pub const PROPOSAL_RESIZE_DIM: u32 = 200;
/// 候选矩形最小边长（缩放帧内）
pub const PROPOSAL_MIN_DIM: f32 = 8.0;
/// 候选矩形最大边长（缩放帧内）
pub const PROPOSAL_MAX_DIM: f32 = 80.0;
/// 候选矩形最小面积
pub const PROPOSAL_MIN_AREA: f32 = 128.0;
/// 候选矩形最大面积
pub const PROPOSAL_MAX_AREA: f32 = 6400.0;
/// 长短边之比上限
pub const PROPOSAL_MAX_ASPECT: f32 = 4.0;
/// 网格尺度数
pub const PROPOSAL_GRID_SCALES: usize = 5;
/// 网格长宽比
pub const PROPOSAL_GRID_ASPECTS: [f32; 3] = [1.0, 2.0, 0.5];
/// 区域槽位容量 N
pub const PROPOSAL_CAPACITY: usize = 100;
/// 全帧回退矩形的边界内缩
pub const PROPOSAL_FALLBACK_MARGIN: f32 = 3.0;

/// 候选区域生成参数
#[derive(Debug, Clone)]
pub struct ProposalConfig {
  pub resize_dim: u32,
  pub min_dim: f32,
  pub max_dim: f32,
  pub min_area: f32,
  pub max_area: f32,
  pub max_aspect: f32,
  pub grid_scales: usize,
  pub grid_aspects: Vec<f32>,
  pub capacity: usize,
  pub fallback_margin: f32,
}

impl Default for ProposalConfig {
  fn default() -> Self {
    ProposalConfig {
      resize_dim: PROPOSAL_RESIZE_DIM,
      min_dim: PROPOSAL_MIN_DIM,
      max_dim: PROPOSAL_MAX_DIM,
      min_area: PROPOSAL_MIN_AREA,
      max_area: PROPOSAL_MAX_AREA,
      max_aspect: PROPOSAL_MAX_ASPECT,
      grid_scales: PROPOSAL_GRID_SCALES,
      grid_aspects: PROPOSAL_GRID_ASPECTS.to_vec(),
      capacity: PROPOSAL_CAPACITY,
      fallback_margin: PROPOSAL_FALLBACK_MARGIN,
    }
  }
}

impl ProposalConfig {
  pub fn with_capacity(mut self, capacity: usize) -> Self {
    self.capacity = capacity;
    self
  }

  pub fn with_resize_dim(mut self, resize_dim: u32) -> Self {
    self.resize_dim = resize_dim;
    self
  }

  pub fn with_dim_limits(mut self, min_dim: f32, max_dim: f32) -> Self {
    self.min_dim = min_dim;
    self.max_dim = max_dim;
    self
  }

  pub fn with_area_limits(mut self, min_area: f32, max_area: f32) -> Self {
    self.min_area = min_area;
    self.max_area = max_area;
    self
  }

  pub fn with_max_aspect(mut self, max_aspect: f32) -> Self {
    self.max_aspect = max_aspect;
    self
  }

  pub fn with_grid(mut self, scales: usize, aspects: &[f32]) -> Self {
    self.grid_scales = scales;
    self.grid_aspects = aspects.to_vec();
    self
  }
}

/// 固定容量的区域集合：前 padding_index 个为真实区域
/// （保持生成顺序，分割结果在网格结果之前），
/// 其余槽位为全零填充哨兵。画布坐标与原图坐标逐槽对齐。
#[derive(Debug, Clone)]
pub struct RegionSet {
  canvas: Box<[Roi]>,
  original: Box<[Roi]>,
  padding_index: usize,
}

impl RegionSet {
  pub fn capacity(&self) -> usize {
    self.canvas.len()
  }

  pub fn padding_index(&self) -> usize {
    self.padding_index
  }

  /// 画布坐标系下的全部槽位
  pub fn canvas(&self) -> &[Roi] {
    &self.canvas
  }

  /// 原图坐标系下的全部槽位
  pub fn original(&self) -> &[Roi] {
    &self.original
  }

  pub fn real_canvas(&self) -> &[Roi] {
    &self.canvas[..self.padding_index]
  }

  pub fn real_original(&self) -> &[Roi] {
    &self.original[..self.padding_index]
  }

  /// 模型输入用的 N x 4 平铺画布坐标
  pub fn canvas_flat(&self) -> Vec<f32> {
    let mut flat = Vec::with_capacity(self.canvas.len() * 4);
    for roi in self.canvas.iter() {
      flat.extend_from_slice(&[roi.x1, roi.y1, roi.x2, roi.y2]);
    }
    flat
  }
}

#[derive(Error, Debug)]
pub enum ProposalError {
  #[error("图像尺寸无效: {width}x{height}")]
  EmptyImage { width: u32, height: u32 },
}

/// 候选区域生成器
#[derive(Debug, Clone, Default)]
pub struct RegionProposer {
  config: ProposalConfig,
}

impl RegionProposer {
  pub fn new(config: ProposalConfig) -> Self {
    RegionProposer { config }
  }

  pub fn config(&self) -> &ProposalConfig {
    &self.config
  }

  /// 生成固定容量的区域集合：
  /// 分割与网格候选在缩放帧内生成并逐个过滤，
  /// 幸存者换算回原图坐标后映射到模型画布，
  /// 最后截断或零填充到容量
  pub fn propose<S: Segmenter>(
    &self,
    segmenter: &S,
    image: &RgbImage,
    transform: &CanvasTransform,
  ) -> Result<RegionSet, ProposalError> {
    let (src_w, src_h) = image.dimensions();
    if src_w == 0 || src_h == 0 {
      return Err(ProposalError::EmptyImage {
        width: src_w,
        height: src_h,
      });
    }

    // 长边超出上限时等比缩小，否则原样使用
    let long = src_w.max(src_h);
    let factor = if long > self.config.resize_dim {
      self.config.resize_dim as f32 / long as f32
    } else {
      1.0
    };
    let seg_w = ((src_w as f32 * factor).round() as u32).max(1);
    let seg_h = ((src_h as f32 * factor).round() as u32).max(1);

    let resized_storage;
    let resized: &RgbImage = if factor < 1.0 {
      resized_storage = imageops::resize(image, seg_w, seg_h, imageops::FilterType::Triangle);
      &resized_storage
    } else {
      image
    };

    // 分割候选在前，网格候选在后
    let mut candidates = segmenter.segment(resized);
    let seg_count = candidates.len();
    candidates.extend(grid_rois(
      seg_w,
      seg_h,
      self.config.grid_scales,
      &self.config.grid_aspects,
    ));
    debug!(
      "候选区域: 分割 {} 个, 网格 {} 个",
      seg_count,
      candidates.len() - seg_count
    );

    // 逐矩形独立过滤
    let mut survivors: Vec<Roi> = candidates
      .into_iter()
      .filter(|roi| self.passes_filters(roi))
      .collect();
    debug!("过滤后剩余 {} 个候选区域", survivors.len());

    if survivors.is_empty() {
      warn!("过滤后无候选区域，回退到全帧矩形");
      survivors.push(self.fallback_roi(seg_w, seg_h));
    }

    // 换算回原图坐标（除以缩放因子，四舍六入五成双）
    let inv = 1.0 / factor;
    let original: Vec<Roi> = survivors
      .iter()
      .map(|roi| {
        roi
          .scale(inv)
          .round_ties_even()
          .clamp(src_w as f32, src_h as f32)
      })
      .filter(|roi| !roi.is_degenerate())
      .collect();

    // 原图坐标映射到模型画布
    let canvas: Vec<Roi> = original.iter().map(|roi| transform.apply(roi)).collect();

    Ok(self.normalize_capacity(canvas, original))
  }

  fn passes_filters(&self, roi: &Roi) -> bool {
    let (w, h) = (roi.width(), roi.height());
    if w < self.config.min_dim || h < self.config.min_dim {
      return false;
    }
    if w > self.config.max_dim || h > self.config.max_dim {
      return false;
    }
    let area = roi.area();
    if area < self.config.min_area || area > self.config.max_area {
      return false;
    }
    roi.aspect() <= self.config.max_aspect
  }

  fn fallback_roi(&self, width: u32, height: u32) -> Roi {
    let (w, h) = (width as f32, height as f32);
    let margin = self
      .config
      .fallback_margin
      .min((w - 1.0) / 2.0)
      .min((h - 1.0) / 2.0)
      .max(0.0);
    Roi::new(margin, margin, w - margin, h - margin)
  }

  /// 截断或右侧零填充到容量，记录首个填充槽位
  fn normalize_capacity(&self, mut canvas: Vec<Roi>, mut original: Vec<Roi>) -> RegionSet {
    let capacity = self.config.capacity;
    if canvas.len() > capacity {
      debug!("候选区域 {} 个超出容量 {}, 截断", canvas.len(), capacity);
      canvas.truncate(capacity);
      original.truncate(capacity);
    }
    let padding_index = canvas.len();
    canvas.resize(capacity, Roi::ZERO);
    original.resize(capacity, Roi::ZERO);

    RegionSet {
      canvas: canvas.into_boxed_slice(),
      original: original.into_boxed_slice(),
      padding_index,
    }
  }
}

#[cfg(test)]
mod tests {
  use super::{ProposalConfig, RegionProposer};
  use crate::geometry::{CanvasTransform, Roi};
  use crate::segment::{NullSegmenter, Segmenter};
  use image::RgbImage;

  struct FixedSegmenter(Vec<Roi>);

  impl Segmenter for FixedSegmenter {
    fn segment(&self, _image: &RgbImage) -> Vec<Roi> {
      self.0.clone()
    }
  }

  fn canvas_transform(w: u32, h: u32) -> CanvasTransform {
    CanvasTransform::fit(w, h, 512, 512)
  }

  #[test]
  fn region_set_always_has_exact_capacity() {
    let image = RgbImage::new(400, 300);
    let proposer = RegionProposer::new(ProposalConfig::default());
    let set = proposer
      .propose(&NullSegmenter, &image, &canvas_transform(400, 300))
      .unwrap();
    assert_eq!(set.capacity(), 100);
    assert_eq!(set.canvas().len(), 100);
    assert_eq!(set.original().len(), 100);
    for roi in set.real_original() {
      assert!(!roi.is_degenerate());
    }
    for roi in &set.original()[set.padding_index()..] {
      assert!(roi.is_zero());
    }
  }

  #[test]
  fn padding_trails_real_regions() {
    // 只给两个合法分割候选，不生成网格
    let seg = FixedSegmenter(vec![
      Roi::new(10.0, 10.0, 40.0, 40.0),
      Roi::new(60.0, 60.0, 90.0, 90.0),
    ]);
    let config = ProposalConfig::default().with_grid(0, &[]);
    let proposer = RegionProposer::new(config);
    let image = RgbImage::new(200, 150);
    let set = proposer
      .propose(&seg, &image, &canvas_transform(200, 150))
      .unwrap();
    assert_eq!(set.padding_index(), 2);
    assert!(set.original()[2..].iter().all(Roi::is_zero));
    // 原图与缩放帧一致（长边未超限），顺序保持
    assert_eq!(set.original()[0], Roi::new(10.0, 10.0, 40.0, 40.0));
    assert_eq!(set.original()[1], Roi::new(60.0, 60.0, 90.0, 90.0));
  }

  #[test]
  fn truncation_keeps_earliest_candidates() {
    let seg = FixedSegmenter(vec![
      Roi::new(0.0, 0.0, 30.0, 30.0),
      Roi::new(30.0, 30.0, 60.0, 60.0),
      Roi::new(60.0, 0.0, 90.0, 30.0),
    ]);
    let config = ProposalConfig::default().with_grid(0, &[]).with_capacity(2);
    let proposer = RegionProposer::new(config);
    let image = RgbImage::new(200, 150);
    let set = proposer
      .propose(&seg, &image, &canvas_transform(200, 150))
      .unwrap();
    assert_eq!(set.capacity(), 2);
    assert_eq!(set.padding_index(), 2);
    assert_eq!(set.original()[0], Roi::new(0.0, 0.0, 30.0, 30.0));
    assert_eq!(set.original()[1], Roi::new(30.0, 30.0, 60.0, 60.0));
  }

  #[test]
  fn survivors_satisfy_all_filter_constraints() {
    // 图像长边等于缩放上限，原图坐标即缩放帧坐标
    let image = RgbImage::new(200, 150);
    let config = ProposalConfig::default();
    let proposer = RegionProposer::new(config.clone());
    let set = proposer
      .propose(&NullSegmenter, &image, &canvas_transform(200, 150))
      .unwrap();
    assert!(set.padding_index() > 0);
    for roi in set.real_original() {
      // 取整最多引入一个像素的偏差
      assert!(roi.width() >= config.min_dim - 1.0);
      assert!(roi.height() >= config.min_dim - 1.0);
      assert!(roi.width() <= config.max_dim + 1.0);
      assert!(roi.height() <= config.max_dim + 1.0);
      assert!(roi.aspect() <= config.max_aspect + 0.1);
    }
  }

  #[test]
  fn filtered_out_candidates_trigger_fallback() {
    // 分割候选全部违反尺寸约束，网格关闭
    let seg = FixedSegmenter(vec![
      Roi::new(0.0, 0.0, 2.0, 2.0),     // 过小
      Roi::new(0.0, 0.0, 199.0, 10.0),  // 长宽比过大
      Roi::new(0.0, 0.0, 150.0, 150.0), // 过大
    ]);
    let config = ProposalConfig::default().with_grid(0, &[]);
    let proposer = RegionProposer::new(config);
    let image = RgbImage::new(200, 150);
    let set = proposer
      .propose(&seg, &image, &canvas_transform(200, 150))
      .unwrap();
    assert_eq!(set.padding_index(), 1);
    let fallback = set.original()[0];
    assert_eq!(fallback, Roi::new(3.0, 3.0, 197.0, 147.0));
  }

  #[test]
  fn rescale_divides_by_resize_factor() {
    // 400x300 图像缩放到 200x150，候选坐标应放大一倍
    let seg = FixedSegmenter(vec![Roi::new(10.0, 10.0, 40.0, 40.0)]);
    let config = ProposalConfig::default().with_grid(0, &[]);
    let proposer = RegionProposer::new(config);
    let image = RgbImage::new(400, 300);
    let set = proposer
      .propose(&seg, &image, &canvas_transform(400, 300))
      .unwrap();
    assert_eq!(set.original()[0], Roi::new(20.0, 20.0, 80.0, 80.0));
  }

  #[test]
  fn empty_image_is_fatal() {
    let proposer = RegionProposer::new(ProposalConfig::default());
    let image = RgbImage::new(0, 0);
    assert!(
      proposer
        .propose(&NullSegmenter, &image, &canvas_transform(1, 1))
        .is_err()
    );
  }

  #[test]
  fn canvas_flat_is_row_major_n_by_four() {
    let seg = FixedSegmenter(vec![Roi::new(10.0, 10.0, 40.0, 40.0)]);
    let config = ProposalConfig::default().with_grid(0, &[]).with_capacity(4);
    let proposer = RegionProposer::new(config);
    let image = RgbImage::new(200, 150);
    let set = proposer
      .propose(&seg, &image, &canvas_transform(200, 150))
      .unwrap();
    let flat = set.canvas_flat();
    assert_eq!(flat.len(), 16);
    assert_eq!(&flat[4..], &[0.0; 12]);
  }
}
