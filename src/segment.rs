// 该文件是 Hexi （河西晚照） 项目的一部分。
// src/segment.rs - 候选区域分割
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use image::RgbImage;

use crate::geometry::Roi;

/// 量化级数
pub const SEGMENT_SCALE: u8 = 8;
/// 预平滑高斯核标准差
pub const SEGMENT_SIGMA: f32 = 1.2;
/// 最小连通域像素数
pub const SEGMENT_MIN_SIZE: u32 = 20;

/// 分割参数
#[derive(Debug, Clone, Copy)]
pub struct SegmentParams {
  pub scale: u8,
  pub sigma: f32,
  pub min_size: u32,
}

impl Default for SegmentParams {
  fn default() -> Self {
    SegmentParams {
      scale: SEGMENT_SCALE,
      sigma: SEGMENT_SIGMA,
      min_size: SEGMENT_MIN_SIZE,
    }
  }
}

/// 区域分割例程：输入图像，输出候选矩形集合。
/// 分割算法本身视为外部黑盒，实现者只需保证确定性。
pub trait Segmenter {
  fn segment(&self, image: &RgbImage) -> Vec<Roi>;
}

/// 不产生任何候选区域的分割器，仅依赖网格候选时使用
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSegmenter;

impl Segmenter for NullSegmenter {
  fn segment(&self, _image: &RgbImage) -> Vec<Roi> {
    Vec::new()
  }
}

#[cfg(feature = "segment_luma")]
mod luma {
  use std::collections::BTreeMap;

  use image::{GrayImage, Luma, RgbImage, imageops};
  use imageproc::filter::gaussian_blur_f32;
  use imageproc::region_labelling::{Connectivity, connected_components};
  use tracing::debug;

  use super::{SegmentParams, Segmenter};
  use crate::geometry::Roi;

  /// 基于亮度量化连通域的分割器：
  /// 高斯平滑后把亮度量化到 scale 个等级，
  /// 同级相邻像素归为一个区域，输出各区域的包围盒
  #[derive(Debug, Clone, Copy, Default)]
  pub struct LumaRegionSegmenter {
    params: SegmentParams,
  }

  impl LumaRegionSegmenter {
    pub fn new(params: SegmentParams) -> Self {
      LumaRegionSegmenter { params }
    }
  }

  fn quantize(image: &GrayImage, levels: u8) -> GrayImage {
    let levels = levels.max(2) as u16;
    let step = (256 / levels).max(1);
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
      let band = (pixel[0] as u16 / step).min(254) as u8;
      *pixel = Luma([band]);
    }
    out
  }

  impl Segmenter for LumaRegionSegmenter {
    fn segment(&self, image: &RgbImage) -> Vec<Roi> {
      let gray = imageops::grayscale(image);
      let smoothed = gaussian_blur_f32(&gray, self.params.sigma.max(0.01));
      let quantized = quantize(&smoothed, self.params.scale);

      // 量化结果不含 255，因此没有像素会被当作背景忽略
      let labels = connected_components(&quantized, Connectivity::Eight, Luma([u8::MAX]));

      let mut bounds: BTreeMap<u32, (u32, u32, u32, u32, u32)> = BTreeMap::new();
      for (x, y, label) in labels.enumerate_pixels() {
        let id = label[0];
        if id == 0 {
          continue;
        }
        let entry = bounds.entry(id).or_insert((x, y, x, y, 0));
        entry.0 = entry.0.min(x);
        entry.1 = entry.1.min(y);
        entry.2 = entry.2.max(x);
        entry.3 = entry.3.max(y);
        entry.4 += 1;
      }

      let rois: Vec<Roi> = bounds
        .values()
        .filter(|(_, _, _, _, count)| *count >= self.params.min_size)
        .map(|(x1, y1, x2, y2, _)| {
          Roi::new(*x1 as f32, *y1 as f32, (*x2 + 1) as f32, (*y2 + 1) as f32)
        })
        .collect();

      debug!("分割得到 {} 个候选区域", rois.len());
      rois
    }
  }

}

#[cfg(feature = "segment_luma")]
pub use self::luma::LumaRegionSegmenter;
