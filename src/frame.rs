// 该文件是 Hexi （河西晚照） 项目的一部分。
// src/frame.rs - 原始帧与模型画布帧定义
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

use image::{Rgb, RgbImage, imageops};
use thiserror::Error;

use crate::geometry::CanvasTransform;
use crate::input::AsNhwcFrame;

const RGB_CHANNELS: usize = 3;
/// 画布边界填充灰度
const PAD_FILL: u8 = 114;

#[derive(Error, Debug)]
pub enum FrameError {
  #[error("图像尺寸无效: {width}x{height}")]
  EmptyImage { width: u32, height: u32 },
}

/// 原始尺寸的输入帧
#[derive(Debug, Clone)]
pub struct SourceFrame {
  image: RgbImage,
}

impl SourceFrame {
  pub fn new(image: RgbImage) -> Result<Self, FrameError> {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
      return Err(FrameError::EmptyImage { width, height });
    }
    Ok(SourceFrame { image })
  }

  pub fn width(&self) -> u32 {
    self.image.width()
  }

  pub fn height(&self) -> u32 {
    self.image.height()
  }

  pub fn image(&self) -> &RgbImage {
    &self.image
  }
}

/// 模型输入画布帧：原图等比缩放后居中，边界以灰色填充，
/// NHWC 字节序，同时记录原图到画布的坐标变换
#[derive(Debug, Clone)]
pub struct PaddedFrame<const W: u32, const H: u32> {
  data: Box<[u8]>,
  transform: CanvasTransform,
}

impl<const W: u32, const H: u32> PaddedFrame<W, H> {
  pub fn from_image(image: &RgbImage) -> Result<Self, FrameError> {
    let (src_w, src_h) = image.dimensions();
    if src_w == 0 || src_h == 0 {
      return Err(FrameError::EmptyImage {
        width: src_w,
        height: src_h,
      });
    }

    let transform = CanvasTransform::fit(src_w, src_h, W, H);
    let scaled_w = transform.scaled_width(src_w);
    let scaled_h = transform.scaled_height(src_h);

    let resized = imageops::resize(image, scaled_w, scaled_h, imageops::FilterType::Triangle);

    let mut canvas = RgbImage::from_pixel(W, H, Rgb([PAD_FILL, PAD_FILL, PAD_FILL]));
    imageops::replace(
      &mut canvas,
      &resized,
      transform.dx as i64,
      transform.dy as i64,
    );

    Ok(PaddedFrame {
      data: canvas.into_raw().into_boxed_slice(),
      transform,
    })
  }

  pub fn transform(&self) -> &CanvasTransform {
    &self.transform
  }

  pub fn width(&self) -> usize {
    W as usize
  }

  pub fn height(&self) -> usize {
    H as usize
  }

  pub fn channels(&self) -> usize {
    RGB_CHANNELS
  }
}

impl<const W: u32, const H: u32> AsNhwcFrame<W, H> for PaddedFrame<W, H> {
  fn as_nhwc(&self) -> &[u8] {
    &self.data
  }
}

#[cfg(test)]
mod tests {
  use super::{PAD_FILL, PaddedFrame, SourceFrame};
  use crate::input::AsNhwcFrame;
  use image::RgbImage;

  #[test]
  fn source_frame_rejects_empty_image() {
    assert!(SourceFrame::new(RgbImage::new(0, 10)).is_err());
    assert!(SourceFrame::new(RgbImage::new(10, 0)).is_err());
    assert!(SourceFrame::new(RgbImage::new(10, 10)).is_ok());
  }

  #[test]
  fn padded_frame_has_canvas_shape() {
    let image = RgbImage::from_pixel(64, 32, image::Rgb([10, 20, 30]));
    let frame = PaddedFrame::<128, 128>::from_image(&image).unwrap();
    assert_eq!(frame.as_nhwc().len(), 128 * 128 * 3);
  }

  #[test]
  fn padded_frame_fills_borders_with_gray() {
    // 64x32 图像放入 128x128 画布，上下各留 32 像素填充带
    let image = RgbImage::from_pixel(64, 32, image::Rgb([200, 0, 0]));
    let frame = PaddedFrame::<128, 128>::from_image(&image).unwrap();
    let data = frame.as_nhwc();
    // 左上角位于填充带内
    assert_eq!(data[0], PAD_FILL);
    assert_eq!(data[1], PAD_FILL);
    assert_eq!(data[2], PAD_FILL);
    // 画布中心落在缩放后的图像里
    let center = (64 * 128 + 64) * 3;
    assert_eq!(data[center], 200);
  }

  #[test]
  fn padded_frame_transform_maps_image_corner_inside_canvas() {
    let image = RgbImage::from_pixel(640, 480, image::Rgb([1, 2, 3]));
    let frame = PaddedFrame::<512, 512>::from_image(&image).unwrap();
    let t = frame.transform();
    let (x, y) = t.apply_point(640.0, 480.0);
    assert!(x <= 512.0 && y <= 512.0);
    let (x0, y0) = t.apply_point(0.0, 0.0);
    assert!(x0 >= 0.0 && y0 >= 0.0);
  }
}
