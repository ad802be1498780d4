// 该文件是 Hexi （河西晚照） 项目的一部分。
// src/output/draw.rs - 检测结果可视化
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use ab_glyph::{FontVec, PxScale};
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_text_mut};
use thiserror::Error;
use tracing::warn;

use crate::frame::SourceFrame;
use crate::model::{DetectItem, DetectResult, WithLabel};

// 文本渲染常量
const LABEL_FONT_SIZE: f32 = 20.0;
const LABEL_TEXT_HEIGHT: i32 = 24;
const LABEL_CHAR_WIDTH: f32 = 11.0; // 每字符平均宽度（粗略估计）
const LABEL_TEXT_VERTICAL_PADDING: i32 = 2;
const LABEL_COLOR: [u8; 3] = [0, 0, 255]; // 蓝色
/// 默认字体文件位置
const DEFAULT_FONT_PATH: &str = "assets/font.ttf";

#[derive(Error, Debug)]
pub enum DrawFontError {
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("字体无效: {0}")]
  InvalidFont(#[from] ab_glyph::InvalidFont),
}

pub struct Draw {
  font_size: f32,
  label_text_height: i32,
  label_char_width: f32,
  label_text_vertical_padding: i32,
  font: Option<FontVec>,
  label_color: [u8; 3],
}

impl Default for Draw {
  fn default() -> Self {
    // 默认字体缺失时退化为只画边框
    let font = match Self::load_font(DEFAULT_FONT_PATH) {
      Ok(font) => Some(font),
      Err(e) => {
        warn!("无法加载字体 {}: {}, 标签文本将被省略", DEFAULT_FONT_PATH, e);
        None
      }
    };

    Self::with_font(font)
  }
}

impl Draw {
  pub fn with_font(font: Option<FontVec>) -> Self {
    Draw {
      font_size: LABEL_FONT_SIZE,
      label_text_height: LABEL_TEXT_HEIGHT,
      label_char_width: LABEL_CHAR_WIDTH,
      label_text_vertical_padding: LABEL_TEXT_VERTICAL_PADDING,
      label_color: LABEL_COLOR,
      font,
    }
  }

  pub fn from_font_file(path: &str) -> Result<Self, DrawFontError> {
    Ok(Self::with_font(Some(Self::load_font(path)?)))
  }

  fn load_font(path: &str) -> Result<FontVec, DrawFontError> {
    let data = std::fs::read(path)?;
    Ok(FontVec::try_from_vec(data)?)
  }

  // 在图像上绘制一个矩形边框，bbox 为归一化坐标 [x_min, y_min, x_max, y_max]
  fn draw_bbox_with_label<T: WithLabel>(
    &self,
    image: &mut RgbImage,
    bbox: &[f32; 4],
    kind: &T,
    score: f32,
    color: [u8; 3],
  ) {
    let (w, h) = (image.width() as f32, image.height() as f32);

    let mut x_min = (bbox[0] * w).floor() as i32;
    let mut y_min = (bbox[1] * h).floor() as i32;
    let mut x_max = (bbox[2] * w).ceil() as i32;
    let mut y_max = (bbox[3] * h).ceil() as i32;

    // Clamp to image bounds
    x_min = x_min.clamp(0, w as i32 - 1);
    y_min = y_min.clamp(0, h as i32 - 1);
    x_max = x_max.clamp(0, w as i32 - 1);
    y_max = y_max.clamp(0, h as i32 - 1);

    if x_min >= x_max || y_min >= y_max {
      return;
    }

    // 绘制边框（加粗为2像素）
    for thickness in 0..2 {
      let x_min_t = (x_min + thickness).min(w as i32 - 1);
      let y_min_t = (y_min + thickness).min(h as i32 - 1);
      let x_max_t = (x_max - thickness).max(0);
      let y_max_t = (y_max - thickness).max(0);

      // Top and bottom edges
      for x in x_min_t..=x_max_t {
        if y_min_t >= 0 && (y_min_t as u32) < image.height() && (x as u32) < image.width() {
          let top = image.get_pixel_mut(x as u32, y_min_t as u32);
          *top = Rgb(color);
        }
        if y_max_t >= 0 && (y_max_t as u32) < image.height() && (x as u32) < image.width() {
          let bottom = image.get_pixel_mut(x as u32, y_max_t as u32);
          *bottom = Rgb(color);
        }
      }

      // Left and right edges
      for y in y_min_t..=y_max_t {
        if x_min_t >= 0 && (x_min_t as u32) < image.width() && (y as u32) < image.height() {
          let left = image.get_pixel_mut(x_min_t as u32, y as u32);
          *left = Rgb(color);
        }
        if x_max_t >= 0 && (x_max_t as u32) < image.width() && (y as u32) < image.height() {
          let right = image.get_pixel_mut(x_max_t as u32, y as u32);
          *right = Rgb(color);
        }
      }
    }

    let Some(font) = &self.font else {
      return;
    };

    // 创建标签文本
    let label = format!("{} {:.2}", kind.to_label_str(), score);

    // 文本参数
    let scale = PxScale::from(self.font_size);
    let text_color = Rgb([255u8, 255u8, 255u8]); // 白色文本

    // 估算文本大小（粗略估计）
    let text_width = (label.len() as f32 * self.label_char_width) as i32;
    let text_height = self.label_text_height;

    // 确定标签背景位置（在边框上方）
    let label_x = x_min.max(0);
    let label_y = (y_min - text_height).max(0);

    // 确保标签不超出图像边界
    let max_width = (w as i32 - label_x).max(0);
    let label_width = text_width.min(max_width) as u32;
    let label_height = text_height as u32;

    // 仅在标签有空间时绘制
    if label_width > 0 && label_height > 0 {
      // 绘制标签背景
      let rect = imageproc::rect::Rect::at(label_x, label_y).of_size(label_width, label_height);
      draw_filled_rect_mut(image, rect, Rgb(color));

      // 绘制文本
      draw_text_mut(
        image,
        text_color,
        label_x,
        label_y + self.label_text_vertical_padding,
        scale,
        font,
        &label,
      );
    }
  }
}

pub trait DrawDetectionOnImage<T: WithLabel> {
  fn draw_detections_on_image(&self, image: &mut RgbImage, result: &DetectResult<T>);
}

pub trait ToRgbImage {
  fn to_rgb_image(&self) -> RgbImage;
}

pub trait FromRgbImage {
  fn from_rgb_image(image: &RgbImage) -> Self;
}

pub trait DrawDetectionOnFrame<FromFrame, ToFrame, T: WithLabel> {
  fn draw_detection(&self, frame: &FromFrame, result: &DetectResult<T>) -> ToFrame;
}

impl<FromFrame: ToRgbImage, ToFrame: FromRgbImage, T: WithLabel, D: DrawDetectionOnImage<T>>
  DrawDetectionOnFrame<FromFrame, ToFrame, T> for D
{
  fn draw_detection(&self, frame: &FromFrame, result: &DetectResult<T>) -> ToFrame {
    let mut image = frame.to_rgb_image();
    self.draw_detections_on_image(&mut image, result);
    ToFrame::from_rgb_image(&image)
  }
}

impl ToRgbImage for SourceFrame {
  fn to_rgb_image(&self) -> RgbImage {
    self.image().clone()
  }
}

impl FromRgbImage for RgbImage {
  fn from_rgb_image(image: &RgbImage) -> Self {
    image.clone()
  }
}

impl<T: WithLabel> DrawDetectionOnImage<T> for Draw {
  fn draw_detections_on_image(&self, image: &mut RgbImage, result: &DetectResult<T>) {
    // 绘制检测框和标签
    for DetectItem { kind, score, bbox } in result.items.iter() {
      self.draw_bbox_with_label(image, bbox, kind, *score, self.label_color);
    }
  }
}

pub struct Record {
  pub label_with_name: bool,
}

impl Record {
  pub fn record<T: WithLabel>(
    &self,
    result: &DetectResult<T>,
    path: &std::path::Path,
  ) -> Result<(), std::io::Error> {
    let mut records = Vec::new();
    for item in result.items.iter() {
      let name = if self.label_with_name {
        item.kind.to_label_str()
      } else {
        format!("{}", item.kind.to_label_id())
      };
      let record = format!(
        "{}, {:.4}, {:.4}, {:.4}, {:.4}, {:.4}",
        name, item.score, item.bbox[0], item.bbox[1], item.bbox[2], item.bbox[3]
      );
      records.push(record);
    }
    std::fs::write(path.with_extension("txt"), records.join("\n"))?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::{Draw, DrawDetectionOnImage};
  use crate::model::{DetectItem, DetectResult, GroceryLabel};
  use image::{Rgb, RgbImage};

  #[test]
  fn draw_marks_box_border_pixels() {
    let mut image = RgbImage::from_pixel(100, 100, Rgb([0, 0, 0]));
    let result = DetectResult {
      items: vec![DetectItem {
        kind: GroceryLabel::Orange,
        score: 0.9,
        bbox: [0.2, 0.2, 0.8, 0.8],
      }]
      .into_boxed_slice(),
    };
    let draw = Draw::with_font(None);
    draw.draw_detections_on_image(&mut image, &result);
    // 边框像素被染成标签颜色
    assert_eq!(*image.get_pixel(20, 20), Rgb([0, 0, 255]));
    assert_eq!(*image.get_pixel(50, 20), Rgb([0, 0, 255]));
    // 框内部保持原样
    assert_eq!(*image.get_pixel(50, 50), Rgb([0, 0, 0]));
  }

  #[test]
  fn degenerate_bbox_is_ignored() {
    let mut image = RgbImage::from_pixel(50, 50, Rgb([0, 0, 0]));
    let result = DetectResult {
      items: vec![DetectItem {
        kind: GroceryLabel::Tomato,
        score: 0.7,
        bbox: [0.5, 0.5, 0.5, 0.5],
      }]
      .into_boxed_slice(),
    };
    let draw = Draw::with_font(None);
    draw.draw_detections_on_image(&mut image, &result);
    assert!(image.pixels().all(|p| *p == Rgb([0, 0, 0])));
  }
}
