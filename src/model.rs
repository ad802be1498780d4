// 该文件是 Hexi （河西晚照） 项目的一部分。
// src/model.rs - 模型
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use thiserror::Error;

use crate::input::AsNhwcFrame;
use crate::proposal::RegionSet;

pub trait Model {
  type Input;
  type Output;
  type Error;

  fn infer(&self, input: &Self::Input) -> Result<Self::Output, Self::Error>;
}

/// 区域分类器边界：输入画布帧与区域集合，
/// 输出与槽位逐行对齐的得分矩阵。
/// 相同输入必须产生相同输出，内部实现视为黑盒。
pub trait ClassifyRegions<const W: u32, const H: u32> {
  type Error;

  fn classify<F: AsNhwcFrame<W, H>>(
    &self,
    frame: &F,
    regions: &RegionSet,
  ) -> Result<ScoreMatrix, Self::Error>;
}

#[derive(Error, Debug)]
#[error("得分矩阵形状无效: 长度 {len} 不能按 {num_classes} 类整除")]
pub struct ScoreShapeError {
  pub len: usize,
  pub num_classes: usize,
}

/// N x C 行主序得分矩阵，行与区域槽位对齐，
/// 填充槽位的得分存在但不参与后续处理
#[derive(Debug, Clone)]
pub struct ScoreMatrix {
  scores: Box<[f32]>,
  num_classes: usize,
}

impl ScoreMatrix {
  pub fn new(scores: Vec<f32>, num_classes: usize) -> Result<Self, ScoreShapeError> {
    if num_classes == 0 || scores.len() % num_classes != 0 {
      return Err(ScoreShapeError {
        len: scores.len(),
        num_classes,
      });
    }
    Ok(ScoreMatrix {
      scores: scores.into_boxed_slice(),
      num_classes,
    })
  }

  pub fn num_rows(&self) -> usize {
    self.scores.len() / self.num_classes
  }

  pub fn num_classes(&self) -> usize {
    self.num_classes
  }

  pub fn row(&self, index: usize) -> &[f32] {
    let start = index * self.num_classes;
    &self.scores[start..start + self.num_classes]
  }
}

/// 检测结果条目，bbox 为原图坐标系下的归一化
/// [x_min, y_min, x_max, y_max]
#[derive(Debug, Clone)]
pub struct DetectItem<T> {
  pub kind: T,
  pub score: f32,
  pub bbox: [f32; 4],
}

#[derive(Debug, Clone)]
pub struct DetectResult<T> {
  pub items: Box<[DetectItem<T>]>,
}

impl<T> DetectResult<T> {
  pub fn len(&self) -> usize {
    self.items.len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.is_empty()
  }
}

pub trait WithLabel: Sized + std::fmt::Debug {
  fn to_label_str(&self) -> String;
  fn to_label_id(&self) -> u32;
  fn from_label_id(id: u32) -> Self;
}

/// 杂货数据集类别数（含背景）
pub const GROCERY_CLASS_NUM: usize = 17;

/// 杂货数据集类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroceryLabel {
  Background,
  Avocado,
  Orange,
  Butter,
  Champagne,
  EggBox,
  Gerkin,
  Joghurt,
  Ketchup,
  OrangeJuice,
  Onion,
  Pepper,
  Tomato,
  Water,
  Milk,
  Tabasco,
  Mustard,
}

impl WithLabel for GroceryLabel {
  fn to_label_str(&self) -> String {
    match self {
      GroceryLabel::Background => "__background__",
      GroceryLabel::Avocado => "avocado",
      GroceryLabel::Orange => "orange",
      GroceryLabel::Butter => "butter",
      GroceryLabel::Champagne => "champagne",
      GroceryLabel::EggBox => "eggBox",
      GroceryLabel::Gerkin => "gerkin",
      GroceryLabel::Joghurt => "joghurt",
      GroceryLabel::Ketchup => "ketchup",
      GroceryLabel::OrangeJuice => "orangeJuice",
      GroceryLabel::Onion => "onion",
      GroceryLabel::Pepper => "pepper",
      GroceryLabel::Tomato => "tomato",
      GroceryLabel::Water => "water",
      GroceryLabel::Milk => "milk",
      GroceryLabel::Tabasco => "tabasco",
      GroceryLabel::Mustard => "mustard",
    }
    .to_string()
  }

  fn to_label_id(&self) -> u32 {
    match self {
      GroceryLabel::Background => 0,
      GroceryLabel::Avocado => 1,
      GroceryLabel::Orange => 2,
      GroceryLabel::Butter => 3,
      GroceryLabel::Champagne => 4,
      GroceryLabel::EggBox => 5,
      GroceryLabel::Gerkin => 6,
      GroceryLabel::Joghurt => 7,
      GroceryLabel::Ketchup => 8,
      GroceryLabel::OrangeJuice => 9,
      GroceryLabel::Onion => 10,
      GroceryLabel::Pepper => 11,
      GroceryLabel::Tomato => 12,
      GroceryLabel::Water => 13,
      GroceryLabel::Milk => 14,
      GroceryLabel::Tabasco => 15,
      GroceryLabel::Mustard => 16,
    }
  }

  /// 未知编号归入背景
  fn from_label_id(id: u32) -> Self {
    match id {
      1 => GroceryLabel::Avocado,
      2 => GroceryLabel::Orange,
      3 => GroceryLabel::Butter,
      4 => GroceryLabel::Champagne,
      5 => GroceryLabel::EggBox,
      6 => GroceryLabel::Gerkin,
      7 => GroceryLabel::Joghurt,
      8 => GroceryLabel::Ketchup,
      9 => GroceryLabel::OrangeJuice,
      10 => GroceryLabel::Onion,
      11 => GroceryLabel::Pepper,
      12 => GroceryLabel::Tomato,
      13 => GroceryLabel::Water,
      14 => GroceryLabel::Milk,
      15 => GroceryLabel::Tabasco,
      16 => GroceryLabel::Mustard,
      _ => GroceryLabel::Background,
    }
  }
}

#[cfg(feature = "model_fastrcnn")]
mod fastrcnn;
#[cfg(feature = "model_fastrcnn")]
pub use self::fastrcnn::{FastRcnn, FastRcnnBuilder, FastRcnnError};

#[cfg(feature = "fetch_model")]
mod fetch;
#[cfg(feature = "fetch_model")]
pub use self::fetch::{FetchError, ensure_local};
