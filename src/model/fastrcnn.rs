// 该文件是 Hexi （河西晚照） 项目的一部分。
// src/model/fastrcnn.rs - 区域分类模型
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use rknpu::{Context, InitFlags, TensorFormat, TensorType};
use thiserror::Error;
use tracing::{debug, error, info};
use url::Url;

use crate::FromUrl;
use crate::input::AsNhwcFrame;
use crate::model::{ClassifyRegions, GROCERY_CLASS_NUM, ScoreMatrix, ScoreShapeError};
use crate::proposal::RegionSet;

const FASTRCNN_NUM_INPUTS: u32 = 2;
const FASTRCNN_NUM_OUTPUTS: u32 = 1;
const FASTRCNN_SCHEME: &str = "fastrcnn";

/// 基于 RKNN 的区域分类器：输入画布图像与 N x 4 区域数组，
/// 输出 N x C 得分
pub struct FastRcnn {
  context: Context,
  num_classes: usize,
}

#[derive(Error, Debug)]
pub enum FastRcnnError {
  #[error("模型加载错误: {0}")]
  ModelLoadError(std::io::Error),
  #[error("模型无效: {0}, 错误: {1}")]
  ModelInvalid(String, rknpu::Error),
  #[error("RKNN 错误: {0}")]
  RknnError(rknpu::Error),
  #[error("模型路径错误: {0}")]
  ModelPathError(String),
  #[error("得分形状错误: {0}")]
  ScoreShape(#[from] ScoreShapeError),
  #[cfg(feature = "fetch_model")]
  #[error("权重下载错误: {0}")]
  FetchError(#[from] super::fetch::FetchError),
}

impl From<std::io::Error> for FastRcnnError {
  fn from(err: std::io::Error) -> Self {
    FastRcnnError::ModelLoadError(err)
  }
}

impl From<rknpu::Error> for FastRcnnError {
  fn from(err: rknpu::Error) -> Self {
    FastRcnnError::RknnError(err)
  }
}

impl FastRcnnError {
  pub fn invalid(msg: &str, e: rknpu::Error) -> Self {
    FastRcnnError::ModelInvalid(msg.to_string(), e)
  }
}

pub struct FastRcnnBuilder {
  model_path: String,
  remote_url: Option<String>,
  flags: InitFlags,
  num_classes: usize,
}

impl FromUrl for FastRcnnBuilder {
  type Error = FastRcnnError;

  /// fastrcnn:///path/to/model.rknn?url=https://…&classes=17
  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != FASTRCNN_SCHEME {
      return Err(FastRcnnError::ModelPathError(format!(
        "模型路径必须使用 {} 方案",
        FASTRCNN_SCHEME
      )));
    }

    let mut remote_url = None;
    let mut num_classes = GROCERY_CLASS_NUM;
    for (key, value) in url.query_pairs() {
      match key.as_ref() {
        "url" => remote_url = Some(value.to_string()),
        "classes" => {
          num_classes = value.parse().map_err(|_| {
            FastRcnnError::ModelPathError(format!("类别数无效: {}", value))
          })?;
        }
        _ => {}
      }
    }

    Ok(FastRcnnBuilder {
      model_path: url.path().to_string(),
      remote_url,
      flags: InitFlags::default(),
      num_classes,
    })
  }
}

impl FastRcnnBuilder {
  pub fn flags(mut self, flags: InitFlags) -> Self {
    self.flags = flags;
    self
  }

  pub fn num_classes(mut self, num_classes: usize) -> Self {
    self.num_classes = num_classes;
    self
  }

  pub fn build(self) -> Result<FastRcnn, FastRcnnError> {
    #[cfg(feature = "fetch_model")]
    if let Some(remote) = &self.remote_url {
      super::fetch::ensure_local(std::path::Path::new(&self.model_path), remote)?;
    }
    #[cfg(not(feature = "fetch_model"))]
    if let Some(remote) = &self.remote_url {
      debug!("未启用权重下载，忽略远程地址 {}", remote);
    }

    info!("加载模型文件: {}", self.model_path);
    let model_data = std::fs::read(&self.model_path)?;
    debug!(
      "模型文件大小: {:.2} MB",
      model_data.len() as f64 / (1024.0 * 1024.0)
    );

    info!("创建 RKNN 推理上下文");
    let context = Context::new(&model_data, self.flags)?;
    info!("模型加载完成");

    match context.sdk_version() {
      Ok(version) => {
        if let Ok(api_ver) = version.api_version() {
          debug!("模型 API 版本: {}", api_ver);
        }
        if let Ok(drv_ver) = version.driver_version() {
          debug!("模型驱动版本: {}", drv_ver);
        }
      }
      Err(e) => {
        error!("查询 SDK 版本失败: {}", e);
        return Err(FastRcnnError::invalid("无法查询 SDK 版本", e));
      }
    }

    let num_inputs = context
      .num_inputs()
      .map_err(|e| FastRcnnError::invalid("无法获取输入数量", e))?;
    let num_outputs = context
      .num_outputs()
      .map_err(|e| FastRcnnError::invalid("无法获取输出数量", e))?;

    if num_inputs != FASTRCNN_NUM_INPUTS {
      error!(
        "预期模型输入数量为 {}, 实际为 {}",
        FASTRCNN_NUM_INPUTS, num_inputs
      );
      return Err(FastRcnnError::invalid(
        &format!(
          "预期模型输入数量为 {}, 实际为 {}",
          FASTRCNN_NUM_INPUTS, num_inputs
        ),
        rknpu::Error::InvalidModel,
      ));
    }

    if num_outputs != FASTRCNN_NUM_OUTPUTS {
      error!(
        "预期模型输出数量为 {}, 实际为 {}",
        FASTRCNN_NUM_OUTPUTS, num_outputs
      );
      return Err(FastRcnnError::invalid(
        &format!(
          "预期模型输出数量为 {}, 实际为 {}",
          FASTRCNN_NUM_OUTPUTS, num_outputs
        ),
        rknpu::Error::InvalidModel,
      ));
    }

    debug!("模型输入数量: {}", num_inputs);
    debug!("模型输出数量: {}", num_outputs);

    Ok(FastRcnn {
      context,
      num_classes: self.num_classes,
    })
  }
}

impl<const W: u32, const H: u32> ClassifyRegions<W, H> for FastRcnn {
  type Error = FastRcnnError;

  fn classify<F: AsNhwcFrame<W, H>>(
    &self,
    frame: &F,
    regions: &RegionSet,
  ) -> Result<ScoreMatrix, Self::Error> {
    debug!("设置画布输入");
    self
      .context
      .set_input(0, frame.as_nhwc(), TensorFormat::NHWC, TensorType::UInt8)?;

    debug!("设置区域输入");
    let rois = regions.canvas_flat();
    let roi_bytes: Vec<u8> = rois.iter().flat_map(|v| v.to_le_bytes()).collect();
    self
      .context
      .set_input(1, &roi_bytes, TensorFormat::NHWC, TensorType::Float32)?;

    debug!("执行模型推理");
    self.context.run()?;

    debug!("获取模型输出");
    let output = self.context.get_outputs()?;
    let scores = match output.get_f32(0) {
      Ok(data) => data,
      Err(e) => {
        error!("获取得分输出失败: {}", e);
        return Err(FastRcnnError::RknnError(e));
      }
    };

    let expected = regions.capacity() * self.num_classes;
    if scores.len() != expected {
      error!(
        "得分输出长度 {} 与预期 {} x {} 不符",
        scores.len(),
        regions.capacity(),
        self.num_classes
      );
      return Err(FastRcnnError::invalid(
        &format!("得分输出长度 {} 与预期 {} 不符", scores.len(), expected),
        rknpu::Error::InvalidModel,
      ));
    }

    Ok(ScoreMatrix::new(scores.to_vec(), self.num_classes)?)
  }
}
