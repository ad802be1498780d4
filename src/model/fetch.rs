// 该文件是 Hexi （河西晚照） 项目的一部分。
// src/model/fetch.rs - 模型权重获取
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use std::io::Read;
use std::path::Path;

use thiserror::Error;
use tracing::{debug, info};

#[derive(Error, Debug)]
pub enum FetchError {
  #[error("下载错误: {0}")]
  Http(#[from] Box<ureq::Error>),
  #[error("I/O 错误: {0}")]
  Io(#[from] std::io::Error),
}

/// 本地权重缺失时从远程地址获取一次；
/// 下载失败直接向上传播，调用方视为致命错误
pub fn ensure_local(path: &Path, url: &str) -> Result<(), FetchError> {
  if path.exists() {
    debug!("权重文件已存在: {}", path.display());
    return Ok(());
  }

  info!("权重文件缺失，从 {} 下载", url);
  let response = ureq::get(url).call().map_err(Box::new)?;

  let mut data = Vec::new();
  response.into_reader().read_to_end(&mut data)?;

  if let Some(parent) = path.parent()
    && !parent.as_os_str().is_empty()
  {
    std::fs::create_dir_all(parent)?;
  }
  std::fs::write(path, &data)?;

  info!(
    "权重已保存到 {} ({:.2} MB)",
    path.display(),
    data.len() as f64 / (1024.0 * 1024.0)
  );

  Ok(())
}
