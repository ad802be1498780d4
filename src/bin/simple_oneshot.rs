// 该文件是 Hexi （河西晚照） 项目的一部分。
// src/bin/simple_oneshot.rs - 单帧推理演示
//
// 本程序遵循 GNU Affero 通用公共许可证（AGPL）许可协议。
// 本程序的发布旨在提供实用价值，但不作任何形式的担保，
// 包括但不限于对适销性或特定用途适用性的默示担保。
// 更多详情请参阅 GNU 通用公共许可证。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, ETVP

use anyhow::Result;
use clap::Parser;
use tracing::info;
use url::Url;

use hexi::{
  FromUrl,
  detect::{DetectConfig, RcnnDetector},
  input::InputWrapper,
  model::{FastRcnnBuilder, GroceryLabel},
  output::OutputWrapper,
  proposal::{ProposalConfig, RegionProposer},
  segment::{LumaRegionSegmenter, SegmentParams},
  suppress::SuppressConfig,
  task::{OneShotTask, Task},
};

/// 模型画布尺寸
const CANVAS_W: u32 = 512;
const CANVAS_H: u32 = 512;

/// Hexi 单帧推理参数配置
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型地址 (fastrcnn:///path/model.rknn?url=https://…)
  #[arg(long, value_name = "MODEL")]
  pub model: Url,
  /// 输入来源 (image:///path/in.jpg)
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出路径 (image:///path/out.png 或 folder:///dir?record=name)
  #[arg(long, value_name = "OUTPUT")]
  pub output: Url,
  /// 区域槽位容量
  #[arg(long, default_value = "100", value_name = "COUNT")]
  pub capacity: usize,
  /// NMS IoU 阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.1", value_name = "THRESHOLD")]
  pub nms_threshold: f32,
  /// 置信度阈值 (0.0 - 1.0)
  #[arg(long, default_value = "0.5", value_name = "THRESHOLD")]
  pub confidence: f32,
  /// 保留背景类检测
  #[arg(long)]
  pub keep_background: bool,
  /// 分割量化级数
  #[arg(long, default_value = "8", value_name = "LEVELS")]
  pub seg_scale: u8,
  /// 分割平滑标准差
  #[arg(long, default_value = "1.2", value_name = "SIGMA")]
  pub seg_sigma: f32,
  /// 分割最小连通域像素数
  #[arg(long, default_value = "20", value_name = "PIXELS")]
  pub seg_min_size: u32,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型地址: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let segmenter = LumaRegionSegmenter::new(SegmentParams {
    scale: args.seg_scale,
    sigma: args.seg_sigma,
    min_size: args.seg_min_size,
  });
  let proposer = RegionProposer::new(ProposalConfig::default().with_capacity(args.capacity));
  let classifier = FastRcnnBuilder::from_url(&args.model)?.build()?;

  let suppress = SuppressConfig {
    iou_threshold: args.nms_threshold,
    ignore_background: !args.keep_background,
    ..SuppressConfig::default()
  };
  let config = DetectConfig {
    min_confidence: args.confidence,
    ..DetectConfig::default()
  };

  let detector: RcnnDetector<_, _, GroceryLabel, CANVAS_W, CANVAS_H> =
    RcnnDetector::new(segmenter, proposer, classifier)
      .with_suppress(suppress)
      .with_config(config);

  let input = InputWrapper::from_url(&args.input)?;
  let output = OutputWrapper::from_url(&args.output)?;

  OneShotTask.run_task(input, detector, output)?;

  Ok(())
}
