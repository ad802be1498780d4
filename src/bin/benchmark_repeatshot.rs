// 该文件是 Hexi （河西晚照） 项目的一部分。
// src/bin/benchmark_repeatshot.rs - 重复推理计时
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
  detect::RcnnDetector,
  input::InputWrapper,
  model::{FastRcnnBuilder, GroceryLabel},
  output::OutputWrapper,
  proposal::{ProposalConfig, RegionProposer},
  segment::{LumaRegionSegmenter, SegmentParams},
  task::{RepeatShotTask, Task},
};

/// 模型画布尺寸
const CANVAS_W: u32 = 512;
const CANVAS_H: u32 = 512;

/// Hexi 重复推理计时参数配置
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
  /// 重复次数
  #[arg(long, default_value = "100", value_name = "COUNT")]
  pub times: usize,
  /// 区域槽位容量
  #[arg(long, default_value = "100", value_name = "COUNT")]
  pub capacity: usize,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("模型地址: {}", args.model);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);
  info!("重复次数: {}", args.times);

  let segmenter = LumaRegionSegmenter::new(SegmentParams::default());
  let proposer = RegionProposer::new(ProposalConfig::default().with_capacity(args.capacity));
  let classifier = FastRcnnBuilder::from_url(&args.model)?.build()?;

  let detector: RcnnDetector<_, _, GroceryLabel, CANVAS_W, CANVAS_H> =
    RcnnDetector::new(segmenter, proposer, classifier);

  let input = InputWrapper::from_url(&args.input)?;
  let output = OutputWrapper::from_url(&args.output)?;

  RepeatShotTask::default()
    .with_times(args.times)
    .run_task(input, detector, output)?;

  Ok(())
}
