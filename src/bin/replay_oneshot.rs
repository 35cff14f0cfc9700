// 该文件是 Duizhun （对准） 项目的一部分。
// src/bin/replay_oneshot.rs - 回放第一帧推理输出
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

use anyhow::Result;
use clap::Parser;
use url::Url;

use duizhun::{
  DetectionPipeline, FromUrl, PipelineConfig,
  input::{ReplayInference, ReplayInput},
  output::JsonLinesOutput,
  task::{CycleDriver, OneShotTask, Task},
};
use tracing::info;

/// Duizhun 回放参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 流水线配置，例如 detect://640?score_threshold=0.5
  #[arg(long, value_name = "CONFIG")]
  pub config: Url,
  /// 回放文件，例如 replay:///data/frames.json
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,
  /// 输出，例如 json://- 或 json:///data/result.jsonl
  #[arg(long, value_name = "OUTPUT", default_value = "json://-")]
  pub output: Url,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("流水线配置: {}", args.config);
  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let config = PipelineConfig::from_url(&args.config)?;
  let labels = config.labels.clone();
  let input = ReplayInput::from_url(&args.input)?;
  let output = JsonLinesOutput::from_url(&args.output)?.with_labels(labels);
  let driver = CycleDriver::new(ReplayInference, DetectionPipeline::new(config)?);

  OneShotTask.run_task(input.into_frames(), &driver, output)?;

  Ok(())
}
