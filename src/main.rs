// 该文件是 Multitask-Yolo（多任务 YOLO 后处理）项目的一部分。
// src/main.rs - 项目主程序
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

mod args;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use multitask_yolo::{
  FromUrl,
  config::DetectorConfig,
  detector::MultiTaskDetector,
  input::DumpInput,
  output::OutputWrapper,
  task::{ContinuousTask, OneShotTask, RepeatShotTask, Task},
};

use crate::args::{Args, TaskKind};

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("输入来源: {}", args.input);
  info!("输出路径: {}", args.output);

  let mut config = match &args.config {
    Some(path) => {
      info!("配置文件: {}", path.display());
      DetectorConfig::from_json_file(path)?
    }
    None => DetectorConfig::default(),
  };
  if let Some(backend) = args.backend {
    config.backend = backend;
  }

  let detector = MultiTaskDetector::new(config)?;
  info!(
    "检测器就绪: 后端 {}, {} 个检测头",
    detector.backend(),
    detector.config().heads.len()
  );

  let input = DumpInput::from_url(&args.input)?.into_frames();
  let output = OutputWrapper::from_url(&args.output)?;

  match args.task {
    TaskKind::Oneshot => OneShotTask.run_task(input, &detector, output)?,
    TaskKind::Repeat => RepeatShotTask::default()
      .with_times(args.repeat)
      .run_task(input, &detector, output)?,
    TaskKind::Continuous => ContinuousTask::default()
      .with_frame_number(args.max_frames)
      .run_task(input, &detector, output)?,
  }

  info!("平均帧率: {}", detector.computed_time().fps());

  Ok(())
}
