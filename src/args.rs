// 该文件是 Multitask-Yolo（多任务 YOLO 后处理）项目的一部分。
// src/args.rs - 命令行参数
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

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use multitask_yolo::postprocess::Backend;
use url::Url;

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TaskKind {
  /// 只处理第一帧
  Oneshot,
  /// 对第一帧重复处理并统计耗时
  Repeat,
  /// 依次处理所有帧
  #[default]
  Continuous,
}

/// 多任务 YOLO 后处理
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 模型输出转储，如 dump:///path/to/frames
  #[arg(long, value_name = "SOURCE")]
  pub input: Url,

  /// 输出路径，如 stdout: 或 folder:///path/to/records?always&raw
  #[arg(long, value_name = "OUTPUT", default_value = "stdout:")]
  pub output: Url,

  /// 检测器配置文件（JSON），缺省使用内置的手势与人体检测头
  #[arg(long, value_name = "FILE")]
  pub config: Option<PathBuf>,

  /// 覆盖配置中的后处理后端
  #[arg(long, value_enum, value_name = "BACKEND")]
  pub backend: Option<Backend>,

  #[arg(long, value_enum, default_value_t = TaskKind::Continuous)]
  pub task: TaskKind,

  /// repeat 任务的重复次数
  #[arg(long, default_value_t = 1000, value_name = "TIMES")]
  pub repeat: usize,

  /// continuous 任务的最大帧数
  #[arg(long, value_name = "FRAME_NUMBER")]
  pub max_frames: Option<usize>,
}
