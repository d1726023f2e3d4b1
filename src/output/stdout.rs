// 该文件是 Multitask-Yolo（多任务 YOLO 后处理）项目的一部分。
// src/output/stdout.rs - 标准输出
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

use std::io::Write;

use thiserror::Error;
use url::Url;

use crate::{FromUrl, FromUrlWithScheme, frame::Frame, model::DetectResult, output::Render};

#[derive(Error, Debug)]
pub enum StdoutOutputError {
  #[error("URI 方案不匹配")]
  SchemeMismatch,
  #[error("I/O 错误: {0}")]
  IoError(#[from] std::io::Error),
  #[error("序列化错误: {0}")]
  SerializeError(#[from] serde_json::Error),
}

/// 每帧输出一行 JSON
#[derive(Debug, Default)]
pub struct StdoutOutput;

impl FromUrlWithScheme for StdoutOutput {
  const SCHEME: &'static str = "stdout";
}

impl FromUrl for StdoutOutput {
  type Error = StdoutOutputError;

  fn from_url(url: &Url) -> Result<Self, Self::Error> {
    if url.scheme() != Self::SCHEME {
      return Err(StdoutOutputError::SchemeMismatch);
    }
    Ok(StdoutOutput)
  }
}

impl StdoutOutput {
  pub fn write_line<W: Write>(mut writer: W, result: &DetectResult) -> Result<(), StdoutOutputError> {
    serde_json::to_writer(&mut writer, result)?;
    writer.write_all(b"\n")?;
    Ok(())
  }
}

impl Render<Frame, DetectResult> for StdoutOutput {
  type Error = StdoutOutputError;

  fn render_result(&self, _frame: &Frame, result: &DetectResult) -> Result<(), Self::Error> {
    Self::write_line(std::io::stdout().lock(), result)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn writes_one_line_per_result() {
    let result = DetectResult {
      frame_index: 3,
      items: Box::new([]),
      boxes: Vec::new(),
    };
    let mut buffer = Vec::new();
    StdoutOutput::write_line(&mut buffer, &result).unwrap();
    assert_eq!(
      String::from_utf8(buffer).unwrap(),
      "{\"frame_index\":3,\"items\":[]}\n"
    );
  }
}
