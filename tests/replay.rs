// 该文件是 Duizhun （对准） 项目的一部分。
// tests/replay.rs - 回放输入到 JSON 输出的集成测试
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

#![cfg(all(feature = "replay_input", feature = "json_output"))]

use duizhun::{
  DetectionPipeline, FromUrl, PipelineConfig,
  input::{ReplayFrames, ReplayInference, ReplayInput},
  output::JsonLinesOutput,
  task::{ContinuousTask, CycleDriver, Task},
};
use url::Url;

const REPLAY: &str = r#"{
  "geometry": { "native_width": 640, "native_height": 640, "displayed_width": 640, "displayed_height": 640 },
  "frames": [
    { "shape": [1, 6], "data": [320, 320, 100, 100, 0.9, 0] },
    { "missing": true },
    { "shape": [2, 6], "data": [100, 100, 50, 50, 0.8, 2, 320, 320, -1, 10, 0.9, 0] }
  ]
}"#;

#[test]
fn replay_frames_to_json_lines() {
  let dir = tempfile::tempdir().unwrap();
  let result_path = dir.path().join("result.jsonl");

  let config = PipelineConfig::from_url(&Url::parse("detect://640?score_threshold=0.0").unwrap()).unwrap();
  let frames: ReplayFrames = ReplayInput::from_json_str(REPLAY).unwrap().into_frames();
  let output = JsonLinesOutput::from_url(&Url::parse(&format!("json://{}", result_path.display())).unwrap())
    .unwrap()
    .with_labels(config.labels.clone());
  let driver = CycleDriver::new(ReplayInference, DetectionPipeline::new(config).unwrap());

  let delivered = ContinuousTask::default().run_task(frames, &driver, output).unwrap();
  assert_eq!(delivered, 3);

  let lines: Vec<serde_json::Value> = std::fs::read_to_string(&result_path)
    .unwrap()
    .lines()
    .map(|line| serde_json::from_str(line).unwrap())
    .collect();
  assert_eq!(lines.len(), 3);

  assert_eq!(lines[0]["chosen_index"], 0);
  assert_eq!(lines[0]["detections"][0]["label"], "person");
  assert!(lines[0]["error"].is_null());

  assert!(lines[1]["chosen_index"].is_null());
  assert!(lines[1]["error"].is_string());

  // 格式错误的候选框被丢弃
  assert_eq!(lines[2]["detections"].as_array().map(Vec::len), Some(1));
  assert_eq!(lines[2]["detections"][0]["label"], "car");
  assert_eq!(lines[2]["capture"]["x"], 75);
}
