// 该文件是 Qingmiao （青苗） 项目的一部分。
// src/bin/simple_oneshot.rs - 固定模型推理测试
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

use qingmiao::input::ImageInput;
use qingmiao::model::{DEFAULT_ASSETS_DIR, ModelName, ModelRegistry};
use qingmiao::task::{OneShotTask, Task};

/// Qingmiao 固定模型推理测试参数
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
  /// 测试图像路径
  #[arg(short = 'i', long, value_name = "FILE")]
  pub img_path: String,

  /// 模型名 (mobilenetv3 或 efficientdet)
  #[arg(short = 'm', long, value_name = "MODEL")]
  pub model: ModelName,

  /// 模型资产目录
  #[arg(long, value_name = "DIR", default_value = DEFAULT_ASSETS_DIR)]
  pub assets: String,
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();

  let args = Args::parse();

  info!("测试图像路径: {}", args.img_path);
  info!("模型名: {}", args.model);
  info!("资产目录: {}", args.assets);

  match args.model {
    ModelName::MobilenetV3 | ModelName::EfficientDet => {}
    other => anyhow::bail!(
      "本测试程序只支持 mobilenetv3 与 efficientdet, 不支持 {}",
      other
    ),
  }

  let registry = ModelRegistry::new(&args.assets);
  let result = OneShotTask::new(args.model).run_task(&registry, ImageInput::Path(args.img_path))?;

  println!("{}", result);
  println!("completed");

  Ok(())
}
