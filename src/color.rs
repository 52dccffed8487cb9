// 该文件是 Fenge （分割） 项目的一部分。
// src/color.rs - 分割段颜色分配
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

use image::Rgb;
use rand::{Rng, SeedableRng, rngs::StdRng};

/// 分割段颜色，只取决于 id 本身
///
/// 以 id 为种子初始化随机数发生器并取一个 3 字节样本，
/// 与调用顺序和进程无关。
pub fn color_of(segment_id: u32) -> Rgb<u8> {
  let mut rng = StdRng::seed_from_u64(u64::from(segment_id));
  let mut rgb = [0u8; 3];
  rng.fill(&mut rgb);
  Rgb(rgb)
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashSet;

  #[test]
  fn same_id_same_color() {
    for id in [1, 3, 42, u32::MAX] {
      assert_eq!(color_of(id), color_of(id));
    }
  }

  #[test]
  fn order_does_not_matter() {
    let forward: Vec<_> = (1..=20).map(color_of).collect();
    let backward: Vec<_> = (1..=20).rev().map(color_of).collect();
    assert!(forward.iter().eq(backward.iter().rev()));
  }

  #[test]
  fn ids_mostly_differ() {
    let colors: HashSet<[u8; 3]> = (1..=200).map(|id| color_of(id).0).collect();
    assert!(colors.len() >= 195);
  }
}
