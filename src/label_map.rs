// 该文件是 Fenge （分割） 项目的一部分。
// src/label_map.rs - 逐像素分割标签图
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

use std::collections::HashMap;

/// 未标注像素的标签值
pub const UNLABELED: u32 = 0;

/// 行优先存储的标签图，值为分割段 id，0 表示不属于任何分割段
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMap {
  width: u32,
  height: u32,
  data: Box<[u32]>,
}

impl LabelMap {
  pub fn new(width: u32, height: u32) -> Self {
    let data = vec![UNLABELED; width as usize * height as usize].into_boxed_slice();
    Self {
      width,
      height,
      data,
    }
  }

  pub fn from_fn<F>(width: u32, height: u32, mut f: F) -> Self
  where
    F: FnMut(u32, u32) -> u32,
  {
    let mut map = Self::new(width, height);
    for y in 0..height {
      for x in 0..width {
        map.set(x, y, f(x, y));
      }
    }
    map
  }

  pub fn width(&self) -> u32 {
    self.width
  }

  pub fn height(&self) -> u32 {
    self.height
  }

  pub fn dimensions(&self) -> (u32, u32) {
    (self.width, self.height)
  }

  fn index(&self, x: u32, y: u32) -> usize {
    y as usize * self.width as usize + x as usize
  }

  pub fn get(&self, x: u32, y: u32) -> u32 {
    self.data[self.index(x, y)]
  }

  pub fn set(&mut self, x: u32, y: u32, value: u32) {
    let idx = self.index(x, y);
    self.data[idx] = value;
  }

  pub fn is_empty(&self) -> bool {
    self.data.iter().all(|&v| v == UNLABELED)
  }

  /// 按行遍历 `(x, y, id)`
  pub fn enumerate(&self) -> impl Iterator<Item = (u32, u32, u32)> + '_ {
    let width = self.width.max(1);
    self
      .data
      .iter()
      .enumerate()
      .map(move |(i, &v)| ((i as u32) % width, (i as u32) / width, v))
  }

  /// 裁剪矩形区域，调用方保证区域位于图内
  pub fn crop(&self, x: u32, y: u32, width: u32, height: u32) -> LabelMap {
    debug_assert!(x + width <= self.width && y + height <= self.height);
    let mut cropped = LabelMap::new(width, height);
    for row in 0..height {
      let src = self.index(x, y + row);
      let dst = cropped.index(0, row);
      cropped.data[dst..dst + width as usize]
        .copy_from_slice(&self.data[src..src + width as usize]);
    }
    cropped
  }

  /// 最近邻缩放，标签值不做任何插值
  pub fn resize_nearest(&self, width: u32, height: u32) -> LabelMap {
    if (width, height) == self.dimensions() {
      return self.clone();
    }

    let xs: Vec<u32> = (0..width)
      .map(|x| nearest_source(x, self.width, width))
      .collect();
    let mut resized = LabelMap::new(width, height);
    for y in 0..height {
      let sy = nearest_source(y, self.height, height);
      let src_row = self.index(0, sy);
      let dst_row = resized.index(0, y);
      for (x, &sx) in xs.iter().enumerate() {
        resized.data[dst_row + x] = self.data[src_row + sx as usize];
      }
    }
    resized
  }

  /// 一次遍历统计所有分割段的面积与质心，不含未标注像素
  pub fn regions(&self) -> HashMap<u32, Region> {
    let mut sums: HashMap<u32, (usize, f64, f64)> = HashMap::new();
    for (x, y, id) in self.enumerate() {
      if id == UNLABELED {
        continue;
      }
      let sum = sums.entry(id).or_insert((0, 0.0, 0.0));
      sum.0 += 1;
      sum.1 += x as f64;
      sum.2 += y as f64;
    }
    sums
      .into_iter()
      .map(|(id, (area, sum_x, sum_y))| {
        let n = area as f64;
        let centroid = ((sum_x / n) as f32, (sum_y / n) as f32);
        (id, Region { area, centroid })
      })
      .collect()
  }
}

/// 分割段的像素数量与质心 `(cx, cy)`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Region {
  pub area: usize,
  pub centroid: (f32, f32),
}

impl AsRef<[u32]> for LabelMap {
  fn as_ref(&self) -> &[u32] {
    &self.data
  }
}

/// 目标坐标 `dst` 在源轴上对应的最近邻下标（像素中心对齐）
pub(crate) fn nearest_source(dst: u32, src_len: u32, dst_len: u32) -> u32 {
  let pos = ((dst as f64 + 0.5) * src_len as f64 / dst_len as f64).floor() as u32;
  pos.min(src_len.saturating_sub(1))
}
