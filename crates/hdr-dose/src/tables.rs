//! 参考数据表加载与插值
//!
//! 数据表为分隔符文本：首行可为列名，其余每行为一组数值。行顺序保持
//! 原样，径向剂量表按距离单调递增，各向异性表为 (r, θ, F) 三元组。
//!
//! 插值约定：
//! - 落在两个表格点之间时线性插值 (各向异性表为距离、角度双线性插值)
//! - 低于最小距离或高于最大距离时取端点值，不外推
//! - 角度先按 0°–180° 对称折叠再查表

use hdr_core::{HdrError, Result};
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::Path;
use tracing::{debug, info};

/// 通用数值表
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceTable {
    headers: Vec<String>,
    rows: Vec<Vec<f64>>,
    digest: Option<String>,
}

impl ReferenceTable {
    /// 从文件加载，并记录文件内容的 SHA-256
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let mut table = Self::from_reader(bytes.as_slice()).map_err(|e| match e {
            HdrError::TableFormat(msg) => HdrError::TableFormat(format!("{}: {}", path.display(), msg)),
            other => other,
        })?;
        table.digest = Some(format!("{:x}", Sha256::digest(&bytes)));

        info!("加载参考数据表 {:?}: {} 列, {} 行", path, table.headers.len(), table.rows.len());
        Ok(table)
    }

    pub fn parse_str(text: &str) -> Result<Self> {
        Self::from_reader(text.as_bytes())
    }

    /// 解析分隔符文本；支持逗号、制表符、分号，`#` 开头的行为注释
    pub fn from_reader<R: Read>(mut reader: R) -> Result<Self> {
        let mut text = String::new();
        reader
            .read_to_string(&mut text)
            .map_err(|e| HdrError::TableFormat(format!("无法读取数据表: {}", e)))?;

        let delimiter = detect_delimiter(&text);
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .comment(Some(b'#'))
            .delimiter(delimiter)
            .from_reader(text.as_bytes());

        let mut headers: Option<Vec<String>> = None;
        let mut rows: Vec<Vec<f64>> = Vec::new();
        let mut width: Option<usize> = None;

        for (line, record) in csv_reader.records().enumerate() {
            let record = record.map_err(|e| HdrError::TableFormat(format!("第 {} 行无法解析: {}", line + 1, e)))?;
            if record.iter().all(|cell| cell.is_empty()) {
                continue;
            }

            let expected = *width.get_or_insert(record.len());
            if record.len() != expected {
                return Err(HdrError::TableFormat(format!(
                    "第 {} 行有 {} 列，应为 {} 列",
                    line + 1,
                    record.len(),
                    expected
                )));
            }

            let parsed: Vec<Option<f64>> = record.iter().map(|cell| cell.parse::<f64>().ok()).collect();
            if headers.is_none() && rows.is_empty() {
                if parsed.iter().all(|v| v.is_none()) {
                    headers = Some(record.iter().map(|h| h.to_string()).collect());
                    continue;
                }
                if parsed.iter().any(|v| v.is_none()) {
                    return Err(HdrError::TableFormat(format!(
                        "第 {} 行既不是列名也不是数值行: {:?}",
                        line + 1,
                        record.iter().collect::<Vec<_>>()
                    )));
                }
            }

            let mut row = Vec::with_capacity(expected);
            for (column, (value, cell)) in parsed.into_iter().zip(record.iter()).enumerate() {
                match value {
                    Some(v) if v.is_finite() => row.push(v),
                    _ => {
                        return Err(HdrError::TableFormat(format!(
                            "第 {} 行第 {} 列不是有效数值: {:?}",
                            line + 1,
                            column + 1,
                            cell
                        )))
                    }
                }
            }
            rows.push(row);
        }

        if rows.is_empty() {
            return Err(HdrError::TableFormat("数据表为空".to_string()));
        }

        let width = rows[0].len();
        let headers = headers.unwrap_or_else(|| (0..width).map(|i| format!("column{}", i)).collect());
        debug!("数据表列名: {:?}", headers);

        Ok(Self {
            headers,
            rows,
            digest: None,
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn width(&self) -> usize {
        self.headers.len()
    }

    /// 文件内容的 SHA-256 (十六进制)，仅对从文件加载的表有效
    pub fn digest(&self) -> Option<&str> {
        self.digest.as_deref()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h.eq_ignore_ascii_case(name))
    }

    /// 按列名取一整列
    pub fn column(&self, name: &str) -> Result<Vec<f64>> {
        let index = self
            .column_index(name)
            .ok_or_else(|| HdrError::TableFormat(format!("数据表没有列 {:?}，现有列: {:?}", name, self.headers)))?;
        Ok(self.column_at(index))
    }

    pub fn column_at(&self, index: usize) -> Vec<f64> {
        self.rows.iter().map(|row| row[index]).collect()
    }

    fn value_column(&self, name: Option<&str>, default_index: usize) -> Result<(usize, String)> {
        let index = match name {
            Some(name) => self
                .column_index(name)
                .ok_or_else(|| HdrError::TableFormat(format!("数据表没有列 {:?}，现有列: {:?}", name, self.headers)))?,
            None => default_index,
        };
        if index >= self.width() {
            return Err(HdrError::TableFormat(format!(
                "数据表只有 {} 列，缺少第 {} 列",
                self.width(),
                index + 1
            )));
        }
        Ok((index, self.headers[index].clone()))
    }
}

fn detect_delimiter(text: &str) -> u8 {
    let first = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty() && !l.starts_with('#'))
        .unwrap_or("");
    if first.contains(',') {
        b','
    } else if first.contains('\t') {
        b'\t'
    } else if first.contains(';') {
        b';'
    } else {
        b','
    }
}

/// 径向剂量函数 g(r) 表
///
/// 第一列为距离 (cm)，取值列默认为第二列。
#[derive(Debug, Clone, PartialEq)]
pub struct RadialDoseTable {
    distances: Vec<f64>,
    values: Vec<f64>,
    value_column: String,
    table: ReferenceTable,
}

impl RadialDoseTable {
    pub fn load<P: AsRef<Path>>(path: P, value_column: Option<&str>) -> Result<Self> {
        Self::from_table(ReferenceTable::load(path)?, value_column)
    }

    pub fn from_table(table: ReferenceTable, value_column: Option<&str>) -> Result<Self> {
        if table.width() < 2 {
            return Err(HdrError::TableFormat("径向剂量表至少需要两列 (r, g)".to_string()));
        }
        let (index, value_column) = table.value_column(value_column, 1)?;
        let distances = table.column_at(0);
        let values = table.column_at(index);
        ensure_increasing(&distances, "径向剂量表距离")?;

        Ok(Self {
            distances,
            values,
            value_column,
            table,
        })
    }

    pub fn distances(&self) -> &[f64] {
        &self.distances
    }

    /// 表格中的 g 值，与距离一一对应
    pub fn g_l(&self) -> &[f64] {
        &self.values
    }

    pub fn value_column(&self) -> &str {
        &self.value_column
    }

    pub fn table(&self) -> &ReferenceTable {
        &self.table
    }

    /// 插值 g(r)，r 单位 cm
    pub fn value_at(&self, r: f64) -> f64 {
        interpolate(&self.distances, &self.values, r)
    }
}

/// 各向异性函数 F(r,θ) 表
///
/// 每行一个 (r cm, θ 度, F) 三元组，必须构成完整的距离×角度网格。
#[derive(Debug, Clone, PartialEq)]
pub struct AnisotropyTable {
    distances: Vec<f64>,
    angles: Vec<f64>,
    /// 按 [角度][距离] 存放
    grid: Vec<Vec<f64>>,
    table: ReferenceTable,
}

impl AnisotropyTable {
    pub fn load<P: AsRef<Path>>(path: P, value_column: Option<&str>) -> Result<Self> {
        Self::from_table(ReferenceTable::load(path)?, value_column)
    }

    pub fn from_table(table: ReferenceTable, value_column: Option<&str>) -> Result<Self> {
        if table.width() < 3 {
            return Err(HdrError::TableFormat("各向异性表至少需要三列 (r, θ, F)".to_string()));
        }
        let (index, _) = table.value_column(value_column, 2)?;

        let mut distances = table.column_at(0);
        let mut angles = table.column_at(1);
        sort_unique(&mut distances);
        sort_unique(&mut angles);

        let mut grid: Vec<Vec<Option<f64>>> = vec![vec![None; distances.len()]; angles.len()];
        for row in table.rows() {
            let (r, theta, value) = (row[0], row[1], row[index]);
            let ri = position_of(&distances, r);
            let ti = position_of(&angles, theta);
            if grid[ti][ri].replace(value).is_some() {
                return Err(HdrError::TableFormat(format!("各向异性表中 (r={}, θ={}) 重复", r, theta)));
            }
        }

        let grid = grid
            .into_iter()
            .enumerate()
            .map(|(ti, row)| {
                row.into_iter()
                    .enumerate()
                    .map(|(ri, v)| {
                        v.ok_or_else(|| {
                            HdrError::TableFormat(format!(
                                "各向异性表缺少网格点 (r={}, θ={})",
                                distances[ri], angles[ti]
                            ))
                        })
                    })
                    .collect::<Result<Vec<f64>>>()
            })
            .collect::<Result<Vec<_>>>()?;

        if angles.iter().any(|a| !(0.0..=180.0).contains(a)) {
            return Err(HdrError::TableFormat("各向异性表角度必须在 0°–180° 之间".to_string()));
        }

        Ok(Self {
            distances,
            angles,
            grid,
            table,
        })
    }

    pub fn distances(&self) -> &[f64] {
        &self.distances
    }

    pub fn angles(&self) -> &[f64] {
        &self.angles
    }

    pub fn table(&self) -> &ReferenceTable {
        &self.table
    }

    /// 双线性插值 F(r,θ)，r 单位 cm，θ 单位度
    pub fn value_at(&self, r: f64, theta_deg: f64) -> f64 {
        let theta = fold_angle(theta_deg);
        let (t0, t1, tw) = bracket(&self.angles, theta);
        let (r0, r1, rw) = bracket(&self.distances, r);

        let at_t0 = lerp(self.grid[t0][r0], self.grid[t0][r1], rw);
        let at_t1 = lerp(self.grid[t1][r0], self.grid[t1][r1], rw);
        lerp(at_t0, at_t1, tw)
    }
}

/// 把任意角度折叠到 [0°, 180°]
pub fn fold_angle(theta_deg: f64) -> f64 {
    let t = theta_deg.rem_euclid(360.0);
    if t > 180.0 {
        360.0 - t
    } else {
        t
    }
}

/// 一维线性插值，超出范围取端点值
pub fn interpolate(xs: &[f64], ys: &[f64], x: f64) -> f64 {
    let (i0, i1, w) = bracket(xs, x);
    lerp(ys[i0], ys[i1], w)
}

/// 找到 x 所在区间 [i0, i1] 及权重；端点外夹取
fn bracket(xs: &[f64], x: f64) -> (usize, usize, f64) {
    let last = xs.len() - 1;
    if x.is_nan() || x <= xs[0] {
        return (0, 0, 0.0);
    }
    if x >= xs[last] {
        return (last, last, 0.0);
    }
    let hi = xs.partition_point(|&v| v <= x);
    let lo = hi - 1;
    (lo, hi, (x - xs[lo]) / (xs[hi] - xs[lo]))
}

fn lerp(a: f64, b: f64, w: f64) -> f64 {
    if w == 0.0 {
        a
    } else {
        a + (b - a) * w
    }
}

fn ensure_increasing(values: &[f64], what: &str) -> Result<()> {
    for pair in values.windows(2) {
        if pair[1] <= pair[0] {
            return Err(HdrError::TableFormat(format!(
                "{}必须严格递增: {} 之后是 {}",
                what, pair[0], pair[1]
            )));
        }
    }
    Ok(())
}

fn sort_unique(values: &mut Vec<f64>) {
    values.sort_by(f64::total_cmp);
    values.dedup();
}

fn position_of(sorted: &[f64], value: f64) -> usize {
    sorted.partition_point(|&v| v < value)
}
