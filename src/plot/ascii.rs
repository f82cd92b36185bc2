//! ASCII plotting of one date series for terminal output.
//!
//! Fixed-size grid, deterministic output (golden tests).
//!
//! Plot elements:
//! - observed values: `o`
//! - moving average: `-` line
//! - flagged anomalies: `A`

use chrono::NaiveDate;

use crate::analysis::ANOMALY_SUFFIX;
use crate::frame::TimeSeriesFrame;

/// Plot `column` against `date`, with an optional smoothing column drawn as a line.
///
/// Anomaly markers come from `{column}_anomaly` when present. Rows with a
/// null date or value are skipped.
pub fn render_series_plot(
    frame: &TimeSeriesFrame,
    column: &str,
    smooth: Option<&str>,
    width: usize,
    height: usize,
) -> String {
    let width = width.max(10);
    let height = height.max(5);

    let Some(dates) = frame.dates() else {
        return format!("Plot: {column} | no dates\n");
    };
    let observed = points(dates, frame.numeric(column));
    if observed.is_empty() {
        return format!("Plot: {column} | no data\n");
    }
    let line = smooth.map(|s| points(dates, frame.numeric(s))).unwrap_or_default();
    let flags = frame.numeric(&format!("{column}{ANOMALY_SUFFIX}"));

    let d_min = observed.iter().map(|p| p.date).min().unwrap_or(NaiveDate::MIN);
    let d_max = observed.iter().map(|p| p.date).max().unwrap_or(NaiveDate::MIN);
    let span = ((d_max - d_min).num_days() as f64).max(1.0);
    let x_of = |d: NaiveDate| (d - d_min).num_days() as f64;

    let (y_min, y_max) = y_range(observed.iter().chain(&line)).unwrap_or((0.0, 1.0));
    let (y_min, y_max) = pad_range(y_min, y_max, 0.05);

    let mut grid = vec![vec![' '; width]; height];

    // Line first so points overlay it.
    let curve: Vec<(f64, f64)> = line.iter().map(|p| (x_of(p.date), p.value)).collect();
    draw_curve(&mut grid, &curve, span, y_min, y_max);

    for p in &observed {
        let x = map_x(x_of(p.date), span, width);
        let y = map_y(p.value, y_min, y_max, height);
        let flagged = flags
            .as_ref()
            .and_then(|f| f.get(p.row).copied().flatten())
            .is_some_and(|f| f == 1.0);
        grid[y][x] = if flagged { 'A' } else { 'o' };
    }

    let mut out = format!("Plot: {column} | date=[{d_min}, {d_max}] | y=[{y_min:.2}, {y_max:.2}]\n");
    for row in grid {
        out.push_str(&row.into_iter().collect::<String>());
        out.push('\n');
    }
    out
}

struct Point {
    row: usize,
    date: NaiveDate,
    value: f64,
}

fn points(dates: &[Option<NaiveDate>], values: Option<Vec<Option<f64>>>) -> Vec<Point> {
    let Some(values) = values else {
        return Vec::new();
    };
    dates
        .iter()
        .zip(values)
        .enumerate()
        .filter_map(|(row, (d, v))| match (d, v) {
            (Some(date), Some(value)) if value.is_finite() => Some(Point {
                row,
                date: *date,
                value,
            }),
            _ => None,
        })
        .collect()
}

fn y_range<'a>(points: impl Iterator<Item = &'a Point>) -> Option<(f64, f64)> {
    let mut min_y = f64::INFINITY;
    let mut max_y = f64::NEG_INFINITY;
    for p in points {
        min_y = min_y.min(p.value);
        max_y = max_y.max(p.value);
    }
    if min_y.is_finite() && max_y.is_finite() && max_y > min_y {
        Some((min_y, max_y))
    } else if min_y.is_finite() {
        // Flat series: centre it.
        Some((min_y - 1.0, min_y + 1.0))
    } else {
        None
    }
}

fn pad_range(min: f64, max: f64, frac: f64) -> (f64, f64) {
    let span = (max - min).abs();
    let pad = (span * frac).max(1e-12);
    (min - pad, max + pad)
}

fn map_x(x: f64, span: f64, width: usize) -> usize {
    let width = width.max(2);
    let u = (x / span).clamp(0.0, 1.0);
    (u * (width as f64 - 1.0)).round() as usize
}

fn map_y(y: f64, y_min: f64, y_max: f64, height: usize) -> usize {
    let height = height.max(2);
    let u = ((y - y_min) / (y_max - y_min)).clamp(0.0, 1.0);
    // y=top is max -> row 0
    (height as f64 - 1.0 - (u * (height as f64 - 1.0))).round() as usize
}

fn draw_curve(grid: &mut [Vec<char>], curve: &[(f64, f64)], span: f64, y_min: f64, y_max: f64) {
    if curve.len() < 2 {
        return;
    }
    let height = grid.len();
    let width = grid[0].len();

    let mut prev = None;
    for &(x, y) in curve {
        let xx = map_x(x, span, width);
        let yy = map_y(y, y_min, y_max, height);
        if let Some((x0, y0)) = prev {
            draw_line(grid, x0, y0, xx, yy, '-');
        } else {
            grid[yy][xx] = '-';
        }
        prev = Some((xx, yy));
    }
}

/// Integer line drawing (Bresenham-ish).
fn draw_line(grid: &mut [Vec<char>], x0: usize, y0: usize, x1: usize, y1: usize, ch: char) {
    let mut x0 = x0 as isize;
    let mut y0 = y0 as isize;
    let x1 = x1 as isize;
    let y1 = y1 as isize;

    let dx = (x1 - x0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let dy = -(y1 - y0).abs();
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;

    loop {
        if y0 >= 0
            && (y0 as usize) < grid.len()
            && x0 >= 0
            && (x0 as usize) < grid[0].len()
            && grid[y0 as usize][x0 as usize] == ' '
        {
            grid[y0 as usize][x0 as usize] = ch;
        }

        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}
