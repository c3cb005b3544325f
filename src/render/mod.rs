#[cfg(test)]
mod tests;

use console::style;
use itertools::Itertools;

use crate::chart::{ChartFrame, PlotKind, Series};

const BAR_WIDTH: usize = 40;
const SPARKLINE: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// Seam between the pipeline and whatever draws its output. The
/// orchestrator only ever hands over a validated frame.
pub trait Renderer: Send + Sync {
    fn draw(&self, frame: &ChartFrame);
}

/// Draws frames as styled text on stdout.
#[derive(Debug, Default, Clone, Copy)]
pub struct TerminalRenderer;

impl TerminalRenderer {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Renderer for TerminalRenderer {
    #[inline]
    fn draw(&self, frame: &ChartFrame) {
        match *frame {
            ChartFrame::Text(ref text) => println!("{}", text),
            ChartFrame::Table {
                ref columns,
                ref rows,
            } => {
                println!("{}", format_table(columns, rows));
            }
            ChartFrame::Plot {
                kind,
                ref x_label,
                ref x_values,
                ref series,
            } => {
                let body = match kind {
                    PlotKind::Bar => format_bar_chart(x_values, series),
                    PlotKind::Line => format_line_chart(x_values, series),
                };
                println!("{}", style(x_label).bold());
                println!("{}", body);
            }
        }
    }
}

/// Column-aligned table with a header rule.
pub(crate) fn format_table(columns: &[String], rows: &[Vec<String>]) -> String {
    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(index, column)| {
            rows.iter()
                .map(|row| row.get(index).map_or(0, |cell| cell.chars().count()))
                .chain(std::iter::once(column.chars().count()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let mut out = format_row(columns, &widths);
    out.push('\n');
    out.push_str(
        &widths
            .iter()
            .map(|width| "-".repeat(*width))
            .join("-+-"),
    );
    for row in rows {
        out.push('\n');
        out.push_str(&format_row(row, &widths));
    }
    out
}

fn format_row(cells: &[String], widths: &[usize]) -> String {
    cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{:<width$}", cell, width = width))
        .join(" | ")
}

/// Horizontal bars per x value, one block per series.
pub(crate) fn format_bar_chart(x_values: &[String], series: &[Series]) -> String {
    let label_width = x_values.iter().map(|x| x.chars().count()).max().unwrap_or(0);

    series
        .iter()
        .map(|s| {
            let max = s.values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let mut block = format!("{}:", s.name);
            for (x, value) in x_values.iter().zip(&s.values) {
                let filled = if max > 0.0 {
                    ((value / max) * BAR_WIDTH as f64).round() as usize
                } else {
                    0
                };
                block.push_str(&format!(
                    "\n  {:<label_width$} {} {}",
                    x,
                    "█".repeat(filled),
                    value,
                    label_width = label_width
                ));
            }
            block
        })
        .join("\n")
}

/// One sparkline row per series, scaled to its own min/max.
pub(crate) fn format_line_chart(x_values: &[String], series: &[Series]) -> String {
    let span = match (x_values.first(), x_values.last()) {
        (Some(first), Some(last)) if x_values.len() > 1 => format!("{} .. {}", first, last),
        (Some(first), _) => first.clone(),
        _ => String::new(),
    };

    let mut out = series
        .iter()
        .map(|s| {
            let min = s.values.iter().copied().fold(f64::INFINITY, f64::min);
            let max = s.values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let range = max - min;
            let line: String = s
                .values
                .iter()
                .map(|value| {
                    let level = if range > 0.0 {
                        (((value - min) / range) * (SPARKLINE.len() - 1) as f64).round() as usize
                    } else {
                        0
                    };
                    SPARKLINE[level.min(SPARKLINE.len() - 1)]
                })
                .collect();
            format!("{} {} (min {}, max {})", line, s.name, min, max)
        })
        .join("\n");

    if !span.is_empty() {
        out.push_str(&format!("\n{}", span));
    }
    out
}
