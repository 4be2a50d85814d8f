use std::path::Path;

use chrono::{Datelike, NaiveDate};

use crate::artifacts::StagedOutputs;
use crate::models::DailyGroupMeans;
use crate::svg::{Anchor, Canvas, LineStyle, TextStyle};

const WIDTH: f64 = 1000.0;
const HEIGHT: f64 = 600.0;
const MARGIN_LEFT: f64 = 90.0;
const MARGIN_RIGHT: f64 = 30.0;
const MARGIN_TOP: f64 = 50.0;
const MARGIN_BOTTOM: f64 = 70.0;

const CONTROL_COLOR: &str = "#1f77b4";
const TREATMENT_COLOR: &str = "#ff7f0e";
const MARKER_COLOR: &str = "#444444";

#[derive(Debug, Clone)]
pub struct Series {
    pub label: Option<String>,
    pub color: &'static str,
    pub points: Vec<(NaiveDate, f64)>,
}

#[derive(Debug, Clone)]
pub struct LineChart {
    pub title: String,
    pub x_label: String,
    pub y_label: String,
    /// Dashed vertical line drawn at this date.
    pub marker: NaiveDate,
    pub series: Vec<Series>,
}

pub fn revenue_by_group_chart(days: &[DailyGroupMeans], intervention: NaiveDate) -> LineChart {
    let control = days
        .iter()
        .map(|d| (d.date, d.control_revenue.unwrap_or(f64::NAN)))
        .collect();
    let treatment = days
        .iter()
        .map(|d| (d.date, d.treated_revenue.unwrap_or(f64::NAN)))
        .collect();

    LineChart {
        title: "Average Revenue by Group Over Time".to_string(),
        x_label: "Date".to_string(),
        y_label: "Revenue".to_string(),
        marker: intervention,
        series: vec![
            Series {
                label: Some("Control (search stays on)".to_string()),
                color: CONTROL_COLOR,
                points: control,
            },
            Series {
                label: Some("Treatment (search goes off)".to_string()),
                color: TREATMENT_COLOR,
                points: treatment,
            },
        ],
    }
}

pub fn log_gap_chart(gap: &[(NaiveDate, f64)], intervention: NaiveDate) -> LineChart {
    LineChart {
        title: "Log Revenue Difference Over Time".to_string(),
        x_label: "Date".to_string(),
        y_label: "log(rev_control) - log(rev_treat)".to_string(),
        marker: intervention,
        series: vec![Series {
            label: None,
            color: CONTROL_COLOR,
            points: gap.to_vec(),
        }],
    }
}

#[derive(Debug, Clone, Copy)]
struct Scale {
    lo: f64,
    hi: f64,
    px_lo: f64,
    px_hi: f64,
}

impl Scale {
    fn map(&self, value: f64) -> f64 {
        self.px_lo + (value - self.lo) / (self.hi - self.lo) * (self.px_hi - self.px_lo)
    }
}

fn day_number(date: NaiveDate) -> f64 {
    date.num_days_from_ce() as f64
}

/// Rounds `raw` to 1, 2 or 5 times a power of ten.
fn nice_step(raw: f64) -> f64 {
    if raw <= 0.0 || !raw.is_finite() {
        return 1.0;
    }
    let magnitude = 10f64.powf(raw.log10().floor());
    let fraction = raw / magnitude;
    let nice = if fraction <= 1.0 {
        1.0
    } else if fraction <= 2.0 {
        2.0
    } else if fraction <= 5.0 {
        5.0
    } else {
        10.0
    };
    nice * magnitude
}

fn value_ticks(lo: f64, hi: f64) -> Vec<f64> {
    let step = nice_step((hi - lo) / 5.0);
    let mut ticks = Vec::new();
    let mut tick = (lo / step).ceil() * step;
    while tick <= hi + step * 1e-9 {
        ticks.push(if tick.abs() < step * 1e-9 { 0.0 } else { tick });
        tick += step;
    }
    ticks
}

/// First day of every month within `[start, end]`; the endpoints if none.
fn month_ticks(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut ticks = Vec::new();
    let mut cursor = NaiveDate::from_ymd_opt(start.year(), start.month(), 1);
    while let Some(month) = cursor {
        if month > end {
            break;
        }
        if month >= start {
            ticks.push(month);
        }
        cursor = if month.month() == 12 {
            NaiveDate::from_ymd_opt(month.year() + 1, 1, 1)
        } else {
            NaiveDate::from_ymd_opt(month.year(), month.month() + 1, 1)
        };
    }
    if ticks.len() < 2 {
        ticks = if start == end { vec![start] } else { vec![start, end] };
    }
    ticks
}

fn format_tick(value: f64, step: f64) -> String {
    let decimals = if step >= 1.0 {
        0
    } else {
        (-step.log10().floor()) as usize
    };
    format!("{value:.decimals$}")
}

pub fn render_line_chart(chart: &LineChart) -> String {
    let mut canvas = Canvas::new(WIDTH, HEIGHT);
    let left = MARGIN_LEFT;
    let right = WIDTH - MARGIN_RIGHT;
    let top = MARGIN_TOP;
    let bottom = HEIGHT - MARGIN_BOTTOM;

    let all_points = chart.series.iter().flat_map(|s| s.points.iter());
    let (mut x_min, mut x_max) = (chart.marker, chart.marker);
    let (mut y_min, mut y_max) = (f64::INFINITY, f64::NEG_INFINITY);
    for (date, value) in all_points {
        x_min = x_min.min(*date);
        x_max = x_max.max(*date);
        if value.is_finite() {
            y_min = y_min.min(*value);
            y_max = y_max.max(*value);
        }
    }
    if !y_min.is_finite() {
        (y_min, y_max) = (0.0, 1.0);
    }
    let pad = if y_max > y_min {
        (y_max - y_min) * 0.05
    } else {
        y_min.abs().max(1.0) * 0.1
    };
    y_min -= pad;
    y_max += pad;

    let x_span = (day_number(x_max) - day_number(x_min)).max(1.0);
    let x_scale = Scale {
        lo: day_number(x_min),
        hi: day_number(x_min) + x_span,
        px_lo: left,
        px_hi: right,
    };
    let y_scale = Scale {
        lo: y_min,
        hi: y_max,
        px_lo: bottom,
        px_hi: top,
    };

    let frame = LineStyle::solid("#000000", 0.8);
    let grid = LineStyle {
        color: "#dddddd",
        width: 0.5,
        dash: Some("3 3"),
    };
    let tick_text = TextStyle {
        size: 11.0,
        anchor: Anchor::Middle,
        bold: false,
    };

    canvas.rect(left, top, right - left, bottom - top, "none", Some("#000000"));

    for date in month_ticks(x_min, x_max) {
        let px = x_scale.map(day_number(date));
        canvas.line(px, top, px, bottom, &grid);
        canvas.line(px, bottom, px, bottom + 5.0, &frame);
        canvas.text(px, bottom + 20.0, &date.format("%Y-%m-%d").to_string(), &tick_text);
    }

    let y_step = nice_step((y_max - y_min) / 5.0);
    let y_tick_text = TextStyle {
        anchor: Anchor::End,
        ..tick_text.clone()
    };
    for value in value_ticks(y_min, y_max) {
        let py = y_scale.map(value);
        canvas.line(left, py, right, py, &grid);
        canvas.line(left - 5.0, py, left, py, &frame);
        canvas.text(left - 8.0, py + 4.0, &format_tick(value, y_step), &y_tick_text);
    }

    // Non-finite values split a series into separate runs.
    for series in &chart.series {
        let style = LineStyle::solid(series.color, 1.5);
        for run in series.points.split(|(_, v)| !v.is_finite()) {
            let points: Vec<(f64, f64)> = run
                .iter()
                .map(|(d, v)| (x_scale.map(day_number(*d)), y_scale.map(*v)))
                .collect();
            canvas.polyline(&points, &style);
        }
    }

    let marker_px = x_scale.map(day_number(chart.marker));
    canvas.line(marker_px, top, marker_px, bottom, &LineStyle::dashed(MARKER_COLOR, 1.2));

    let labelled: Vec<&Series> = chart.series.iter().filter(|s| s.label.is_some()).collect();
    for (i, series) in labelled.iter().enumerate() {
        let y = top + 20.0 + i as f64 * 18.0;
        canvas.line(left + 12.0, y - 4.0, left + 40.0, y - 4.0, &LineStyle::solid(series.color, 2.0));
        if let Some(label) = &series.label {
            canvas.text(left + 46.0, y, label, &TextStyle { size: 12.0, ..Default::default() });
        }
    }

    let title_style = TextStyle {
        size: 16.0,
        anchor: Anchor::Middle,
        bold: true,
    };
    canvas.text((left + right) / 2.0, top - 18.0, &chart.title, &title_style);

    let axis_label = TextStyle {
        size: 13.0,
        anchor: Anchor::Middle,
        bold: false,
    };
    canvas.text((left + right) / 2.0, HEIGHT - 20.0, &chart.x_label, &axis_label);
    let y_label_x = 24.0;
    let y_label_y = (top + bottom) / 2.0;
    canvas.text_rotated(y_label_x, y_label_y, &chart.y_label, &axis_label, -90.0);

    canvas.finish_svg()
}

pub fn stage_chart(
    outputs: &mut StagedOutputs,
    path: &Path,
    chart: &LineChart,
) -> anyhow::Result<()> {
    let svg = render_line_chart(chart);
    outputs.stage(path, svg.as_bytes())?;
    tracing::debug!(title = %chart.title, path = %path.display(), "staged figure");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2012, m, d).unwrap()
    }

    fn day(m: u32, d: u32, treated: f64, control: f64) -> DailyGroupMeans {
        DailyGroupMeans {
            date: date(m, d),
            treated_revenue: Some(treated),
            control_revenue: Some(control),
            treated_log_revenue: Some(treated.ln()),
            control_log_revenue: Some(control.ln()),
        }
    }

    #[test]
    fn revenue_chart_has_both_groups() {
        let days = vec![day(5, 1, 100.0, 120.0), day(6, 1, 90.0, 125.0)];
        let chart = revenue_by_group_chart(&days, date(5, 22));
        assert_eq!(chart.series.len(), 2);
        assert_eq!(chart.series[0].points, vec![(date(5, 1), 120.0), (date(6, 1), 125.0)]);
        assert_eq!(chart.series[1].points[1], (date(6, 1), 90.0));
        assert_eq!(chart.marker, date(5, 22));

        let svg = render_line_chart(&chart);
        assert_eq!(svg.matches("<polyline").count(), 2);
        assert!(svg.contains("Average Revenue by Group Over Time"));
        assert!(svg.contains("Control (search stays on)"));
        assert!(svg.contains("Treatment (search goes off)"));
        assert!(svg.contains(r#"stroke-dasharray="6 4""#));
    }

    #[test]
    fn marker_sits_between_dates() {
        let chart = log_gap_chart(&[(date(5, 1), 0.1), (date(6, 12), 0.3)], date(5, 22));
        let svg = render_line_chart(&chart);
        let left = MARGIN_LEFT;
        let right = WIDTH - MARGIN_RIGHT;
        let expected = left + 21.0 / 42.0 * (right - left);
        assert!(svg.contains(&format!(r#"<line x1="{expected:.2}""#)));
        assert!(svg.contains("log(rev_control) - log(rev_treat)"));
    }

    #[test]
    fn empty_series_still_renders() {
        let chart = log_gap_chart(&[], date(5, 22));
        let svg = render_line_chart(&chart);
        assert!(svg.contains("Log Revenue Difference Over Time"));
        assert!(!svg.contains("<polyline"));
    }

    #[test]
    fn missing_days_break_the_line() {
        let gap = [
            (date(5, 1), 0.1),
            (date(5, 2), f64::NAN),
            (date(5, 3), 0.2),
            (date(5, 4), 0.25),
        ];
        let svg = render_line_chart(&log_gap_chart(&gap, date(5, 2)));
        assert_eq!(svg.matches("<polyline").count(), 2);

        let mut days = vec![day(5, 1, 100.0, 120.0), day(5, 2, 90.0, 125.0), day(5, 3, 95.0, 130.0)];
        days[1].control_revenue = None;
        days[1].control_log_revenue = None;
        let chart = revenue_by_group_chart(&days, date(5, 2));
        assert!(chart.series[0].points[1].1.is_nan());
        assert_eq!(render_line_chart(&chart).matches("<polyline").count(), 3);
    }

    #[test]
    fn nice_steps_and_ticks() {
        assert!((nice_step(0.3) - 0.5).abs() < 1e-12);
        assert_eq!(nice_step(13.0), 20.0);
        assert_eq!(value_ticks(0.0, 10.0), vec![0.0, 2.0, 4.0, 6.0, 8.0, 10.0]);
        assert_eq!(format_tick(0.25, 0.05), "0.25");
        assert_eq!(format_tick(1200.0, 200.0), "1200");
    }

    #[test]
    fn month_ticks_cover_range() {
        assert_eq!(
            month_ticks(date(4, 1), date(7, 22)),
            vec![date(4, 1), date(5, 1), date(6, 1), date(7, 1)]
        );
        assert_eq!(month_ticks(date(5, 3), date(5, 20)), vec![date(5, 3), date(5, 20)]);
    }
}
