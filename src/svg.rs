use std::fmt::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Anchor {
    Start,
    Middle,
    End,
}

impl Anchor {
    fn as_str(self) -> &'static str {
        match self {
            Anchor::Start => "start",
            Anchor::Middle => "middle",
            Anchor::End => "end",
        }
    }
}

#[derive(Debug, Clone)]
pub struct LineStyle {
    pub color: &'static str,
    pub width: f64,
    pub dash: Option<&'static str>,
}

impl LineStyle {
    pub fn solid(color: &'static str, width: f64) -> Self {
        Self {
            color,
            width,
            dash: None,
        }
    }

    pub fn dashed(color: &'static str, width: f64) -> Self {
        Self {
            color,
            width,
            dash: Some("6 4"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct TextStyle {
    pub size: f64,
    pub anchor: Anchor,
    pub bold: bool,
}

impl Default for TextStyle {
    fn default() -> Self {
        Self {
            size: 12.0,
            anchor: Anchor::Start,
            bold: false,
        }
    }
}

/// Immediate-mode SVG canvas; coordinates are in pixels from the top-left.
pub struct Canvas {
    pub width: f64,
    pub height: f64,
    body: String,
}

impl Canvas {
    pub fn new(width: f64, height: f64) -> Self {
        Self {
            width,
            height,
            body: String::with_capacity(16 * 1024),
        }
    }

    pub fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, style: &LineStyle) {
        let _ = write!(
            self.body,
            r#"<line x1="{x1:.2}" y1="{y1:.2}" x2="{x2:.2}" y2="{y2:.2}""#
        );
        self.line_attrs(style);
        self.body.push_str(" />\n");
    }

    pub fn polyline(&mut self, points: &[(f64, f64)], style: &LineStyle) {
        if points.is_empty() {
            return;
        }
        self.body.push_str(r#"<polyline points=""#);
        for (i, (x, y)) in points.iter().enumerate() {
            if i > 0 {
                self.body.push(' ');
            }
            let _ = write!(self.body, "{x:.2},{y:.2}");
        }
        self.body.push_str(r#"" fill="none""#);
        self.line_attrs(style);
        self.body.push_str(" />\n");
    }

    pub fn rect(&mut self, x: f64, y: f64, w: f64, h: f64, fill: &str, stroke: Option<&str>) {
        let _ = write!(
            self.body,
            r#"<rect x="{x:.2}" y="{y:.2}" width="{w:.2}" height="{h:.2}" fill="{fill}""#
        );
        if let Some(stroke) = stroke {
            let _ = write!(self.body, r#" stroke="{stroke}" stroke-width="0.80""#);
        }
        self.body.push_str(" />\n");
    }

    pub fn text(&mut self, x: f64, y: f64, content: &str, style: &TextStyle) {
        self.text_inner(x, y, content, style, None);
    }

    pub fn text_rotated(&mut self, x: f64, y: f64, content: &str, style: &TextStyle, angle: f64) {
        self.text_inner(x, y, content, style, Some(angle));
    }

    fn text_inner(&mut self, x: f64, y: f64, content: &str, style: &TextStyle, rotate: Option<f64>) {
        let _ = write!(
            self.body,
            r#"<text x="{x:.2}" y="{y:.2}" font-family="DejaVu Sans, sans-serif" font-size="{:.1}" text-anchor="{}""#,
            style.size,
            style.anchor.as_str()
        );
        if style.bold {
            self.body.push_str(r#" font-weight="bold""#);
        }
        if let Some(angle) = rotate {
            let _ = write!(self.body, r#" transform="rotate({angle:.1},{x:.2},{y:.2})""#);
        }
        self.body.push('>');
        escape_into(&mut self.body, content);
        self.body.push_str("</text>\n");
    }

    fn line_attrs(&mut self, style: &LineStyle) {
        let _ = write!(
            self.body,
            r#" stroke="{}" stroke-width="{:.2}""#,
            style.color, style.width
        );
        if let Some(dash) = style.dash {
            let _ = write!(self.body, r#" stroke-dasharray="{dash}""#);
        }
    }

    pub fn finish_svg(&self) -> String {
        let mut out = String::with_capacity(self.body.len() + 256);
        let _ = writeln!(
            out,
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            w = self.width,
            h = self.height,
        );
        let _ = writeln!(
            out,
            r#"<rect width="{}" height="{}" fill="white" />"#,
            self.width, self.height
        );
        out.push_str(&self.body);
        out.push_str("</svg>\n");
        out
    }
}

fn escape_into(out: &mut String, content: &str) {
    for ch in content.chars() {
        match ch {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            _ => out.push(ch),
        }
    }
}
