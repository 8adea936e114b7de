//! Minimal SVG document builder

use crate::error::{InsightError, Result};
use std::fmt::Write;

/// Low-value end of the feature colour scale
pub const LOW_COLOUR: (u8, u8, u8) = (0x00, 0x8b, 0xfb);
/// High-value end of the feature colour scale
pub const HIGH_COLOUR: (u8, u8, u8) = (0xff, 0x00, 0x51);

pub(crate) struct SvgDoc {
    buf: String,
}

impl SvgDoc {
    pub fn new(width: f64, height: f64) -> Result<Self> {
        let mut doc = Self { buf: String::new() };
        doc.push(format_args!(
            "<svg xmlns=\"http://www.w3.org/2000/svg\" width=\"{w}\" height=\"{h}\" viewBox=\"0 0 {w} {h}\" font-family=\"sans-serif\">\n",
            w = width,
            h = height
        ))?;
        doc.push(format_args!(
            "<rect x=\"0\" y=\"0\" width=\"{}\" height=\"{}\" fill=\"white\"/>\n",
            width, height
        ))?;
        Ok(doc)
    }

    fn push(&mut self, args: std::fmt::Arguments<'_>) -> Result<()> {
        self.buf
            .write_fmt(args)
            .map_err(|e| InsightError::Render(e.to_string()))
    }

    pub fn text(&mut self, x: f64, y: f64, size: f64, anchor: &str, content: &str) -> Result<()> {
        self.push(format_args!(
            "<text x=\"{:.1}\" y=\"{:.1}\" font-size=\"{}\" text-anchor=\"{}\" fill=\"#333\">{}</text>\n",
            x,
            y,
            size,
            anchor,
            escape(content)
        ))
    }

    pub fn line(&mut self, x1: f64, y1: f64, x2: f64, y2: f64, stroke: &str, dashed: bool) -> Result<()> {
        let dash = if dashed { " stroke-dasharray=\"3,3\"" } else { "" };
        self.push(format_args!(
            "<line x1=\"{:.1}\" y1=\"{:.1}\" x2=\"{:.1}\" y2=\"{:.1}\" stroke=\"{}\" stroke-width=\"1\"{}/>\n",
            x1, y1, x2, y2, stroke, dash
        ))
    }

    pub fn circle(&mut self, cx: f64, cy: f64, r: f64, fill: &str) -> Result<()> {
        self.push(format_args!(
            "<circle cx=\"{:.2}\" cy=\"{:.2}\" r=\"{}\" fill=\"{}\" fill-opacity=\"0.8\"/>\n",
            cx, cy, r, fill
        ))
    }

    pub fn rect(&mut self, x: f64, y: f64, w: f64, h: f64, fill: &str) -> Result<()> {
        self.push(format_args!(
            "<rect x=\"{:.2}\" y=\"{:.2}\" width=\"{:.2}\" height=\"{:.2}\" fill=\"{}\"/>\n",
            x, y, w, h, fill
        ))
    }

    /// Vertical gradient legend from low (bottom) to high (top)
    pub fn colour_bar(&mut self, x: f64, y: f64, w: f64, h: f64) -> Result<()> {
        self.push(format_args!(
            "<defs><linearGradient id=\"fv\" x1=\"0\" y1=\"1\" x2=\"0\" y2=\"0\">\
             <stop offset=\"0\" stop-color=\"{}\"/><stop offset=\"1\" stop-color=\"{}\"/>\
             </linearGradient></defs>\n",
            hex(LOW_COLOUR),
            hex(HIGH_COLOUR)
        ))?;
        self.push(format_args!(
            "<rect x=\"{:.1}\" y=\"{:.1}\" width=\"{:.1}\" height=\"{:.1}\" fill=\"url(#fv)\"/>\n",
            x, y, w, h
        ))
    }

    pub fn finish(mut self) -> Result<String> {
        self.push(format_args!("</svg>\n"))?;
        Ok(self.buf)
    }
}

fn hex((r, g, b): (u8, u8, u8)) -> String {
    format!("#{:02x}{:02x}{:02x}", r, g, b)
}

/// Colour for a normalised value in `[0, 1]`
pub fn blend(t: f64) -> String {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.5 };
    let mix = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * t).round() as u8;
    hex((
        mix(LOW_COLOUR.0, HIGH_COLOUR.0),
        mix(LOW_COLOUR.1, HIGH_COLOUR.1),
        mix(LOW_COLOUR.2, HIGH_COLOUR.2),
    ))
}

pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}
