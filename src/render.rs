use image::codecs::png::PngEncoder;
use image::{ColorType, ImageEncoder};
use plotters::coord::Shift;
use plotters::prelude::*;
use thiserror::Error;

use crate::chart::{ChartPayload, MONTHS};

// keeps a stray --scale from allocating gigabytes
const MAX_DIMENSION: u32 = 8192;

const INCOME_RGB: RGBColor = RGBColor(54, 162, 235);
const EXPENSES_RGB: RGBColor = RGBColor(255, 99, 132);

#[derive(Debug, Error)]
pub enum ChartError {
    #[error("scale must be a finite number greater than zero, got {0}")]
    InvalidScale(f64),

    #[error("chart size {0}x{1} is out of range")]
    InvalidSize(u32, u32),

    #[error("failed to draw chart: {0}")]
    Render(String),

    #[error("failed to encode PNG: {0}")]
    Encode(String),
}

/// Layout size in logical pixels plus the display density multiplier.
#[derive(Debug, Clone, Copy)]
pub struct ChartOptions {
    pub width: u32,
    pub height: u32,
    pub scale: f64,
}

impl Default for ChartOptions {
    fn default() -> Self {
        Self {
            width: 800,
            height: 400,
            scale: 1.0,
        }
    }
}

impl ChartOptions {
    /// Output size in device pixels.
    pub fn pixel_size(&self) -> Result<(u32, u32), ChartError> {
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(ChartError::InvalidScale(self.scale));
        }
        let w = (f64::from(self.width) * self.scale).round();
        let h = (f64::from(self.height) * self.scale).round();
        if w < 1.0 || h < 1.0 || w > f64::from(MAX_DIMENSION) || h > f64::from(MAX_DIMENSION) {
            return Err(ChartError::InvalidSize(w as u32, h as u32));
        }
        Ok((w as u32, h as u32))
    }

    fn px(&self, logical: f64) -> u32 {
        (logical * self.scale).round().max(1.0) as u32
    }
}

/// Draws the income/expenses bar chart and returns it as PNG bytes.
pub fn render_png(payload: &ChartPayload, options: &ChartOptions) -> Result<Vec<u8>, ChartError> {
    let (width, height) = options.pixel_size()?;
    let mut buffer = vec![0u8; width as usize * height as usize * 3];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (width, height)).into_drawing_area();
        draw_chart(&root, payload, options).map_err(|e| ChartError::Render(e.to_string()))?;
        root.present().map_err(|e| ChartError::Render(e.to_string()))?;
    }
    encode_png(&buffer, width, height)
}

fn encode_png(rgb: &[u8], width: u32, height: u32) -> Result<Vec<u8>, ChartError> {
    let mut png = Vec::new();
    PngEncoder::new(&mut png)
        .write_image(rgb, width, height, ColorType::Rgb8)
        .map_err(|e| ChartError::Encode(e.to_string()))?;
    Ok(png)
}

fn month_label(value: &SegmentValue<i32>) -> String {
    match value {
        SegmentValue::CenterOf(i) => usize::try_from(*i)
            .ok()
            .and_then(|i| MONTHS.get(i))
            .map(|m| m.to_string())
            .unwrap_or_default(),
        _ => String::new(),
    }
}

fn draw_chart(
    root: &DrawingArea<BitMapBackend, Shift>,
    payload: &ChartPayload,
    options: &ChartOptions,
) -> Result<(), Box<dyn std::error::Error>> {
    let s = options.scale;
    root.fill(&WHITE)?;

    // y axis always begins at zero
    let max = payload.max_value();
    let y_top = if max > 0.0 { max * 1.1 } else { 1.0 };

    let mut chart = ChartBuilder::on(root)
        .caption("Income vs Expenses", ("sans-serif", 22.0 * s).into_font())
        .margin(options.px(12.0))
        .x_label_area_size(options.px(32.0))
        .y_label_area_size(options.px(64.0))
        .build_cartesian_2d((0i32..12i32).into_segmented(), 0f64..y_top)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(12)
        .x_label_formatter(&month_label)
        .label_style(("sans-serif", 13.0 * s))
        .draw()?;

    let gap = options.px(3.0);
    let series = [
        ("Income", INCOME_RGB.mix(0.7), &payload.income),
        ("Expenses", EXPENSES_RGB.mix(0.7), &payload.expenses),
    ];

    for (index, (label, color, values)) in series.into_iter().enumerate() {
        // income takes the left half of each month, expenses the right half
        let bars = values.iter().enumerate().map(move |(month, &value)| {
            let month = month as i32;
            let (left, right) = if index == 0 {
                (SegmentValue::Exact(month), SegmentValue::CenterOf(month))
            } else {
                (SegmentValue::CenterOf(month), SegmentValue::Exact(month + 1))
            };
            let mut bar = Rectangle::new([(left, 0.0), (right, value)], color.filled());
            if index == 0 {
                bar.set_margin(0, 0, gap, 0);
            } else {
                bar.set_margin(0, 0, 0, gap);
            }
            bar
        });

        chart
            .draw_series(bars)?
            .label(label)
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 10, y + 5)], color.filled()));
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(WHITE.mix(0.8))
        .border_style(&BLACK)
        .label_font(("sans-serif", 13.0 * s))
        .draw()?;

    Ok(())
}
